//! Dependency-graph validation for stages and phases.

use crate::nodes::{PhaseNode, Stage};
use crate::validation::{codes, ValidationResult};
use gantry_core::names::is_legal_node_name;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::warn;

/// A node participating in sibling dependency-graph validation.
pub trait GraphNode {
    fn node_name(&self) -> &str;
    fn node_depends_on(&self) -> &[String];
}

impl GraphNode for Stage {
    fn node_name(&self) -> &str {
        &self.name
    }

    fn node_depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

impl GraphNode for PhaseNode {
    fn node_name(&self) -> &str {
        &self.common().name
    }

    fn node_depends_on(&self) -> &[String] {
        &self.common().depends_on
    }
}

/// Settings for one graph-validation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptions {
    pub allow_hyphen_names: bool,
    /// When off, an illegal name is only a warning and execution substitutes
    /// a generated name for it.
    pub enforce_legal_node_names: bool,
}

/// Validates sibling nodes as a dependency graph, accumulating every error
/// rather than stopping at the first:
///
/// 1. node names are legal,
/// 2. names are unique (case-insensitive) within the parent scope,
/// 3. every `dependsOn` entry names an existing sibling,
/// 4. the graph is acyclic,
/// 5. at least one starting point (node without dependencies) exists.
pub fn validate_graph<N: GraphNode>(
    nodes: &[N],
    scope: Option<&str>,
    options: GraphOptions,
    result: &mut ValidationResult,
) {
    if nodes.is_empty() {
        return;
    }

    let describe = |name: &str| match scope {
        Some(scope) => format!("'{scope}.{name}'"),
        None => format!("'{name}'"),
    };

    // Name legality
    for node in nodes {
        let name = node.node_name();
        if !is_legal_node_name(name, options.allow_hyphen_names) {
            if options.enforce_legal_node_names {
                result.error(
                    codes::NAME_INVALID,
                    format!("The node name {} is not valid", describe(name)),
                );
            } else {
                warn!(node = %name, "Illegal node name; a generated name will be substituted");
                result
                    .warnings
                    .push(format!("The node name {} is not valid", describe(name)));
            }
        }
    }

    // Uniqueness
    let mut seen: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        *seen.entry(node.node_name().to_lowercase()).or_insert(0) += 1;
    }
    for node in nodes {
        let count = seen
            .get_mut(&node.node_name().to_lowercase())
            .expect("name was counted");
        if *count > 1 {
            result.error(
                codes::NAME_NOT_UNIQUE,
                format!("The node name {} must be unique", describe(node.node_name())),
            );
            // Report the duplicate set once.
            *count = 0;
        }
    }

    // Dependency existence
    let index_by_name: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.node_name().to_lowercase(), i))
        .collect();

    for node in nodes {
        for dependency in node.node_depends_on() {
            if !index_by_name.contains_key(&dependency.to_lowercase()) {
                result.error(
                    codes::DEPENDENCY_NOT_FOUND,
                    format!(
                        "The node {} depends on unknown node '{}'",
                        describe(node.node_name()),
                        dependency
                    ),
                );
            }
        }
    }

    // Acyclicity, over the edges whose endpoints exist
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
    for (i, node) in nodes.iter().enumerate() {
        for dependency in node.node_depends_on() {
            if let Some(&dep) = index_by_name.get(&dependency.to_lowercase()) {
                graph.add_edge(indices[dep], indices[i], ());
            }
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        let position = graph[cycle.node_id()];
        result.error(
            codes::GRAPH_CONTAINS_CYCLE,
            format!(
                "The node {} participates in a dependency cycle",
                describe(nodes[position].node_name())
            ),
        );
    }

    // Starting point
    if !nodes.iter().any(|node| node.node_depends_on().is_empty()) {
        result.error(
            codes::STARTING_POINT_NOT_FOUND,
            match scope {
                Some(scope) => format!("Stage '{scope}' has no starting node"),
                None => "The pipeline has no starting node".to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Phase, PhaseCommon};
    use pretty_assertions::assert_eq;

    fn phase(name: &str, depends_on: &[&str]) -> PhaseNode {
        PhaseNode::Phase(Phase {
            common: PhaseCommon {
                name: name.to_string(),
                depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
                ..PhaseCommon::default()
            },
            steps: vec![],
        })
    }

    fn codes_of(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.code.as_str()).collect()
    }

    #[test]
    fn test_valid_diamond() {
        let nodes = vec![
            phase("build", &[]),
            phase("test_unit", &["build"]),
            phase("test_integration", &["build"]),
            phase("publish", &["test_unit", "test_integration"]),
        ];

        let mut result = ValidationResult::new();
        validate_graph(&nodes, None, GraphOptions::default(), &mut result);
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_three_node_cycle() {
        let nodes = vec![
            phase("a", &["b"]),
            phase("b", &["c"]),
            phase("c", &["a"]),
        ];

        let mut result = ValidationResult::new();
        validate_graph(&nodes, None, GraphOptions::default(), &mut result);

        let codes = codes_of(&result);
        assert!(codes.contains(&codes::GRAPH_CONTAINS_CYCLE));
        assert_eq!(
            codes
                .iter()
                .filter(|c| **c == codes::GRAPH_CONTAINS_CYCLE)
                .count(),
            1
        );
        // A full cycle also has no starting point.
        assert!(codes.contains(&codes::STARTING_POINT_NOT_FOUND));
    }

    #[test]
    fn test_missing_dependency() {
        let nodes = vec![phase("a", &[]), phase("b", &["ghost"])];

        let mut result = ValidationResult::new();
        validate_graph(&nodes, Some("deploy"), GraphOptions::default(), &mut result);

        assert_eq!(codes_of(&result), vec![codes::DEPENDENCY_NOT_FOUND]);
        assert!(result.errors[0].message.contains("ghost"));
    }

    #[test]
    fn test_duplicate_names_reported_once() {
        let nodes = vec![phase("build", &[]), phase("Build", &[]), phase("ok", &[])];

        let mut result = ValidationResult::new();
        validate_graph(&nodes, None, GraphOptions::default(), &mut result);

        assert_eq!(codes_of(&result), vec![codes::NAME_NOT_UNIQUE]);
    }

    #[test]
    fn test_illegal_name_warns_unless_enforced() {
        let nodes = vec![phase("no spaces allowed", &[])];

        let mut result = ValidationResult::new();
        validate_graph(&nodes, None, GraphOptions::default(), &mut result);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);

        let mut enforced = ValidationResult::new();
        validate_graph(
            &nodes,
            None,
            GraphOptions {
                enforce_legal_node_names: true,
                ..GraphOptions::default()
            },
            &mut enforced,
        );
        assert_eq!(codes_of(&enforced), vec![codes::NAME_INVALID]);
    }

    #[test]
    fn test_errors_accumulate() {
        let nodes = vec![
            phase("a", &["b"]),
            phase("b", &["a"]),
            phase("c", &["ghost"]),
        ];

        let mut result = ValidationResult::new();
        validate_graph(&nodes, None, GraphOptions::default(), &mut result);

        let codes = codes_of(&result);
        assert!(codes.contains(&codes::DEPENDENCY_NOT_FOUND));
        assert!(codes.contains(&codes::GRAPH_CONTAINS_CYCLE));
    }
}
