//! Node-name legality and sanitization.

use crate::constants::MAX_NODE_NAME_LENGTH;

/// A legal node name starts with a letter and is otherwise composed of
/// alphanumeric characters and underscores (plus hyphens when
/// `allow_hyphens` is set).
pub fn is_legal_node_name(name: &str, allow_hyphens: bool) -> bool {
    if name.trim().is_empty() || name.len() > MAX_NODE_NAME_LENGTH {
        return false;
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }

    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_hyphens && c == '-'))
}

/// Strips characters that are illegal in a node name. Names do not have to
/// start with a letter after sanitization; callers that care check
/// [`is_legal_node_name`] on the result.
pub fn sanitize(name: &str, allow_hyphens: bool) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || (allow_hyphens && *c == '-'))
        .take(MAX_NODE_NAME_LENGTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_names() {
        assert!(is_legal_node_name("build_linux", false));
        assert!(is_legal_node_name("Job1", false));
        assert!(!is_legal_node_name("1job", false));
        assert!(!is_legal_node_name("", false));
        assert!(!is_legal_node_name("has space", false));
    }

    #[test]
    fn test_hyphens_are_opt_in() {
        assert!(!is_legal_node_name("build-linux", false));
        assert!(is_legal_node_name("build-linux", true));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("node 18.x (linux)", false), "node18xlinux");
        assert_eq!(sanitize("build-linux", true), "build-linux");
        assert_eq!(sanitize("build-linux", false), "buildlinux");
    }
}
