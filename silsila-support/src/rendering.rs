//! Text rendering for resolution paths and error messages.
//!
//! Failures during resolution show the user two things: the chain of
//! service identifiers that led to the failure, and an indented tree of
//! every step the resolver took. The helpers here format both.

/// Option flags attached to a rendered identifier.
///
/// Rendered inside the identifier's bracket suffix in a fixed order:
/// container name first, then `Lazy`, `Dynamic`, `Optional`, `Multiple`,
/// `Default`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathFlags {
    pub lazy: bool,
    pub dynamic: bool,
    pub optional: bool,
    pub multiple: bool,
    pub has_default: bool,
}

/// Renders an identifier with its container and option flags.
///
/// # Examples
/// ```
/// use silsila_support::rendering::{render_identifier, PathFlags};
///
/// let flags = PathFlags { lazy: true, optional: true, ..PathFlags::default() };
/// assert_eq!(render_identifier("logger", "Root", &flags), "logger[#Root, Lazy, Optional]");
/// assert_eq!(render_identifier("db", "app", &PathFlags::default()), "db[#app]");
/// ```
pub fn render_identifier(label: &str, container: &str, flags: &PathFlags) -> String {
    let mut out = String::with_capacity(label.len() + container.len() + 8);
    out.push_str(label);
    out.push_str("[#");
    out.push_str(container);
    for (set, tag) in [
        (flags.lazy, "Lazy"),
        (flags.dynamic, "Dynamic"),
        (flags.optional, "Optional"),
        (flags.multiple, "Multiple"),
        (flags.has_default, "Default"),
    ] {
        if set {
            out.push_str(", ");
            out.push_str(tag);
        }
    }
    out.push(']');
    out
}

/// Renders a resolution chain as a single line.
///
/// When `cycle_index` is given, that entry is wrapped in double parentheses
/// to mark where the chain loops back on itself.
///
/// # Examples
/// ```
/// use silsila_support::rendering::render_chain;
///
/// let chain = vec!["A[#C1]".to_string(), "B[#C2]".to_string(), "A[#C1]".to_string()];
/// assert_eq!(render_chain(&chain, Some(2)), "A[#C1] -> B[#C2] -> ((A[#C1]))");
/// assert_eq!(render_chain(&chain[..2], None), "A[#C1] -> B[#C2]");
/// ```
pub fn render_chain(entries: &[String], cycle_index: Option<usize>) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            if Some(i) == cycle_index {
                format!("(({entry}))")
            } else {
                entry.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Renders resolution steps as an indented tree.
///
/// Each line is `(depth, text)`; depth 0 is the first visible level and is
/// indented by two spaces, each further level by two more.
///
/// ```
/// use silsila_support::rendering::render_tree;
///
/// let lines = vec![(0, "Resolve A".to_string()), (1, "Resolve B".to_string())];
/// assert_eq!(render_tree(&lines), "  Resolve A\n    Resolve B");
/// ```
pub fn render_tree(lines: &[(usize, String)]) -> String {
    lines
        .iter()
        .map(|(depth, text)| format!("{}{}", "  ".repeat(depth + 1), text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use silsila_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>");
/// assert_eq!(short, "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    // Keep only the last segment of each path component:
    // "my_app::services::UserService" -> "UserService"
    // "Arc<dyn my_app::Logger>" -> "Arc<dyn Logger>"
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut current_segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next(); // consume second ':'
                current_segment.clear(); // discard path prefix
            }
            '<' | '>' | ',' | ' ' => {
                result.push_str(&current_segment);
                result.push(ch);
                current_segment.clear();
            }
            _ => {
                current_segment.push(ch);
            }
        }
    }

    result.push_str(&current_segment);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_without_flags() {
        assert_eq!(
            render_identifier("db", "Root", &PathFlags::default()),
            "db[#Root]"
        );
    }

    #[test]
    fn identifier_flag_order_is_fixed() {
        let flags = PathFlags {
            lazy: false,
            dynamic: true,
            optional: true,
            multiple: true,
            has_default: true,
        };
        assert_eq!(
            render_identifier("svc", "app", &flags),
            "svc[#app, Dynamic, Optional, Multiple, Default]"
        );
    }

    #[test]
    fn chain_without_cycle() {
        let chain = vec!["A[#Root]".to_string(), "B[#Root]".to_string()];
        assert_eq!(render_chain(&chain, None), "A[#Root] -> B[#Root]");
    }

    #[test]
    fn chain_marks_cycle_entry() {
        let chain = vec![
            "A[#Root]".to_string(),
            "B[#Root]".to_string(),
            "A[#Root]".to_string(),
        ];
        assert_eq!(
            render_chain(&chain, Some(2)),
            "A[#Root] -> B[#Root] -> ((A[#Root]))"
        );
    }

    #[test]
    fn chain_of_one() {
        let chain = vec!["A[#Root]".to_string()];
        assert_eq!(render_chain(&chain, None), "A[#Root]");
    }

    #[test]
    fn empty_chain() {
        assert_eq!(render_chain(&[], None), "");
    }

    #[test]
    fn tree_indents_by_depth() {
        let lines = vec![
            (0, "Resolve A[#Root]".to_string()),
            (1, "Resolve B[#Root]".to_string()),
            (2, "Resolve parameter #0 of \"B\"".to_string()),
            (1, "Resolve C[#Root]".to_string()),
        ];
        let rendered = render_tree(&lines);
        assert_eq!(
            rendered,
            "  Resolve A[#Root]\n    Resolve B[#Root]\n      Resolve parameter #0 of \"B\"\n    Resolve C[#Root]"
        );
    }

    #[test]
    fn shorten_simple_path() {
        assert_eq!(
            shorten_type_name("my_app::services::UserService"),
            "UserService"
        );
    }

    #[test]
    fn shorten_with_generics() {
        assert_eq!(
            shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
            "Arc<dyn Logger>"
        );
    }

    #[test]
    fn shorten_no_path() {
        assert_eq!(shorten_type_name("String"), "String");
    }
}
