//! Directive vocabulary and marker scanning.
//!
//! Directives are plain attributes on fragment nodes. The names here are the
//! wire format: templates written against them must keep resolving, so the
//! vocabulary never changes casually.

use crate::dom::{Fragment, NodeId};

// Resolution directives, in handler order.
pub const PRE_CONDITION: &str = "pre_condition";
pub const CONDITION: &str = "condition";
pub const AUTH: &str = "auth";
pub const TRIGGER: &str = "trigger";
pub const EDITING_TOOLS: &str = "editing_tools";
pub const SEARCH: &str = "search";
pub const SEARCH_RESULTS: &str = "search_results";
pub const ATTRIBUTE_LIST: &str = "attribute_list";
pub const RELATION: &str = "relation";
pub const ACTION: &str = "action";
pub const ATTRIBUTE: &str = "attribute";
pub const LINK: &str = "link";

/// Marker left behind once an attribute directive has been consumed. Nested
/// templates also author it directly on nodes the main resolver must skip.
pub const RESOLVED: &str = "_attribute";

// Auxiliary attributes read alongside a directive.
pub const FILTER: &str = "filter";
pub const LIMIT: &str = "limit";
pub const EDITABLE: &str = "editable";
pub const MODEL: &str = "model";
pub const FORMAT: &str = "format";
pub const DATE_FORMAT: &str = "date_format";
pub const INPUT_TYPE: &str = "input_type";
pub const USE_CONTEXT: &str = "use_context";
pub const NO_CACHE: &str = "no_cache";
pub const CONTEXT: &str = "context";
pub const ATTRIBUTES: &str = "attributes";
pub const HREF: &str = "href";

// Classes with structural meaning.
pub const CLASS_DELAY_LOAD: &str = "delay_load";
pub const CLASS_DENY_ALL: &str = "deny-all";
pub const CLASS_EDIT_TEMPLATE: &str = "edit_template";
pub const CLASS_VIEW_TEMPLATE: &str = "view_template";
pub const CLASS_FIRST_VALUE: &str = "first-value";
pub const CLASS_HIDDEN: &str = "hidden";

/// Which marker occurrences a scan returns.
#[derive(Debug, Clone, Copy)]
pub enum Filter<'a> {
    /// Every occurrence in document order.
    All,
    /// Only the first occurrence.
    First,
    /// Occurrences with no strict ancestor carrying any of the listed
    /// attributes. Used to skip markers that belong to a nested template.
    NotInside(&'a [&'a str]),
}

/// Scan the subtree under `scope` for nodes carrying `name`, in document
/// order. The scope node itself is included.
pub fn find(
    frag: &Fragment,
    scope: NodeId,
    name: &str,
    filter: Filter<'_>,
) -> Vec<(NodeId, String)> {
    let mut out = Vec::new();
    let mut stack = vec![scope];
    // Manual DFS keeps document order with a LIFO stack of reversed children.
    while let Some(node) = stack.pop() {
        if let Some(value) = frag.attr(node, name) {
            let excluded = match filter {
                Filter::NotInside(attrs) => has_marked_ancestor(frag, scope, node, attrs),
                _ => false,
            };
            if !excluded {
                out.push((node, value.to_string()));
                if matches!(filter, Filter::First) {
                    return out;
                }
            }
        }
        for &child in frag.children(node).iter().rev() {
            stack.push(child);
        }
    }
    out
}

/// Any strict ancestor of `node` (up to and excluding `scope`) carrying one
/// of the listed attributes.
fn has_marked_ancestor(frag: &Fragment, scope: NodeId, node: NodeId, attrs: &[&str]) -> bool {
    let mut cur = frag.parent(node);
    while let Some(parent) = cur {
        if parent == scope {
            break;
        }
        if attrs.iter().any(|a| frag.attr(parent, a).is_some()) {
            return true;
        }
        cur = frag.parent(parent);
    }
    false
}

/// Split a directive value into its leading property and an optional
/// follow-path remainder: `owner.name` becomes `("owner", Some("name"))`.
pub fn split_follow(value: &str) -> (&str, Option<&str>) {
    match value.split_once('.') {
        Some((base, rest)) => (base, Some(rest)),
        None => (value, None),
    }
}

/// Split a directive value into its base and parenthesized embedded data:
/// `Comment(author: {id})` becomes `("Comment", Some("author: {id}"))`.
pub fn split_embedded(value: &str) -> (&str, Option<&str>) {
    let Some(open) = value.find('(') else {
        return (value.trim(), None);
    };
    let base = value[..open].trim();
    let rest = &value[open + 1..];
    let data = rest.strip_suffix(')').unwrap_or(rest);
    (base, Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_document_order() {
        let frag = Fragment::parse(
            r#"<div><p attribute="a"><span attribute="b"/></p><em attribute="c"/></div>"#,
        )
        .unwrap();
        let hits = find(&frag, frag.root(), ATTRIBUTE, Filter::All);
        let values: Vec<_> = hits.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, ["a", "b", "c"]);
    }

    #[test]
    fn find_first_only() {
        let frag =
            Fragment::parse(r#"<div><p attribute="a"/><p attribute="b"/></div>"#).unwrap();
        let hits = find(&frag, frag.root(), ATTRIBUTE, Filter::First);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, "a");
    }

    #[test]
    fn not_inside_skips_nested_markers() {
        let frag = Fragment::parse(
            r#"<div><ul attribute_list=""><li attribute="nested"/></ul><p attribute="top"/></div>"#,
        )
        .unwrap();
        let hits = find(
            &frag,
            frag.root(),
            ATTRIBUTE,
            Filter::NotInside(&[ATTRIBUTE_LIST]),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, "top");
    }

    #[test]
    fn not_inside_checks_strict_ancestors_only() {
        // A node carrying both markers is still returned; the exclusion is
        // about ancestors, not the node itself.
        let frag = Fragment::parse(r#"<div><p attribute="x" attribute_list=""/></div>"#).unwrap();
        let hits = find(
            &frag,
            frag.root(),
            ATTRIBUTE,
            Filter::NotInside(&[ATTRIBUTE_LIST]),
        );
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn follow_split() {
        assert_eq!(split_follow("owner.name"), ("owner", Some("name")));
        assert_eq!(split_follow("owner.group.name"), ("owner", Some("group.name")));
        assert_eq!(split_follow("name"), ("name", None));
    }

    #[test]
    fn embedded_split() {
        assert_eq!(
            split_embedded("Comment(author: {id})"),
            ("Comment", Some("author: {id}"))
        );
        assert_eq!(split_embedded("edit"), ("edit", None));
    }
}
