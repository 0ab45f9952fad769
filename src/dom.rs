//! Owned document fragment arena.
//!
//! The directive engine works on an exclusively-owned subtree rather than a
//! live browser DOM. `Fragment` is a flat arena of element/text nodes indexed
//! by `NodeId`; detached nodes stay in the arena (the fragment is short-lived
//! and absorbed into the caller's output once resolution completes).
//!
//! Markup I/O goes through quick-xml: `Fragment::parse` accepts a well-formed
//! XML/XHTML subset (multiple top-level nodes allowed) and `to_xml`
//! serializes the live tree back out.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::WeftError;

/// Handle to a node inside one [`Fragment`]. Not valid across fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        classes: Vec<String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned document subtree.
#[derive(Debug, Clone)]
pub struct Fragment {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for Fragment {
    fn default() -> Self {
        Self::new()
    }
}

impl Fragment {
    /// Create an empty fragment (synthetic container root).
    pub fn new() -> Self {
        let root_data = NodeData {
            kind: NodeKind::Element {
                tag: String::new(),
                attrs: Vec::new(),
                classes: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root_data],
            root: NodeId(0),
        }
    }

    /// Parse a markup string into a fragment.
    ///
    /// Whitespace-only text between elements is dropped; entity references
    /// for the five XML entities and numeric references are decoded.
    pub fn parse(input: &str) -> Result<Self, WeftError> {
        let mut frag = Self::new();
        // Entity references arrive as separate GeneralRef events, so text
        // must keep its surrounding whitespace; whitespace-only nodes are
        // dropped below instead of via trim_text.
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<NodeId> = vec![frag.root];

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let node = frag.element_from_start(&e)?;
                    let parent = *stack.last().unwrap_or(&frag.root);
                    frag.append(parent, node);
                    stack.push(node);
                }
                Event::Empty(e) => {
                    let node = frag.element_from_start(&e)?;
                    let parent = *stack.last().unwrap_or(&frag.root);
                    frag.append(parent, node);
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e
                        .decode()
                        .map_err(|e| WeftError::Markup(e.to_string()))?
                        .into_owned();
                    if !text.trim().is_empty() {
                        let node = frag.create_text(&text);
                        let parent = *stack.last().unwrap_or(&frag.root);
                        frag.append(parent, node);
                    }
                }
                Event::GeneralRef(e) => {
                    let entity = String::from_utf8_lossy(&e).into_owned();
                    let node = frag.create_text(&decode_entity(&entity));
                    let parent = *stack.last().unwrap_or(&frag.root);
                    frag.append(parent, node);
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    let node = frag.create_text(&text);
                    let parent = *stack.last().unwrap_or(&frag.root);
                    frag.append(parent, node);
                }
                Event::Eof => break,
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }

        Ok(frag)
    }

    fn element_from_start(&mut self, e: &BytesStart<'_>) -> Result<NodeId, WeftError> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let node = self.create_element(&tag);

        for attr in e.attributes() {
            let attr = attr.map_err(|e| WeftError::Markup(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| WeftError::Markup(e.to_string()))?
                .into_owned();
            if key == "class" {
                for class in value.split_whitespace() {
                    self.add_class(node, class);
                }
            } else {
                self.set_attr(node, &key, &value);
            }
        }
        Ok(node)
    }

    /// Serialize the fragment's contents (children of the synthetic root).
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for &child in &self.data(self.root).children {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.data(id).kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element { tag, attrs, classes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                if !classes.is_empty() {
                    out.push_str(" class=\"");
                    out.push_str(&escape_attr(&classes.join(" ")));
                    out.push('"');
                }
                let children = &self.data(id).children;
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData {
            kind: NodeKind::Element {
                tag: tag.to_string(),
                attrs: Vec::new(),
                classes: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        })
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    // ─────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id).kind, NodeKind::Element { .. })
    }

    /// Element tag name; `None` for text nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.data(id).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.data(id).kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.data_mut(id).kind {
            if let Some(entry) = attrs.iter_mut().find(|(k, _)| k == name) {
                entry.1 = value.to_string();
            } else {
                attrs.push((name.to_string(), value.to_string()));
            }
        }
    }

    /// Remove an attribute, returning its former value.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attrs, .. } = &mut self.data_mut(id).kind {
            if let Some(pos) = attrs.iter().position(|(k, _)| k == name) {
                return Some(attrs.remove(pos).1);
            }
        }
        None
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        match &self.data(id).kind {
            NodeKind::Element { classes, .. } => classes.iter().any(|c| c == class),
            NodeKind::Text(_) => false,
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let NodeKind::Element { classes, .. } = &mut self.data_mut(id).kind {
            if !classes.iter().any(|c| c == class) {
                classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let NodeKind::Element { classes, .. } = &mut self.data_mut(id).kind {
            classes.retain(|c| c != class);
        }
    }

    pub fn classes(&self, id: NodeId) -> &[String] {
        match &self.data(id).kind {
            NodeKind::Element { classes, .. } => classes,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).children
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.data(id).parent?;
        let siblings = &self.data(parent).children;
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Whether the node is still reachable from the fragment root.
    ///
    /// Async load callbacks must check this: a load is never cancelled, so
    /// its carrier node may have been detached by a condition in the
    /// meantime.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root {
                return true;
            }
            match self.data(cur).parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Concatenated text of the node and its descendants.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.data(id).kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element { .. } => {
                for &child in &self.data(id).children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    ///
    /// Returns a snapshot so callers may mutate the tree while iterating.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.data(id).children {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Ancestors of `id` from its parent up to (and including) the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = id;
        while let Some(p) = self.data(cur).parent {
            out.push(p);
            cur = p;
        }
        out
    }

    // ─────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.data_mut(child).parent = Some(parent);
        self.data_mut(parent).children.push(child);
    }

    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) {
        self.detach(node);
        if let Some(parent) = self.data(anchor).parent {
            let pos = self
                .data(parent)
                .children
                .iter()
                .position(|&c| c == anchor)
                .unwrap_or(0);
            self.data_mut(node).parent = Some(parent);
            self.data_mut(parent).children.insert(pos, node);
        }
    }

    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        self.detach(node);
        if let Some(parent) = self.data(anchor).parent {
            let pos = self
                .data(parent)
                .children
                .iter()
                .position(|&c| c == anchor)
                .map(|p| p + 1)
                .unwrap_or(self.data(parent).children.len());
            self.data_mut(node).parent = Some(parent);
            self.data_mut(parent).children.insert(pos, node);
        }
    }

    /// Unlink a node from its parent. The node and its subtree stay in the
    /// arena but are no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.data(id).parent else {
            return;
        };
        self.data_mut(id).parent = None;
        self.data_mut(parent).children.retain(|&c| c != id);
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.data_mut(id).children);
        for child in children {
            self.data_mut(child).parent = None;
        }
    }

    /// Replace the node's contents with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append(id, t);
        }
    }

    /// Replace the node's contents with parsed markup. Falls back to plain
    /// text when the markup does not parse.
    pub fn set_html(&mut self, id: NodeId, markup: &str) {
        if markup.contains('<') {
            if let Ok(sub) = Fragment::parse(markup) {
                self.clear_children(id);
                self.splice(id, &sub);
                return;
            }
        }
        self.set_text(id, markup);
    }

    /// Deep-clone a subtree within this fragment; the clone is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let cloned = NodeData {
            kind: self.data(id).kind.clone(),
            parent: None,
            children: Vec::new(),
        };
        let new_id = self.push(cloned);
        let children = self.data(id).children.clone();
        for child in children {
            let new_child = self.clone_subtree(child);
            self.append(new_id, new_child);
        }
        new_id
    }

    /// Clone the node and its subtree into a fresh fragment.
    pub fn capture_subtree(&self, id: NodeId) -> Fragment {
        let mut out = Fragment::new();
        let root = out.root;
        let copied = out.copy_from(self, id);
        out.append(root, copied);
        out
    }

    /// Clone the node's children into a fresh fragment (a captured template).
    pub fn capture_children(&self, id: NodeId) -> Fragment {
        let mut out = Fragment::new();
        let root = out.root;
        for &child in &self.data(id).children {
            let copied = out.copy_from(self, child);
            out.append(root, copied);
        }
        out
    }

    /// Clone the contents of `src` (its root children) into `target`,
    /// appending. Returns a map from `src` node ids to the new ids here, so
    /// callers can remap bookkeeping that referenced the source fragment.
    pub fn splice(&mut self, target: NodeId, src: &Fragment) -> HashMap<NodeId, NodeId> {
        let mut map = HashMap::new();
        for &child in &src.data(src.root).children {
            let copied = self.copy_from_mapped(src, child, &mut map);
            self.append(target, copied);
        }
        map
    }

    fn copy_from(&mut self, src: &Fragment, id: NodeId) -> NodeId {
        let mut map = HashMap::new();
        self.copy_from_mapped(src, id, &mut map)
    }

    fn copy_from_mapped(
        &mut self,
        src: &Fragment,
        id: NodeId,
        map: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        let new_id = self.push(NodeData {
            kind: src.data(id).kind.clone(),
            parent: None,
            children: Vec::new(),
        });
        map.insert(id, new_id);
        for &child in &src.data(id).children {
            let new_child = self.copy_from_mapped(src, child, map);
            self.append(new_id, new_child);
        }
        new_id
    }
}

fn decode_entity(entity: &str) -> String {
    match entity {
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "amp" => "&".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        _ => entity
            .strip_prefix("#x")
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| format!("&{entity};")),
    }
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_roundtrip() {
        let frag = Fragment::parse(r#"<div id="a"><span>hi</span></div>"#).unwrap();
        assert_eq!(frag.to_xml(), r#"<div id="a"><span>hi</span></div>"#);
    }

    #[test]
    fn parse_multiple_roots() {
        let frag = Fragment::parse("<a/><b/>").unwrap();
        assert_eq!(frag.children(frag.root()).len(), 2);
        assert_eq!(frag.to_xml(), "<a/><b/>");
    }

    #[test]
    fn parse_classes() {
        let frag = Fragment::parse(r#"<div class="one two"/>"#).unwrap();
        let div = frag.children(frag.root())[0];
        assert!(frag.has_class(div, "one"));
        assert!(frag.has_class(div, "two"));
        assert_eq!(frag.to_xml(), r#"<div class="one two"/>"#);
    }

    #[test]
    fn attr_set_remove() {
        let mut frag = Fragment::parse(r#"<div attribute="name"/>"#).unwrap();
        let div = frag.children(frag.root())[0];
        assert_eq!(frag.attr(div, "attribute"), Some("name"));
        assert_eq!(frag.remove_attr(div, "attribute"), Some("name".to_string()));
        assert_eq!(frag.attr(div, "attribute"), None);
        frag.set_attr(div, "_attribute", "name");
        assert_eq!(frag.to_xml(), r#"<div _attribute="name"/>"#);
    }

    #[test]
    fn set_text_replaces_children() {
        let mut frag = Fragment::parse("<div><span>old</span></div>").unwrap();
        let div = frag.children(frag.root())[0];
        frag.set_text(div, "new");
        assert_eq!(frag.to_xml(), "<div>new</div>");
    }

    #[test]
    fn set_html_parses_markup() {
        let mut frag = Fragment::parse("<div/>").unwrap();
        let div = frag.children(frag.root())[0];
        frag.set_html(div, "line<br/>break");
        assert_eq!(frag.to_xml(), "<div>line<br/>break</div>");
    }

    #[test]
    fn detach_and_is_attached() {
        let mut frag = Fragment::parse("<div><span>hi</span></div>").unwrap();
        let div = frag.children(frag.root())[0];
        let span = frag.children(div)[0];
        assert!(frag.is_attached(span));
        frag.detach(div);
        assert!(!frag.is_attached(span));
        assert_eq!(frag.to_xml(), "");
    }

    #[test]
    fn insert_after_preserves_order() {
        let mut frag = Fragment::parse("<ul><li>a</li></ul>").unwrap();
        let ul = frag.children(frag.root())[0];
        let li = frag.children(ul)[0];
        let b = frag.create_element("li");
        frag.set_text(b, "b");
        frag.insert_after(li, b);
        assert_eq!(frag.to_xml(), "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn capture_and_splice() {
        let mut frag = Fragment::parse("<div><span>tpl</span></div>").unwrap();
        let div = frag.children(frag.root())[0];
        let captured = frag.capture_children(div);
        frag.clear_children(div);
        assert_eq!(frag.to_xml(), "<div/>");

        let map = frag.splice(div, &captured);
        assert_eq!(frag.to_xml(), "<div><span>tpl</span></div>");
        assert_eq!(map.len(), 2); // span + text node
    }

    #[test]
    fn clone_subtree_is_deep() {
        let mut frag = Fragment::parse(r#"<tr class="row"><td>x</td></tr>"#).unwrap();
        let tr = frag.children(frag.root())[0];
        let copy = frag.clone_subtree(tr);
        frag.insert_before(tr, copy);
        assert_eq!(
            frag.to_xml(),
            r#"<tr class="row"><td>x</td></tr><tr class="row"><td>x</td></tr>"#
        );
    }

    #[test]
    fn text_concatenates_descendants() {
        let frag = Fragment::parse("<div>a<span>b</span>c</div>").unwrap();
        let div = frag.children(frag.root())[0];
        assert_eq!(frag.text(div), "abc");
    }

    #[test]
    fn descendants_document_order() {
        let frag = Fragment::parse("<div><a/><b><c/></b></div>").unwrap();
        let div = frag.children(frag.root())[0];
        let tags: Vec<_> = frag
            .descendants(div)
            .into_iter()
            .filter_map(|n| frag.tag(n).map(str::to_string))
            .collect();
        assert_eq!(tags, ["a", "b", "c"]);
    }

    #[test]
    fn entities_decoded_on_parse() {
        let frag = Fragment::parse("<div>a &amp; b</div>").unwrap();
        let div = frag.children(frag.root())[0];
        assert_eq!(frag.text(div), "a & b");
        assert_eq!(frag.to_xml(), "<div>a &amp; b</div>");
    }
}
