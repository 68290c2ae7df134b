//! The fragment tree: tolerant parsing into owned [`Node`]s and canonical serialization.
//!
//! Parsing goes through `scraper` (html5ever) in fragment mode, so tag soup,
//! unclosed paragraphs and inline images inside block tags survive the way a
//! browser would build them. The resulting tree is converted into plain owned
//! nodes that the transform passes can clone and rewrite freely.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

/// Tag name of the synthetic wrapper every parsed fragment sits under.
pub const ROOT_TAG: &str = "body";

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text content is emitted without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single node of the fragment tree.
///
/// Text nodes have an empty `tag_name` and no children; element nodes carry no
/// text of their own (mixed content is a child text node).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Lower-cased tag name, empty for text nodes.
    pub tag_name: String,
    /// Attributes, sorted by name.
    pub attributes: BTreeMap<String, String>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
    /// Text of a leaf text node.
    pub text: String,
}

impl Node {
    /// Create an element with no attributes or children.
    pub fn element(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Create a text node.
    pub fn text(content: &str) -> Self {
        Self {
            text: content.to_string(),
            ..Self::default()
        }
    }

    /// Builder: add an attribute.
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder: append a child.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Builder: append several children.
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn is_text(&self) -> bool {
        self.tag_name.is_empty()
    }

    pub fn is_element(&self) -> bool {
        !self.tag_name.is_empty()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Attribute value, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Attribute value, or the empty string when absent.
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or_default()
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attributes
            .insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    /// Concatenated text of this node and all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if self.is_text() {
            out.push_str(&self.text);
            return;
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Serialized children of this node.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        self.write_children(&mut out, None);
        out
    }

    /// Serialized children, letting `replace` serialize any descendant element
    /// itself. Elements it returns `None` for are written as usual.
    pub fn inner_html_with(&self, replace: &dyn Fn(&Node) -> Option<String>) -> String {
        let mut out = String::new();
        self.write_children(&mut out, Some(replace));
        out
    }

    /// Serialized node including its own tag.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out, false, None);
        out
    }

    fn write_children(&self, out: &mut String, replace: Option<&dyn Fn(&Node) -> Option<String>>) {
        let raw = RAW_TEXT_ELEMENTS.contains(&self.tag_name.as_str());
        for child in &self.children {
            // Empty list items carry nothing worth keeping.
            if child.tag_name == "li" && child.attributes.is_empty() && child.children.is_empty() {
                continue;
            }
            child.write_html(out, raw, replace);
        }
    }

    fn write_html(
        &self,
        out: &mut String,
        raw_text: bool,
        replace: Option<&dyn Fn(&Node) -> Option<String>>,
    ) {
        if self.is_text() {
            if raw_text {
                out.push_str(&self.text);
            } else {
                out.push_str(&escape_text(&self.text));
            }
            return;
        }

        if let Some(html) = replace.and_then(|f| f(self)) {
            out.push_str(&html);
            return;
        }

        out.push('<');
        out.push_str(&self.tag_name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }

        if is_void_element(&self.tag_name) {
            out.push_str(" />");
            return;
        }

        out.push('>');
        self.write_children(out, replace);
        out.push_str("</");
        out.push_str(&self.tag_name);
        out.push('>');
    }

    /// Visit every element in this subtree (pre-order), including `self`.
    pub fn visit_elements_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        if self.is_text() {
            return;
        }
        f(self);
        for child in &mut self.children {
            child.visit_elements_mut(f);
        }
    }

    /// Detach the first descendant (pre-order) matching `pred` and return it.
    pub fn remove_first_where(&mut self, pred: &impl Fn(&Node) -> bool) -> Option<Node> {
        if let Some(pos) = self.children.iter().position(|c| pred(c)) {
            return Some(self.children.remove(pos));
        }
        for child in &mut self.children {
            if let Some(found) = child.remove_first_where(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Iterate over this node and every descendant in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// Pre-order iterator over a subtree.
pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Whether `tag` is serialized as a self-closing void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Escape text content for HTML.
pub fn escape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape a double-quoted attribute value.
pub fn escape_attr(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// An ordered forest of nodes under a synthetic [`ROOT_TAG`] wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    root: Node,
}

impl Default for Fragment {
    fn default() -> Self {
        Self::from_nodes(Vec::new())
    }
}

impl Fragment {
    /// Wrap already-built nodes.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self {
            root: Node::element(ROOT_TAG).with_children(nodes),
        }
    }

    /// The synthetic wrapper element.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Top-level nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.root.children
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Serialize the forest back to HTML.
    pub fn to_html(&self) -> String {
        self.root.inner_html()
    }

    /// All elements named `tag`, in document order.
    pub fn elements_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.root
            .descendants()
            .skip(1)
            .filter(move |node| node.tag_name == tag)
    }

    /// Return a copy of this fragment with `f` applied to every element (pre-order).
    ///
    /// The wrapper itself is not visited.
    pub fn map_elements(&self, mut f: impl FnMut(&mut Node)) -> Fragment {
        let mut out = self.clone();
        for child in &mut out.root.children {
            child.visit_elements_mut(&mut f);
        }
        out
    }

    /// Return a copy without the first node matching `pred`, plus the removed node.
    pub fn without_first(&self, pred: impl Fn(&Node) -> bool) -> (Fragment, Option<Node>) {
        let mut out = self.clone();
        let removed = out.root.remove_first_where(&pred);
        (out, removed)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse an HTML fragment tolerantly.
///
/// Never fails: malformed markup is repaired by the HTML5 tree builder, and
/// comments, doctypes and processing instructions are dropped.
pub fn parse_fragment(html: &str) -> Fragment {
    let parsed = Html::parse_fragment(html);
    // Fragment parsing places content under an `<html>` context element.
    let nodes = convert_children(parsed.root_element());
    Fragment::from_nodes(nodes)
}

fn convert_children(el: ElementRef<'_>) -> Vec<Node> {
    el.children()
        .filter_map(|child| match child.value() {
            scraper::Node::Text(text) => Some(Node::text(text)),
            scraper::Node::Element(_) => ElementRef::wrap(child).map(convert_element),
            _ => None,
        })
        .collect()
}

fn convert_element(el: ElementRef<'_>) -> Node {
    let mut node = Node::element(el.value().name());
    for (name, value) in el.value().attrs() {
        node.set_attr(name, value);
    }
    node.children = convert_children(el);
    node
}
