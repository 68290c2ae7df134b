//! Node classification and the recursive dispatch walk shared by every renderer.

use tracing::trace;

use crate::fragment::{Fragment, Node};

/// Ordered or unordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Unordered => "ul",
            Self::Ordered => "ol",
        }
    }
}

/// Heading level 1..=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    pub fn new(level: u8) -> Option<Self> {
        (1..=6).contains(&level).then_some(Self(level))
    }

    /// Parse `h1`..`h6`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let digit = tag.strip_prefix('h')?;
        if digit.len() != 1 {
            return None;
        }
        Self::new(digit.parse().ok()?)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// `h1`..`h6`.
    pub fn tag(self) -> String {
        format!("h{}", self.0)
    }
}

impl std::fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// What a node is, as far as dispatch is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    /// Document or body wrapper: drilled into once.
    PassThrough,
    Paragraph,
    List(ListKind),
    ListItem,
    Heading(HeadingLevel),
    Image,
    Blockquote,
    Table,
    /// Any other element; its children are processed at the parent's level.
    Container,
    Text,
}

/// Classify a node by tag name.
pub fn classify(node: &Node) -> NodeCategory {
    if node.is_text() {
        return NodeCategory::Text;
    }
    match node.tag_name.as_str() {
        "html" | "body" => NodeCategory::PassThrough,
        "p" => NodeCategory::Paragraph,
        "ul" => NodeCategory::List(ListKind::Unordered),
        "ol" => NodeCategory::List(ListKind::Ordered),
        "li" => NodeCategory::ListItem,
        "img" => NodeCategory::Image,
        "blockquote" => NodeCategory::Blockquote,
        "table" => NodeCategory::Table,
        tag => HeadingLevel::from_tag(tag)
            .map(NodeCategory::Heading)
            .unwrap_or(NodeCategory::Container),
    }
}

/// Target-specific handlers invoked by [`walk`].
///
/// Handlers own the whole subtree of the node they receive; the walker never
/// descends into it. Returning `None` drops the node from the output.
pub trait NodeHandler {
    type Output;

    fn paragraph(&mut self, _node: &Node) -> Option<Self::Output> {
        None
    }

    fn list(&mut self, _node: &Node, _kind: ListKind) -> Option<Self::Output> {
        None
    }

    fn list_item(&mut self, _node: &Node) -> Option<Self::Output> {
        None
    }

    fn heading(&mut self, _node: &Node, _level: HeadingLevel) -> Option<Self::Output> {
        None
    }

    fn image(&mut self, _node: &Node) -> Option<Self::Output> {
        None
    }

    fn blockquote(&mut self, _node: &Node) -> Option<Self::Output> {
        None
    }

    fn table(&mut self, _node: &Node) -> Option<Self::Output> {
        None
    }
}

/// Elements that flow inside a paragraph rather than starting a block.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "del", "dfn", "em", "font",
    "i", "img", "ins", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong",
    "sub", "sup", "time", "u", "var",
];

/// Text and inline elements are paragraph content.
pub fn is_inline(node: &Node) -> bool {
    node.is_text() || INLINE_TAGS.contains(&node.tag_name.as_str())
}

/// One dispatchable item at a given level of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    /// A node taken as-is.
    Node(&'a Node),
    /// Loose text and inline elements gathered under a synthetic `<p>`.
    Implicit(Node),
}

impl Block<'_> {
    pub fn node(&self) -> &Node {
        match self {
            Self::Node(node) => node,
            Self::Implicit(node) => node,
        }
    }
}

/// Group runs of sibling inline content into implicit paragraphs.
///
/// A run only becomes a paragraph when it carries visible text; otherwise its
/// nodes are dispatched one by one (so a bare `<img>` stays an image).
pub fn group_blocks(nodes: &[Node]) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        if !is_inline(&nodes[i]) {
            blocks.push(Block::Node(&nodes[i]));
            i += 1;
            continue;
        }
        let start = i;
        while i < nodes.len() && is_inline(&nodes[i]) {
            i += 1;
        }
        let run = &nodes[start..i];
        if run.iter().any(|n| !n.text_content().trim().is_empty()) {
            blocks.push(Block::Implicit(implicit_paragraph(run)));
        } else {
            blocks.extend(run.iter().map(Block::Node));
        }
    }
    blocks
}

/// Wrap `run` in a `<p>`, trimming whitespace at its edges.
fn implicit_paragraph(run: &[Node]) -> Node {
    let mut children = run.to_vec();
    if let Some(first) = children.first_mut().filter(|n| n.is_text()) {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = children.last_mut().filter(|n| n.is_text()) {
        last.text = last.text.trim_end().to_string();
    }
    children.retain(|n| !n.is_text() || !n.text.is_empty());
    Node::element("p").with_children(children)
}

/// Walk `fragment` in document order, collecting handler output.
pub fn walk<H: NodeHandler>(fragment: &Fragment, handler: &mut H) -> Vec<H::Output> {
    let mut out = Vec::new();
    walk_nodes(std::slice::from_ref(fragment.root()), handler, &mut out);
    out
}

fn walk_nodes<H: NodeHandler>(nodes: &[Node], handler: &mut H, out: &mut Vec<H::Output>) {
    for block in group_blocks(nodes) {
        let node = block.node();
        let category = classify(node);
        let produced = match category {
            NodeCategory::PassThrough => {
                // The wrapper encloses everything at this level.
                walk_nodes(&node.children, handler, out);
                break;
            }
            NodeCategory::Paragraph => handler.paragraph(node),
            NodeCategory::List(kind) => handler.list(node, kind),
            NodeCategory::ListItem => handler.list_item(node),
            NodeCategory::Heading(level) => handler.heading(node, level),
            NodeCategory::Image => handler.image(node),
            NodeCategory::Blockquote => handler.blockquote(node),
            NodeCategory::Table => handler.table(node),
            NodeCategory::Container => {
                if node.has_children() {
                    walk_nodes(&node.children, handler, out);
                }
                continue;
            }
            // Whitespace between blocks.
            NodeCategory::Text => continue,
        };

        match produced {
            Some(output) => out.push(output),
            None => trace!(tag = %node.tag_name, ?category, "node produced no output"),
        }
    }
}
