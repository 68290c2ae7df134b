//! Flat-HTML renderer: normalized paragraphs, headings, lists and images.

use contentbridge_dom::{
    Fragment, HeadingLevel, ListKind, Node, NodeHandler, escape_attr, escape_text, walk,
};

/// Attributes carried by a re-synthesized `<img />`, in output order.
pub const IMG_ATTRIBUTES: [&str; 6] = ["src", "alt", "title", "width", "height", "class"];

/// Render `fragment` to flat HTML.
pub fn render_flat(fragment: &Fragment) -> String {
    walk(fragment, &mut FlatHandler).concat()
}

/// Build a self-closing `<img />` from the fixed attribute set.
///
/// Every attribute is emitted, missing ones as empty strings.
pub fn synthesize_img(node: &Node) -> String {
    let mut out = String::from("<img");
    for name in IMG_ATTRIBUTES {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(node.attr_or_empty(name)));
        out.push('"');
    }
    out.push_str(" />");
    out
}

/// Handler set producing literal HTML strings.
pub struct FlatHandler;

impl NodeHandler for FlatHandler {
    type Output = String;

    fn paragraph(&mut self, node: &Node) -> Option<String> {
        let inner = node.inner_html();
        if inner.contains("<img") {
            // Never separate prose from its images.
            let inner =
                node.inner_html_with(&|el| (el.tag_name == "img").then(|| synthesize_img(el)));
            return Some(format!("{}\n", inner.trim()));
        }
        Some(format!("<p>{inner}</p>\n"))
    }

    fn list(&mut self, node: &Node, kind: ListKind) -> Option<String> {
        let tag = kind.tag();
        let mut out = format!("<{tag}>\n");
        for child in &node.children {
            if child.tag_name == "li" {
                out.push_str(&render_list_item(child));
            } else if child.is_element() {
                out.push_str(&child.outer_html());
                out.push('\n');
            } else if !child.text.trim().is_empty() {
                out.push_str(&escape_text(&child.text));
            }
        }
        out.push_str(&format!("</{tag}>\n"));
        Some(out)
    }

    fn list_item(&mut self, node: &Node) -> Option<String> {
        Some(render_list_item(node))
    }

    fn heading(&mut self, node: &Node, level: HeadingLevel) -> Option<String> {
        Some(format!("<{level}>{}</{level}>\n", node.inner_html()))
    }

    fn image(&mut self, node: &Node) -> Option<String> {
        Some(format!("{}\n", synthesize_img(node)))
    }

    fn blockquote(&mut self, node: &Node) -> Option<String> {
        let inner = node.inner_html();
        (!inner.is_empty()).then(|| format!("<blockquote>{inner}</blockquote>\n"))
    }

    fn table(&mut self, node: &Node) -> Option<String> {
        let inner = node.inner_html();
        (!inner.is_empty()).then(|| format!("<table>{inner}</table>\n"))
    }
}

fn render_list_item(node: &Node) -> String {
    format!("<li>{}</li>\n", node.inner_html())
}
