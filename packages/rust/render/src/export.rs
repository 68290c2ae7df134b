//! Reverse exporter: flattens a stored rich-text body back into linear HTML.

use contentbridge_dom::{Fragment, Node, NodeCategory, classify, group_blocks, parse_fragment};

use crate::flat::synthesize_img;

/// Parse `html` and flatten it.
pub fn flatten(html: &str) -> String {
    flatten_fragment(&parse_fragment(html))
}

/// Flatten an already-parsed fragment.
pub fn flatten_fragment(fragment: &Fragment) -> String {
    let mut out = String::new();
    flatten_nodes(std::slice::from_ref(fragment.root()), &mut out);
    out
}

fn flatten_nodes(nodes: &[Node], out: &mut String) {
    for block in group_blocks(nodes) {
        let node = block.node();
        let category = classify(node);
        if category == NodeCategory::PassThrough {
            flatten_nodes(&node.children, out);
            break;
        }

        let inner = node.inner_html();
        if inner.contains("<img") {
            // Whatever wraps an image goes out untouched.
            out.push_str(inner.trim());
            out.push('\n');
            continue;
        }

        match category {
            NodeCategory::ListItem => {
                out.push_str(&format!("<li>{inner}</li>\n"));
            }
            NodeCategory::Paragraph => {
                out.push_str(&format!("<p>{inner}</p>\n"));
            }
            NodeCategory::Heading(level) => {
                out.push_str(&format!("<{level}>{inner}</{level}>\n"));
            }
            NodeCategory::Image => {
                out.push_str(&synthesize_img(node));
                out.push('\n');
            }
            _ if node.has_children() => flatten_nodes(&node.children, out),
            _ => {}
        }
    }
}
