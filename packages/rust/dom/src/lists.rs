//! List normalization before block-tree rendering.

use crate::fragment::{Fragment, Node};

/// Replace every `<p>` inside an `<li>` with its children.
pub fn unwrap_list_paragraphs(fragment: &Fragment) -> Fragment {
    fragment.map_elements(|node| {
        if node.tag_name == "li" {
            let children = std::mem::take(&mut node.children);
            node.children = unwrap_paragraphs(children);
        }
    })
}

fn unwrap_paragraphs(children: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    for mut child in children {
        if child.is_element() {
            child.children = unwrap_paragraphs(std::mem::take(&mut child.children));
        }
        if child.tag_name == "p" {
            out.extend(child.children);
        } else {
            out.push(child);
        }
    }
    out
}
