//! Fragment tree, dispatch walker, and the pure tree passes run before rendering.
//!
//! - [`fragment`]: tolerant parsing and canonical serialization
//! - [`walker`]: node classification and handler dispatch
//! - [`style`]: inline style / attribute analysis
//! - [`links`]: anchor `rel`/`target` rewriting
//! - [`lists`]: list-item paragraph unwrapping

pub mod fragment;
pub mod links;
pub mod lists;
pub mod style;
pub mod walker;

pub use fragment::{Fragment, Node, ROOT_TAG, escape_attr, escape_text, parse_fragment};
pub use links::{LinkKind, classify_link, rewrite_anchor, rewrite_links};
pub use lists::unwrap_list_paragraphs;
pub use style::{Alignment, NodeAttributes, StyleAttributes, analyze, parse_style};
pub use walker::{
    Block, HeadingLevel, ListKind, NodeCategory, NodeHandler, classify, group_blocks, is_inline,
    walk,
};
