//! Target renderers for parsed fragments, and the reverse exporter.
//!
//! Both renderers plug handler sets into [`contentbridge_dom::walk`]:
//! [`flat`] produces a normalized HTML string, [`block_tree`] produces a
//! container/widget JSON document. [`export`] runs the other direction.

pub mod block_tree;
pub mod export;
pub mod flat;

pub use block_tree::{
    BlockTreeRenderer, Container, IMAGE_WIDGET_TITLE, ResolvedImages, Settings, StyleTemplate,
    Widget, WidgetType, document_to_json,
};
pub use export::{flatten, flatten_fragment};
pub use flat::{FlatHandler, IMG_ATTRIBUTES, render_flat, synthesize_img};
