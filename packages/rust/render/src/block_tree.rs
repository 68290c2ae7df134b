//! Block-tree renderer: one root container holding a flat list of widgets.
//!
//! The document shape is the JSON consumed by the target page builder:
//!
//! ```json
//! [{"id":"1a2b3c4d","elType":"container","settings":{...},"elements":[
//!     {"id":"5e6f7a8b","elType":"widget","settings":{...},"elements":[],"widgetType":"heading"}
//! ],"isInner":null}]
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use contentbridge_dom::{Fragment, HeadingLevel, ListKind, Node, NodeHandler, analyze, walk};
use contentbridge_shared::{AssetReference, ContentBridgeError, Result};

/// Widget settings object.
pub type Settings = Map<String, Value>;

/// Fixed label placed in every image widget's `title`.
pub const IMAGE_WIDGET_TITLE: &str = "Header";

/// Heading level used to index template headings without a `header_size`.
const DEFAULT_HEADER_SIZE: &str = "h2";

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// Widget kinds produced by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetType {
    TextEditor,
    Heading,
    Image,
    Html,
}

impl WidgetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextEditor => "text-editor",
            Self::Heading => "heading",
            Self::Image => "image",
            Self::Html => "html",
        }
    }
}

/// A leaf content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    #[serde(rename = "elType")]
    pub el_type: String,
    pub settings: Settings,
    /// Always empty: widgets are leaves.
    pub elements: Vec<Value>,
    #[serde(rename = "widgetType")]
    pub widget_type: WidgetType,
}

impl Widget {
    fn new(widget_type: WidgetType, settings: Settings) -> Self {
        Self {
            id: element_id(),
            el_type: "widget".into(),
            settings,
            elements: Vec::new(),
            widget_type,
        }
    }

    /// String setting, if present.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

/// The single root aggregation node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(rename = "elType")]
    pub el_type: String,
    pub settings: Settings,
    pub elements: Vec<Widget>,
    #[serde(rename = "isInner")]
    pub is_inner: Option<bool>,
}

/// Serialize a document (array of exactly one container).
pub fn document_to_json(container: &Container) -> Result<String> {
    Ok(serde_json::to_string(std::slice::from_ref(container))?)
}

/// A fresh 8-character element id.
fn element_id() -> String {
    let mut id = Uuid::new_v4().to_string();
    id.truncate(8);
    id
}

// ---------------------------------------------------------------------------
// Style template
// ---------------------------------------------------------------------------

/// Per-widget-type settings borrowed from a previously authored document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleTemplate {
    container: Option<Settings>,
    widgets: HashMap<String, Settings>,
}

impl StyleTemplate {
    /// A template that contributes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index a template document given as JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ContentBridgeError::parse(format!("style template is not JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Index a template document.
    ///
    /// Accepts the document array (only the first root is read) or a bare root object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let root = match value {
            Value::Array(items) => items
                .first()
                .ok_or_else(|| ContentBridgeError::parse("style template document is empty"))?,
            other => other,
        };
        let root = root
            .as_object()
            .ok_or_else(|| ContentBridgeError::parse("style template root is not an object"))?;

        let mut template = Self::default();

        if root.get("elType").and_then(Value::as_str) == Some("container") {
            template.container = root.get("settings").and_then(Value::as_object).cloned();
        }

        let elements = root
            .get("elements")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for element in elements {
            if element.get("elType").and_then(Value::as_str) != Some("widget") {
                continue;
            }
            let Some(widget_type) = element.get("widgetType").and_then(Value::as_str) else {
                continue;
            };
            let settings = element
                .get("settings")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            let key = if widget_type == WidgetType::Heading.as_str() {
                settings
                    .get("header_size")
                    .and_then(Value::as_str)
                    .filter(|size| !size.is_empty())
                    .unwrap_or(DEFAULT_HEADER_SIZE)
                    .to_string()
            } else {
                widget_type.to_string()
            };
            template.widgets.insert(key, settings);
        }

        debug!(
            widgets = template.widgets.len(),
            has_container = template.container.is_some(),
            "indexed style template"
        );
        Ok(template)
    }

    /// Like [`from_json`](Self::from_json), but a malformed template is logged and ignored.
    pub fn from_json_or_empty(json: &str) -> Self {
        Self::from_json(json).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring malformed style template");
            Self::empty()
        })
    }

    /// Base settings for a new widget (deep copy).
    pub fn widget_settings(&self, key: &str) -> Settings {
        self.widgets.get(key).cloned().unwrap_or_default()
    }

    /// Settings for the root container.
    pub fn container_settings(&self) -> Settings {
        self.container.clone().unwrap_or_else(|| {
            let mut settings = Settings::new();
            settings.insert("flex_direction".into(), Value::from("column"));
            settings
        })
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_none() && self.widgets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolved images
// ---------------------------------------------------------------------------

/// Image resolutions made earlier in the pass, looked up by `src`.
///
/// Each reference is reachable by its origin URL and by its local URL, since
/// `src` attributes may already have been rewritten.
#[derive(Debug, Clone, Default)]
pub struct ResolvedImages {
    references: Vec<AssetReference>,
    by_url: HashMap<String, usize>,
}

impl ResolvedImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: AssetReference) {
        let index = self.references.len();
        if let Some(local) = &reference.local_url {
            self.by_url.insert(local.clone(), index);
        }
        self.by_url.insert(reference.origin_url.clone(), index);
        self.references.push(reference);
    }

    pub fn get(&self, src: &str) -> Option<&AssetReference> {
        self.by_url.get(src).map(|&i| &self.references[i])
    }

    /// All references, in insertion order.
    pub fn references(&self) -> Vec<AssetReference> {
        self.references.clone()
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders fragments into a block-tree document.
pub struct BlockTreeRenderer<'a> {
    template: &'a StyleTemplate,
    images: &'a ResolvedImages,
}

impl<'a> BlockTreeRenderer<'a> {
    pub fn new(template: &'a StyleTemplate, images: &'a ResolvedImages) -> Self {
        Self { template, images }
    }

    /// Render `fragment` into a root container.
    ///
    /// List paragraphs should already have been unwrapped.
    pub fn render(&self, fragment: &Fragment) -> Container {
        let mut handler = BlockTreeHandler {
            template: self.template,
            images: self.images,
        };
        let elements = walk(fragment, &mut handler);
        debug!(widgets = elements.len(), "rendered block tree");

        Container {
            id: element_id(),
            el_type: "container".into(),
            settings: self.template.container_settings(),
            elements,
            is_inner: None,
        }
    }
}

struct BlockTreeHandler<'a> {
    template: &'a StyleTemplate,
    images: &'a ResolvedImages,
}

impl BlockTreeHandler<'_> {
    fn text_editor(&self, node: &Node, editor: String) -> Widget {
        let mut settings = self.template.widget_settings(WidgetType::TextEditor.as_str());
        settings.insert("editor".into(), Value::String(editor));
        if let Some(align) = analyze(node).align {
            settings.insert("align".into(), Value::from(align.as_str()));
        }
        Widget::new(WidgetType::TextEditor, settings)
    }

    fn html(&self, html: String) -> Widget {
        let mut settings = self.template.widget_settings(WidgetType::Html.as_str());
        settings.insert("html".into(), Value::String(html));
        Widget::new(WidgetType::Html, settings)
    }
}

impl NodeHandler for BlockTreeHandler<'_> {
    type Output = Widget;

    fn paragraph(&mut self, node: &Node) -> Option<Widget> {
        Some(self.text_editor(node, format!("<p>{}</p>", node.inner_html())))
    }

    fn list(&mut self, node: &Node, kind: ListKind) -> Option<Widget> {
        let tag = kind.tag();
        Some(self.text_editor(node, format!("<{tag}>{}</{tag}>", node.inner_html())))
    }

    fn heading(&mut self, node: &Node, level: HeadingLevel) -> Option<Widget> {
        let size = level.tag();
        let mut settings = self.template.widget_settings(&size);
        settings.insert("title".into(), Value::String(node.inner_html()));
        settings.insert("header_size".into(), Value::String(size));
        Some(Widget::new(WidgetType::Heading, settings))
    }

    fn image(&mut self, node: &Node) -> Option<Widget> {
        let src = node.attr_or_empty("src");
        let alt = node.attr_or_empty("alt");
        let (url, id) = match self.images.get(src) {
            Some(reference) => (reference.effective_url(), reference.local_id.unwrap_or(0)),
            None => (src, 0),
        };

        let mut image = Settings::new();
        image.insert("url".into(), Value::from(url));
        image.insert("id".into(), Value::from(id));
        image.insert("size".into(), Value::Null);
        image.insert("alt".into(), Value::from(alt));
        image.insert("source".into(), Value::from("library"));

        let mut settings = self.template.widget_settings(WidgetType::Image.as_str());
        settings.insert("title".into(), Value::from(IMAGE_WIDGET_TITLE));
        settings.insert("image".into(), Value::Object(image));
        Some(Widget::new(WidgetType::Image, settings))
    }

    fn blockquote(&mut self, node: &Node) -> Option<Widget> {
        let inner = node.inner_html();
        (!inner.is_empty()).then(|| self.html(inner))
    }

    fn table(&mut self, node: &Node) -> Option<Widget> {
        let inner = node.inner_html();
        if inner.is_empty() {
            return None;
        }
        // The value ends up inside a quoted attribute downstream.
        let escaped = format!("<table>{inner}</table>")
            .replace('"', "&quot;")
            .replace('\'', "&#39;");
        Some(self.html(escaped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentbridge_dom::{parse_fragment, unwrap_list_paragraphs};
    use contentbridge_shared::LocalAsset;

    fn render(html: &str, template: &StyleTemplate) -> Container {
        let images = ResolvedImages::new();
        BlockTreeRenderer::new(template, &images).render(&parse_fragment(html))
    }

    const TEMPLATE: &str = r##"[{
        "id": "aaaa1111", "elType": "container",
        "settings": {"flex_direction": "row", "gap": 10},
        "elements": [
            {"id": "b1", "elType": "widget", "widgetType": "text-editor",
             "settings": {"text_color": "#333", "typography": {"size": 16}}, "elements": []},
            {"id": "b2", "elType": "widget", "widgetType": "heading",
             "settings": {"header_size": "h3", "title_color": "red"}, "elements": []},
            {"id": "b3", "elType": "widget", "widgetType": "heading",
             "settings": {"title_color": "blue"}, "elements": []},
            {"id": "b4", "elType": "section", "widgetType": "html", "settings": {"x": 1}}
        ],
        "isInner": null
    }]"##;

    #[test]
    fn example_heading_and_image_paragraph() {
        let mut images = ResolvedImages::new();
        images.insert(
            AssetReference::unresolved("http://x/a.png", "a").resolved(&LocalAsset {
                id: 12,
                url: "https://site.test/media/a.png".into(),
            }),
        );
        // `src` has already been rewritten to the local URL by the pipeline.
        let fragment = parse_fragment(
            r#"<h1>Title</h1><p>Hello <img src="https://site.test/media/a.png" alt="a"></p>"#,
        );
        let template = StyleTemplate::empty();
        let container = BlockTreeRenderer::new(&template, &images).render(&fragment);

        assert_eq!(container.elements.len(), 2);
        let heading = &container.elements[0];
        assert_eq!(heading.widget_type, WidgetType::Heading);
        assert_eq!(heading.setting_str("title"), Some("Title"));
        assert_eq!(heading.setting_str("header_size"), Some("h1"));

        let text = &container.elements[1];
        assert_eq!(text.widget_type, WidgetType::TextEditor);
        assert_eq!(
            text.setting_str("editor"),
            Some(r#"<p>Hello <img alt="a" src="https://site.test/media/a.png" /></p>"#)
        );
    }

    #[test]
    fn document_shape() {
        let container = render("<p>x</p>", &StyleTemplate::empty());
        assert_eq!(container.id.len(), 8);
        assert_eq!(container.elements[0].id.len(), 8);
        assert_ne!(container.id, container.elements[0].id);

        let json = document_to_json(&container).expect("serialize");
        let value: Value = serde_json::from_str(&json).expect("parse");
        let root = &value.as_array().expect("array")[0];
        assert_eq!(root["elType"], "container");
        assert_eq!(root["isInner"], Value::Null);
        assert_eq!(root["settings"]["flex_direction"], "column");
        let widget = &root["elements"][0];
        assert_eq!(widget["elType"], "widget");
        assert_eq!(widget["widgetType"], "text-editor");
        assert_eq!(widget["elements"], Value::Array(vec![]));
    }

    #[test]
    fn lists_and_alignment() {
        let container = render(
            r#"<p style="text-align: center">c</p><ol style="text-align:end"><li>a</li></ol>"#,
            &StyleTemplate::empty(),
        );
        assert_eq!(container.elements[0].setting_str("align"), Some("center"));
        assert_eq!(container.elements[1].setting_str("editor"), Some("<ol><li>a</li></ol>"));
        assert_eq!(container.elements[1].setting_str("align"), Some("right"));
    }

    #[test]
    fn list_paragraphs_are_unwrapped_by_prepass() {
        let images = ResolvedImages::new();
        let template = StyleTemplate::empty();
        let fragment = unwrap_list_paragraphs(&parse_fragment("<ul><li><p>a</p></li></ul>"));
        let container = BlockTreeRenderer::new(&template, &images).render(&fragment);
        assert_eq!(container.elements[0].setting_str("editor"), Some("<ul><li>a</li></ul>"));
    }

    #[test]
    fn image_widget_unresolved_and_resolved() {
        let container = render(r#"<img src="http://x/b.png" alt="b">"#, &StyleTemplate::empty());
        let widget = &container.elements[0];
        assert_eq!(widget.widget_type, WidgetType::Image);
        assert_eq!(widget.setting_str("title"), Some(IMAGE_WIDGET_TITLE));
        let image = &widget.settings["image"];
        assert_eq!(image["url"], "http://x/b.png");
        assert_eq!(image["id"], 0);
        assert_eq!(image["size"], Value::Null);
        assert_eq!(image["alt"], "b");
        assert_eq!(image["source"], "library");

        let mut images = ResolvedImages::new();
        images.insert(
            AssetReference::unresolved("http://x/b.png", "b").resolved(&LocalAsset {
                id: 4,
                url: "https://site.test/b.png".into(),
            }),
        );
        let template = StyleTemplate::empty();
        let container = BlockTreeRenderer::new(&template, &images)
            .render(&parse_fragment(r#"<img src="http://x/b.png" alt="b">"#));
        let image = &container.elements[0].settings["image"];
        assert_eq!(image["url"], "https://site.test/b.png");
        assert_eq!(image["id"], 4);
    }

    #[test]
    fn blockquote_and_table_widgets() {
        let container = render(
            r#"<blockquote></blockquote><blockquote>q</blockquote><table><tbody><tr><td class="n">it's</td></tr></tbody></table>"#,
            &StyleTemplate::empty(),
        );
        assert_eq!(container.elements.len(), 2);
        assert_eq!(container.elements[0].widget_type, WidgetType::Html);
        assert_eq!(container.elements[0].setting_str("html"), Some("q"));
        assert_eq!(
            container.elements[1].setting_str("html"),
            Some("<table><tbody><tr><td class=&quot;n&quot;>it&#39;s</td></tr></tbody></table>")
        );
    }

    #[test]
    fn template_indexing() {
        let template = StyleTemplate::from_json(TEMPLATE).expect("template");
        assert_eq!(template.container_settings()["flex_direction"], "row");
        assert_eq!(template.widget_settings("text-editor")["text_color"], "#333");
        assert_eq!(template.widget_settings("h3")["title_color"], "red");
        // Heading without header_size is indexed as h2.
        assert_eq!(template.widget_settings("h2")["title_color"], "blue");
        // Non-widget elements are ignored.
        assert!(template.widget_settings("html").is_empty());
    }

    #[test]
    fn template_settings_are_base_for_widgets() {
        let template = StyleTemplate::from_json(TEMPLATE).expect("template");
        let container = render("<h3>s</h3><p>a</p><p>b</p><h4>t</h4>", &template);

        assert_eq!(container.settings["gap"], 10);
        let h3 = &container.elements[0];
        assert_eq!(h3.settings["title_color"], "red");
        assert_eq!(h3.setting_str("title"), Some("s"));

        let p = &container.elements[1];
        assert_eq!(p.settings["typography"]["size"], 16);
        assert_eq!(p.setting_str("editor"), Some("<p>a</p>"));

        // No template entry for h4.
        assert!(container.elements[3].settings.get("title_color").is_none());
    }

    #[test]
    fn template_settings_are_deep_cloned() {
        let template = StyleTemplate::from_json(TEMPLATE).expect("template");
        let mut container = render("<p>a</p><p>b</p>", &template);
        container.elements[0].settings["typography"]["size"] = Value::from(99);
        assert_eq!(container.elements[1].settings["typography"]["size"], 16);
        assert_eq!(template.widget_settings("text-editor")["typography"]["size"], 16);
    }

    #[test]
    fn malformed_template_is_ignored() {
        assert!(StyleTemplate::from_json("not json").is_err());
        assert!(StyleTemplate::from_json("[]").is_err());
        assert!(StyleTemplate::from_json_or_empty("{{").is_empty());
    }
}
