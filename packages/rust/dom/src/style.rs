//! Inline style and attribute analysis.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::fragment::Node;

/// Tags whose inline `style` contributes alignment.
const STYLED_TAGS: &[&str] = &["p", "ul", "ol", "h2", "h3", "h4", "h5", "h6"];

/// Attributes never carried into rendered output.
const DROPPED_ATTRIBUTES: &[&str] = &["contenteditable"];

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    /// Parse a CSS `text-align` value. Logical values map to their LTR equivalent.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Self::Left),
            "center" => Some(Self::Center),
            "right" | "end" => Some(Self::Right),
            "justify" => Some(Self::Justify),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
        }
    }
}

/// Normalized attributes derived from an inline style string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleAttributes {
    pub align: Option<Alignment>,
}

/// Parse an inline `style` attribute.
///
/// Declarations are `;`-separated `property: value` pairs; anything
/// unrecognized is ignored. The last valid `text-align` wins.
pub fn parse_style(style: &str) -> StyleAttributes {
    let mut attrs = StyleAttributes::default();
    for declaration in style.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        if !property.trim().eq_ignore_ascii_case("text-align") {
            continue;
        }
        let value = value.trim().trim_end_matches("!important");
        if let Some(align) = Alignment::parse(value) {
            attrs.align = Some(align);
        }
    }
    attrs
}

/// A node's attributes after analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttributes {
    /// Source attributes minus editor-only ones.
    pub attributes: BTreeMap<String, String>,
    /// Computed alignment, if any.
    pub align: Option<Alignment>,
}

/// Analyze an element's attributes.
pub fn analyze(node: &Node) -> NodeAttributes {
    let attributes = node
        .attributes
        .iter()
        .filter(|(name, _)| !DROPPED_ATTRIBUTES.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let from_style = if STYLED_TAGS.contains(&node.tag_name.as_str()) {
        node.attr("style").and_then(|style| parse_style(style).align)
    } else {
        None
    };
    let align = from_style.or_else(|| node.attr("align").and_then(Alignment::parse));

    NodeAttributes { attributes, align }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_align() {
        assert_eq!(parse_style("text-align: center").align, Some(Alignment::Center));
        assert_eq!(
            parse_style("color: red; text-align:right;").align,
            Some(Alignment::Right)
        );
        assert_eq!(parse_style("TEXT-ALIGN: Justify").align, Some(Alignment::Justify));
    }

    #[test]
    fn logical_values_normalize() {
        assert_eq!(parse_style("text-align: start").align, Some(Alignment::Left));
        assert_eq!(parse_style("text-align: end").align, Some(Alignment::Right));
    }

    #[test]
    fn ignores_garbage() {
        assert_eq!(parse_style("").align, None);
        assert_eq!(parse_style("text-align").align, None);
        assert_eq!(parse_style("text-align: sideways").align, None);
        assert_eq!(parse_style(";;color:blue").align, None);
    }

    #[test]
    fn important_is_stripped() {
        assert_eq!(
            parse_style("text-align: center !important").align,
            Some(Alignment::Center)
        );
    }

    #[test]
    fn analyze_drops_contenteditable() {
        let node = Node::element("p")
            .with_attr("contenteditable", "true")
            .with_attr("class", "lead")
            .with_attr("style", "text-align: center");
        let analyzed = analyze(&node);
        assert!(!analyzed.attributes.contains_key("contenteditable"));
        assert_eq!(analyzed.attributes.get("class").map(String::as_str), Some("lead"));
        assert_eq!(analyzed.align, Some(Alignment::Center));
    }

    #[test]
    fn style_only_counts_on_block_tags() {
        let h1 = Node::element("h1").with_attr("style", "text-align: center");
        assert_eq!(analyze(&h1).align, None);
        let div = Node::element("div").with_attr("style", "text-align: center");
        assert_eq!(analyze(&div).align, None);
    }

    #[test]
    fn literal_align_attribute_is_fallback() {
        let node = Node::element("p").with_attr("align", "right");
        assert_eq!(analyze(&node).align, Some(Alignment::Right));

        let both = Node::element("p")
            .with_attr("align", "right")
            .with_attr("style", "text-align: left");
        assert_eq!(analyze(&both).align, Some(Alignment::Left));
    }
}
