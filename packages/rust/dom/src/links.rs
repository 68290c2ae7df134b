//! Anchor rewriting: internal/external classification and `rel`/`target` policy.

use contentbridge_shared::LinkPolicy;

use crate::fragment::{Fragment, Node};

/// Where a link points relative to the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Internal,
    External,
}

/// Classify `href` against the canonical origin.
///
/// This is a substring test on the raw href, not an origin comparison: any
/// href that mentions the origin anywhere counts as internal. It is a
/// heuristic for presentation only and must not be used as a security check.
pub fn classify_link(href: &str, canonical_origin: &str) -> LinkKind {
    let origin = canonical_origin.trim_end_matches('/');
    if !origin.is_empty() && href.contains(origin) {
        LinkKind::Internal
    } else {
        LinkKind::External
    }
}

/// Return a copy of `fragment` with every anchor rewritten per `policy`.
pub fn rewrite_links(fragment: &Fragment, policy: &LinkPolicy, canonical_origin: &str) -> Fragment {
    fragment.map_elements(|node| {
        if node.tag_name == "a" {
            rewrite_anchor(node, policy, canonical_origin);
        }
    })
}

/// Apply `policy` to a single anchor in place.
pub fn rewrite_anchor(node: &mut Node, policy: &LinkPolicy, canonical_origin: &str) {
    node.remove_attr("target");

    let kind = classify_link(node.attr_or_empty("href"), canonical_origin);
    let (target, rel) = match kind {
        LinkKind::Internal => (&policy.internal_target, &policy.internal_rel),
        LinkKind::External => (&policy.external_target, &policy.external_rel),
    };

    node.set_attr("target", target.as_str());
    if !rel.is_empty() {
        node.set_attr("rel", rel.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::parse_fragment;

    const ORIGIN: &str = "https://blog.example.com/";

    fn policy() -> LinkPolicy {
        LinkPolicy {
            internal_rel: vec![],
            internal_target: "_self".into(),
            external_rel: vec!["nofollow".into(), "noopener".into()],
            external_target: "_blank".into(),
        }
    }

    #[test]
    fn classifies_by_substring() {
        assert_eq!(
            classify_link("https://blog.example.com/post", ORIGIN),
            LinkKind::Internal
        );
        assert_eq!(classify_link("https://other.test/", ORIGIN), LinkKind::External);
        assert_eq!(classify_link("/relative", ORIGIN), LinkKind::External);
        // Heuristic: the origin appearing in a query string still counts.
        assert_eq!(
            classify_link("https://evil.test/?u=https://blog.example.com", ORIGIN),
            LinkKind::Internal
        );
    }

    #[test]
    fn empty_origin_makes_everything_external() {
        assert_eq!(classify_link("https://blog.example.com/", ""), LinkKind::External);
    }

    #[test]
    fn rewrites_internal_and_external() {
        let fragment = parse_fragment(
            r#"<p><a href="https://blog.example.com/a" target="_blank" rel="x">in</a> <a href="https://other.test/" rel="sponsored">out</a></p>"#,
        );
        let rewritten = rewrite_links(&fragment, &policy(), ORIGIN);
        let anchors: Vec<&Node> = rewritten.elements_named("a").collect();

        assert_eq!(anchors[0].attr("target"), Some("_self"));
        // Internal rel not configured: existing rel untouched.
        assert_eq!(anchors[0].attr("rel"), Some("x"));

        assert_eq!(anchors[1].attr("target"), Some("_blank"));
        assert_eq!(anchors[1].attr("rel"), Some("nofollow noopener"));
    }

    #[test]
    fn anchors_without_href_are_external() {
        let fragment = parse_fragment("<a>bare</a>");
        let rewritten = rewrite_links(&fragment, &policy(), ORIGIN);
        let anchor = rewritten.elements_named("a").next().expect("anchor");
        assert_eq!(anchor.attr("target"), Some("_blank"));
    }

    #[test]
    fn source_fragment_is_not_mutated() {
        let fragment = parse_fragment(r#"<a href="https://other.test/" target="_top">x</a>"#);
        let _ = rewrite_links(&fragment, &policy(), ORIGIN);
        let anchor = fragment.elements_named("a").next().expect("anchor");
        assert_eq!(anchor.attr("target"), Some("_top"));
    }
}
