//! Text clean-up applied before content is handed to the host.

use std::sync::LazyLock;

use regex::Regex;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Replace code points in U+1F000..=U+1F9FF with hexadecimal character references.
///
/// Hosts with a 3-byte UTF-8 column type reject these.
pub fn encode_emoji(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for c in content.chars() {
        if ('\u{1F000}'..='\u{1F9FF}').contains(&c) {
            out.push_str(&format!("&#x{:x};", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Text of the first `<h1>` in `html`, tags stripped and trimmed.
pub fn extract_title(html: &str) -> Option<String> {
    let inner = TITLE_RE.captures(html)?.get(1)?.as_str();
    let title = strip_tags(inner).trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Remove anything that looks like a tag.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_become_entities() {
        assert_eq!(encode_emoji("Hi 😀!"), "Hi &#x1f600;!");
        assert_eq!(encode_emoji("🃏 and 🤖"), "&#x1f0cf; and &#x1f916;");
    }

    #[test]
    fn other_text_is_untouched() {
        let text = "Zażółć ✓ <p>&amp;</p>";
        assert_eq!(encode_emoji(text), text);
    }

    #[test]
    fn title_from_first_h1() {
        let html = "<p>intro</p><H1 class=\"t\">Hello <em>World</em></H1><h1>Second</h1>";
        assert_eq!(extract_title(html).as_deref(), Some("Hello World"));
    }

    #[test]
    fn title_spanning_lines() {
        assert_eq!(
            extract_title("<h1>\n  Multi\n  line\n</h1>").as_deref(),
            Some("Multi\n  line")
        );
    }

    #[test]
    fn no_title() {
        assert_eq!(extract_title("<h2>Nope</h2>"), None);
        assert_eq!(extract_title("<h1> </h1>"), None);
    }
}
