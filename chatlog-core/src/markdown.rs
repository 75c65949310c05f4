use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").expect("valid regex"));
static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+?)`").expect("valid regex"));
static H3_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^### (.+)$").expect("valid regex"));
static H2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^## (.+)$").expect("valid regex"));
static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));
static BOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*]+?)\*\*").expect("valid regex"));
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+?)\*").expect("valid regex"));
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+?)\]\(([^)]+?)\)").expect("valid regex"));
static BREAK_BEFORE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<br>\s*(<h[123]|<pre)").expect("valid regex"));
static BREAK_AFTER_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(</h[123]>|</pre>)\s*<br>").expect("valid regex"));

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders the small markdown subset assistant replies use.
///
/// Rules run in a fixed order over escaped text, so a later rule also sees the
/// output of an earlier one (for example inline code inside a fenced block).
pub fn markdown_to_html(markdown: &str) -> String {
    if markdown.is_empty() {
        return String::new();
    }

    let html = escape_html(markdown);
    let html = FENCED_CODE_RE.replace_all(&html, r#"<pre class="md-pre"><code>${2}</code></pre>"#);
    let html = INLINE_CODE_RE.replace_all(&html, r#"<code class="md-code">${1}</code>"#);
    let html = H3_RE.replace_all(&html, "<h3>${1}</h3>");
    let html = H2_RE.replace_all(&html, "<h2>${1}</h2>");
    let html = H1_RE.replace_all(&html, "<h1>${1}</h1>");
    let html = BOLD_RE.replace_all(&html, "<strong>${1}</strong>");
    let html = ITALIC_RE.replace_all(&html, "<em>${1}</em>");
    let html = LINK_RE.replace_all(&html, r#"<a href="${2}" target="_blank">${1}</a>"#);
    let html = html.replace('\n', "<br>");
    let html = BREAK_BEFORE_BLOCK_RE.replace_all(&html, "${1}");
    BREAK_AFTER_BLOCK_RE.replace_all(&html, "${1}").into_owned()
}

#[cfg(test)]
mod tests {
    use super::{escape_html, markdown_to_html};

    #[test]
    fn escapes_before_formatting() {
        assert_eq!(escape_html(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
        assert_eq!(markdown_to_html("**<b>**"), "<strong>&lt;b&gt;</strong>");
    }

    #[test]
    fn fenced_code_drops_surrounding_breaks() {
        let html = markdown_to_html("Intro\n```rust\nfn main() {}\n```\nAfter");
        assert_eq!(
            html,
            r#"Intro<pre class="md-pre"><code>fn main() {}<br></code></pre>After"#
        );
    }

    #[test]
    fn headers_and_inline_rules() {
        let html = markdown_to_html("# Title\nSome `code` and *em* with [link](https://x.dev)");
        assert_eq!(
            html,
            r#"<h1>Title</h1>Some <code class="md-code">code</code> and <em>em</em> with <a href="https://x.dev" target="_blank">link</a>"#
        );
    }

    #[test]
    fn level_three_header_is_not_read_as_level_one() {
        assert_eq!(markdown_to_html("### Notes"), "<h3>Notes</h3>");
    }

    #[test]
    fn empty_input() {
        assert_eq!(markdown_to_html(""), "");
    }
}
