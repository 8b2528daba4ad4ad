//! Markup fragment → plain text normalization.

use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</(?:h3|p|ul)>").unwrap());
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"<li>").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?(?:strong|em)>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static STAR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{2,}").unwrap());
static QUOTE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r#""{2,}"#).unwrap());
static APOSTROPHE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"'{2,}").unwrap());

/// Convert one raw message fragment into plain text.
///
/// Block closers become blank lines, list items become `- ` bullets,
/// bold/italic pairs collapse to single-asterisk emphasis, the handful of
/// entities the chat UI emits are decoded, and everything else that looks
/// like a tag is dropped. Trailing block closers leave trailing newlines
/// behind, which the final trim removes, so no special end-of-fragment
/// casing is needed.
pub fn normalize_markup(raw: &str) -> String {
    let text = strip_nested_emphasis(raw);

    // A paragraph close directly inside a list item would otherwise insert a
    // blank line in the middle of the bullet.
    let text = text.replace("</p></li>", "");

    let text = BLOCK_CLOSE.replace_all(&text, "\n\n");
    let text = LIST_ITEM.replace_all(&text, "\n- ");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = EMPHASIS.replace_all(&text, "*");

    let text = text
        .replace("&amp;", "&")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"");

    let text = ANY_TAG.replace_all(&text, "");

    let text = NEWLINE_RUN.replace_all(&text, "\n\n");
    let text = STAR_RUN.replace_all(&text, "*");
    let text = QUOTE_RUN.replace_all(&text, "\"");
    let text = APOSTROPHE_RUN.replace_all(&text, "'");

    text.trim_matches('\n').to_string()
}

/// Drop `<em>` markers that occur inside a `<strong>` run. Both map to the
/// same `*` emphasis downstream, and the nested pair would otherwise produce
/// a doubled marker that the run-collapse step then merges incorrectly.
fn strip_nested_emphasis(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut inside_strong = false;
    let mut i = 0;
    while i < html.len() {
        let rest = &html[i..];
        if rest.starts_with("<strong>") {
            inside_strong = true;
            out.push_str("<strong>");
            i += "<strong>".len();
        } else if rest.starts_with("</strong>") {
            inside_strong = false;
            out.push_str("</strong>");
            i += "</strong>".len();
        } else if inside_strong && rest.starts_with("<em>") {
            i += "<em>".len();
        } else if inside_strong && rest.starts_with("</em>") {
            i += "</em>".len();
        } else {
            let ch = rest.chars().next().expect("non-empty remainder");
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_blank_lines() {
        assert_eq!(normalize_markup("<p>Hello</p><p>World</p>"), "Hello\n\nWorld");
    }

    #[test]
    fn list_items_become_bullets() {
        let out = normalize_markup("<ul><li>a</li><li>b</li></ul>");
        assert!(out.contains("\n- a"));
        assert!(out.contains("\n- b"));
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(normalize_markup("<p>salt &amp; pepper</p>"), "salt & pepper");
        assert_eq!(normalize_markup("a &gt; b&nbsp;&quot;c&quot;"), "a > b \"c\"");
    }

    #[test]
    fn strong_and_em_collapse_to_single_asterisk() {
        assert_eq!(normalize_markup("<strong>bold</strong>"), "*bold*");
        assert_eq!(normalize_markup("<em>soft</em>"), "*soft*");
    }

    #[test]
    fn em_inside_strong_is_dropped() {
        assert_eq!(
            normalize_markup("<strong><em>both</em></strong>"),
            "*both*"
        );
    }

    #[test]
    fn unknown_tags_are_stripped() {
        assert_eq!(normalize_markup("<div class=\"x\">text</div>"), "text");
        assert_eq!(normalize_markup("<code>let x</code>"), "let x");
    }

    #[test]
    fn line_breaks_and_runs_collapse() {
        assert_eq!(normalize_markup("a<br>b<br/>c"), "a\nb\nc");
        assert_eq!(normalize_markup("<p>a</p><p></p><p>b</p>"), "a\n\nb");
        assert_eq!(normalize_markup("**doubled** ''quotes''"), "*doubled* 'quotes'");
    }

    #[test]
    fn paragraph_close_inside_list_item_is_silent() {
        let out = normalize_markup("<ul><li><p>one</p></li><li><p>two</p></li></ul>");
        assert!(out.contains("- one"));
        assert!(!out.contains("one\n\n\n"));
    }

    #[test]
    fn leading_and_trailing_newlines_are_trimmed() {
        assert_eq!(normalize_markup("<p>only</p>"), "only");
        assert_eq!(normalize_markup("<h3>Title</h3>body"), "Title\n\nbody");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_markup(""), "");
    }
}
