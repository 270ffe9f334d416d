//! Markup helpers - regex-evaluated, deterministic.
//!
//! The selector language is deliberately thin: `tag`, `#id`, `.class`.
//! Matching works on the raw markup string; scripts, styles and comments
//! are removed before anything else runs.

use regex::Regex;

/// Remove non-content markup: scripts, styles, noscript blocks, comments.
pub(crate) fn strip_noise(html: &str) -> String {
    let mut text = html.to_string();

    let script_pattern = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let style_pattern = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let noscript_pattern = Regex::new(r"(?is)<noscript[^>]*>.*?</noscript>").unwrap();
    let comment_pattern = Regex::new(r"(?s)<!--.*?-->").unwrap();

    text = script_pattern.replace_all(&text, "").to_string();
    text = style_pattern.replace_all(&text, "").to_string();
    text = noscript_pattern.replace_all(&text, "").to_string();
    text = comment_pattern.replace_all(&text, "").to_string();

    text
}

/// Find the inner markup of the first element matching `selector`.
///
/// Supported selector forms: `tag`, `#id`, `.class`. Anything else
/// (or a selector that matches nothing) yields `None`.
pub(crate) fn select_first(html: &str, selector: &str) -> Option<String> {
    let open_pattern = match selector.chars().next()? {
        '#' => format!(
            r#"(?is)<([a-z][a-z0-9]*)\b[^>]*\bid\s*=\s*["']{}["'][^>]*>"#,
            regex::escape(&selector[1..])
        ),
        '.' => format!(
            r#"(?is)<([a-z][a-z0-9]*)\b[^>]*\bclass\s*=\s*["'](?:[^"']*\s)?{}(?:\s[^"']*)?["'][^>]*>"#,
            regex::escape(&selector[1..])
        ),
        _ => format!(r"(?is)<({})\b[^>]*>", regex::escape(selector)),
    };

    let open_re = Regex::new(&open_pattern).ok()?;
    let caps = open_re.captures(html)?;
    let opened = caps.get(0)?;
    let tag = caps.get(1)?.as_str().to_lowercase();

    let rest = &html[opened.end()..];
    let close_re = Regex::new(&format!(r"(?i)</{}\s*>", regex::escape(&tag))).unwrap();
    let close = close_re.find(rest)?;

    Some(rest[..close.start()].to_string())
}

/// Collapse markup to a single line of text: tags stripped, entities
/// decoded, all whitespace runs reduced to one space.
pub(crate) fn flatten_text(html: &str) -> String {
    let tag_pattern = Regex::new(r"<[^>]+>").unwrap();
    let text = tag_pattern.replace_all(html, " ");
    let text = decode_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert markup to block text, keeping paragraph structure.
///
/// Headers become `#` lines, paragraphs and breaks become newlines,
/// list items become `- ` lines; remaining tags are stripped.
pub(crate) fn block_text(html: &str) -> String {
    let mut text = html.to_string();

    let h1_pattern = Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap();
    let h2_pattern = Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").unwrap();
    let h3_pattern = Regex::new(r"(?is)<h3[^>]*>(.*?)</h3>").unwrap();
    text = h1_pattern.replace_all(&text, "# $1\n").to_string();
    text = h2_pattern.replace_all(&text, "## $1\n").to_string();
    text = h3_pattern.replace_all(&text, "### $1\n").to_string();

    let p_pattern = Regex::new(r"(?is)<p[^>]*>(.*?)</p>").unwrap();
    let br_pattern = Regex::new(r"(?i)<br\s*/?>").unwrap();
    text = p_pattern.replace_all(&text, "$1\n\n").to_string();
    text = br_pattern.replace_all(&text, "\n").to_string();

    let li_pattern = Regex::new(r"(?is)<li[^>]*>(.*?)</li>").unwrap();
    text = li_pattern.replace_all(&text, "- $1\n").to_string();

    let tag_pattern = Regex::new(r"<[^>]+>").unwrap();
    text = tag_pattern.replace_all(&text, "").to_string();

    text = decode_entities(&text);

    // Collapse horizontal whitespace per line, then squeeze blank runs.
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    let text = lines.join("\n");
    let multi_newline = Regex::new(r"\n{3,}").unwrap();
    let text = multi_newline.replace_all(&text, "\n\n").to_string();

    text.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
