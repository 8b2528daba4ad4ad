//! Trailing-markup re-balancing for truncated streams.

/// Return the single symbol needed to close an emphasis or quote run left
/// open on the last line of `text`, or `""` when the line is already
/// balanced.
///
/// Tracked symbols are `"` and `*`; they are opposites of each other, so an
/// asterisk seen while a quote is open implicitly closes the quote and opens
/// an emphasis run (and vice versa). A last line that already ends with `"`,
/// `*`, or the typographic closing quote `”` — optionally followed by a
/// period — is taken as balanced without scanning.
pub fn closing_symbol(text: &str) -> &'static str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "";
    }

    let last_line = trimmed.lines().last().unwrap_or("").trim();
    if ends_balanced(last_line) {
        return "";
    }

    let mut open: Option<char> = None;
    for ch in last_line.chars() {
        if ch == '"' || ch == '*' {
            open = match open {
                None => Some(ch),
                Some(current) if current == ch => None,
                // The opposite symbol closes the current run and opens its
                // own.
                Some(_) => Some(ch),
            };
        }
    }

    match open {
        Some('"') => "\"",
        Some('*') => "*",
        _ => "",
    }
}

fn ends_balanced(line: &str) -> bool {
    let line = line.strip_suffix('.').unwrap_or(line);
    line.ends_with('"') || line.ends_with('*') || line.ends_with('”')
}
