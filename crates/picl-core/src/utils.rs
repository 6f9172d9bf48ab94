// ============== Text Helpers ==============
//
// All lengths are in characters (Unicode scalar values), matching how the
// platform counts message length.

/// Keep the first `max` characters; append `marker` if anything was cut.
pub fn truncate_with_marker(text: &str, max: usize, marker: &str) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{marker}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Keep the last `max` characters.
pub fn tail_chars(text: &str, max: usize) -> &str {
    let total = text.chars().count();
    if total <= max {
        return text;
    }
    let skip = total - max;
    match text.char_indices().nth(skip) {
        Some((start, _)) => &text[start..],
        None => "",
    }
}

/// Split into pieces of at most `size` characters. Boundaries ignore lines.
pub fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut n = 0usize;
    for ch in text.chars() {
        cur.push(ch);
        n += 1;
        if n == size {
            out.push(std::mem::take(&mut cur));
            n = 0;
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

// ============== Commands ==============

/// Split `<prefix><name> <args>` into a lower-cased name and the rest.
///
/// Returns `None` when `text` does not start with the prefix or names nothing.
pub fn parse_command(prefix: &str, text: &str) -> Option<(String, String)> {
    let body = text.trim().strip_prefix(prefix)?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    let rest = parts.next().unwrap_or("").trim().to_string();
    Some((name, rest))
}
