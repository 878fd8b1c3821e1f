//! Small text helpers shared by the transports.

/// One-line excerpt of free-form process output for an error message.
///
/// Whitespace runs (newlines included) collapse to a single space. Output
/// longer than `max_bytes` is cut on a character boundary and marked with
/// a trailing `...`.
pub fn excerpt(text: &str, max_bytes: usize) -> String {
    let mut flat = String::with_capacity(text.len().min(max_bytes + 3));
    for word in text.split_whitespace() {
        if !flat.is_empty() {
            flat.push(' ');
        }
        flat.push_str(word);
        if flat.len() > max_bytes {
            break;
        }
    }

    if flat.len() <= max_bytes {
        return flat;
    }
    let mut end = max_bytes;
    while end > 0 && !flat.is_char_boundary(end) {
        end -= 1;
    }
    flat.truncate(end);
    flat.push_str("...");
    flat
}
