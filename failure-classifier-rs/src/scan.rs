// failure-classifier-rs/src/scan.rs
// Bounded view over log text.

use std::borrow::Cow;

/// Returns at most `limit` bytes of `text`: the whole string when it fits,
/// otherwise the head and tail halves joined by a newline. Cuts land on char
/// boundaries, so multi-byte content is never split.
pub fn scan_window(text: &str, limit: usize) -> Cow<'_, str> {
    if text.len() <= limit {
        return Cow::Borrowed(text);
    }

    let half = limit / 2;
    let head_end = floor_char_boundary(text, half);
    let tail_start = ceil_char_boundary(text, text.len() - half);

    let mut window = String::with_capacity(head_end + 1 + (text.len() - tail_start));
    window.push_str(&text[..head_end]);
    window.push('\n');
    window.push_str(&text[tail_start..]);
    Cow::Owned(window)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
