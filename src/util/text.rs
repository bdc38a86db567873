use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Removes anything that looks like a markup tag (`<...>`, including an
/// unterminated trailing `<...`).
///
/// This is a character-class scan, not an HTML parser: `a < b` loses
/// everything after the `<`. Good enough for display-only snippets, which
/// are never parsed again.
pub fn strip_markup(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    Cow::Owned(out)
}

/// First `max_chars` characters of `s`, no ellipsis.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_string()),
        None => Cow::Borrowed(s),
    }
}

/// Display width in terminal columns (CJK and emoji count as two).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncates to `max_width` terminal columns, appending "..." when cut.
///
/// Widths of three columns or fewer get no ellipsis since it would not fit
/// alongside any text.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width <= ELLIPSIS_WIDTH {
        max_width
    } else {
        max_width - ELLIPSIS_WIDTH
    };

    let mut used = 0;
    let mut cut = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        cut = idx + c.len_utf8();
    }

    if max_width <= ELLIPSIS_WIDTH {
        Cow::Owned(s[..cut].to_string())
    } else {
        Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
    }
}

/// SEC-001: Drops control characters and ANSI escape sequences from feed
/// text before it reaches the terminal. Tab, newline and CR survive.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_unsafe =
        |c: char| c == '\x1b' || c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));
    if !s.chars().any(is_unsafe) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_unsafe(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            // CSI: ESC [ params final-byte
            Some('[') => {
                chars.next();
                for n in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&n) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... BEL | ESC \
            Some(']') => {
                chars.next();
                while let Some(n) = chars.next() {
                    if n == '\x07' {
                        break;
                    }
                    if n == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}
