use std::borrow::Cow;

/// Strips terminal control characters and escape sequences from text
/// received over the network.
///
/// Removes whole CSI (`ESC [` ... final byte) and OSC (`ESC ]` ... BEL or
/// ST) sequences, their 8-bit forms (U+009B, U+009D), bare ESC, C0 controls
/// other than tab, DEL and the C1 range U+0080..=U+009F. An article title
/// therefore cannot recolor or retitle the terminal. Newlines and carriage
/// returns collapse to a single space, since feed lines are printed one per
/// row.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
///
/// # Examples
///
/// ```
/// use newswire::util::sanitize_line;
///
/// assert_eq!(sanitize_line("Fed holds rates"), "Fed holds rates");
/// assert_eq!(sanitize_line("a\x1b[31mb"), "ab");
/// assert_eq!(sanitize_line("two\nlines"), "two lines");
/// ```
pub fn sanitize_line(s: &str) -> Cow<'_, str> {
    if !needs_strip(s.as_bytes()) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    skip_csi(&mut chars);
                }
                Some(']') => {
                    chars.next();
                    skip_osc(&mut chars);
                }
                _ => {} // bare ESC
            },
            '\u{9b}' => skip_csi(&mut chars),
            '\u{9d}' => skip_osc(&mut chars),
            '\n' | '\r' => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            '\t' => out.push(c),
            // C0, DEL and C1
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Byte scan for anything `sanitize_line` would change. C1 controls are
/// two bytes in UTF-8: 0xC2 followed by 0x80..=0x9F.
fn needs_strip(bytes: &[u8]) -> bool {
    bytes.iter().enumerate().any(|(i, &b)| {
        b == 0x1b
            || b == 0x7f
            || (b < 0x20 && b != b'\t')
            || (b == 0xc2 && matches!(bytes.get(i + 1), Some(0x80..=0x9f)))
    })
}

/// Consumes parameter and intermediate bytes up to and including the final
/// byte (0x40..=0x7E).
fn skip_csi<I: Iterator<Item = char>>(chars: &mut I) {
    for c in chars.by_ref() {
        if ('\x40'..='\x7e').contains(&c) {
            break;
        }
    }
}

/// Consumes everything up to and including BEL, `ESC \\` or the 8-bit ST.
fn skip_osc<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    while let Some(c) = chars.next() {
        match c {
            '\x07' | '\u{9c}' => break,
            '\x1b' if chars.peek() == Some(&'\\') => {
                chars.next();
                break;
            }
            _ => {}
        }
    }
}

/// Returns at most `max_chars` characters of `s` for log output, marking
/// truncation with `...[truncated]`.
///
/// Cuts on a char boundary, so multi-byte input never panics.
pub fn preview(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}...[truncated]", &s[..byte_idx])),
        None => Cow::Borrowed(s),
    }
}
