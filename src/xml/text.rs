//! Low-level text scanning and entity encoding
//!
//! Stateless helpers shared by the tokenizer, the attribute-list parser and
//! the node serializers. Scanning functions operate on byte offsets into a
//! `&str`; every structural delimiter in XML is ASCII, so byte-wise scanning
//! never splits a UTF-8 sequence. On failure they return the end of the
//! scanned range; callers compare against it instead of unwrapping.

/// True for the characters XML treats as whitespace (space, tab, CR, LF).
#[inline]
pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// First character of an XML name: letters, `_` and `:` (namespace prefixes).
#[inline]
pub(crate) fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

/// Subsequent characters of an XML name.
#[inline]
pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || c.is_ascii_digit() || c == '-' || c == '.' || c == '\u{B7}'
}

/// Advance `i` past any whitespace, up to `j`.
pub(crate) fn skip_whitespace(text: &str, mut i: usize, j: usize) -> usize {
    let bytes = text.as_bytes();
    while i < j && is_space(bytes[i]) {
        i += 1;
    }
    i
}

/// Offset of the next occurrence of `c` in `[i, j)`, or `j` if none.
pub(crate) fn find_next_char(text: &str, mut i: usize, j: usize, c: u8) -> usize {
    let bytes = text.as_bytes();
    while i < j && bytes[i] != c {
        i += 1;
    }
    i
}

/// Offset of the next whitespace character in `[i, j)`, or `j` if none.
pub(crate) fn find_next_space(text: &str, mut i: usize, j: usize) -> usize {
    let bytes = text.as_bytes();
    while i < j && !is_space(bytes[i]) {
        i += 1;
    }
    i
}

/// Offset of the `r` that balances nesting of `l`/`r` pairs, starting with
/// nesting level 1 at `i`. Quoted runs are opaque: an `l` or `r` inside
/// `'...'` or `"..."` does not affect the count. Returns `j` if unbalanced.
pub(crate) fn find_closing_char(text: &str, mut i: usize, j: usize, l: u8, r: u8) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut quote = 0u8;
    while i < j {
        let b = bytes[i];
        if quote != 0 {
            if b == quote {
                quote = 0;
            }
        } else if b == b'"' || b == b'\'' {
            quote = b;
        } else if b == l {
            depth += 1;
        } else if b == r {
            depth -= 1;
            if depth == 0 {
                return i;
            }
        }
        i += 1;
    }
    j
}

/// True when `token` occurs at offset `i`.
pub(crate) fn is_token(text: &str, i: usize, token: &str) -> bool {
    text.as_bytes()[i..].starts_with(token.as_bytes())
}

/// Offset of the next occurrence of `token` in `[i, j)`, or `j` if none.
pub(crate) fn find_token(text: &str, i: usize, j: usize, token: &str) -> usize {
    match text[i..j].find(token) {
        Some(k) => i + k,
        None => j,
    }
}

/// Resolve an entity reference body (the part between `&` and `;`).
///
/// Supports the five predefined character entities plus decimal (`#NNN`) and
/// hexadecimal (`#xNN`) character references. Returns `None` for anything
/// unrecognized, which the decoder passes through verbatim.
pub(crate) fn reference_value(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                digits.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Replace entity references with the characters they denote.
///
/// Single pass with a copy-before-flush rebuild: nothing is allocated until
/// the first reference actually resolves, so reference-free text is returned
/// as a cheap copy of the input.
pub fn decoded_text(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out: Option<String> = None;
    let mut flushed = 0usize; // everything before this offset is already in `out`
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'&' {
            let semi = find_next_char(text, i + 1, bytes.len(), b';');
            if semi < bytes.len() {
                if let Some(c) = reference_value(&text[i + 1..semi]) {
                    let buf = out.get_or_insert_with(|| String::with_capacity(text.len()));
                    buf.push_str(&text[flushed..i]);
                    buf.push(c);
                    flushed = semi + 1;
                    i = semi + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    match out {
        Some(mut buf) => {
            buf.push_str(&text[flushed..]);
            buf
        }
        None => text.to_string(),
    }
}

/// Escape characters that cannot appear literally in XML content.
///
/// `&`, `<`, `>` and `"` are always escaped; `'` only when `apos` is
/// requested (attribute values that may be single-quoted).
pub fn encoded_text(text: &str, apos: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' if apos => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace each run of whitespace with a single space (xs:token style).
pub fn collapsed_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            in_space = true;
        } else {
            if in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = false;
            out.push(c);
        }
    }
    out
}

/// Strip leading and trailing whitespace only.
pub fn trimmed_spaces(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_ascii_whitespace())
}
