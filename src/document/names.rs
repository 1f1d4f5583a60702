//! Reversible mapping between column names and XML element names
//!
//! Characters that cannot appear in an XML name are written as `_xHHHH_`
//! (or `_xHHHHHHHH_` above the BMP). A literal `_` that would otherwise be
//! read back as the start of such a sequence is itself written as `_x005F_`.

use std::fmt::Write;

/// XML 1.0 (5th edition) `NameStartChar`, without the namespace colon
fn is_name_start(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

/// XML 1.0 (5th edition) `NameChar`, without the namespace colon
fn is_name_char(c: char) -> bool {
    is_name_start(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// Length of an escape sequence starting at the beginning of `s`, if any
fn escape_len(s: &str) -> Option<usize> {
    let rest = s.strip_prefix("_x")?;
    [4usize, 8].into_iter().find_map(|digits| {
        let hex = rest.get(..digits)?;
        let closed = rest[digits..].starts_with('_');
        (closed && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(digits + 3)
    })
}

fn push_escaped(out: &mut String, c: char) {
    let code = c as u32;
    if code > 0xFFFF {
        let _ = write!(out, "_x{:08X}_", code);
    } else {
        let _ = write!(out, "_x{:04X}_", code);
    }
}

/// Encode a non-empty column name as a valid XML element name
pub fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());

    for (i, c) in name.char_indices() {
        let allowed = if i == 0 { is_name_start(c) } else { is_name_char(c) };
        if c == '_' && escape_len(&name[i..]).is_some() {
            push_escaped(&mut out, c);
        } else if allowed {
            out.push(c);
        } else {
            push_escaped(&mut out, c);
        }
    }
    out
}

/// Inverse of [`encode_name`]
pub fn decode_name(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;

    while let Some(c) = rest.chars().next() {
        if let Some(len) = escape_len(rest) {
            let decoded = u32::from_str_radix(&rest[2..len - 1], 16)
                .ok()
                .and_then(char::from_u32);
            if let Some(decoded) = decoded {
                out.push(decoded);
                rest = &rest[len..];
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}
