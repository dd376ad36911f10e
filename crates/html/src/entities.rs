//! Character reference decoding
//!
//! Covers the named references that show up in practice plus every numeric
//! form. Unknown names are left in the text untouched.

use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::sync::LazyLock;

static ENTITIES: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let pairs: &[(&str, &str)] = &[
        ("amp", "&"),
        ("lt", "<"),
        ("gt", ">"),
        ("quot", "\""),
        ("apos", "'"),
        ("nbsp", "\u{00A0}"),
        ("iexcl", "\u{00A1}"),
        ("cent", "\u{00A2}"),
        ("pound", "\u{00A3}"),
        ("yen", "\u{00A5}"),
        ("sect", "\u{00A7}"),
        ("copy", "\u{00A9}"),
        ("laquo", "\u{00AB}"),
        ("shy", "\u{00AD}"),
        ("reg", "\u{00AE}"),
        ("deg", "\u{00B0}"),
        ("plusmn", "\u{00B1}"),
        ("micro", "\u{00B5}"),
        ("para", "\u{00B6}"),
        ("middot", "\u{00B7}"),
        ("raquo", "\u{00BB}"),
        ("frac12", "\u{00BD}"),
        ("iquest", "\u{00BF}"),
        ("times", "\u{00D7}"),
        ("divide", "\u{00F7}"),
        ("eacute", "\u{00E9}"),
        ("Eacute", "\u{00C9}"),
        ("uuml", "\u{00FC}"),
        ("ouml", "\u{00F6}"),
        ("auml", "\u{00E4}"),
        ("szlig", "\u{00DF}"),
        ("ndash", "\u{2013}"),
        ("mdash", "\u{2014}"),
        ("lsquo", "\u{2018}"),
        ("rsquo", "\u{2019}"),
        ("ldquo", "\u{201C}"),
        ("rdquo", "\u{201D}"),
        ("bull", "\u{2022}"),
        ("hellip", "\u{2026}"),
        ("euro", "\u{20AC}"),
        ("trade", "\u{2122}"),
        ("larr", "\u{2190}"),
        ("uarr", "\u{2191}"),
        ("rarr", "\u{2192}"),
        ("darr", "\u{2193}"),
        ("infin", "\u{221E}"),
        ("ne", "\u{2260}"),
        ("le", "\u{2264}"),
        ("ge", "\u{2265}"),
        ("alpha", "\u{03B1}"),
        ("beta", "\u{03B2}"),
        ("pi", "\u{03C0}"),
        ("Omega", "\u{03A9}"),
        ("zwj", "\u{200D}"),
        ("zwnj", "\u{200C}"),
    ];
    pairs.iter().copied().collect()
});

/// Decode a named reference without the surrounding `&` and `;`
pub fn decode_entity(name: &str) -> Option<&'static str> {
    ENTITIES.get(name).copied()
}

/// Decode a numeric reference body: `65`, `x41` or `X41`
pub fn decode_numeric(s: &str) -> Option<char> {
    let value = if let Some(hex) = s.strip_prefix('x').or_else(|| s.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        s.parse::<u32>().ok()?
    };

    let value = match value {
        0x00 => 0xFFFD,
        0x80 => 0x20AC,
        0x82 => 0x201A,
        0x85 => 0x2026,
        0x91 => 0x2018,
        0x92 => 0x2019,
        0x93 => 0x201C,
        0x94 => 0x201D,
        0x96 => 0x2013,
        0x97 => 0x2014,
        0x99 => 0x2122,
        0xD800..=0xDFFF => 0xFFFD,
        v if v > 0x10FFFF => 0xFFFD,
        v => v,
    };

    char::from_u32(value)
}

/// Decode every character reference in `text`
pub fn decode_text(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        output.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match decode_reference(after) {
            Some((decoded, consumed)) => {
                output.push_str(&decoded);
                rest = &after[consumed..];
            }
            None => {
                output.push('&');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    Cow::Owned(output)
}

/// Decode the reference at the start of `s` (just past the `&`), returning
/// the replacement and how many bytes it used
fn decode_reference(s: &str) -> Option<(String, usize)> {
    if let Some(numeric) = s.strip_prefix('#') {
        let hex = numeric.starts_with(['x', 'X']);
        let digits_start = if hex { 1 } else { 0 };
        let digits_len = numeric[digits_start..]
            .bytes()
            .take_while(|b| if hex { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
            .count();
        if digits_len == 0 {
            return None;
        }
        let body = &numeric[..digits_start + digits_len];
        let c = decode_numeric(body)?;
        let mut consumed = 1 + body.len();
        if s[consumed..].starts_with(';') {
            consumed += 1;
        }
        return Some((c.to_string(), consumed));
    }

    let name_len = s.bytes().take_while(|b| b.is_ascii_alphanumeric()).count();
    if name_len == 0 {
        return None;
    }
    let decoded = decode_entity(&s[..name_len])?;
    let mut consumed = name_len;
    if s[consumed..].starts_with(';') {
        consumed += 1;
    }
    Some((decoded.to_string(), consumed))
}
