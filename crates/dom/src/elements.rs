//! Element classification shared by tokenizing, building and serializing

/// Void elements never have contents or an end tag
pub fn is_void_element(name: &str) -> bool {
    const VOID: &[&str] = &[
        "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img",
        "input", "keygen", "link", "meta", "param", "source", "track", "wbr",
    ];
    VOID.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Elements whose contents are raw text owned by the tag rather than child nodes
pub fn is_self_contained_element(name: &str) -> bool {
    const SELF_CONTAINED: &[&str] = &[
        "iframe", "noembed", "noframes", "script", "style", "textarea", "title", "xmp",
    ];
    SELF_CONTAINED.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Self-contained elements whose text has character references decoded
pub fn is_escapable_raw_text_element(name: &str) -> bool {
    name.eq_ignore_ascii_case("textarea") || name.eq_ignore_ascii_case("title")
}
