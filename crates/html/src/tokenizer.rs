//! HTML tokenizer
//!
//! Splits input into lexemes with byte spans. Each call to [`Tokenizer::scan`]
//! reads one whole lexeme: a tag together with its attributes, a complete
//! comment, or a run of text. Self-contained elements such as SCRIPT or TITLE
//! are read together with their contents and end tag. Input that stops in the
//! middle of a lexeme is reported as [`Scan::Incomplete`] so that nothing is
//! emitted for the truncated construct.

use parsetrail_dom::elements::{is_escapable_raw_text_element, is_self_contained_element};
use parsetrail_dom::{CompatMode, Span};
use smallvec::SmallVec;

use crate::entities::decode_text;
use crate::source::{CommentType, DoctypeInfo};

/// Attributes in source order, `None` for attributes written without a value
pub type Attributes = SmallVec<[(String, Option<String>); 4]>;

/// A start or end tag
#[derive(Debug, Clone, PartialEq)]
pub struct TagLexeme {
    /// Lower-cased tag name
    pub name: String,
    pub attributes: Attributes,
    pub is_end: bool,
    pub self_closing: bool,
    /// Contents of a self-contained element, read up to its end tag
    pub raw_text: Option<String>,
}

/// One lexical unit of input
#[derive(Debug, Clone, PartialEq)]
pub enum Lexeme {
    Tag(TagLexeme),
    Text(String),
    CdataSection(String),
    Comment {
        text: String,
        kind: CommentType,
        /// Target of a PI-lookalike comment
        target: Option<String>,
    },
    Doctype(DoctypeInfo),
    /// `</>`
    PresumptuousTag,
    /// `</` followed by something that cannot start a tag name
    FunkyComment(String),
}

/// Outcome of scanning for the next lexeme
#[derive(Debug, Clone, PartialEq)]
pub enum Scan {
    Token { lexeme: Lexeme, span: Span },
    /// The input ends inside a lexeme starting at `at`
    Incomplete { at: usize },
    End,
}

/// Byte-oriented HTML tokenizer
pub struct Tokenizer {
    input: String,
    pos: usize,
}

impl Tokenizer {
    /// Create a new tokenizer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            pos: 0,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Offset of the next unread byte
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read the next lexeme
    ///
    /// `foreign` is set while the parser is inside SVG or MathML content,
    /// where CDATA sections are real and no element owns its raw text.
    pub fn scan(&mut self, foreign: bool) -> Scan {
        let start = self.pos;
        if start >= self.input.len() {
            return Scan::End;
        }

        let result = if self.starts_markup(start) {
            self.scan_markup(start, foreign)
        } else {
            Some(self.scan_text(start))
        };

        match result {
            Some((lexeme, end)) => {
                self.pos = end;
                Scan::Token {
                    lexeme,
                    span: Span::new(start, end - start),
                }
            }
            None => Scan::Incomplete { at: start },
        }
    }

    fn bytes(&self) -> &[u8] {
        self.input.as_bytes()
    }

    fn rest(&self, at: usize) -> &str {
        self.input.get(at..).unwrap_or("")
    }

    /// Whether a `<` at `at` opens markup rather than being plain text
    fn starts_markup(&self, at: usize) -> bool {
        let bytes = self.bytes();
        if bytes.get(at) != Some(&b'<') {
            return false;
        }
        match bytes.get(at + 1) {
            Some(b) => b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'),
            // A trailing `<` is plain text
            None => false,
        }
    }

    fn scan_text(&self, start: usize) -> (Lexeme, usize) {
        let mut end = start + 1;
        while end < self.input.len() && !self.starts_markup(end) {
            end += 1;
        }
        let raw = self.input.get(start..end).unwrap_or("");
        (Lexeme::Text(decode_text(raw).into_owned()), end)
    }

    fn scan_markup(&self, start: usize, foreign: bool) -> Option<(Lexeme, usize)> {
        let rest = self.rest(start);
        if rest.starts_with("<!--") {
            self.scan_comment(start)
        } else if rest.starts_with("<![CDATA[") {
            self.scan_cdata(start, foreign)
        } else if starts_with_ignore_case(rest, "<!doctype") {
            self.scan_doctype(start)
        } else if rest.starts_with("<!") {
            let close = find_from(rest, 2, ">")?;
            let text = rest[2..close].to_string();
            Some((
                Lexeme::Comment {
                    text,
                    kind: CommentType::InvalidHtml,
                    target: None,
                },
                start + close + 1,
            ))
        } else if rest.starts_with("<?") {
            self.scan_processing_instruction(start)
        } else if rest.starts_with("</") {
            self.scan_end_tag(start)
        } else {
            self.scan_start_tag(start, foreign)
        }
    }

    fn scan_comment(&self, start: usize) -> Option<(Lexeme, usize)> {
        let rest = self.rest(start);
        let abrupt = if rest[4..].starts_with('>') {
            Some(5)
        } else if rest[4..].starts_with("->") {
            Some(6)
        } else {
            None
        };
        if let Some(length) = abrupt {
            return Some((
                Lexeme::Comment {
                    text: String::new(),
                    kind: CommentType::AbruptlyClosed,
                    target: None,
                },
                start + length,
            ));
        }

        let close = find_from(rest, 4, "-->")?;
        Some((
            Lexeme::Comment {
                text: rest[4..close].to_string(),
                kind: CommentType::HtmlComment,
                target: None,
            },
            start + close + 3,
        ))
    }

    fn scan_cdata(&self, start: usize, foreign: bool) -> Option<(Lexeme, usize)> {
        let rest = self.rest(start);
        let close = find_from(rest, 9, "]]>")?;
        let text = rest[9..close].to_string();
        let lexeme = if foreign {
            Lexeme::CdataSection(text)
        } else {
            Lexeme::Comment {
                text,
                kind: CommentType::CdataLookalike,
                target: None,
            }
        };
        Some((lexeme, start + close + 3))
    }

    fn scan_doctype(&self, start: usize) -> Option<(Lexeme, usize)> {
        let rest = self.rest(start);
        let close = find_from(rest, 9, ">")?;
        let info = parse_doctype(&rest[9..close]);
        Some((Lexeme::Doctype(info), start + close + 1))
    }

    fn scan_processing_instruction(&self, start: usize) -> Option<(Lexeme, usize)> {
        let rest = self.rest(start);
        let close = find_from(rest, 2, ">")?;
        let body = &rest[2..close];
        let end = start + close + 1;

        let target_len = body
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
            .count();
        let first_is_letter = body.bytes().next().map(|b| b.is_ascii_alphabetic()).unwrap_or(false);

        if first_is_letter && body.ends_with('?') {
            let target = &body[..target_len];
            let data = &body[target_len..body.len() - 1];
            let separated = data.is_empty() || data.starts_with(is_html_whitespace);
            if separated {
                return Some((
                    Lexeme::Comment {
                        text: data.trim_start_matches(is_html_whitespace).to_string(),
                        kind: CommentType::PiLookalike,
                        target: Some(target.to_string()),
                    },
                    end,
                ));
            }
        }

        Some((
            Lexeme::Comment {
                text: body.to_string(),
                kind: CommentType::InvalidHtml,
                target: None,
            },
            end,
        ))
    }

    fn scan_end_tag(&self, start: usize) -> Option<(Lexeme, usize)> {
        let rest = self.rest(start);
        match rest.as_bytes().get(2) {
            None => None,
            Some(b'>') => Some((Lexeme::PresumptuousTag, start + 3)),
            Some(b) if b.is_ascii_alphabetic() => {
                let (mut tag, end) = self.scan_tag_body(start + 2)?;
                tag.is_end = true;
                tag.attributes.clear();
                tag.self_closing = false;
                Some((Lexeme::Tag(tag), end))
            }
            Some(_) => {
                let close = find_from(rest, 2, ">")?;
                Some((Lexeme::FunkyComment(rest[2..close].to_string()), start + close + 1))
            }
        }
    }

    fn scan_start_tag(&self, start: usize, foreign: bool) -> Option<(Lexeme, usize)> {
        let (mut tag, mut end) = self.scan_tag_body(start + 1)?;

        if !foreign && is_self_contained_element(&tag.name) {
            let (raw, close_end) = self.scan_raw_text(end, &tag.name)?;
            let text = if is_escapable_raw_text_element(&tag.name) {
                decode_text(raw).into_owned()
            } else {
                raw.to_string()
            };
            tag.raw_text = Some(text);
            end = close_end;
        }

        Some((Lexeme::Tag(tag), end))
    }

    /// Read a tag name and attributes starting at the first name byte
    fn scan_tag_body(&self, at: usize) -> Option<(TagLexeme, usize)> {
        let bytes = self.bytes();
        let mut pos = at;

        while pos < bytes.len() && !is_tag_name_end(bytes[pos]) {
            pos += 1;
        }
        let name = self.input.get(at..pos)?.to_ascii_lowercase();

        let mut tag = TagLexeme {
            name,
            attributes: Attributes::new(),
            is_end: false,
            self_closing: false,
            raw_text: None,
        };

        loop {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            match bytes.get(pos)? {
                b'>' => return Some((tag, pos + 1)),
                b'/' => {
                    pos += 1;
                    if bytes.get(pos) == Some(&b'>') {
                        tag.self_closing = true;
                        return Some((tag, pos + 1));
                    }
                }
                _ => {
                    let (attribute, next) = self.scan_attribute(pos)?;
                    if !tag.attributes.iter().any(|(name, _)| *name == attribute.0) {
                        tag.attributes.push(attribute);
                    }
                    pos = next;
                }
            }
        }
    }

    fn scan_attribute(&self, at: usize) -> Option<((String, Option<String>), usize)> {
        let bytes = self.bytes();
        let mut pos = at + 1;
        while pos < bytes.len() && !matches!(bytes[pos], b'=' | b'>' | b'/') && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let name = self.input.get(at..pos)?.to_ascii_lowercase();

        let mut after = pos;
        while after < bytes.len() && bytes[after].is_ascii_whitespace() {
            after += 1;
        }
        if bytes.get(after) != Some(&b'=') {
            // Report EOF inside the tag rather than a valueless attribute
            bytes.get(after)?;
            return Some(((name, None), pos));
        }

        let mut pos = after + 1;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let (raw, end) = match bytes.get(pos)? {
            quote @ (b'"' | b'\'') => {
                let close = find_byte(bytes, pos + 1, *quote)?;
                (self.input.get(pos + 1..close)?, close + 1)
            }
            b'>' => ("", pos),
            _ => {
                let mut end = pos;
                while end < bytes.len() && bytes[end] != b'>' && !bytes[end].is_ascii_whitespace() {
                    end += 1;
                }
                (self.input.get(pos..end)?, end)
            }
        };

        Some(((name, Some(decode_text(raw).into_owned())), end))
    }

    /// Find the end tag closing a self-contained element, returning its
    /// contents and the offset just past the end tag
    fn scan_raw_text(&self, from: usize, name: &str) -> Option<(&str, usize)> {
        let bytes = self.bytes();
        let mut search = from;
        loop {
            let open = search + self.rest(search).find("</")?;
            let name_start = open + 2;
            let name_end = name_start + name.len();
            let candidate = self.input.get(name_start..name_end);
            let matches = candidate.map(|c| c.eq_ignore_ascii_case(name)).unwrap_or(false)
                && bytes
                    .get(name_end)
                    .map(|b| b.is_ascii_whitespace() || matches!(b, b'/' | b'>'))
                    .unwrap_or(false);
            if matches {
                let close = find_byte(bytes, name_end, b'>')?;
                return Some((self.input.get(from..open)?, close + 1));
            }
            search = open + 2;
        }
    }
}

fn find_from(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    haystack.get(from..)?.find(needle).map(|i| i + from)
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes.get(from..)?.iter().position(|b| *b == needle).map(|i| i + from)
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

fn is_tag_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'/' || b == b'>'
}

fn is_html_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0C' | '\r')
}

/// Parse the part of a DOCTYPE after the keyword
fn parse_doctype(body: &str) -> DoctypeInfo {
    let mut rest = body.trim_start_matches(is_html_whitespace);

    let name_len = rest.find(is_html_whitespace).unwrap_or(rest.len());
    let name = if name_len > 0 {
        Some(rest[..name_len].to_ascii_lowercase())
    } else {
        None
    };
    rest = rest[name_len..].trim_start_matches(is_html_whitespace);

    let mut public_identifier = None;
    let mut system_identifier = None;
    let mut force_quirks = name.is_none();

    if starts_with_ignore_case(rest, "public") {
        rest = &rest[6..];
        match take_quoted(rest) {
            Some((public, after)) => {
                public_identifier = Some(public.to_string());
                if let Some((system, _)) = take_quoted(after) {
                    system_identifier = Some(system.to_string());
                }
            }
            None => force_quirks = true,
        }
    } else if starts_with_ignore_case(rest, "system") {
        rest = &rest[6..];
        match take_quoted(rest) {
            Some((system, _)) => system_identifier = Some(system.to_string()),
            None => force_quirks = true,
        }
    } else if !rest.is_empty() {
        force_quirks = true;
    }

    let indicated_compatability_mode = if force_quirks {
        CompatMode::Quirks
    } else {
        compat_mode_for(name.as_deref(), public_identifier.as_deref(), system_identifier.as_deref())
    };

    DoctypeInfo {
        name,
        public_identifier,
        system_identifier,
        indicated_compatability_mode,
    }
}

/// Read a quoted identifier, returning it and the text after the closing quote
fn take_quoted(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start_matches(is_html_whitespace);
    let quote = s.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = &s[1..];
    let close = inner.find(quote)?;
    Some((&inner[..close], &inner[close + 1..]))
}

const QUIRKY_PUBLIC_PREFIXES: &[&str] = &[
    "+//silmaril//dtd html pro v0r11 19970101//",
    "-//as//dtd html 3.0 aswedit + extensions//",
    "-//ietf//dtd html 2.0",
    "-//ietf//dtd html 3",
    "-//ietf//dtd html level",
    "-//ietf//dtd html strict",
    "-//ietf//dtd html//",
    "-//microsoft//dtd internet explorer",
    "-//netscape comm. corp.//dtd html//",
    "-//o'reilly and associates//dtd html",
    "-//w3c//dtd html 3",
    "-//w3c//dtd html 4.0 frameset//",
    "-//w3c//dtd html 4.0 transitional//",
    "-//w3c//dtd w3 html//",
    "-//w3o//dtd w3 html 3.0//",
    "-//webtechs//dtd mozilla html",
];

fn compat_mode_for(name: Option<&str>, public: Option<&str>, system: Option<&str>) -> CompatMode {
    if name != Some("html") {
        return CompatMode::Quirks;
    }

    let public = public.map(|p| p.to_ascii_lowercase());
    let system = system.map(|s| s.to_ascii_lowercase());
    let public = public.as_deref();

    if let Some(public) = public {
        if matches!(
            public,
            "-//w3o//dtd w3 html strict 3.0//en//" | "-/w3c/dtd html 4.0 transitional/en" | "html"
        ) || QUIRKY_PUBLIC_PREFIXES.iter().any(|prefix| public.starts_with(prefix))
        {
            return CompatMode::Quirks;
        }
    }
    if system.as_deref() == Some("http://www.ibm.com/data/dtd/v11/ibmxhtml1-transitional.dtd") {
        return CompatMode::Quirks;
    }

    let html401_loose = public
        .map(|p| p.starts_with("-//w3c//dtd html 4.01 frameset//") || p.starts_with("-//w3c//dtd html 4.01 transitional//"))
        .unwrap_or(false);
    if html401_loose && system.is_none() {
        return CompatMode::Quirks;
    }

    let xhtml_loose = public
        .map(|p| p.starts_with("-//w3c//dtd xhtml 1.0 frameset//") || p.starts_with("-//w3c//dtd xhtml 1.0 transitional//"))
        .unwrap_or(false);
    if xhtml_loose || html401_loose {
        return CompatMode::LimitedQuirks;
    }

    CompatMode::NoQuirks
}
