//! Build options and debugger requests

use serde::{Deserialize, Serialize};

/// Markup language of the input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Markup {
    #[default]
    Html,
    /// XML document; declarations and processing instructions become nodes
    Xml,
}

/// What to build and how
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Markup whose last element becomes the fragment's context
    pub context_html: Option<String>,
    /// Selector the token source evaluates against every element
    pub selector: Option<String>,
    pub markup: Markup,
}

impl BuildOptions {
    pub fn with_context(mut self, context_html: impl Into<String>) -> Self {
        self.context_html = Some(context_html.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = markup;
        self
    }
}

/// Body of a debugger request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub html: String,
    #[serde(rename = "contextHTML", default)]
    pub context_html: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub markup: Markup,
}

impl Request {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Options for this request; empty context or selector strings count as absent
    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            context_html: self.context_html.clone().filter(|c| !c.is_empty()),
            selector: self.selector.clone().filter(|s| !s.trim().is_empty()),
            markup: self.markup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json() {
        let request = Request::from_json(r#"{"html":"<tr>","contextHTML":"<table>","selector":"tr"}"#).unwrap();
        assert_eq!(request.html, "<tr>");
        assert_eq!(
            request.options(),
            BuildOptions::default().with_context("<table>").with_selector("tr")
        );
    }

    #[test]
    fn test_empty_fields_are_absent() {
        let request = Request::from_json(r#"{"html":"x","contextHTML":"","selector":" "}"#).unwrap();
        assert_eq!(request.options(), BuildOptions::default());

        let bare = Request::from_json("{}").unwrap();
        assert_eq!(bare, Request::new(""));
        assert_eq!(bare.markup, Markup::Html);
    }

    #[test]
    fn test_request_markup() {
        let request = Request::from_json(r#"{"html":"<a/>","markup":"xml"}"#).unwrap();
        assert_eq!(request.options(), BuildOptions::default().with_markup(Markup::Xml));
        assert!(Request::from_json(r#"{"html":"","markup":"sgml"}"#).is_err());
    }
}
