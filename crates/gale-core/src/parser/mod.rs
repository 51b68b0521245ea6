//! Request body parsing
//!
//! The engine only needs "parsing completed, fields and files attached".
//! [`BodyParser`] is the seam; [`DefaultBodyParser`] handles raw, form and
//! JSON bodies and refuses multipart payloads.

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How a route wants its body pre-processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostParsing {
    /// Leave the body alone
    #[default]
    None,
    /// Body as text
    Raw,
    /// `application/x-www-form-urlencoded`
    Form,
    /// JSON document
    Json,
}

/// Parsed request body
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Text(String),
    Form(HashMap<String, String>),
    Json(serde_json::Value),
}

impl ParsedBody {
    /// Field lookup for form bodies and JSON objects
    pub fn field(&self, name: &str) -> Option<String> {
        match self {
            ParsedBody::Form(map) => map.get(name).cloned(),
            ParsedBody::Json(serde_json::Value::Object(map)) => map.get(name).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParsedBody::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ParsedBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// An uploaded file written to the upload directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field the file was posted under
    pub field: String,
    /// Client-side file name
    pub name: String,
    /// Where the bytes were stored
    pub path: PathBuf,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Result of multipart parsing
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

/// Body and multipart parser
pub trait BodyParser: Send + Sync {
    /// Parse a collected body
    fn parse(&self, body: &[u8], mode: PostParsing) -> Result<ParsedBody>;

    /// Parse a multipart body, storing files under `upload_dir`
    fn parse_multipart(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        upload_dir: &Path,
    ) -> Result<Multipart>;
}

/// Built-in parser for text, form and JSON bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBodyParser;

/// Does the payload look like an XML document?
fn looks_like_xml(text: &str) -> bool {
    text.starts_with('<') && text.ends_with('>')
}

impl BodyParser for DefaultBodyParser {
    fn parse(&self, body: &[u8], mode: PostParsing) -> Result<ParsedBody> {
        let text = String::from_utf8_lossy(body).into_owned();

        let parsed = match mode {
            PostParsing::None | PostParsing::Raw => ParsedBody::Text(text),
            PostParsing::Form if looks_like_xml(&text) => ParsedBody::Text(text),
            PostParsing::Form => ParsedBody::Form(
                url::form_urlencoded::parse(text.as_bytes())
                    .into_owned()
                    .collect(),
            ),
            PostParsing::Json if text.trim().is_empty() => {
                ParsedBody::Json(serde_json::Value::Object(Default::default()))
            }
            PostParsing::Json => match serde_json::from_str(&text) {
                Ok(value) => ParsedBody::Json(value),
                Err(e) => {
                    tracing::debug!(error = %e, "Invalid JSON body, kept as text");
                    ParsedBody::Text(text)
                }
            },
        };

        Ok(parsed)
    }

    fn parse_multipart(
        &self,
        content_type: Option<&str>,
        _body: &[u8],
        _upload_dir: &Path,
    ) -> Result<Multipart> {
        Err(Error::Parse(format!(
            "multipart bodies need a custom BodyParser (content-type: {})",
            content_type.unwrap_or("none")
        )))
    }
}
