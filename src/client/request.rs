//! Request and response shapes for [`VolairClient::send_request`](super::VolairClient::send_request).

use std::fmt;

use reqwest::blocking::multipart::{Form, Part};
use serde_json::{Map, Value};

use super::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// `"GET"` (any case) is [`Method::Get`]; every other name is sent as a POST.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("GET") {
            Method::Get
        } else {
            Method::Post
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        Method::from_name(name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A file to upload as one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// MIME type; omitted from the part when `None`.
    pub mime: Option<String>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    fn into_part(self) -> Result<Part, ClientError> {
        let part = Part::bytes(self.bytes).file_name(self.file_name);
        match self.mime {
            Some(mime) => part
                .mime_str(&mime)
                .map_err(|e| ClientError::Build(format!("invalid mime type '{mime}': {e}"))),
            None => Ok(part),
        }
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    Raw(Vec<u8>),
}

impl ApiResponse {
    pub fn into_json(self) -> Result<Value, ClientError> {
        match self {
            ApiResponse::Json(v) => Ok(v),
            ApiResponse::Raw(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ClientError::Decode(format!("response is not JSON: {e}"))),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ApiResponse::Raw(bytes) => bytes,
            ApiResponse::Json(v) => v.to_string().into_bytes(),
        }
    }
}

/// Flatten `data` into string pairs for query strings and form fields.
/// Arrays repeat the key; `null` becomes an empty value.
pub(crate) fn to_pairs(data: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(data.len());
    for (key, value) in data {
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_text(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_text(other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a multipart form: `data` as text fields, `files` as file parts.
pub(crate) fn multipart_form<'a>(
    data: &Map<String, Value>,
    files: impl IntoIterator<Item = (&'a String, &'a FilePart)>,
) -> Result<Form, ClientError> {
    let mut form = Form::new();
    for (key, value) in to_pairs(data) {
        form = form.text(key, value);
    }
    for (field, file) in files {
        form = form.part(field.clone(), file.clone().into_part()?);
    }
    Ok(form)
}
