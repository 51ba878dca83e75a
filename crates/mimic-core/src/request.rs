//! Normalized view of an inbound HTTP request.
//!
//! The transport layer builds a `Request` from whatever it received on the
//! wire; the engine only ever reads from it. Header names compare
//! case-insensitively and every attribute may carry several values.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;

/// An inbound request as seen by the matching engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RequestRaw", into = "RequestRaw")]
pub struct Request {
    method: String,
    url: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    /// Create a request from a method and a URL (path plus optional query).
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (url.clone(), Vec::new()),
        };
        Self {
            method: method.as_ref().trim().to_string(),
            url,
            path,
            query,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a cookie explicitly, in addition to any `Cookie` headers.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path plus query string, as received.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// All values of a header, name compared case-insensitively.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }

    pub fn query_parameters(&self) -> &[(String, String)] {
        &self.query
    }

    /// All decoded values of a query parameter.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All cookies: explicit ones first, then those parsed from `Cookie` headers.
    pub fn cookies(&self) -> Vec<(&str, &str)> {
        let explicit = self.cookies.iter().map(|(n, v)| (n.as_str(), v.as_str()));
        let from_headers = self
            .header_values("cookie")
            .into_iter()
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name, value.trim().trim_matches('"')))
            });
        explicit.chain(from_headers).collect()
    }

    pub fn cookie_values(&self, name: &str) -> Vec<&str> {
        self.cookies()
            .into_iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, invalid UTF-8 replaced.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (decode_component(name), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct NameValue {
    name: String,
    value: String,
}

/// Wire shape of a request in journal dumps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestRaw {
    method: String,
    url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    headers: Vec<NameValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cookies: Vec<NameValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_as_base64: Option<String>,
}

impl TryFrom<RequestRaw> for Request {
    type Error = base64::DecodeError;

    fn try_from(raw: RequestRaw) -> Result<Self, Self::Error> {
        let body = match (raw.body_as_base64, raw.body) {
            (Some(encoded), _) => base64::engine::general_purpose::STANDARD.decode(encoded)?,
            (None, Some(text)) => text.into_bytes(),
            (None, None) => Vec::new(),
        };
        let mut request = Request::new(raw.method, raw.url).with_body(body);
        request.headers = raw.headers.into_iter().map(|h| (h.name, h.value)).collect();
        request.cookies = raw.cookies.into_iter().map(|c| (c.name, c.value)).collect();
        Ok(request)
    }
}

impl From<Request> for RequestRaw {
    fn from(request: Request) -> Self {
        let (body, body_as_base64) = if request.body.is_empty() {
            (None, None)
        } else {
            match String::from_utf8(request.body) {
                Ok(text) => (Some(text), None),
                Err(e) => (
                    None,
                    Some(base64::engine::general_purpose::STANDARD.encode(e.into_bytes())),
                ),
            }
        };
        let to_pairs = |pairs: Vec<(String, String)>| {
            pairs
                .into_iter()
                .map(|(name, value)| NameValue { name, value })
                .collect()
        };
        RequestRaw {
            method: request.method,
            url: request.url,
            headers: to_pairs(request.headers),
            cookies: to_pairs(request.cookies),
            body,
            body_as_base64,
        }
    }
}

/// A request captured by the journal, with identity and arrival time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedRequest {
    pub id: Uuid,
    pub logged_at: DateTime<Utc>,
    #[serde(flatten)]
    pub request: Request,
}

impl LoggedRequest {
    pub fn capture(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            logged_at: Utc::now(),
            request,
        }
    }
}
