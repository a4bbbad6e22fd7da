// src/flow/exchange.rs
//! Exchange data model: requests, responses, headers, keys, edits

use crate::codec;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a live exchange.
///
/// The interception engine owns the exchange for its lifetime; the control
/// plane only holds references through the registry.
pub type FlowHandle = Arc<RwLock<Exchange>>;

/// Ordered, case-insensitive header map.
///
/// Insertion order is preserved both in memory and across the JSON
/// protocol; lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Get the first value for a header name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a header is present (case-insensitive)
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a header, replacing an existing value under the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Append a header without checking for an existing name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
                let mut headers = Headers::new();
                // MapAccess yields entries in document order
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    headers.append(name, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// Client connection endpoint, as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAddr {
    pub ip: String,
    pub port: u16,
}

/// HTTP request half of an exchange
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Host component of the URL, without port
    pub fn host(&self) -> &str {
        split_url(&self.url).0
    }

    /// Path component of the URL, query string stripped
    pub fn path(&self) -> &str {
        split_url(&self.url).1
    }

    /// Request body as (lossy) UTF-8 text
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP response half of an exchange
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }
}

/// One request and its eventually arriving response
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Unique identifier, stable per exchange
    pub id: String,

    /// Client endpoint, when the engine reports one
    pub client: Option<ClientAddr>,

    pub request: HttpRequest,
    pub response: Option<HttpResponse>,
}

impl Exchange {
    pub fn new(id: impl Into<String>, request: HttpRequest) -> Self {
        Self {
            id: id.into(),
            client: None,
            request,
            response: None,
        }
    }

    /// Lookup key for rule tables: host + path, query stripped
    pub fn key(&self) -> String {
        let (host, path) = split_url(&self.request.url);
        flow_key(host, path)
    }

    /// Wrap into a shared handle
    pub fn into_handle(self) -> FlowHandle {
        Arc::new(RwLock::new(self))
    }
}

/// Derive the rule lookup key from host and path
pub fn flow_key(host: &str, path: &str) -> String {
    format!("{}{}", host, path)
}

/// Split a URL into (host-without-port, path-without-query).
///
/// Hand-rolled on purpose: the engine hands us pre-validated URLs and the
/// key model only needs authority and path, never full URL semantics.
fn split_url(url: &str) -> (&str, &str) {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };

    // The authority ends at the first path, query, or fragment delimiter;
    // a query with no path (http://host?x=1) must not bleed into the host
    let (authority, path) = match rest.find(['/', '?', '#']) {
        Some(idx) if rest.as_bytes()[idx] == b'/' => (&rest[..idx], &rest[idx..]),
        Some(idx) => (&rest[..idx], "/"),
        None => (rest, "/"),
    };

    let host = if authority.starts_with('[') {
        // Bracketed IPv6 literal, keep brackets, drop any :port suffix
        match authority.find(']') {
            Some(idx) => &authority[..=idx],
            None => authority,
        }
    } else {
        authority.split(':').next().unwrap_or(authority)
    };

    let path = path.split(['?', '#']).next().unwrap_or(path);
    (host, path)
}

/// Loopback-destined exchanges are ignored entirely by the control plane
/// so it never interferes with local tooling.
pub fn is_loopback_host(host: &str) -> bool {
    let h = host.trim().to_ascii_lowercase();
    if h.is_empty() {
        return false;
    }
    if h == "localhost" || h == "::1" || h == "0.0.0.0" {
        return true;
    }
    if h.starts_with("127.") {
        return true;
    }
    // Engines can surface IPv6 literals with brackets in some contexts
    h.starts_with("[::1]")
}

/// Request edits carried by `breakpoint_continue` and `retry_flow`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestEdit {
    pub method: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub body: String,
    pub headers: Option<Headers>,
}

/// Response edits carried by `breakpoint_continue`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEdit {
    pub status: Option<u16>,
    #[serde(default)]
    pub body: String,
    pub headers: Option<Headers>,
}

impl Exchange {
    /// Apply a request edit in place.
    ///
    /// The method is upper-cased; the body always replaces the current one
    /// (an empty string clears it); headers, when provided, fully replace
    /// the existing set rather than merging into it.
    pub fn apply_request_edit(&mut self, edit: &RequestEdit) {
        if let Some(method) = &edit.method {
            self.request.method = method.to_ascii_uppercase();
        }
        if let Some(url) = &edit.url {
            if !url.is_empty() {
                self.request.url = url.clone();
            }
        }
        self.request.body = Bytes::from(edit.body.clone().into_bytes());
        if let Some(headers) = &edit.headers {
            self.request.headers = headers.clone();
        }
    }

    /// Apply a response edit in place, building a fresh response.
    ///
    /// The status defaults to the current response's (or 200 if none
    /// existed). The body is tried as a data-URL first; when it decodes,
    /// the binary payload is used and the decoded MIME type injected as
    /// Content-Type unless the edit already carries one.
    pub fn apply_response_edit(&mut self, edit: &ResponseEdit) {
        let default_status = self.response.as_ref().map(|r| r.status).unwrap_or(200);
        let status = edit.status.unwrap_or(default_status);
        let mut headers = edit.headers.clone().unwrap_or_default();

        let body = match codec::decode_data_url(&edit.body) {
            Some((mime, data)) => {
                if !headers.contains("content-type") {
                    headers.set("Content-Type", mime);
                }
                data
            }
            None => Bytes::from(edit.body.clone().into_bytes()),
        };

        self.response = Some(HttpResponse {
            status,
            headers,
            body,
        });
    }
}
