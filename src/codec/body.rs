// src/codec/body.rs
//! Text / data-URL body codec
//!
//! The two directions are intentionally asymmetric: serialization emits a
//! data-URL only for `image/*` content and plain text for everything else,
//! while decoding recognizes the data-URL form alone and returns `None` for
//! plain text (which needs no decoding).

use crate::flow::exchange::Headers;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurpose, GeneralPurposeConfig};
use bytes::Bytes;

/// Fallback MIME type when the Content-Type header is absent or empty
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Standard-alphabet engine tolerating malformed padding on decode
const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Extract the base MIME type from a header set.
///
/// Parameters after `;` are dropped; an absent or empty Content-Type falls
/// back to `application/octet-stream`. The header's casing is preserved so
/// an emitted data-URL carries the type exactly as the server sent it.
pub fn content_mime(headers: &Headers) -> String {
    let content_type = headers.get("content-type").unwrap_or("");
    let base = content_type.split(';').next().unwrap_or("").trim();

    if base.is_empty() {
        DEFAULT_MIME.to_string()
    } else {
        base.to_string()
    }
}

/// Serialize a message body for the event protocol.
///
/// Image bodies become data-URLs of the raw bytes; everything else is
/// decoded as (lossy) UTF-8 text.
pub fn serialize_body(headers: &Headers, body: &Bytes) -> String {
    let mime = content_mime(headers);

    // Case-insensitive check only; the data-URL keeps the original casing
    if mime.to_ascii_lowercase().starts_with("image/") {
        encode_data_url(&mime, body)
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

/// Encode raw bytes as a `data:<mime>;base64,<payload>` URL
pub fn encode_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, B64.encode(data))
}

/// Decode a data-URL back into its MIME type and raw bytes.
///
/// Returns `None` when the `data:` prefix, the comma separator, or the
/// `;base64` marker is missing, or when base64 decoding fails.
pub fn decode_data_url(payload: &str) -> Option<(String, Bytes)> {
    let rest = payload.strip_prefix("data:")?;
    let (meta, b64) = rest.split_once(',')?;
    if !meta.contains(";base64") {
        return None;
    }

    let mime = meta.split(';').next().unwrap_or("").trim();
    let mime = if mime.is_empty() { DEFAULT_MIME } else { mime };

    let data = B64.decode(b64).ok()?;
    Some((mime.to_string(), Bytes::from(data)))
}
