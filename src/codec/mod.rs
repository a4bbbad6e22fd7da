// src/codec/mod.rs
//! Binary-safe body serialization for the wire protocol
//!
//! Request/response bodies cross the controller boundary as JSON string
//! fields. Text bodies travel as plain text; binary image bodies travel as
//! `data:<mime>;base64,<payload>` data-URLs so the line-delimited JSON
//! stream never carries raw bytes.

pub mod body;

pub use body::{content_mime, decode_data_url, encode_data_url, serialize_body};
