// src/flow/mod.rs
//! Flow data model and registry
//!
//! An *exchange* is one request and its eventually arriving response,
//! tracked as a unit. The engine owns exchange memory; the control plane
//! holds shared handles and indexes them two ways:
//!
//! - **by id**: exact, stable for the lifetime of the exchange
//! - **by key**: `host + path` (query stripped), last writer wins
//!
//! The by-key index is intentionally lossy: map-local and breakpoint rules
//! are scoped to keys, not individual exchanges, so two concurrent
//! exchanges to the same endpoint share one slot.

pub mod exchange;
pub mod registry;

pub use exchange::{
    flow_key, is_loopback_host, ClientAddr, Exchange, FlowHandle, Headers, HttpRequest,
    HttpResponse, RequestEdit, ResponseEdit,
};
pub use registry::FlowRegistry;
