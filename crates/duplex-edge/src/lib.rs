//! Request-time origin failover for the duplex delivery layer.
//!
//! The edge failover group sits in front of both regional origins. Every
//! request goes to the primary origin first; when the response status is in
//! the configured failover set (or the origin is unreachable), the same
//! request is retried exactly once against the secondary origin and that
//! response is returned instead.
//!
//! The decision is stateless and per-request: nothing is cached across
//! requests and no health prediction is involved. This gives sub-request
//! failover that complements the slower, stickier DNS layer — a client only
//! sees a failure when both origins fail for its specific request.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod group;
mod origin;

pub use group::{EdgeRouter, OriginGroup};
pub use origin::{EdgeError, HttpOrigin, Origin, OriginRequest, OriginResponse};
