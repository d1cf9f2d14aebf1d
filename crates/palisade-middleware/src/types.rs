//! Pipeline request/response types.

use bytes::Bytes;

/// The request type flowing through the pipeline.
///
/// Bodies are collected into memory by the connection driver before the
/// pipeline runs, so stages see complete `Bytes`.
pub type Request = http::Request<Bytes>;

/// The response type produced by the pipeline.
pub type Response = palisade_core::Response;
