//! # Transport Abstraction
//!
//! The live-call surface a transport exposes to this crate.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The transport knows nothing about service types or
//!   marshalling. It moves opaque payloads and reports call state.
//! - **Call-Shaped**: One struct per RPC shape. Each carries the pending
//!   response (or streams) plus a shared [`CallState`] for headers, status,
//!   trailers and cancellation.
//! - **Failures are Statuses**: A failed call resolves to the [`Status`] the
//!   transport observed. Call handles surface it unchanged.

use std::sync::Arc;

use futures::future::BoxFuture;
use svcmeta::Metadata;
use svcmeta::Status;

use crate::client::CallOptions;

/// Pending single response of a call.
pub type ResponseFuture = BoxFuture<'static, Result<Vec<u8>, Status>>;

/// Call-wide state owned by the transport.
///
/// This trait is designed to be object-safe (`Arc<dyn CallState>`).
#[async_trait::async_trait]
pub trait CallState: Send + Sync + 'static {
    /// Waits for the response headers.
    async fn response_headers(&self) -> Result<Metadata, Status>;

    /// Returns the final status once the call has finished.
    ///
    /// # invariants
    /// - Must return `None` until the call reaches a terminal state.
    /// - Must keep returning the same status afterwards.
    fn status(&self) -> Option<Status>;

    /// Returns the trailing metadata once the call has finished.
    fn trailers(&self) -> Option<Metadata>;

    /// Requests cancellation of all pending work for the call.
    ///
    /// Best-effort and idempotent. Pending operations should complete with a
    /// `Cancelled` status.
    fn cancel(&self);
}

/// Read side of a message stream.
#[async_trait::async_trait]
pub trait StreamReader: Send + 'static {
    /// Returns the next message, or `None` once the stream is exhausted.
    async fn next(&mut self) -> Result<Option<Vec<u8>>, Status>;
}

/// Write side of a message stream.
#[async_trait::async_trait]
pub trait StreamWriter: Send + 'static {
    async fn write(&mut self, message: Vec<u8>) -> Result<(), Status>;

    /// Signals that no more messages will be written.
    async fn complete(&mut self) -> Result<(), Status>;
}

/// Single request, single response.
pub struct AsyncUnaryCall {
    pub response: ResponseFuture,
    pub call: Arc<dyn CallState>,
}

/// Streamed requests, single response.
pub struct AsyncClientStreamingCall {
    pub request_stream: Box<dyn StreamWriter>,
    pub response: ResponseFuture,
    pub call: Arc<dyn CallState>,
}

/// Single request, streamed responses.
pub struct AsyncServerStreamingCall {
    pub response_stream: Box<dyn StreamReader>,
    pub call: Arc<dyn CallState>,
}

/// Streamed requests and streamed responses.
pub struct AsyncDuplexStreamingCall {
    pub request_stream: Box<dyn StreamWriter>,
    pub response_stream: Box<dyn StreamReader>,
    pub call: Arc<dyn CallState>,
}

/// Starts calls on a channel.
///
/// `path` has the form `/{service}/{method}`.
pub trait CallInvoker: Send + Sync + 'static {
    fn unary(&self, path: &str, options: &CallOptions, request: Vec<u8>) -> AsyncUnaryCall;

    fn client_streaming(&self, path: &str, options: &CallOptions) -> AsyncClientStreamingCall;

    fn server_streaming(
        &self,
        path: &str,
        options: &CallOptions,
        request: Vec<u8>,
    ) -> AsyncServerStreamingCall;

    fn duplex_streaming(&self, path: &str, options: &CallOptions) -> AsyncDuplexStreamingCall;
}
