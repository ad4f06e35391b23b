//! # Call Handles
//!
//! Caller-facing wrappers over one RPC exchange.
//!
//! ## Philosophy
//!
//! - **One Lifecycle**: Every shape exposes the same surface through
//!   [`CallHandle`]: response headers, status, trailers and disposal. The
//!   surface reflects the call as a whole, never one of its streams.
//! - **Forward, Don't Implement**: Cancellation belongs to the transport.
//!   Disposing a handle asks the transport to cancel through
//!   [`CallState::cancel`] and wakes up any local waiter.
//! - **No Invented Values**: A handle without a backing call has no headers,
//!   status or trailers. It reports [`Error::Unavailable`] for all three.
//!
//! ## Invariants
//!
//! - `dispose()` is idempotent and never fails.
//! - After disposal of an unfinished call, pending and later awaits return
//!   [`Error::Cancelled`] instead of hanging. A call that already reported
//!   its status keeps its result.
//! - A fired caller token is disposal, whether or not anything is awaiting.
//! - Status and trailers are [`Error::InvalidState`] until the call reports
//!   a status.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use futures::future::BoxFuture;
use svcmeta::Metadata;
use svcmeta::Status;
use tokio_util::sync::CancellationToken;

use crate::marshal::MarshalError;
use crate::transport::CallState;

mod client_streaming;
mod duplex;
mod server_streaming;
mod stream;
mod unary;

pub use client_streaming::ClientStreamingResponse;
pub use duplex::DuplexStreamingResponse;
pub use server_streaming::ServerStreamingResponse;
pub use stream::RequestStream;
pub use stream::ResponseStream;
pub use stream::StreamState;
pub use unary::UnaryResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The operation is not valid in the handle's current state.
    InvalidState(&'static str),
    /// The handle has no backing call.
    Unavailable,
    /// The handle was disposed or its cancellation token fired.
    Cancelled,
    /// The transport reported a failure.
    Rpc(Status),
    Marshal(MarshalError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Self::Unavailable => write!(f, "No backing call"),
            Self::Cancelled => write!(f, "Call cancelled"),
            Self::Rpc(status) => write!(f, "RPC error: {}", status),
            Self::Marshal(e) => write!(f, "Marshal error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(status) => Some(status),
            Self::Marshal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::Rpc(status)
    }
}

impl From<MarshalError> for Error {
    fn from(e: MarshalError) -> Self {
        Self::Marshal(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where a single-result handle is in its lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallPhase {
    /// Resolution was attempted and failed. The value will never arrive.
    Unresolved,
    /// The value is still pending.
    Resolving,
    /// The value is available or has been taken.
    Resolved,
    /// The backing call reported its final status.
    Terminated,
    Disposed,
}

/// Lifecycle surface shared by every call handle.
pub trait CallHandle {
    /// Waits for the response headers.
    fn response_headers(&self) -> BoxFuture<'static, Result<Metadata>>;

    /// Final status. [`Error::InvalidState`] until the call has finished.
    fn status(&self) -> Result<Status>;

    /// Trailing metadata. [`Error::InvalidState`] until the call has finished.
    fn trailers(&self) -> Result<Metadata>;

    /// Releases the call, cancelling it if it has not finished.
    fn dispose(&self);

    /// A cloneable handle that can dispose the call from elsewhere.
    fn disposer(&self) -> Disposer;

    fn is_disposed(&self) -> bool;
}

/// Shared state of one exchange, held by a handle and all of its parts.
///
/// `token` fires when the exchange is abandoned, either by disposal of an
/// unfinished call or by the caller's token. `closed` fires on any disposal
/// and stops the caller watcher.
pub(crate) struct Lifecycle {
    call: Option<Arc<dyn CallState>>,
    token: CancellationToken,
    closed: CancellationToken,
    disposed: AtomicBool,
}

impl Lifecycle {
    /// A lifecycle with no backing call.
    pub(crate) fn detached() -> Arc<Self> {
        Arc::new(Self {
            call: None,
            token: CancellationToken::new(),
            closed: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        })
    }

    /// A lifecycle over a live call. If `cancellation` is given, cancelling
    /// it disposes this exchange.
    ///
    /// Inside a tokio runtime a watcher task disposes the call as soon as the
    /// caller's token fires. Without one, disposal happens on the next
    /// observation of the handle.
    pub(crate) fn attached(call: Arc<dyn CallState>, cancellation: Option<&CancellationToken>) -> Arc<Self> {
        let token = match cancellation {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let lifecycle = Arc::new(Self {
            call: Some(call),
            token,
            closed: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });

        if let (Some(parent), Ok(runtime)) = (cancellation, tokio::runtime::Handle::try_current()) {
            let parent = parent.clone();
            let closed = lifecycle.closed.clone();
            let weak = Arc::downgrade(&lifecycle);
            runtime.spawn(async move {
                tokio::select! {
                    _ = closed.cancelled() => {}
                    _ = parent.cancelled() => {
                        if let Some(lifecycle) = weak.upgrade() {
                            tracing::debug!("Caller cancelled, disposing call");
                            lifecycle.dispose();
                        }
                    }
                }
            });
        }

        lifecycle
    }

    /// True once disposed. A fired caller token counts as disposal.
    pub(crate) fn is_disposed(&self) -> bool {
        if !self.disposed.load(Ordering::Acquire) && self.token.is_cancelled() {
            self.dispose();
        }
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.call.as_ref().is_some_and(|call| call.status().is_some())
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.closed.cancel();

        // A finished call keeps its result.
        if self.is_terminated() {
            return;
        }
        if let Some(call) = &self.call {
            tracing::debug!("Cancelling unfinished call on dispose");
            call.cancel();
        }
        self.token.cancel();
    }

    /// Runs `fut` unless the exchange is cancelled first.
    ///
    /// A fired caller token disposes the exchange.
    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.dispose();
                Err(Error::Cancelled)
            }
            result = fut => result,
        }
    }

    pub(crate) fn response_headers(self: &Arc<Self>) -> BoxFuture<'static, Result<Metadata>> {
        let Some(call) = self.call.clone() else {
            return futures::future::ready(Err(Error::Unavailable)).boxed();
        };
        let lifecycle = self.clone();

        async move {
            tokio::select! {
                biased;
                _ = lifecycle.token.cancelled() => {
                    lifecycle.dispose();
                    Err(Error::Cancelled)
                }
                headers = call.response_headers() => headers.map_err(Error::Rpc),
            }
        }
        .boxed()
    }

    pub(crate) fn status(&self) -> Result<Status> {
        let call = self.call.as_ref().ok_or(Error::Unavailable)?;
        call.status().ok_or(Error::InvalidState("call has not finished"))
    }

    pub(crate) fn trailers(&self) -> Result<Metadata> {
        let call = self.call.as_ref().ok_or(Error::Unavailable)?;
        if call.status().is_none() {
            return Err(Error::InvalidState("call has not finished"));
        }
        Ok(call.trailers().unwrap_or_default())
    }
}

/// Disposes a call from outside the handle that owns it.
#[derive(Clone)]
pub struct Disposer(Arc<Lifecycle>);

impl Disposer {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self(lifecycle)
    }

    pub fn dispose(&self) {
        self.0.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.0.is_disposed()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.0.is_disposed())
            .finish()
    }
}

/// Implements [`CallHandle`] by delegating to a `lifecycle` field.
macro_rules! impl_call_handle {
    ($ty:ident < $($param:ident),+ >) => {
        impl<$($param),+> $crate::response::CallHandle for $ty<$($param),+> {
            fn response_headers(
                &self,
            ) -> futures::future::BoxFuture<'static, $crate::response::Result<svcmeta::Metadata>> {
                self.lifecycle.response_headers()
            }

            fn status(&self) -> $crate::response::Result<svcmeta::Status> {
                self.lifecycle.status()
            }

            fn trailers(&self) -> $crate::response::Result<svcmeta::Metadata> {
                self.lifecycle.trailers()
            }

            fn dispose(&self) {
                self.lifecycle.dispose();
            }

            fn disposer(&self) -> $crate::response::Disposer {
                $crate::response::Disposer::new(self.lifecycle.clone())
            }

            fn is_disposed(&self) -> bool {
                self.lifecycle.is_disposed()
            }
        }

        impl<$($param),+> Drop for $ty<$($param),+> {
            fn drop(&mut self) {
                self.lifecycle.dispose();
            }
        }
    };
}

pub(crate) use impl_call_handle;
