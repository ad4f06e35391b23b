use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::marshal::Marshaller;
use crate::transport::AsyncUnaryCall;
use crate::transport::ResponseFuture;

use super::CallPhase;
use super::Error;
use super::Lifecycle;
use super::Result;
use super::impl_call_handle;

enum Origin<T> {
    /// Known up front.
    Value(Option<T>),
    /// Produced by a future that has no backing call.
    Deferred(Option<BoxFuture<'static, Result<T>>>),
    /// Raw bytes from a live call, decoded on arrival.
    Call {
        response: Option<ResponseFuture>,
        marshaller: Arc<dyn Marshaller<T>>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Progress {
    Pending,
    Taken,
    Failed,
}

/// Handle over a single-result exchange.
///
/// The value is taken once through [`response`](Self::response). Headers,
/// status, trailers and disposal come from [`CallHandle`](super::CallHandle).
pub struct UnaryResponse<T> {
    origin: Origin<T>,
    progress: Progress,
    lifecycle: Arc<Lifecycle>,
}

impl<T: Send + 'static> UnaryResponse<T> {
    /// Wraps a value that is already known. There is no backing call.
    pub fn from_value(value: T) -> Self {
        Self {
            origin: Origin::Value(Some(value)),
            progress: Progress::Pending,
            lifecycle: Lifecycle::detached(),
        }
    }

    /// Wraps a value still being computed. There is no backing call.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            origin: Origin::Deferred(Some(future.boxed())),
            progress: Progress::Pending,
            lifecycle: Lifecycle::detached(),
        }
    }

    /// Wraps a live call. The response bytes are decoded with `marshaller`.
    pub fn from_call(call: AsyncUnaryCall, marshaller: Arc<dyn Marshaller<T>>) -> Self {
        Self::from_call_linked(call, marshaller, None)
    }

    pub(crate) fn from_call_linked(
        call: AsyncUnaryCall,
        marshaller: Arc<dyn Marshaller<T>>,
        cancellation: Option<&CancellationToken>,
    ) -> Self {
        let lifecycle = Lifecycle::attached(call.call, cancellation);
        Self::from_parts(call.response, marshaller, lifecycle)
    }

    /// A call-backed handle sharing `lifecycle` with other parts of a call.
    pub(crate) fn from_parts(
        response: ResponseFuture,
        marshaller: Arc<dyn Marshaller<T>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            origin: Origin::Call {
                response: Some(response),
                marshaller,
            },
            progress: Progress::Pending,
            lifecycle,
        }
    }

    pub fn phase(&self) -> CallPhase {
        if self.lifecycle.is_disposed() {
            return CallPhase::Disposed;
        }
        if self.lifecycle.is_terminated() {
            return CallPhase::Terminated;
        }
        match (&self.origin, self.progress) {
            (_, Progress::Failed) => CallPhase::Unresolved,
            (_, Progress::Taken) | (Origin::Value(_), _) => CallPhase::Resolved,
            _ => CallPhase::Resolving,
        }
    }

    /// Takes the response value.
    ///
    /// A value handle answers immediately, even after disposal. Otherwise the
    /// pending work is awaited; a transport failure surfaces unchanged as
    /// [`Error::Rpc`] and disposal turns a pending await into
    /// [`Error::Cancelled`]. The value can be taken once.
    pub async fn response(&mut self) -> Result<T> {
        match self.progress {
            Progress::Taken => return Err(Error::InvalidState("response already taken")),
            Progress::Failed => return Err(Error::InvalidState("response resolution failed")),
            Progress::Pending => {}
        }

        let lifecycle = self.lifecycle.clone();
        let result = match &mut self.origin {
            Origin::Value(value) => value.take().ok_or(Error::InvalidState("response already taken")),
            Origin::Deferred(future) => match future.take() {
                Some(future) => lifecycle.guard(future).await,
                None => Err(Error::InvalidState("response already taken")),
            },
            Origin::Call { response, marshaller } => match response.take() {
                Some(response) => {
                    let marshaller = marshaller.clone();
                    lifecycle
                        .guard(async move {
                            let bytes = response.await?;
                            Ok(marshaller.deserialize(&bytes)?)
                        })
                        .await
                }
                None => Err(Error::InvalidState("response already taken")),
            },
        };

        self.progress = match result {
            Ok(_) => Progress::Taken,
            Err(_) => Progress::Failed,
        };
        result
    }
}

impl_call_handle!(UnaryResponse<T>);

impl<T> fmt::Debug for UnaryResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match &self.origin {
            Origin::Value(_) => "value",
            Origin::Deferred(_) => "deferred",
            Origin::Call { .. } => "call",
        };
        f.debug_struct("UnaryResponse")
            .field("origin", &origin)
            .field("progress", &self.progress)
            .field("disposed", &self.lifecycle.is_disposed())
            .finish()
    }
}
