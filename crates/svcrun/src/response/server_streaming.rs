use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::marshal::Marshaller;
use crate::transport::AsyncServerStreamingCall;

use super::Lifecycle;
use super::ResponseStream;
use super::impl_call_handle;

/// Handle over a call that sends one request and receives a stream.
pub struct ServerStreamingResponse<Resp> {
    response_stream: ResponseStream<Resp>,
    lifecycle: Arc<Lifecycle>,
}

impl<Resp: Send + 'static> ServerStreamingResponse<Resp> {
    pub fn from_call(call: AsyncServerStreamingCall, marshaller: Arc<dyn Marshaller<Resp>>) -> Self {
        Self::from_call_linked(call, marshaller, None)
    }

    pub(crate) fn from_call_linked(
        call: AsyncServerStreamingCall,
        marshaller: Arc<dyn Marshaller<Resp>>,
        cancellation: Option<&CancellationToken>,
    ) -> Self {
        let lifecycle = Lifecycle::attached(call.call, cancellation);
        Self {
            response_stream: ResponseStream::new(call.response_stream, marshaller, lifecycle.clone()),
            lifecycle,
        }
    }

    pub fn response_stream(&mut self) -> &mut ResponseStream<Resp> {
        &mut self.response_stream
    }
}

impl_call_handle!(ServerStreamingResponse<Resp>);
