use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::marshal::Marshaller;
use crate::transport::AsyncDuplexStreamingCall;

use super::Lifecycle;
use super::RequestStream;
use super::ResponseStream;
use super::impl_call_handle;

/// Handle over a call that streams in both directions.
///
/// The two sides progress independently. Disposal closes both, whatever
/// state each one is in.
pub struct DuplexStreamingResponse<Req, Resp> {
    request_stream: RequestStream<Req>,
    response_stream: ResponseStream<Resp>,
    lifecycle: Arc<Lifecycle>,
}

impl<Req: Send + 'static, Resp: Send + 'static> DuplexStreamingResponse<Req, Resp> {
    pub fn from_call(
        call: AsyncDuplexStreamingCall,
        request_marshaller: Arc<dyn Marshaller<Req>>,
        response_marshaller: Arc<dyn Marshaller<Resp>>,
    ) -> Self {
        Self::from_call_linked(call, request_marshaller, response_marshaller, None)
    }

    pub(crate) fn from_call_linked(
        call: AsyncDuplexStreamingCall,
        request_marshaller: Arc<dyn Marshaller<Req>>,
        response_marshaller: Arc<dyn Marshaller<Resp>>,
        cancellation: Option<&CancellationToken>,
    ) -> Self {
        let lifecycle = Lifecycle::attached(call.call, cancellation);
        Self {
            request_stream: RequestStream::new(call.request_stream, request_marshaller, lifecycle.clone()),
            response_stream: ResponseStream::new(call.response_stream, response_marshaller, lifecycle.clone()),
            lifecycle,
        }
    }

    pub fn request_stream(&mut self) -> &mut RequestStream<Req> {
        &mut self.request_stream
    }

    pub fn response_stream(&mut self) -> &mut ResponseStream<Resp> {
        &mut self.response_stream
    }

    /// Both sides at once, for driving them concurrently.
    pub fn streams(&mut self) -> (&mut RequestStream<Req>, &mut ResponseStream<Resp>) {
        (&mut self.request_stream, &mut self.response_stream)
    }
}

impl_call_handle!(DuplexStreamingResponse<Req, Resp>);
