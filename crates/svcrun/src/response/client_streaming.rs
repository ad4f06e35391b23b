use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::marshal::Marshaller;
use crate::transport::AsyncClientStreamingCall;

use super::CallPhase;
use super::Lifecycle;
use super::RequestStream;
use super::Result;
use super::UnaryResponse;
use super::impl_call_handle;

/// Handle over a call that streams requests and receives one response.
pub struct ClientStreamingResponse<Req, Resp> {
    request_stream: RequestStream<Req>,
    response: UnaryResponse<Resp>,
    lifecycle: Arc<Lifecycle>,
}

impl<Req: Send + 'static, Resp: Send + 'static> ClientStreamingResponse<Req, Resp> {
    pub fn from_call(
        call: AsyncClientStreamingCall,
        request_marshaller: Arc<dyn Marshaller<Req>>,
        response_marshaller: Arc<dyn Marshaller<Resp>>,
    ) -> Self {
        Self::from_call_linked(call, request_marshaller, response_marshaller, None)
    }

    pub(crate) fn from_call_linked(
        call: AsyncClientStreamingCall,
        request_marshaller: Arc<dyn Marshaller<Req>>,
        response_marshaller: Arc<dyn Marshaller<Resp>>,
        cancellation: Option<&CancellationToken>,
    ) -> Self {
        let lifecycle = Lifecycle::attached(call.call, cancellation);
        Self {
            request_stream: RequestStream::new(call.request_stream, request_marshaller, lifecycle.clone()),
            response: UnaryResponse::from_parts(call.response, response_marshaller, lifecycle.clone()),
            lifecycle,
        }
    }

    pub fn request_stream(&mut self) -> &mut RequestStream<Req> {
        &mut self.request_stream
    }

    pub fn phase(&self) -> CallPhase {
        self.response.phase()
    }

    /// Waits for the single response. Complete the request stream first.
    pub async fn response(&mut self) -> Result<Resp> {
        self.response.response().await
    }
}

impl_call_handle!(ClientStreamingResponse<Req, Resp>);
