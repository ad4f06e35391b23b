//! # Service Client
//!
//! Starts calls through a [`CallInvoker`] and wraps them into call handles.
//!
//! Per-call settings live in [`CallOptions`]. Anything holding options gets
//! the fluent `with_*` family by implementing [`ConfigurableCall`]; these
//! names are reserved and never exposed as service methods.

use std::sync::Arc;
use std::time::SystemTime;

use svcmeta::Metadata;
use tokio_util::sync::CancellationToken;

use crate::handler::MethodIdentity;
use crate::marshal::Marshaller;
use crate::response::ClientStreamingResponse;
use crate::response::DuplexStreamingResponse;
use crate::response::Error;
use crate::response::Result;
use crate::response::ServerStreamingResponse;
use crate::response::UnaryResponse;
use crate::service::MethodKind;
use crate::transport::CallInvoker;

/// Settings applied to every call started with them.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Request headers.
    pub headers: Metadata,
    pub deadline: Option<SystemTime>,
    /// Cancelling this token disposes the calls started with it.
    pub cancellation: Option<CancellationToken>,
    /// Overrides the authority the transport sends.
    pub host: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-call configuration capability.
pub trait ConfigurableCall: Sized {
    fn options_mut(&mut self) -> &mut CallOptions;

    fn with_options(mut self, options: CallOptions) -> Self {
        *self.options_mut() = options;
        self
    }

    /// Adds `headers` to the request headers.
    fn with_headers(mut self, headers: Metadata) -> Self {
        self.options_mut().headers.extend(&headers);
        self
    }

    fn with_deadline(mut self, deadline: SystemTime) -> Self {
        self.options_mut().deadline = Some(deadline);
        self
    }

    fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options_mut().cancellation = Some(token);
        self
    }

    fn with_host(mut self, host: impl Into<String>) -> Self {
        self.options_mut().host = Some(host.into());
        self
    }
}

impl ConfigurableCall for CallOptions {
    fn options_mut(&mut self) -> &mut CallOptions {
        self
    }
}

/// Client-side description of one method: name, shape and marshallers.
pub struct ClientMethod<Req, Resp> {
    pub name: String,
    pub kind: MethodKind,
    pub request: Arc<dyn Marshaller<Req>>,
    pub response: Arc<dyn Marshaller<Resp>>,
}

impl<Req, Resp> ClientMethod<Req, Resp> {
    pub fn new(
        name: impl Into<String>,
        kind: MethodKind,
        request: impl Marshaller<Req>,
        response: impl Marshaller<Resp>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            request: Arc::new(request),
            response: Arc::new(response),
        }
    }
}

impl<Req, Resp> Clone for ClientMethod<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            request: self.request.clone(),
            response: self.response.clone(),
        }
    }
}

/// Starts calls against one service.
#[derive(Clone)]
pub struct ServiceClient {
    service: String,
    invoker: Arc<dyn CallInvoker>,
    options: CallOptions,
}

impl ServiceClient {
    pub fn new(service: impl Into<String>, invoker: Arc<dyn CallInvoker>) -> Self {
        Self {
            service: service.into(),
            invoker,
            options: CallOptions::default(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    fn path<Req, Resp>(&self, method: &ClientMethod<Req, Resp>, expected: MethodKind) -> Result<String> {
        if method.kind != expected {
            return Err(Error::InvalidState("method called with the wrong shape"));
        }
        Ok(MethodIdentity::new(self.service.as_str(), method.name.as_str()).path())
    }

    pub fn unary<Req: Send + 'static, Resp: Send + 'static>(
        &self,
        method: &ClientMethod<Req, Resp>,
        request: &Req,
    ) -> Result<UnaryResponse<Resp>> {
        let path = self.path(method, MethodKind::Unary)?;
        let payload = method.request.serialize(request)?;
        let call = self.invoker.unary(&path, &self.options, payload);
        Ok(UnaryResponse::from_call_linked(
            call,
            method.response.clone(),
            self.options.cancellation.as_ref(),
        ))
    }

    pub fn client_streaming<Req: Send + 'static, Resp: Send + 'static>(
        &self,
        method: &ClientMethod<Req, Resp>,
    ) -> Result<ClientStreamingResponse<Req, Resp>> {
        let path = self.path(method, MethodKind::ClientStreaming)?;
        let call = self.invoker.client_streaming(&path, &self.options);
        Ok(ClientStreamingResponse::from_call_linked(
            call,
            method.request.clone(),
            method.response.clone(),
            self.options.cancellation.as_ref(),
        ))
    }

    pub fn server_streaming<Req: Send + 'static, Resp: Send + 'static>(
        &self,
        method: &ClientMethod<Req, Resp>,
        request: &Req,
    ) -> Result<ServerStreamingResponse<Resp>> {
        let path = self.path(method, MethodKind::ServerStreaming)?;
        let payload = method.request.serialize(request)?;
        let call = self.invoker.server_streaming(&path, &self.options, payload);
        Ok(ServerStreamingResponse::from_call_linked(
            call,
            method.response.clone(),
            self.options.cancellation.as_ref(),
        ))
    }

    pub fn duplex_streaming<Req: Send + 'static, Resp: Send + 'static>(
        &self,
        method: &ClientMethod<Req, Resp>,
    ) -> Result<DuplexStreamingResponse<Req, Resp>> {
        let path = self.path(method, MethodKind::DuplexStreaming)?;
        let call = self.invoker.duplex_streaming(&path, &self.options);
        Ok(DuplexStreamingResponse::from_call_linked(
            call,
            method.request.clone(),
            method.response.clone(),
            self.options.cancellation.as_ref(),
        ))
    }
}

impl ConfigurableCall for ServiceClient {
    fn options_mut(&mut self) -> &mut CallOptions {
        &mut self.options
    }
}
