//! # Service Types
//!
//! Describes the candidates offered to the dispatch-table builder.
//!
//! Rust has no runtime reflection, so a service type is described explicitly:
//! its name, how to construct a fresh instance, and the methods it exposes.
//! The description carries the same facts a reflective scan would find
//! (abstract or concrete, opt-out marker, accessor flag, receiver,
//! visibility) so that filtering works on data rather than on language
//! features.
//!
//! ```ignore
//! #[derive(Default)]
//! struct Greeter;
//! impl Service for Greeter {}
//!
//! let ty = ServiceType::of::<Greeter>("Greeter")
//!     .method(MethodInfo::unary("Hello", |_svc: Greeter, ctx: ServiceContext| async move {
//!         anyhow::Ok(ctx.into_request())
//!     }))
//!     .method(MethodInfo::unary("Secret", |_svc: Greeter, _ctx: ServiceContext| async move {
//!         anyhow::Ok(Vec::new())
//!     }).ignore());
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use svcmeta::Metadata;

use crate::transport::StreamReader;
use crate::transport::StreamWriter;

/// Marker capability for types that can be exposed as services.
pub trait Service: Any + Send + 'static {}

/// A freshly constructed, type-erased service instance.
pub type ServiceInstance = Box<dyn Any + Send>;

/// A public no-argument constructor.
pub type Constructor = Arc<dyn Fn() -> ServiceInstance + Send + Sync>;

/// The executable body of a method, invoked with a new instance per call.
pub type MethodBody =
    Arc<dyn Fn(ServiceInstance, ServiceContext) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> + Send + Sync>;

/// The four invocation shapes a method can have.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ClientStreaming,
    ServerStreaming,
    DuplexStreaming,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unary => write!(f, "unary"),
            Self::ClientStreaming => write!(f, "client-streaming"),
            Self::ServerStreaming => write!(f, "server-streaming"),
            Self::DuplexStreaming => write!(f, "duplex-streaming"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Receiver {
    /// Called on an instance (`&self` / `self`).
    Instance,
    /// Associated function without a receiver.
    Static,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// One method declared on a service type.
#[derive(Clone)]
pub struct MethodInfo {
    pub name: String,
    pub kind: MethodKind,
    pub receiver: Receiver,
    pub visibility: Visibility,
    /// Set for generated accessors (`get_*` / `set_*` property pairs).
    pub special_name: bool,
    /// Opt-out marker.
    pub ignored: bool,
    /// Parameter type names. Informational; never part of the identity.
    pub params: Vec<String>,
    pub body: MethodBody,
}

impl MethodInfo {
    /// A public instance method with the given body.
    pub fn new(name: impl Into<String>, kind: MethodKind, body: MethodBody) -> Self {
        Self {
            name: name.into(),
            kind,
            receiver: Receiver::Instance,
            visibility: Visibility::Public,
            special_name: false,
            ignored: false,
            params: Vec::new(),
            body,
        }
    }

    /// Builds a method whose body receives the concrete service type `S`.
    ///
    /// The instance handed to the body is downcast to `S`; a mismatch surfaces
    /// as an application error from the call, not as a panic.
    pub fn typed<S, F, Fut>(name: impl Into<String>, kind: MethodKind, f: F) -> Self
    where
        S: Service,
        F: Fn(S, ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        let body: MethodBody = Arc::new(move |instance: ServiceInstance, ctx: ServiceContext| {
            match instance.downcast::<S>() {
                Ok(service) => f(*service, ctx).boxed(),
                Err(_) => {
                    let expected = std::any::type_name::<S>();
                    async move { Err::<Vec<u8>, _>(anyhow::anyhow!("service instance is not a {}", expected)) }.boxed()
                }
            }
        });
        Self::new(name, kind, body)
    }

    pub fn unary<S, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        S: Service,
        F: Fn(S, ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        Self::typed(name, MethodKind::Unary, f)
    }

    pub fn client_streaming<S, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        S: Service,
        F: Fn(S, ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        Self::typed(name, MethodKind::ClientStreaming, f)
    }

    pub fn server_streaming<S, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        S: Service,
        F: Fn(S, ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        Self::typed(name, MethodKind::ServerStreaming, f)
    }

    pub fn duplex_streaming<S, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        S: Service,
        F: Fn(S, ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        Self::typed(name, MethodKind::DuplexStreaming, f)
    }

    /// Attaches the opt-out marker.
    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Marks the method as a generated property accessor.
    pub fn accessor(mut self) -> Self {
        self.special_name = true;
        self
    }

    pub fn static_fn(mut self) -> Self {
        self.receiver = Receiver::Static;
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn params<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("receiver", &self.receiver)
            .field("visibility", &self.visibility)
            .field("special_name", &self.special_name)
            .field("ignored", &self.ignored)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A candidate type offered to the dispatch-table builder.
#[derive(Clone)]
pub struct ServiceType {
    pub name: String,
    /// Whether the type carries the [`Service`] capability.
    pub is_service: bool,
    pub is_abstract: bool,
    /// Opt-out marker.
    pub ignored: bool,
    pub constructor: Option<Constructor>,
    pub methods: Vec<MethodInfo>,
}

impl ServiceType {
    /// A concrete service type without a constructor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_service: true,
            is_abstract: false,
            ignored: false,
            constructor: None,
            methods: Vec::new(),
        }
    }

    /// A concrete service type constructed through `S::default()`.
    pub fn of<S: Service + Default>(name: impl Into<String>) -> Self {
        Self::new(name).constructor(|| S::default())
    }

    pub fn constructor<S, F>(mut self, f: F) -> Self
    where
        S: Service,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(move || Box::new(f()) as ServiceInstance));
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    /// Attaches the opt-out marker.
    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Drops the [`Service`] capability, e.g. for helper types found next to services.
    pub fn non_service(mut self) -> Self {
        self.is_service = false;
        self
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceType")
            .field("name", &self.name)
            .field("is_service", &self.is_service)
            .field("is_abstract", &self.is_abstract)
            .field("ignored", &self.ignored)
            .field("constructor", &self.constructor.is_some())
            .field("methods", &self.methods)
            .finish()
    }
}

/// Per-call input handed to a method body.
///
/// Which parts are populated depends on the method kind: unary and
/// server-streaming calls carry a request payload, client-streaming and
/// duplex calls carry a request stream, and server-streaming and duplex calls
/// carry a response stream.
pub struct ServiceContext {
    kind: MethodKind,
    request_headers: Metadata,
    request: Vec<u8>,
    request_stream: Option<Box<dyn StreamReader>>,
    response_stream: Option<Box<dyn StreamWriter>>,
}

impl ServiceContext {
    pub fn unary(request_headers: Metadata, request: Vec<u8>) -> Self {
        Self {
            kind: MethodKind::Unary,
            request_headers,
            request,
            request_stream: None,
            response_stream: None,
        }
    }

    pub fn client_streaming(request_headers: Metadata, requests: Box<dyn StreamReader>) -> Self {
        Self {
            kind: MethodKind::ClientStreaming,
            request_headers,
            request: Vec::new(),
            request_stream: Some(requests),
            response_stream: None,
        }
    }

    pub fn server_streaming(
        request_headers: Metadata,
        request: Vec<u8>,
        responses: Box<dyn StreamWriter>,
    ) -> Self {
        Self {
            kind: MethodKind::ServerStreaming,
            request_headers,
            request,
            request_stream: None,
            response_stream: Some(responses),
        }
    }

    pub fn duplex_streaming(
        request_headers: Metadata,
        requests: Box<dyn StreamReader>,
        responses: Box<dyn StreamWriter>,
    ) -> Self {
        Self {
            kind: MethodKind::DuplexStreaming,
            request_headers,
            request: Vec::new(),
            request_stream: Some(requests),
            response_stream: Some(responses),
        }
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn request_headers(&self) -> &Metadata {
        &self.request_headers
    }

    pub fn request(&self) -> &[u8] {
        &self.request
    }

    pub fn into_request(self) -> Vec<u8> {
        self.request
    }

    /// Takes the request stream. Returns `None` for shapes without one or
    /// when it was already taken.
    pub fn take_request_stream(&mut self) -> Option<Box<dyn StreamReader>> {
        self.request_stream.take()
    }

    pub fn take_response_stream(&mut self) -> Option<Box<dyn StreamWriter>> {
        self.response_stream.take()
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("kind", &self.kind)
            .field("request_headers", &self.request_headers)
            .field("request_len", &self.request.len())
            .field("request_stream", &self.request_stream.is_some())
            .field("response_stream", &self.response_stream.is_some())
            .finish()
    }
}
