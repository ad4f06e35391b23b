//! # Method Handlers
//!
//! A `MethodHandler` is one discovered method turned into a registrable unit.
//!
//! ## Identity
//!
//! Identity is `(service name, method name)` and nothing else. Parameter
//! types are deliberately left out, so two overloads of the same method name
//! on one type are equal and collide when merged into a dispatch table.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use svcmeta::Status;

use crate::builder::BuildOptions;
use crate::registrar::ServiceRegistrar;
use crate::service::Constructor;
use crate::service::MethodBody;
use crate::service::MethodInfo;
use crate::service::MethodKind;
use crate::service::ServiceContext;
use crate::service::ServiceType;

/// Detail reported to callers when a method fails and error detail is off.
pub const GENERIC_FAILURE_DETAIL: &str = "internal error in service method";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The owning type cannot be constructed without arguments.
    MissingConstructor,
    /// The name cannot be used in a route.
    InvalidName(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConstructor => write!(f, "type has no parameterless constructor"),
            Self::InvalidName(name) => write!(f, "'{}' is not a valid route segment", name),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Transport-facing entry point for one method.
pub type ServerHandler =
    Arc<dyn Fn(ServiceContext) -> BoxFuture<'static, std::result::Result<Vec<u8>, Status>> + Send + Sync>;

/// `(service, method)` pair identifying a handler.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodIdentity {
    pub service: String,
    pub method: String,
}

impl MethodIdentity {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    /// Route under which the method is bound: `/{service}/{method}`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// A discovered method, ready to be registered with a transport.
pub struct MethodHandler {
    identity: MethodIdentity,
    kind: MethodKind,
    params: Vec<String>,
    constructor: Constructor,
    body: MethodBody,
    return_error_detail: bool,
}

impl MethodHandler {
    /// Builds the handler for `method` declared on `service`.
    ///
    /// Both are expected to have passed the discovery filter already.
    pub fn new(service: &ServiceType, method: &MethodInfo, options: &BuildOptions) -> Result<Self> {
        let constructor = service.constructor.clone().ok_or(Error::MissingConstructor)?;
        validate_segment(&service.name)?;
        validate_segment(&method.name)?;

        Ok(Self {
            identity: MethodIdentity::new(service.name.as_str(), method.name.as_str()),
            kind: method.kind,
            params: method.params.clone(),
            constructor,
            body: method.body.clone(),
            return_error_detail: options.return_error_detail,
        })
    }

    pub fn identity(&self) -> &MethodIdentity {
        &self.identity
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Registers this handler with a transport registrar.
    pub fn register<R: ServiceRegistrar + ?Sized>(&self, registrar: &mut R) {
        registrar.register(&self.identity, self.kind, self.server_handler());
    }

    /// Produces the closure a transport invokes for each incoming call.
    ///
    /// Every call gets a fresh service instance. Application errors become a
    /// `Status`: an error that already is a `Status` passes through, anything
    /// else maps to `Unknown`, with the full error chain as detail only when
    /// error detail is enabled.
    pub fn server_handler(&self) -> ServerHandler {
        let identity = Arc::new(self.identity.clone());
        let constructor = self.constructor.clone();
        let body = self.body.clone();
        let return_error_detail = self.return_error_detail;

        Arc::new(move |ctx: ServiceContext| {
            let identity = identity.clone();
            let instance = constructor();
            let call = body(instance, ctx);

            async move {
                match call.await {
                    Ok(response) => Ok(response),
                    Err(e) => {
                        tracing::warn!(method = %identity, error = %e, "service method failed");
                        match e.downcast::<Status>() {
                            Ok(status) => Err(status),
                            Err(e) if return_error_detail => Err(Status::unknown(format!("{:?}", e))),
                            Err(_) => Err(Status::unknown(GENERIC_FAILURE_DETAIL)),
                        }
                    }
                }
            }
            .boxed()
        })
    }
}

impl PartialEq for MethodHandler {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for MethodHandler {}

impl Hash for MethodHandler {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandler")
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}
