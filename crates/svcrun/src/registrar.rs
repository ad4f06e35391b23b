//! # Service Registrar
//!
//! The seam between the dispatch-table builder and a transport.
//!
//! A transport implements [`ServiceRegistrar`] to receive one
//! [`ServerHandler`] per method and produces its own bound form when the
//! build is sealed. [`ServiceDefinitionBuilder`] is the in-crate
//! implementation: a route table keyed by `/{service}/{method}`.

use std::collections::HashMap;
use std::fmt;

use svcmeta::Status;

use crate::handler::MethodIdentity;
use crate::handler::ServerHandler;
use crate::service::MethodKind;
use crate::service::ServiceContext;

/// Accepts method handlers and binds them into a transport-specific form.
///
/// `register` is never called twice with the same identity: the builder
/// resolves duplicates before touching the registrar.
pub trait ServiceRegistrar: Send {
    type Bound: Send + Sync + 'static;

    fn register(&mut self, identity: &MethodIdentity, kind: MethodKind, handler: ServerHandler);

    fn finish(self) -> Self::Bound;
}

struct Route {
    identity: MethodIdentity,
    kind: MethodKind,
    handler: ServerHandler,
}

/// Collects handlers into a [`ServiceDefinition`].
#[derive(Default)]
pub struct ServiceDefinitionBuilder {
    routes: HashMap<String, Route>,
}

impl ServiceDefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceRegistrar for ServiceDefinitionBuilder {
    type Bound = ServiceDefinition;

    fn register(&mut self, identity: &MethodIdentity, kind: MethodKind, handler: ServerHandler) {
        tracing::trace!(method = %identity, %kind, "Binding route");
        self.routes.insert(
            identity.path(),
            Route {
                identity: identity.clone(),
                kind,
                handler,
            },
        );
    }

    fn finish(self) -> ServiceDefinition {
        ServiceDefinition { routes: self.routes }
    }
}

/// Bound, immutable route table.
pub struct ServiceDefinition {
    routes: HashMap<String, Route>,
}

impl ServiceDefinition {
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    /// Kind of the method bound at `path`.
    pub fn kind(&self, path: &str) -> Option<MethodKind> {
        self.routes.get(path).map(|route| route.kind)
    }

    /// Bound identities, sorted.
    pub fn methods(&self) -> Vec<&MethodIdentity> {
        let mut methods: Vec<_> = self.routes.values().map(|route| &route.identity).collect();
        methods.sort();
        methods
    }

    /// Runs the method bound at `path`.
    ///
    /// Unknown paths and calls of the wrong shape fail with `Unimplemented`.
    pub async fn dispatch(&self, path: &str, ctx: ServiceContext) -> Result<Vec<u8>, Status> {
        let Some(route) = self.routes.get(path) else {
            tracing::debug!(path, "No route");
            return Err(Status::unimplemented(format!("method {} not found", path)));
        };

        if route.kind != ctx.kind() {
            return Err(Status::unimplemented(format!(
                "method {} is {}, called as {}",
                route.identity,
                route.kind,
                ctx.kind()
            )));
        }

        (route.handler)(ctx).await
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("methods", &self.methods())
            .finish()
    }
}
