//! # Dispatch-Table Builder
//!
//! Turns a set of candidate service types into a sealed [`DispatchTable`].
//!
//! ## Algorithm
//!
//! 1. Candidates come from the caller or from the discovery registry.
//! 2. Types failing [`filter::admits_type`] are dropped, then the embedded
//!    services are appended unless disabled.
//! 3. Each type is processed in parallel: constructor check, method filter,
//!    one [`MethodHandler`] per admitted method.
//! 4. Handlers are merged into one map. The identity's map entry stays
//!    locked across the check, the registrar call and the insert, so two
//!    concurrent producers of the same identity cannot both succeed. The
//!    registrar mutex is taken only for the registration itself, always
//!    after the entry lock.
//! 5. The map is sealed into a sorted handler list and the registrar is
//!    finished into its bound form.
//!
//! ## Invariants
//!
//! - No two handlers in a table share an identity.
//! - Any error aborts the build. There is no partial table.
//! - Builds share no state with each other.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rayon::prelude::*;

use crate::discovery;
use crate::embedded;
use crate::filter;
use crate::handler;
use crate::handler::MethodHandler;
use crate::handler::MethodIdentity;
use crate::registrar::ServiceDefinition;
use crate::registrar::ServiceDefinitionBuilder;
use crate::registrar::ServiceRegistrar;
use crate::service::ServiceType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An admitted type has no parameterless constructor.
    MissingConstructor { service: String },
    /// Two admitted methods share `(service, method)`.
    DuplicateIdentity { service: String, method: String },
    /// A handler could not be built for a method.
    Handler {
        service: String,
        method: String,
        reason: handler::Error,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConstructor { service } => {
                write!(f, "Service type '{}' has no parameterless constructor", service)
            }
            Self::DuplicateIdentity { service, method } => {
                write!(f, "Duplicate method {}.{} (overloads are not supported)", service, method)
            }
            Self::Handler { service, method, reason } => {
                write!(f, "Handler error for {}.{}: {}", service, method, reason)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handler { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Options recognized by a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Skip the embedded heartbeat and ping services.
    pub disable_embedded_services: bool,
    /// Report the full error chain of failed methods to callers.
    pub return_error_detail: bool,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable_embedded_services(mut self, disable: bool) -> Self {
        self.disable_embedded_services = disable;
        self
    }

    pub fn return_error_detail(mut self, enable: bool) -> Self {
        self.return_error_detail = enable;
        self
    }
}

/// Sealed result of a build: the handlers plus the registrar's bound object.
pub struct DispatchTable<B> {
    handlers: Vec<Arc<MethodHandler>>,
    bound: B,
}

impl<B> DispatchTable<B> {
    /// Handlers sorted by identity.
    pub fn handlers(&self) -> &[Arc<MethodHandler>] {
        &self.handlers
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn get(&self, identity: &MethodIdentity) -> Option<&Arc<MethodHandler>> {
        self.handlers
            .binary_search_by(|h| h.identity().cmp(identity))
            .ok()
            .map(|i| &self.handlers[i])
    }

    pub fn contains(&self, service: &str, method: &str) -> bool {
        self.get(&MethodIdentity::new(service, method)).is_some()
    }

    pub fn identities(&self) -> impl Iterator<Item = &MethodIdentity> {
        self.handlers.iter().map(|h| h.identity())
    }

    pub fn bound(&self) -> &B {
        &self.bound
    }

    pub fn into_bound(self) -> B {
        self.bound
    }

    pub fn into_parts(self) -> (Vec<Arc<MethodHandler>>, B) {
        (self.handlers, self.bound)
    }
}

impl<B> fmt::Debug for DispatchTable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("handlers", &self.identities().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Merge target shared by the parallel workers of one build.
struct Merge<R> {
    handlers: DashMap<MethodIdentity, Arc<MethodHandler>>,
    registrar: Mutex<R>,
}

impl<R: ServiceRegistrar> Merge<R> {
    fn new(registrar: R) -> Self {
        Self {
            handlers: DashMap::new(),
            registrar: Mutex::new(registrar),
        }
    }

    fn insert(&self, handler: MethodHandler) -> Result<()> {
        match self.handlers.entry(handler.identity().clone()) {
            Entry::Occupied(existing) => {
                let identity = existing.key();
                Err(Error::DuplicateIdentity {
                    service: identity.service.clone(),
                    method: identity.method.clone(),
                })
            }
            Entry::Vacant(slot) => {
                {
                    let mut registrar = self.registrar.lock().unwrap_or_else(PoisonError::into_inner);
                    handler.register(&mut *registrar);
                }
                tracing::trace!(method = %handler.identity(), kind = %handler.kind(), "Registered handler");
                slot.insert(Arc::new(handler));
                Ok(())
            }
        }
    }

    fn seal(self) -> DispatchTable<R::Bound> {
        let mut handlers: Vec<_> = self.handlers.into_iter().map(|(_, h)| h).collect();
        handlers.sort_by(|a, b| a.identity().cmp(b.identity()));

        let registrar = self.registrar.into_inner().unwrap_or_else(PoisonError::into_inner);

        DispatchTable {
            handlers,
            bound: registrar.finish(),
        }
    }
}

pub struct DispatchTableBuilder;

impl DispatchTableBuilder {
    /// Builds a table over `types`, bound into a [`ServiceDefinition`].
    pub fn build(types: Vec<ServiceType>, options: &BuildOptions) -> Result<DispatchTable<ServiceDefinition>> {
        Self::build_with(types, options, ServiceDefinitionBuilder::new())
    }

    /// Builds a table over every type in the discovery registry.
    pub fn build_discovered(options: &BuildOptions) -> Result<DispatchTable<ServiceDefinition>> {
        Self::build(discovery::discover(), options)
    }

    /// Builds a table over `types`, registering each handler with `registrar`.
    pub fn build_with<R: ServiceRegistrar>(
        types: Vec<ServiceType>,
        options: &BuildOptions,
        registrar: R,
    ) -> Result<DispatchTable<R::Bound>> {
        let started = Instant::now();
        tracing::debug!(candidates = types.len(), ?options, "Building dispatch table");

        let mut types: Vec<ServiceType> = types.into_iter().filter(filter::admits_type).collect();
        if !options.disable_embedded_services {
            types.extend(embedded::services());
        }

        let merge = Merge::new(registrar);
        let result = types.par_iter().try_for_each(|ty| {
            for handler in handlers_for(ty, options)? {
                merge.insert(handler)?;
            }
            Ok(())
        });

        if let Err(e) = result {
            tracing::error!(error = %e, "Dispatch table build failed");
            return Err(e);
        }

        let table = merge.seal();
        tracing::info!(
            handlers = table.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dispatch table built"
        );
        Ok(table)
    }
}

fn handlers_for(ty: &ServiceType, options: &BuildOptions) -> Result<Vec<MethodHandler>> {
    if ty.constructor.is_none() {
        return Err(Error::MissingConstructor {
            service: ty.name.clone(),
        });
    }

    ty.methods
        .iter()
        .filter(|m| filter::admits_method(m))
        .map(|m| {
            MethodHandler::new(ty, m, options).map_err(|reason| Error::Handler {
                service: ty.name.clone(),
                method: m.name.clone(),
                reason,
            })
        })
        .collect()
}
