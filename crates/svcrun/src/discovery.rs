//! # Service Discovery
//!
//! Link-time registry of service types.
//!
//! Services register a loader with [`register_service!`](crate::register_service)
//! anywhere in the program. At build time the registry is scanned and each
//! loader is run. A loader that fails is logged and skipped; the remaining
//! services are still returned.
//!
//! ```ignore
//! fn greeter() -> Result<ServiceType, LoadError> {
//!     Ok(ServiceType::of::<Greeter>("Greeter").method(/* ... */))
//! }
//!
//! svcrun::register_service!(greeter);
//! ```

use std::fmt;

use crate::service::ServiceType;

/// Reason a registered service could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub reason: String,
}

impl LoadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Load error: {}", self.reason)
    }
}

impl std::error::Error for LoadError {}

pub type Loader = fn() -> Result<ServiceType, LoadError>;

/// One registry entry: the registering module and its loader.
pub struct ServiceRegistration {
    module: &'static str,
    load: Loader,
}

impl ServiceRegistration {
    pub const fn new(module: &'static str, load: Loader) -> Self {
        Self { module, load }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn load(&self) -> Result<ServiceType, LoadError> {
        (self.load)()
    }

    /// Whether the entry lives in `prefix` or one of its submodules.
    pub fn is_in(&self, prefix: &str) -> bool {
        self.module == prefix
            || (self.module.starts_with(prefix) && self.module[prefix.len()..].starts_with("::"))
    }
}

inventory::collect!(ServiceRegistration);

/// Registers a service loader with the discovery registry.
///
/// The argument is a `fn() -> Result<ServiceType, LoadError>`.
#[macro_export]
macro_rules! register_service {
    ($load:expr) => {
        $crate::inventory::submit! {
            $crate::discovery::ServiceRegistration::new(module_path!(), $load)
        }
    };
}

/// Loads every registered service.
pub fn discover() -> Vec<ServiceType> {
    load_all(inventory::iter::<ServiceRegistration>.into_iter())
}

/// Loads the services registered in the given modules and their submodules.
pub fn discover_in(modules: &[&str]) -> Vec<ServiceType> {
    load_all(
        inventory::iter::<ServiceRegistration>
            .into_iter()
            .filter(|reg| modules.iter().any(|m| reg.is_in(m))),
    )
}

fn load_all<'a>(registrations: impl Iterator<Item = &'a ServiceRegistration>) -> Vec<ServiceType> {
    let mut types = Vec::new();
    let mut failed = 0usize;

    for reg in registrations {
        match reg.load() {
            Ok(ty) => types.push(ty),
            Err(e) => {
                failed += 1;
                tracing::warn!(module = reg.module(), error = %e, "Skipping service that failed to load");
            }
        }
    }

    types.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(loaded = types.len(), failed, "Service discovery finished");
    types
}
