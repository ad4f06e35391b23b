//! # svcrun
//!
//! Sits between an RPC transport and application services.
//!
//! - **Server side**: service types are discovered from a link-time registry
//!   (see [`register_service!`]) or passed explicitly, filtered, turned into
//!   [`handler::MethodHandler`]s in parallel and merged into a sealed
//!   [`builder::DispatchTable`]. Duplicate `(service, method)` identities fail
//!   the whole build.
//! - **Client side**: every call shape (unary, client-streaming,
//!   server-streaming, duplex, or a value that is already known) is wrapped
//!   in a call handle from [`response`] with one lifecycle: headers, status,
//!   trailers and disposal.
//!
//! The transport, the wire format and payload serialization are not part of
//! this crate. They plug in through the traits in [`transport`],
//! [`registrar`] and [`marshal`].
//!
//! ```ignore
//! use svcrun::builder::{BuildOptions, DispatchTableBuilder};
//!
//! let table = DispatchTableBuilder::build_discovered(&BuildOptions::default())?;
//! for handler in table.handlers() {
//!     println!("{}", handler.identity());
//! }
//! let definition = table.into_bound();
//! ```

pub mod builder;
pub mod client;
pub mod discovery;
pub mod embedded;
pub mod filter;
pub mod handler;
pub mod marshal;
pub mod registrar;
pub mod response;
pub mod service;
pub mod transport;

pub use svcmeta::Code;
pub use svcmeta::Metadata;
pub use svcmeta::MetadataEntry;
pub use svcmeta::Status;

pub use builder::BuildOptions;
pub use builder::DispatchTable;
pub use builder::DispatchTableBuilder;
pub use handler::MethodHandler;
pub use handler::MethodIdentity;
pub use service::MethodInfo;
pub use service::MethodKind;
pub use service::Service;
pub use service::ServiceContext;
pub use service::ServiceType;

#[doc(hidden)]
pub use inventory;

#[cfg(test)]
mod mock_transport;

#[cfg(test)]
mod tests;
