//! # svcmeta
//!
//! Plain data that travels alongside every call: ordered key/value
//! [`Metadata`] (request headers, response headers, trailers) and the
//! terminal [`Status`] of a call.
//!
//! The crate knows nothing about transports or services. It exists so that
//! transport implementations, service implementations and callers can agree
//! on these types without depending on the dispatch machinery.

pub mod metadata;
pub mod status;

pub use metadata::Metadata;
pub use metadata::MetadataEntry;
pub use status::Code;
pub use status::Status;
