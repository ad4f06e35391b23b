//! # Discovery Filter
//!
//! Pure predicates deciding which candidate types and methods become RPC
//! endpoints.
//!
//! A type is admitted when it carries the service capability, is concrete
//! and has no opt-out marker. Whether it can actually be constructed is not a
//! filtering question: the builder rejects an admitted type without a
//! constructor as a hard error.
//!
//! A method is admitted when it is a public instance method that is neither
//! a property accessor, nor opted out, nor one of the reserved names below.

use crate::service::MethodInfo;
use crate::service::Receiver;
use crate::service::ServiceType;
use crate::service::Visibility;

/// Methods of the per-call configuration capability (`ConfigurableCall`).
pub const CALL_CONFIGURATION_METHODS: [&str; 5] = [
    "with_options",
    "with_headers",
    "with_deadline",
    "with_cancellation",
    "with_host",
];

/// Universal identity methods: equality, hashing, type and string form.
pub const IDENTITY_METHODS: [&str; 4] = ["eq", "hash", "type_id", "to_string"];

pub fn admits_type(ty: &ServiceType) -> bool {
    ty.is_service && !ty.is_abstract && !ty.ignored
}

pub fn admits_method(method: &MethodInfo) -> bool {
    if method.receiver != Receiver::Instance || method.visibility != Visibility::Public {
        return false;
    }

    !is_accessor(method) && !method.ignored && !is_reserved(&method.name)
}

pub fn is_accessor(method: &MethodInfo) -> bool {
    method.special_name && (method.name.starts_with("get_") || method.name.starts_with("set_"))
}

pub fn is_reserved(name: &str) -> bool {
    CALL_CONFIGURATION_METHODS.contains(&name) || IDENTITY_METHODS.contains(&name)
}
