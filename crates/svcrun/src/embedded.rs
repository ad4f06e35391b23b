//! Built-in services appended to every build unless
//! [`BuildOptions::disable_embedded_services`](crate::BuildOptions) is set.

use crate::service::MethodInfo;
use crate::service::Service;
use crate::service::ServiceContext;
use crate::service::ServiceType;

pub const HEARTBEAT_SERVICE: &str = "EmbeddedHeartbeat";
pub const HEARTBEAT_METHOD: &str = "connect";

pub const PING_SERVICE: &str = "EmbeddedPing";
pub const PING_METHOD: &str = "ping";

/// Liveness probe. Answers with an empty payload.
#[derive(Default)]
pub struct EmbeddedHeartbeat;

impl Service for EmbeddedHeartbeat {}

/// Round-trip probe. Echoes the request payload.
#[derive(Default)]
pub struct EmbeddedPing;

impl Service for EmbeddedPing {}

pub fn services() -> Vec<ServiceType> {
    vec![
        ServiceType::of::<EmbeddedHeartbeat>(HEARTBEAT_SERVICE).method(MethodInfo::unary(
            HEARTBEAT_METHOD,
            |_svc: EmbeddedHeartbeat, _ctx: ServiceContext| async move { anyhow::Ok(Vec::new()) },
        )),
        ServiceType::of::<EmbeddedPing>(PING_SERVICE).method(MethodInfo::unary(
            PING_METHOD,
            |_svc: EmbeddedPing, ctx: ServiceContext| async move { anyhow::Ok(ctx.into_request()) },
        )),
    ]
}
