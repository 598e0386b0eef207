//! Node agent: C2 duplex RPC transport (client half) and C5 method-group
//! handlers dispatching to pluggable drivers.

pub mod drivers;
pub mod handlers;
pub mod idempotency;
pub mod transport;

pub use handlers::Handlers;
pub use transport::AgentTransport;
