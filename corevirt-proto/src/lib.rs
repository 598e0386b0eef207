//! Wire contract between `corevirt-controller` and `corevirt-agent`.
//!
//! A single persistent bidirectional WebSocket connection per agent
//! carries JSON text [`Frame`]s. The shape and correlation rules here
//! are the closed contract both sides must honor; see the controller's
//! `rpc::transport` and the agent's `transport` module for the runtime
//! that drives them.

pub mod entities;
pub mod error;
pub mod frame;
pub mod methods;
pub mod payloads;

pub use entities::*;
pub use error::{ErrorCode, RpcError};
pub use frame::{Frame, FrameKind, StreamPayload};
