pub mod transport;
pub mod ws_handler;

pub use ws_handler::agent_ws_handler;
