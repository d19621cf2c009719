//! Live client registry and the hot reload socket.
//!
//! ```text
//! TcpListener --accept--> session thread --inbound--> ClientRegistry --events--> EventBus
//!                              ^                           |
//!                              +-------outbound queue------+ (broadcast, evaluate)
//! ```
//!
//! # Modules
//!
//! - `message` - wire shapes exchanged with the browser client
//! - `bus` - inbound client events keyed by message type
//! - `registry` - open sockets and pending remote evaluations
//! - `session` - per-socket read/write loop
//! - `server` - listener with port retry

pub mod bus;
pub mod message;
pub mod registry;
pub mod server;
mod session;

pub use bus::{ClientEvent, EventBus};
pub use message::HotMessage;
pub use registry::{ClientId, ClientRegistry};
