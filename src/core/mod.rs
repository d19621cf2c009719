//! Core types shared across the build pipeline and the dev server.

mod driver;
mod state;

pub use driver::BuildMode;
pub use state::{is_shutdown, register_server, setup_shutdown_handler};
