//! Section definitions of `lumen.toml`.

mod build;
mod hmr;
mod plugins;
mod serve;
mod webext;

pub use build::BuildSectionConfig;
pub use hmr::HmrConfig;
pub use plugins::{CommandPluginConfig, HookPoint};
pub use serve::ServeConfig;
pub use webext::WebextConfig;
