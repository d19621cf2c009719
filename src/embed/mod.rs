//! Browser scripts compiled into the binary.
//!
//! Both live in `embed/serve/` and are minified by `build.rs`.

pub mod serve {
    const WS_URL: &str = "__LUMEN_WS_URL__";

    const CLIENT_JS: &str = include_str!(concat!(env!("OUT_DIR"), "/client.min.js"));

    /// Module whose default export reports the page origin.
    pub const PROBE_JS: &str = include_str!(concat!(env!("OUT_DIR"), "/probe.min.js"));

    /// Hot reload client runtime that connects to `ws_url`,
    /// e.g. `ws://127.0.0.1:5001`.
    pub fn client_js(ws_url: &str) -> String {
        CLIENT_JS.replacen(WS_URL, ws_url, 1)
    }
}
