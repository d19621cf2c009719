//! HTTP responses.
//!
//! Every reply carries `access-control-allow-origin`, a `content-type` guessed
//! from the request path when the producer set none, and `cache-control:
//! no-cache` unless the producer chose otherwise.

use anyhow::Result;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::debug;
use crate::utils::mime;
use crate::vfs::VirtualContent;

/// A fully resolved response, independent of the socket it goes out on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    /// 200 with content produced by a plugin or the virtual file registry.
    pub fn content(path: &str, content: VirtualContent) -> Self {
        Self {
            status: 200,
            headers: content.headers,
            body: content.body,
        }
        .with_defaults(mime::from_url(path))
    }

    /// 200 with a file read from a served directory.
    pub fn file(path: &std::path::Path, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
        .with_defaults(mime::from_path(path))
    }

    /// 404, with the output's `404.html` when present.
    pub fn not_found(custom: Option<Vec<u8>>) -> Self {
        let (body, content_type) = match custom {
            Some(body) => (body, mime::types::HTML),
            None => (b"404 Not Found".to_vec(), mime::types::PLAIN),
        };
        Self {
            status: 404,
            headers: Vec::new(),
            body,
        }
        .with_defaults(content_type)
    }

    pub fn server_error(message: &str) -> Self {
        Self {
            status: 500,
            headers: Vec::new(),
            body: message.as_bytes().to_vec(),
        }
        .with_defaults(mime::types::PLAIN)
    }

    /// 503 while shutting down.
    pub fn unavailable() -> Self {
        Self {
            status: 503,
            headers: Vec::new(),
            body: b"503 Service Unavailable".to_vec(),
        }
        .with_defaults(mime::types::PLAIN)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn with_defaults(mut self, content_type: &str) -> Self {
        for (name, value) in [
            ("access-control-allow-origin", "*"),
            ("content-type", content_type),
            ("cache-control", "no-cache"),
        ] {
            if self.header(name).is_none() {
                self.headers.push((name.to_string(), value.to_string()));
            }
        }
        self
    }

    /// Write the reply. `HEAD` requests get the headers only.
    pub fn send(self, request: Request) -> Result<()> {
        let headers: Vec<Header> = self
            .headers
            .iter()
            .filter_map(|(name, value)| make_header(name, value))
            .collect();
        let status = StatusCode(self.status);

        if request.method() == &Method::Head {
            let mut response = Response::empty(status);
            for header in headers {
                response.add_header(header);
            }
            request.respond(response)?;
        } else {
            let mut response = Response::from_data(self.body).with_status_code(status);
            for header in headers {
                response.add_header(header);
            }
            request.respond(response)?;
        }
        Ok(())
    }
}

fn make_header(name: &str, value: &str) -> Option<Header> {
    let header = Header::from_bytes(name.as_bytes(), value.as_bytes()).ok();
    if header.is_none() {
        debug!("serve"; "dropping invalid header `{}`", name);
    }
    header
}
