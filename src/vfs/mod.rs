//! Virtual file registry.
//!
//! In-memory files served by the dev server ahead of the output directory:
//! the client runtime, the extension index, and the throwaway modules the
//! script patcher asks clients to import.
//!
//! An entry is either fixed content or a resolver invoked per request. Keys
//! are request paths, last writer wins, and nothing expires on a timer.
//! Ephemeral entries are removed once every [`VirtualLease`] taken on them
//! has been dropped.
//!
//! ```ignore
//! registry.set_ephemeral("/@lumen/patch/1.js", VirtualEntry::fixed(content));
//! let lease = registry.acquire("/@lumen/patch/1.js");
//! clients.evaluate(id, "/@lumen/patch/1.js", args).await;
//! drop(lease); // entry removed here
//! ```

use anyhow::Result;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{future::Future, pin::Pin, sync::Arc};

use crate::utils::mime;

/// Body and headers of a virtual file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualContent {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl VirtualContent {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Content with a `content-type` header.
    pub fn typed(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        Self::new(body).with_header("content-type", content_type)
    }

    /// JavaScript module content.
    pub fn script(code: impl Into<Vec<u8>>) -> Self {
        Self::typed(code, mime::types::JAVASCRIPT)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What a resolver sees of the incoming request.
#[derive(Debug, Clone, Default)]
pub struct VirtualRequest {
    /// Path without query string.
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl VirtualRequest {
    /// Split a raw request URL into path and query.
    pub fn from_url(url: &str) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (url, None),
        };
        Self {
            path: path.to_string(),
            query,
            headers: Vec::new(),
        }
    }
}

pub type ResolveFuture = Pin<Box<dyn Future<Output = Result<VirtualContent>> + Send>>;
pub type Resolver = Arc<dyn Fn(VirtualRequest) -> ResolveFuture + Send + Sync>;

/// A registered virtual file.
#[derive(Clone)]
pub enum VirtualEntry {
    /// Fixed content, cloned per request.
    Static(Arc<VirtualContent>),
    /// Recomputed for every request.
    Lazy(Resolver),
}

impl VirtualEntry {
    pub fn fixed(content: VirtualContent) -> Self {
        Self::Static(Arc::new(content))
    }

    pub fn lazy<F, Fut>(resolver: F) -> Self
    where
        F: Fn(VirtualRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<VirtualContent>> + Send + 'static,
    {
        Self::Lazy(Arc::new(move |req| Box::pin(resolver(req))))
    }

    /// Produce the content for one request.
    pub async fn produce(&self, request: VirtualRequest) -> Result<VirtualContent> {
        match self {
            Self::Static(content) => Ok(content.as_ref().clone()),
            Self::Lazy(resolver) => resolver(request).await,
        }
    }
}

impl std::fmt::Debug for VirtualEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(c) => write!(f, "Static({} bytes)", c.body.len()),
            Self::Lazy(_) => f.write_str("Lazy"),
        }
    }
}

struct Slot {
    entry: VirtualEntry,
    ephemeral: bool,
    leases: usize,
}

/// Path-keyed store of virtual files.
///
/// Every mutation is a single map operation under one lock. Entries are
/// cloned out before producing, so resolvers never run under the lock.
#[derive(Default)]
pub struct VirtualFileRegistry {
    slots: Mutex<FxHashMap<String, Slot>>,
}

impl VirtualFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent entry, replacing any previous one.
    pub fn set(&self, path: impl Into<String>, entry: VirtualEntry) {
        self.insert(path.into(), entry, false);
    }

    /// Register an entry removed once its last lease is released.
    ///
    /// Take the leases right away: an entry nobody leases is only removed
    /// by [`delete`](Self::delete).
    pub fn set_ephemeral(&self, path: impl Into<String>, entry: VirtualEntry) {
        self.insert(path.into(), entry, true);
    }

    fn insert(&self, path: String, entry: VirtualEntry, ephemeral: bool) {
        let mut slots = self.slots.lock();
        let leases = slots.get(&path).map_or(0, |s| s.leases);
        slots.insert(
            path,
            Slot {
                entry,
                ephemeral,
                leases,
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<VirtualEntry> {
        self.slots.lock().get(path).map(|s| s.entry.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.slots.lock().contains_key(path)
    }

    /// Remove an entry regardless of outstanding leases.
    pub fn delete(&self, path: &str) -> bool {
        self.slots.lock().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Outstanding leases on `path`.
    #[cfg(test)]
    pub fn in_flight(&self, path: &str) -> usize {
        self.slots.lock().get(path).map_or(0, |s| s.leases)
    }

    /// Take a lease on an existing entry.
    pub fn acquire(self: &Arc<Self>, path: &str) -> Option<VirtualLease> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(path)?;
        slot.leases += 1;
        Some(VirtualLease {
            registry: Arc::clone(self),
            path: path.to_string(),
        })
    }

    fn release(&self, path: &str) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(path) else {
            return;
        };
        slot.leases = slot.leases.saturating_sub(1);
        if slot.leases == 0 && slot.ephemeral {
            slots.remove(path);
        }
    }

    /// Produce the content registered for a request path, if any.
    pub async fn resolve(&self, request: VirtualRequest) -> Option<Result<VirtualContent>> {
        let entry = self.get(&request.path)?;
        Some(entry.produce(request).await)
    }
}

/// Keeps a virtual entry alive while an evaluation that needs it is pending.
#[must_use = "dropping a lease releases it immediately"]
pub struct VirtualLease {
    registry: Arc<VirtualFileRegistry>,
    path: String,
}

impl VirtualLease {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for VirtualLease {
    fn drop(&mut self) {
        self.registry.release(&self.path);
    }
}
