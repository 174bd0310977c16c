//! Process-wide lease registry (§4.9): a refcounted multiset of named
//! resources (e.g. `"net.http"`, `"net.mdns"`) with first-acquire /
//! last-release callbacks. Grounded on the sink's single-owner,
//! bracket-per-transaction discipline (Design Notes §9's "SPI bus is
//! protected by a mutex... acquire/release brackets each transaction"),
//! generalized here from one physical resource to any named one.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

type Callback = Box<dyn Fn() + Send + Sync>;

struct LeaseEntry {
    refcount: u32,
    owners: HashMap<u64, (Value, Instant)>,
    on_first: Option<Callback>,
    on_last: Option<Callback>,
}

struct Inner {
    resources: Mutex<HashMap<String, LeaseEntry>>,
    next_id: AtomicU64,
}

/// A snapshot of a single active lease, for diagnostics.
#[derive(Debug, Clone)]
pub struct LeaseSnapshot {
    pub resource: String,
    pub lease_id: u64,
    pub owner: Value,
    pub age: Duration,
}

/// A process-wide registry of named resources, each tracked by refcount.
#[derive(Clone)]
pub struct LeaseRegistry {
    inner: Arc<Inner>,
}

impl Default for LeaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseRegistry {
    pub fn new() -> Self {
        LeaseRegistry {
            inner: Arc::new(Inner {
                resources: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Acquires a lease on `resource`, invoking `on_first` iff this
    /// transitions the resource's refcount 0 → 1. `on_first`/`on_last`
    /// only take effect the first time they are supplied for a given
    /// resource name (later acquires may omit them).
    pub fn acquire(
        &self,
        resource: &str,
        owner: Value,
        on_first: Option<Callback>,
        on_last: Option<Callback>,
    ) -> Lease {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut resources = self.inner.resources.lock().unwrap();
        let entry = resources.entry(resource.to_string()).or_insert_with(|| LeaseEntry {
            refcount: 0,
            owners: HashMap::new(),
            on_first: None,
            on_last: None,
        });

        if entry.on_first.is_none() {
            entry.on_first = on_first;
        }
        if entry.on_last.is_none() {
            entry.on_last = on_last;
        }

        entry.refcount += 1;
        entry.owners.insert(id, (owner, Instant::now()));
        debug!(resource, lease_id = id, refcount = entry.refcount, "lease acquired");
        if entry.refcount == 1 {
            if let Some(cb) = entry.on_first.as_ref() {
                cb();
            }
        }

        Lease {
            registry: self.inner.clone(),
            resource: resource.to_string(),
            id,
            released: false,
        }
    }

    /// Returns a point-in-time list of all active leases across every
    /// resource, for diagnostics.
    pub fn snapshot(&self) -> Vec<LeaseSnapshot> {
        let resources = self.inner.resources.lock().unwrap();
        let mut out = Vec::new();
        for (resource, entry) in resources.iter() {
            for (&lease_id, (owner, acquired_at)) in entry.owners.iter() {
                out.push(LeaseSnapshot {
                    resource: resource.clone(),
                    lease_id,
                    owner: owner.clone(),
                    age: acquired_at.elapsed(),
                });
            }
        }
        out
    }
}

fn release_impl(inner: &Inner, resource: &str, id: u64) {
    let mut resources = inner.resources.lock().unwrap();
    let Some(entry) = resources.get_mut(resource) else {
        return;
    };
    if entry.owners.remove(&id).is_none() {
        // Idempotent: a lease already released is a no-op.
        return;
    }
    entry.refcount = entry.refcount.saturating_sub(1);
    debug!(resource, lease_id = id, refcount = entry.refcount, "lease released");
    if entry.refcount == 0 {
        let on_last = entry.on_last.take();
        let on_first = entry.on_first.take();
        resources.remove(resource);
        drop(resources);
        if let Some(cb) = on_last {
            cb();
        }
        drop(on_first);
    }
}

/// A move-only handle to an acquired lease. Releasing is idempotent:
/// calling [`Lease::release`] twice, or dropping after an explicit
/// release, invokes `on_last` at most once.
pub struct Lease {
    registry: Arc<Inner>,
    resource: String,
    id: u64,
    released: bool,
}

impl Lease {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Releases the lease early. A no-op if already released.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        release_impl(&self.registry, &self.resource, self.id);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn first_acquire_invokes_on_first_exactly_once() {
        let registry = LeaseRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let lease_a = registry.acquire(
            "net.http",
            Value::String("a".into()),
            Some(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
            None,
        );
        let _lease_b = registry.acquire("net.http", Value::String("b".into()), None, None);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(lease_a);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn last_release_invokes_on_last_exactly_once() {
        let registry = LeaseRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let lease_a = registry.acquire(
            "net.mdns",
            Value::String("a".into()),
            None,
            Some(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let lease_b = registry.acquire("net.mdns", Value::String("b".into()), None, None);

        drop(lease_a);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(lease_b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_then_drop_is_idempotent() {
        let registry = LeaseRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let lease = registry.acquire(
            "net.http",
            Value::String("solo".into()),
            None,
            Some(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
        );
        lease.release();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_release_invokes_on_last_at_most_once() {
        let registry = LeaseRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let mut lease = registry.acquire(
            "net.http",
            Value::String("solo".into()),
            None,
            Some(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
        );
        lease.release_once();
        lease.release_once();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_reports_active_leases_with_ages() {
        let registry = LeaseRegistry::new();
        let _lease = registry.acquire("net.http", Value::String("diag".into()), None, None);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].resource, "net.http");
    }
}
