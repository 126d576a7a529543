//! In-process backend and lock service.
//!
//! Everything lives in this process, so "distributed" only spans the threads
//! sharing one [`MemoryBackend`]. Used when no other product is configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use tracing::debug;

use crate::backend::{Backend, LockId, LockService, StoreCursor, StoreDescriptor, StoreId};
use crate::command::{ArgList, Command, HttpCommand, HttpVerb};
use crate::error::{code, BridgeError, Result};

pub const PRODUCT_NAME: &str = "memory";

/// Expired TTL entries are swept once every this many TTL writes.
const TTL_SWEEP_INTERVAL: u64 = 256;

struct MemoryStore {
    descriptor: StoreDescriptor,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    // serializes put_safe/get_safe on this store
    safe_guard: Mutex<()>,
}

struct TtlEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl TtlEntry {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => at > now,
            None => true,
        }
    }
}

#[derive(Clone, Copy)]
struct Holder {
    pid: u32,
    // None holds until released
    until: Option<Instant>,
}

impl Holder {
    fn is_active(&self, now: Instant) -> bool {
        match self.until {
            Some(until) => until > now,
            None => true,
        }
    }
}

struct MemoryLock {
    name: String,
    holder: Mutex<Option<Holder>>,
    changed: Condvar,
    removed: AtomicBool,
}

#[derive(Default)]
struct Catalog {
    stores: HashMap<String, StoreId>,
    locks: HashMap<String, LockId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreSummary {
    id: StoreId,
    name: String,
    key_type: String,
    value_type: String,
    size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackendInfo<'a> {
    product: &'a str,
    servers: Vec<String>,
    stores: usize,
    ttl_entries: usize,
    locks: usize,
}

/// Stores, TTL namespace and locks held in process memory.
pub struct MemoryBackend {
    catalog: Mutex<Catalog>,
    stores: DashMap<StoreId, Arc<MemoryStore>>,
    ttl: DashMap<Vec<u8>, TtlEntry>,
    ttl_writes: AtomicU64,
    locks: DashMap<LockId, Arc<MemoryLock>>,
    next_store: AtomicU64,
    next_lock: AtomicU64,
    connected: AtomicBool,
    servers: RwLock<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_servers(Vec::new())
    }

    pub fn with_servers(servers: Vec<String>) -> Self {
        Self {
            catalog: Mutex::new(Catalog::default()),
            stores: DashMap::new(),
            ttl: DashMap::new(),
            ttl_writes: AtomicU64::new(0),
            locks: DashMap::new(),
            next_store: AtomicU64::new(1),
            next_lock: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            servers: RwLock::new(servers),
        }
    }

    /// Drop the simulated connection; calls fail until [`Backend::reconnect`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::NotConnected)
        }
    }

    fn store(&self, store: StoreId) -> Result<Arc<MemoryStore>> {
        self.ensure_connected()?;
        self.stores
            .get(&store)
            .map(|entry| Arc::clone(&entry))
            .ok_or(BridgeError::InvalidStore(store))
    }

    fn lock_entry(&self, lock: LockId) -> Result<Arc<MemoryLock>> {
        self.ensure_connected()?;
        self.locks
            .get(&lock)
            .map(|entry| Arc::clone(&entry))
            .ok_or(BridgeError::InvalidLock(lock))
    }

    fn insert_store(
        &self,
        catalog: &mut Catalog,
        name: &str,
        key_type: &str,
        value_type: &str,
    ) -> StoreId {
        let id = self.next_store.fetch_add(1, Ordering::SeqCst);
        let store = MemoryStore {
            descriptor: StoreDescriptor {
                name: name.to_string(),
                key_type: key_type.to_string(),
                value_type: value_type.to_string(),
            },
            entries: RwLock::new(BTreeMap::new()),
            safe_guard: Mutex::new(()),
        };
        self.stores.insert(id, Arc::new(store));
        catalog.stores.insert(name.to_string(), id);
        debug!(store = id, name, "created store");
        id
    }

    fn ttl_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();
        let live = self
            .ttl
            .get(key)
            .and_then(|entry| entry.is_live(now).then(|| entry.value.clone()));
        if live.is_none() {
            self.ttl.remove_if(key, |_, entry| !entry.is_live(now));
        }
        live
    }

    /// Drop every TTL entry that is no longer live at `now`.
    fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.ttl.len();
        self.ttl.retain(|_, entry| entry.is_live(now));
        let swept = before.saturating_sub(self.ttl.len());
        if swept > 0 {
            debug!(swept, "swept expired ttl entries");
        }
        swept
    }

    fn summary(&self, id: StoreId, store: &MemoryStore) -> StoreSummary {
        StoreSummary {
            id,
            name: store.descriptor.name.clone(),
            key_type: store.descriptor.key_type.clone(),
            value_type: store.descriptor.value_type.clone(),
            size: store.entries.read().len(),
        }
    }

    fn run_text(&self, text: &str) -> Result<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let Some((verb, args)) = tokens.split_first() else {
            return Err(BridgeError::Command("empty command".into()));
        };
        match (verb.to_ascii_uppercase().as_str(), args) {
            ("PING", []) => Ok(String::new()),
            ("SET", [key, value]) => {
                self.put_ttl(key.as_bytes(), value.as_bytes(), 0)?;
                Ok(String::new())
            }
            ("SET", [key, value, ex, secs]) if ex.eq_ignore_ascii_case("EX") => {
                let secs = secs
                    .parse()
                    .map_err(|_| BridgeError::Command(format!("invalid expiry '{secs}'")))?;
                self.put_ttl(key.as_bytes(), value.as_bytes(), secs)?;
                Ok(String::new())
            }
            ("DEL", keys) if !keys.is_empty() => {
                for key in keys {
                    self.remove_ttl(key.as_bytes())?;
                }
                Ok(String::new())
            }
            _ => Err(BridgeError::Command(format!("unsupported command '{text}'"))),
        }
    }

    fn run_http(&self, request: &HttpCommand) -> Result<String> {
        let endpoint = request.endpoint.trim_end_matches('/');
        let rest_error = |message: String| BridgeError::backend(code::HTTP_REST_API_ERROR, message);

        let value = match (request.verb, endpoint) {
            (HttpVerb::Get, "") => serde_json::to_value(BackendInfo {
                product: PRODUCT_NAME,
                servers: self.servers.read().clone(),
                stores: self.stores.len(),
                ttl_entries: self.ttl.len(),
                locks: self.locks.len(),
            }),
            (HttpVerb::Get, "/stores") => {
                let mut summaries: Vec<StoreSummary> = self
                    .stores
                    .iter()
                    .map(|entry| self.summary(*entry.key(), entry.value()))
                    .collect();
                summaries.sort_by_key(|s| s.id);
                serde_json::to_value(summaries)
            }
            (verb, path) if path.starts_with("/stores/") => {
                let name = &path["/stores/".len()..];
                let id = self.find_store(name).map_err(|e| rest_error(e.to_string()))?;
                match verb {
                    HttpVerb::Get => {
                        let store = self.store(id)?;
                        serde_json::to_value(self.summary(id, &store))
                    }
                    HttpVerb::Delete => {
                        self.remove_store(id)?;
                        Ok(serde_json::json!({ "ok": true, "id": id }))
                    }
                    other => return Err(rest_error(format!("{other:?} is not allowed on {path}"))),
                }
            }
            (verb, path) => return Err(rest_error(format!("no route for {verb:?} {path}"))),
        };
        value
            .map(|v| v.to_string())
            .map_err(|e| rest_error(e.to_string()))
    }

    fn run_args(&self, serialized: &[u8]) -> Result<String> {
        let args = ArgList::decode(serialized)?;
        let Some((verb, args)) = args.split_first() else {
            return Err(BridgeError::Command("empty argument list".into()));
        };
        let verb = String::from_utf8_lossy(verb).to_ascii_uppercase();
        match (verb.as_str(), args) {
            ("PING", []) => Ok("PONG".to_string()),
            ("SET", [key, value]) => {
                self.put_ttl(key, value, 0)?;
                Ok("OK".to_string())
            }
            ("GET", [key]) => Ok(self
                .ttl_get(key)
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .unwrap_or_else(|| "(nil)".to_string())),
            ("MGET", keys) if !keys.is_empty() => {
                let values: Vec<Option<String>> = keys
                    .iter()
                    .map(|key| self.ttl_get(key).map(|v| String::from_utf8_lossy(&v).into_owned()))
                    .collect();
                serde_json::to_string(&values).map_err(|e| BridgeError::Command(e.to_string()))
            }
            ("DEL", keys) if !keys.is_empty() => {
                let mut removed = 0u64;
                for key in keys {
                    if self.remove_ttl(key)? {
                        removed += 1;
                    }
                }
                Ok(removed.to_string())
            }
            ("EXISTS", keys) if !keys.is_empty() => {
                let count = keys.iter().filter(|key| self.ttl_get(key).is_some()).count();
                Ok(count.to_string())
            }
            _ => Err(BridgeError::Command(format!(
                "unsupported command '{verb}' with {} arguments",
                args.len()
            ))),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct SnapshotCursor {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl StoreCursor for SnapshotCursor {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.entries.next())
    }
}

impl Backend for MemoryBackend {
    fn product_name(&self) -> &str {
        PRODUCT_NAME
    }

    fn create_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<StoreId> {
        self.ensure_connected()?;
        let mut catalog = self.catalog.lock();
        if catalog.stores.contains_key(name) {
            return Err(BridgeError::StoreExists(name.to_string()));
        }
        Ok(self.insert_store(&mut catalog, name, key_type, value_type))
    }

    fn create_or_get_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<StoreId> {
        self.ensure_connected()?;
        let mut catalog = self.catalog.lock();
        if let Some(id) = catalog.stores.get(name) {
            return Ok(*id);
        }
        Ok(self.insert_store(&mut catalog, name, key_type, value_type))
    }

    fn find_store(&self, name: &str) -> Result<StoreId> {
        self.ensure_connected()?;
        self.catalog
            .lock()
            .stores
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::StoreNotFound(name.to_string()))
    }

    fn remove_store(&self, store: StoreId) -> Result<bool> {
        self.ensure_connected()?;
        let mut catalog = self.catalog.lock();
        let (_, removed) = self
            .stores
            .remove(&store)
            .ok_or(BridgeError::InvalidStore(store))?;
        catalog.stores.remove(&removed.descriptor.name);
        debug!(store, name = %removed.descriptor.name, "removed store");
        Ok(true)
    }

    fn describe_store(&self, store: StoreId) -> Result<StoreDescriptor> {
        Ok(self.store(store)?.descriptor.clone())
    }

    fn put(&self, store: StoreId, key: &[u8], value: &[u8]) -> Result<()> {
        let store = self.store(store)?;
        store.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_safe(&self, store: StoreId, key: &[u8], value: &[u8]) -> Result<()> {
        let store = self.store(store)?;
        let _guard = store.safe_guard.lock();
        store.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, store: StoreId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let store = self.store(store)?;
        let value = store.entries.read().get(key).cloned();
        Ok(value)
    }

    fn get_safe(&self, store: StoreId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let store = self.store(store)?;
        let _guard = store.safe_guard.lock();
        let value = store.entries.read().get(key).cloned();
        Ok(value)
    }

    fn remove(&self, store: StoreId, key: &[u8]) -> Result<bool> {
        let store = self.store(store)?;
        let removed = store.entries.write().remove(key).is_some();
        Ok(removed)
    }

    fn has(&self, store: StoreId, key: &[u8]) -> Result<bool> {
        let store = self.store(store)?;
        let present = store.entries.read().contains_key(key);
        Ok(present)
    }

    fn clear(&self, store: StoreId) -> Result<()> {
        self.store(store)?.entries.write().clear();
        Ok(())
    }

    fn size(&self, store: StoreId) -> Result<u64> {
        let len = self.store(store)?.entries.read().len();
        Ok(len as u64)
    }

    fn open_cursor(&self, store: StoreId) -> Result<Box<dyn StoreCursor>> {
        let store = self.store(store)?;
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = store
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(SnapshotCursor {
            entries: snapshot.into_iter(),
        }))
    }

    fn put_ttl(&self, key: &[u8], value: &[u8], ttl_seconds: u32) -> Result<()> {
        self.ensure_connected()?;
        let expires_at = match ttl_seconds {
            0 => None,
            secs => Instant::now().checked_add(Duration::from_secs(u64::from(secs))),
        };
        self.ttl.insert(
            key.to_vec(),
            TtlEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        let writes = self.ttl_writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % TTL_SWEEP_INTERVAL == 0 {
            self.sweep_expired(Instant::now());
        }
        Ok(())
    }

    fn get_ttl(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_connected()?;
        Ok(self.ttl_get(key))
    }

    fn remove_ttl(&self, key: &[u8]) -> Result<bool> {
        self.ensure_connected()?;
        let now = Instant::now();
        Ok(self
            .ttl
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    fn has_ttl(&self, key: &[u8]) -> Result<bool> {
        self.ensure_connected()?;
        Ok(self.ttl_get(key).is_some())
    }

    fn run_command(&self, command: &Command) -> Result<String> {
        self.ensure_connected()?;
        match command {
            Command::Text(text) => self.run_text(text),
            Command::Http(request) => self.run_http(request),
            Command::Args(serialized) => self.run_args(serialized),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reconnect(&self, servers: &[String]) -> Result<()> {
        if !servers.is_empty() {
            *self.servers.write() = servers.to_vec();
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!(servers = servers.len(), "reconnected");
        Ok(())
    }
}

impl LockService for MemoryBackend {
    fn create_or_get_lock(&self, name: &str) -> Result<LockId> {
        self.ensure_connected()?;
        let mut catalog = self.catalog.lock();
        if let Some(id) = catalog.locks.get(name) {
            return Ok(*id);
        }
        let id = self.next_lock.fetch_add(1, Ordering::SeqCst);
        self.locks.insert(
            id,
            Arc::new(MemoryLock {
                name: name.to_string(),
                holder: Mutex::new(None),
                changed: Condvar::new(),
                removed: AtomicBool::new(false),
            }),
        );
        catalog.locks.insert(name.to_string(), id);
        debug!(lock = id, name, "created lock");
        Ok(id)
    }

    fn remove_lock(&self, lock: LockId) -> Result<bool> {
        self.ensure_connected()?;
        let mut catalog = self.catalog.lock();
        let (_, removed) = self.locks.remove(&lock).ok_or(BridgeError::InvalidLock(lock))?;
        catalog.locks.remove(&removed.name);
        removed.removed.store(true, Ordering::SeqCst);
        let _holder = removed.holder.lock();
        removed.changed.notify_all();
        Ok(true)
    }

    /// A zero lease would expire on the spot and is refused.
    fn acquire(&self, lock: LockId, lease: Duration, max_wait: Duration) -> Result<()> {
        let entry = self.lock_entry(lock)?;
        if lease.is_zero() {
            return Err(BridgeError::backend(
                code::GET_DISTRIBUTED_LOCK_ERROR,
                format!("Unable to acquire the lock {lock} with an empty lease."),
            ));
        }
        let started = Instant::now();
        let deadline = started.checked_add(max_wait);
        let mut holder = entry.holder.lock();
        loop {
            if entry.removed.load(Ordering::SeqCst) {
                return Err(BridgeError::InvalidLock(lock));
            }
            let now = Instant::now();
            let current = *holder;
            let busy_until = match current {
                Some(current) if current.is_active(now) => current.until,
                _ => {
                    *holder = Some(Holder {
                        pid: std::process::id(),
                        until: now.checked_add(lease),
                    });
                    return Ok(());
                }
            };
            if deadline.is_some_and(|d| now >= d) {
                return Err(BridgeError::LockTimeout {
                    lock,
                    waited: now - started,
                });
            }
            let wake = match (deadline, busy_until) {
                (Some(d), Some(u)) => Some(d.min(u)),
                (d, u) => d.or(u),
            };
            match wake {
                Some(at) => {
                    entry.changed.wait_until(&mut holder, at);
                }
                None => entry.changed.wait(&mut holder),
            }
        }
    }

    /// Clears whoever holds the lock, including a holder that took it over
    /// after the caller's own lease ran out.
    fn release(&self, lock: LockId) -> Result<()> {
        let entry = self.lock_entry(lock)?;
        let mut holder = entry.holder.lock();
        *holder = None;
        entry.changed.notify_all();
        Ok(())
    }

    fn owner_pid(&self, name: &str) -> Result<u32> {
        self.ensure_connected()?;
        let id = self
            .catalog
            .lock()
            .locks
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::LockNotFound(name.to_string()))?;
        let entry = self.lock_entry(id)?;
        let holder = *entry.holder.lock();
        Ok(holder
            .filter(|h| h.is_active(Instant::now()))
            .map_or(0, |h| h.pid))
    }
}
