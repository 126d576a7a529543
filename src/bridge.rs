//! The bridge: store sessions, iteration, the TTL facade, locks and command
//! passthrough over one backend and one lock service.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::backend::{Backend, LockId, LockService, Services, StoreId};
use crate::buffer::TransferredBuffer;
use crate::command::Command;
use crate::config::{BackendConfig, BackendRegistry};
use crate::cursor::{CursorTable, IterationId};
use crate::error::{BridgeError, ErrorKind, ErrorSlot, LastErrors, Result};
use crate::memory::MemoryBackend;

/// Lease used by [`Bridge::acquire_lock`]: ten years, i.e. until released.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(315_360_000);
/// Wait budget used by [`Bridge::acquire_lock`].
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(15);

/// Convert caller-supplied seconds. Negative and NaN mean zero, values too
/// large for a `Duration` mean forever.
pub fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

pub struct Bridge {
    store: Arc<dyn Backend>,
    locks: Arc<dyn LockService>,
    cursors: CursorTable,
    errors: LastErrors,
}

impl Bridge {
    pub fn new(services: Services) -> Self {
        Self {
            store: services.store,
            locks: services.locks,
            cursors: CursorTable::new(),
            errors: LastErrors::new(),
        }
    }

    /// A bridge over a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Services::shared(Arc::new(MemoryBackend::new())))
    }

    pub fn from_config(config: &BackendConfig, registry: &BackendRegistry) -> Result<Self> {
        let services = registry.build(config)?;
        debug!(
            product = %config.product,
            servers = config.servers.len(),
            "bridge initialized"
        );
        Ok(Self::new(services))
    }

    fn track<T>(&self, kind: ErrorKind, result: Result<T>) -> Result<T> {
        self.errors.record(kind, &result);
        if let Err(e) = &result {
            debug!(?kind, code = e.code(), error = %e, "call failed");
        }
        result
    }

    /// Report a call that failed before reaching the backend, such as one
    /// with malformed arguments, into the slot for `kind`.
    pub fn record_failure(&self, kind: ErrorKind, error: BridgeError) -> BridgeError {
        self.errors.record::<()>(kind, &Err(error.clone()));
        debug!(?kind, code = error.code(), error = %error, "call rejected before reaching the backend");
        error
    }

    /// Drop cursors whose store no longer exists. Returns how many were dropped.
    fn close_orphaned_cursors(&self) -> usize {
        self.cursors
            .stores()
            .into_iter()
            .filter(|store| {
                matches!(
                    self.store.describe_store(*store),
                    Err(BridgeError::InvalidStore(_))
                )
            })
            .map(|store| self.cursors.close_store(store))
            .sum()
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn product_name(&self) -> &str {
        self.store.product_name()
    }

    pub fn last_store_error(&self) -> ErrorSlot {
        self.errors.get(ErrorKind::Store)
    }

    pub fn last_ttl_error(&self) -> ErrorSlot {
        self.errors.get(ErrorKind::Ttl)
    }

    pub fn last_lock_error(&self) -> ErrorSlot {
        self.errors.get(ErrorKind::Lock)
    }

    /// Number of cursors begun and not yet ended.
    pub fn open_iterations(&self) -> usize {
        self.cursors.len()
    }

    // ========================================================================
    // Store sessions
    // ========================================================================

    #[instrument(name = "dps::store::create", level = "debug", skip(self))]
    pub fn create_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<StoreId> {
        let result = self.store.create_store(name, key_type, value_type);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::create_or_get", level = "debug", skip(self))]
    pub fn create_or_get_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<StoreId> {
        let result = self.store.create_or_get_store(name, key_type, value_type);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::find", level = "trace", skip(self))]
    pub fn find_store(&self, name: &str) -> Result<StoreId> {
        let result = self.store.find_store(name);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::remove", level = "debug", skip(self))]
    pub fn remove_store(&self, store: StoreId) -> Result<bool> {
        let result = self.store.remove_store(store);
        if result.is_ok() {
            let dropped = self.cursors.close_store(store);
            if dropped > 0 {
                warn!(store, dropped, "store removed with open iterations");
            }
        }
        self.track(ErrorKind::Store, result)
    }

    pub fn get_store_name(&self, store: StoreId) -> Result<String> {
        let result = self.store.describe_store(store).map(|d| d.name);
        self.track(ErrorKind::Store, result)
    }

    pub fn get_key_type_name(&self, store: StoreId) -> Result<String> {
        let result = self.store.describe_store(store).map(|d| d.key_type);
        self.track(ErrorKind::Store, result)
    }

    pub fn get_value_type_name(&self, store: StoreId) -> Result<String> {
        let result = self.store.describe_store(store).map(|d| d.value_type);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::put", level = "trace", skip(self, key, value), fields(key_len = key.len(), value_len = value.len()))]
    pub fn put(&self, store: StoreId, key: &[u8], value: &[u8]) -> Result<()> {
        let result = self.store.put(store, key, value);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::put_safe", level = "trace", skip(self, key, value), fields(key_len = key.len(), value_len = value.len()))]
    pub fn put_safe(&self, store: StoreId, key: &[u8], value: &[u8]) -> Result<()> {
        let result = self.store.put_safe(store, key, value);
        self.track(ErrorKind::Store, result)
    }

    /// `Ok(None)` when the key is absent.
    #[instrument(name = "dps::store::get", level = "trace", skip(self, key))]
    pub fn get(&self, store: StoreId, key: &[u8]) -> Result<Option<TransferredBuffer>> {
        let result = self.store.get(store, key).map(|v| v.map(TransferredBuffer::new));
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::get_safe", level = "trace", skip(self, key))]
    pub fn get_safe(&self, store: StoreId, key: &[u8]) -> Result<Option<TransferredBuffer>> {
        let result = self.store.get_safe(store, key).map(|v| v.map(TransferredBuffer::new));
        self.track(ErrorKind::Store, result)
    }

    /// `Ok(false)` when there was nothing to remove.
    #[instrument(name = "dps::store::remove_key", level = "trace", skip(self, key))]
    pub fn remove(&self, store: StoreId, key: &[u8]) -> Result<bool> {
        let result = self.store.remove(store, key);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::has", level = "trace", skip(self, key))]
    pub fn has(&self, store: StoreId, key: &[u8]) -> Result<bool> {
        let result = self.store.has(store, key);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::clear", level = "debug", skip(self))]
    pub fn clear(&self, store: StoreId) -> Result<()> {
        let result = self.store.clear(store);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::size", level = "trace", skip(self))]
    pub fn size(&self, store: StoreId) -> Result<u64> {
        let result = self.store.size(store);
        self.track(ErrorKind::Store, result)
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    #[instrument(name = "dps::iteration::begin", level = "debug", skip(self))]
    pub fn begin_iteration(&self, store: StoreId) -> Result<IterationId> {
        let result = self
            .store
            .open_cursor(store)
            .map(|cursor| self.cursors.open(store, cursor));
        if let Ok(iteration) = &result {
            debug!(store, iteration, "cursor opened");
        }
        self.track(ErrorKind::Store, result)
    }

    /// Next key and value, `Ok(None)` once the store is exhausted.
    #[instrument(name = "dps::iteration::next", level = "trace", skip(self))]
    pub fn get_next(
        &self,
        store: StoreId,
        iteration: IterationId,
    ) -> Result<Option<(TransferredBuffer, TransferredBuffer)>> {
        // a store removed behind the bridge's back takes its cursors with it
        if matches!(
            self.store.describe_store(store),
            Err(BridgeError::InvalidStore(_))
        ) {
            let dropped = self.cursors.close_store(store);
            if dropped > 0 {
                warn!(store, dropped, "store vanished under open iterations");
            }
        }
        let result = self.cursors.next(store, iteration).map(|entry| {
            entry.map(|(k, v)| (TransferredBuffer::new(k), TransferredBuffer::new(v)))
        });
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::iteration::end", level = "debug", skip(self))]
    pub fn end_iteration(&self, store: StoreId, iteration: IterationId) -> Result<()> {
        let result = self.cursors.close(store, iteration);
        self.track(ErrorKind::Store, result)
    }

    // ========================================================================
    // TTL facade
    // ========================================================================

    #[instrument(name = "dps::ttl::put", level = "trace", skip(self, key, value))]
    pub fn put_ttl(&self, key: &[u8], value: &[u8], ttl_seconds: u32) -> Result<()> {
        let result = self.store.put_ttl(key, value, ttl_seconds);
        self.track(ErrorKind::Ttl, result)
    }

    #[instrument(name = "dps::ttl::get", level = "trace", skip(self, key))]
    pub fn get_ttl(&self, key: &[u8]) -> Result<Option<TransferredBuffer>> {
        let result = self.store.get_ttl(key).map(|v| v.map(TransferredBuffer::new));
        self.track(ErrorKind::Ttl, result)
    }

    #[instrument(name = "dps::ttl::remove", level = "trace", skip(self, key))]
    pub fn remove_ttl(&self, key: &[u8]) -> Result<bool> {
        let result = self.store.remove_ttl(key);
        self.track(ErrorKind::Ttl, result)
    }

    #[instrument(name = "dps::ttl::has", level = "trace", skip(self, key))]
    pub fn has_ttl(&self, key: &[u8]) -> Result<bool> {
        let result = self.store.has_ttl(key);
        self.track(ErrorKind::Ttl, result)
    }

    // ========================================================================
    // Locks
    // ========================================================================

    #[instrument(name = "dps::lock::create_or_get", level = "debug", skip(self))]
    pub fn create_or_get_lock(&self, name: &str) -> Result<LockId> {
        let result = self.locks.create_or_get_lock(name);
        self.track(ErrorKind::Lock, result)
    }

    #[instrument(name = "dps::lock::remove", level = "debug", skip(self))]
    pub fn remove_lock(&self, lock: LockId) -> Result<bool> {
        let result = self.locks.remove_lock(lock);
        self.track(ErrorKind::Lock, result)
    }

    /// Acquire with [`DEFAULT_LOCK_LEASE`] and [`DEFAULT_LOCK_WAIT`].
    pub fn acquire_lock(&self, lock: LockId) -> Result<()> {
        self.acquire_lock_within(lock, DEFAULT_LOCK_LEASE, DEFAULT_LOCK_WAIT)
    }

    /// Blocks for at most `max_wait`.
    #[instrument(name = "dps::lock::acquire", level = "debug", skip(self))]
    pub fn acquire_lock_within(&self, lock: LockId, lease: Duration, max_wait: Duration) -> Result<()> {
        let result = self.locks.acquire(lock, lease, max_wait);
        match &result {
            Ok(()) => debug!(lock, "lock acquired"),
            Err(e) if e.is_lock_timeout() => warn!(lock, ?max_wait, "lock wait exhausted"),
            Err(_) => {}
        }
        self.track(ErrorKind::Lock, result)
    }

    #[instrument(name = "dps::lock::release", level = "debug", skip(self))]
    pub fn release_lock(&self, lock: LockId) -> Result<()> {
        let result = self.locks.release(lock);
        self.track(ErrorKind::Lock, result)
    }

    /// Pid of the current holder, 0 when the lock is free.
    #[instrument(name = "dps::lock::owner", level = "trace", skip(self))]
    pub fn get_owning_pid(&self, name: &str) -> Result<u32> {
        let result = self.locks.owner_pid(name);
        self.track(ErrorKind::Lock, result)
    }

    // ========================================================================
    // Commands and connection
    // ========================================================================

    #[instrument(name = "dps::command::run", level = "debug", skip(self, command), fields(kind = command.kind()))]
    pub fn run_command(&self, command: &Command) -> Result<String> {
        let result = self.store.run_command(command);
        if result.is_ok() && !self.cursors.is_empty() {
            let dropped = self.close_orphaned_cursors();
            if dropped > 0 {
                warn!(dropped, "command removed stores with open iterations");
            }
        }
        self.track(ErrorKind::Store, result)
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// In-flight calls are not drained and may fail across the reconnect.
    #[instrument(name = "dps::connection::reconnect", level = "debug", skip(self))]
    pub fn reconnect(&self, servers: &[String]) -> Result<()> {
        let result = self.store.reconnect(servers);
        self.track(ErrorKind::Store, result)
    }

    #[instrument(name = "dps::store::persist", level = "debug", skip(self))]
    pub fn persist(&self) -> Result<()> {
        let result = self.store.persist();
        self.track(ErrorKind::Store, result)
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("product", &self.product_name())
            .field("open_iterations", &self.cursors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{code, BridgeError};

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(duration_from_secs(0.1), Duration::from_millis(100));
        assert_eq!(duration_from_secs(-3.0), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_ttl_and_store_slots_are_separate() {
        let bridge = Bridge::in_memory();
        assert!(bridge.size(99).is_err());
        bridge.put_ttl(b"k", b"v", 0).unwrap();

        assert_eq!(bridge.last_store_error().code, code::INVALID_STORE_ID_ERROR);
        assert_eq!(bridge.last_ttl_error().code, code::NO_ERROR);
    }

    #[test]
    fn test_descriptors() {
        let bridge = Bridge::in_memory();
        let store = bridge.create_store("people", "rstring", "tuple<int32 age>").unwrap();
        assert_eq!(bridge.get_store_name(store).unwrap(), "people");
        assert_eq!(bridge.get_key_type_name(store).unwrap(), "rstring");
        assert_eq!(bridge.get_value_type_name(store).unwrap(), "tuple<int32 age>");
    }

    #[test]
    fn test_remove_store_closes_cursors() {
        let bridge = Bridge::in_memory();
        let store = bridge.create_store("s", "k", "v").unwrap();
        let it = bridge.begin_iteration(store).unwrap();
        assert_eq!(bridge.open_iterations(), 1);
        bridge.remove_store(store).unwrap();
        assert_eq!(bridge.open_iterations(), 0);
        assert_eq!(
            bridge.get_next(store, it).unwrap_err(),
            BridgeError::InvalidIterator(it)
        );
    }

    #[test]
    fn test_store_deleted_by_command_closes_cursors() {
        use crate::command::{CommandScope, HttpCommand, HttpVerb};

        let bridge = Bridge::in_memory();
        let store = bridge.create_store("doomed", "k", "v").unwrap();
        bridge.put(store, b"k", b"v").unwrap();
        let it = bridge.begin_iteration(store).unwrap();

        bridge
            .run_command(&Command::Http(HttpCommand {
                scope: CommandScope::Database,
                verb: HttpVerb::Delete,
                base_url: String::new(),
                endpoint: "/stores/doomed".into(),
                query_params: String::new(),
                body: String::new(),
            }))
            .unwrap();
        assert_eq!(bridge.open_iterations(), 0);
        assert_eq!(
            bridge.get_next(store, it).unwrap_err(),
            BridgeError::InvalidIterator(it)
        );
    }

    #[test]
    fn test_store_removed_behind_bridge_ends_iteration() {
        let backend = Arc::new(MemoryBackend::new());
        let bridge = Bridge::new(Services::shared(Arc::clone(&backend)));
        let store = bridge.create_store("shared", "k", "v").unwrap();
        bridge.put(store, b"k", b"v").unwrap();
        let it = bridge.begin_iteration(store).unwrap();

        backend.remove_store(store).unwrap();
        assert_eq!(
            bridge.get_next(store, it).unwrap_err(),
            BridgeError::InvalidIterator(it)
        );
        assert_eq!(bridge.open_iterations(), 0);
    }

    #[test]
    fn test_recorded_failure_overwrites_slot() {
        let bridge = Bridge::in_memory();
        assert!(bridge.find_store("absent").is_err());
        assert_eq!(bridge.last_store_error().code, code::STORE_DOES_NOT_EXIST);

        let err = bridge.record_failure(ErrorKind::Store, BridgeError::InvalidArgument("key is null".into()));
        assert_eq!(err.code(), code::INVALID_ARGUMENT_ERROR);
        assert_eq!(bridge.last_store_error().code, code::INVALID_ARGUMENT_ERROR);
        assert_eq!(bridge.last_ttl_error(), ErrorSlot::default());
    }

    #[test]
    fn test_lock_errors_go_to_lock_slot() {
        let bridge = Bridge::in_memory();
        assert!(bridge.release_lock(42).is_err());
        assert_eq!(bridge.last_lock_error().code, code::INVALID_LOCK_ID_ERROR);
        assert_eq!(bridge.last_store_error(), ErrorSlot::default());
    }
}
