//! Seams to the external collaborators: the key/value backend and the lock
//! service. Everything behind these traits is backend-defined.

use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::error::{BridgeError, Result};

pub type StoreId = u64;
pub type LockId = u64;

/// What a store was declared as. The type names are descriptive only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub name: String,
    pub key_type: String,
    pub value_type: String,
}

/// Open cursor over one store's entries.
pub trait StoreCursor: Send {
    /// Next key/value pair, or `None` once the cursor is exhausted.
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
}

/// A process-shared key/value engine addressed by numeric store ids.
pub trait Backend: Send + Sync {
    /// Name of the NoSQL product behind this backend.
    fn product_name(&self) -> &str;

    fn create_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<StoreId>;

    fn create_or_get_store(&self, name: &str, key_type: &str, value_type: &str) -> Result<StoreId>;

    fn find_store(&self, name: &str) -> Result<StoreId>;

    fn remove_store(&self, store: StoreId) -> Result<bool>;

    fn describe_store(&self, store: StoreId) -> Result<StoreDescriptor>;

    fn put(&self, store: StoreId, key: &[u8], value: &[u8]) -> Result<()>;

    /// Put serialized against other safe writers of the same store.
    fn put_safe(&self, store: StoreId, key: &[u8], value: &[u8]) -> Result<()>;

    fn get(&self, store: StoreId, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn get_safe(&self, store: StoreId, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn remove(&self, store: StoreId, key: &[u8]) -> Result<bool>;

    fn has(&self, store: StoreId, key: &[u8]) -> Result<bool>;

    fn clear(&self, store: StoreId) -> Result<()>;

    fn size(&self, store: StoreId) -> Result<u64>;

    fn open_cursor(&self, store: StoreId) -> Result<Box<dyn StoreCursor>>;

    /// Write into the global TTL namespace. `ttl_seconds == 0` never expires.
    fn put_ttl(&self, key: &[u8], value: &[u8], ttl_seconds: u32) -> Result<()>;

    fn get_ttl(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn remove_ttl(&self, key: &[u8]) -> Result<bool>;

    fn has_ttl(&self, key: &[u8]) -> Result<bool>;

    /// Run a passthrough command. Text commands answer with an empty string.
    fn run_command(&self, command: &Command) -> Result<String> {
        Err(BridgeError::Command(format!(
            "{} commands are not supported by {}",
            command.kind(),
            self.product_name()
        )))
    }

    fn is_connected(&self) -> bool;

    fn reconnect(&self, servers: &[String]) -> Result<()>;

    /// Flush anything held only in memory so far.
    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Named distributed locks addressed by numeric lock ids.
pub trait LockService: Send + Sync {
    fn create_or_get_lock(&self, name: &str) -> Result<LockId>;

    fn remove_lock(&self, lock: LockId) -> Result<bool>;

    /// Acquire within `max_wait`, holding for at most `lease`.
    ///
    /// Running out of `max_wait` must surface as [`BridgeError::LockTimeout`].
    fn acquire(&self, lock: LockId, lease: Duration, max_wait: Duration) -> Result<()>;

    fn release(&self, lock: LockId) -> Result<()>;

    /// Process id of the current holder, 0 when nobody holds it.
    fn owner_pid(&self, name: &str) -> Result<u32>;
}

/// The pair of collaborators one bridge talks to.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Backend>,
    pub locks: Arc<dyn LockService>,
}

impl Services {
    /// Use one object for both the store and the lock service.
    pub fn shared<T>(engine: Arc<T>) -> Self
    where
        T: Backend + LockService + 'static,
    {
        Self {
            store: engine.clone(),
            locks: engine,
        }
    }
}
