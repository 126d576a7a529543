//! Error codes, the bridge error type and the process-wide last-error slots.

use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

/// Numeric status crossing the boundary. Zero means success.
pub type ErrorCode = u64;

/// Stable error codes. Nonzero values outside this list are backend-defined
/// and are passed through verbatim.
pub mod code {
    use super::ErrorCode;

    pub const NO_ERROR: ErrorCode = 0;
    pub const RUN_DATA_STORE_COMMAND_ERROR: ErrorCode = 99;
    pub const INITIALIZE_ERROR: ErrorCode = 101;
    pub const CONNECTION_ERROR: ErrorCode = 102;
    pub const DATA_ITEM_WRITE_ERROR: ErrorCode = 107;
    pub const DATA_ITEM_READ_ERROR: ErrorCode = 108;
    pub const STORE_EXISTS: ErrorCode = 109;
    pub const STORE_DOES_NOT_EXIST: ErrorCode = 110;
    pub const DATA_ITEM_DELETE_ERROR: ErrorCode = 113;
    pub const STORE_ITERATION_DELETION_ERROR: ErrorCode = 131;
    pub const INVALID_STORE_ID_ERROR: ErrorCode = 143;
    pub const HTTP_REST_API_ERROR: ErrorCode = 154;
    pub const RESULT_CEILING_EXCEEDED: ErrorCode = 159;
    pub const INVALID_ARGUMENT_ERROR: ErrorCode = 160;
    pub const INTERNAL_ERROR: ErrorCode = 161;
    pub const GET_DISTRIBUTED_LOCK_ERROR: ErrorCode = 506;
    pub const LOCK_RELEASE_ERROR: ErrorCode = 511;
    pub const INVALID_LOCK_ID_ERROR: ErrorCode = 512;
    pub const GET_LOCK_TIMEOUT_ERROR: ErrorCode = 513;
    pub const LOCK_NOT_FOUND_ERROR: ErrorCode = 514;
}

/// Every way a bridge call can fail.
///
/// Not-found results (absent key, exhausted cursor) are not errors; they are
/// `Ok(None)` / `Ok(false)` and encode as `false,0`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Failure reported by the backend, kept as-is.
    #[error("{message}")]
    Backend { code: ErrorCode, message: String },

    #[error("A store named '{0}' already exists.")]
    StoreExists(String),

    #[error("No store named '{0}' exists.")]
    StoreNotFound(String),

    #[error("No store exists for the StoreId {0}.")]
    InvalidStore(u64),

    #[error("No open iterator exists for the iteration handle {0}.")]
    InvalidIterator(u64),

    #[error("No lock exists for the LockId {0}.")]
    InvalidLock(u64),

    #[error("No lock named '{0}' exists.")]
    LockNotFound(String),

    #[error("Unable to acquire the lock {lock} within {waited:?}.")]
    LockTimeout { lock: u64, waited: Duration },

    #[error("Encoded result of {len} bytes exceeds the {ceiling}-byte ceiling.")]
    ResultCeiling { len: usize, ceiling: usize },

    #[error("Invalid data store command: {0}")]
    Command(String),

    #[error("There is no valid connection to the back-end data store at this time.")]
    NotConnected,

    #[error("Bridge initialization failed: {0}")]
    Initialize(String),

    #[error("Invalid base64 input: {0}")]
    InvalidBase64(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal bridge failure: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn backend(code: ErrorCode, message: impl Into<String>) -> Self {
        BridgeError::Backend {
            code,
            message: message.into(),
        }
    }

    /// The numeric code this error crosses the boundary as.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Backend { code, .. } => *code,
            BridgeError::StoreExists(_) => code::STORE_EXISTS,
            BridgeError::StoreNotFound(_) => code::STORE_DOES_NOT_EXIST,
            BridgeError::InvalidStore(_) => code::INVALID_STORE_ID_ERROR,
            BridgeError::InvalidIterator(_) => code::STORE_ITERATION_DELETION_ERROR,
            BridgeError::InvalidLock(_) => code::INVALID_LOCK_ID_ERROR,
            BridgeError::LockNotFound(_) => code::LOCK_NOT_FOUND_ERROR,
            BridgeError::LockTimeout { .. } => code::GET_LOCK_TIMEOUT_ERROR,
            BridgeError::ResultCeiling { .. } => code::RESULT_CEILING_EXCEEDED,
            BridgeError::Command(_) => code::RUN_DATA_STORE_COMMAND_ERROR,
            BridgeError::NotConnected => code::CONNECTION_ERROR,
            BridgeError::Initialize(_) => code::INITIALIZE_ERROR,
            BridgeError::InvalidBase64(_) => code::DATA_ITEM_READ_ERROR,
            BridgeError::InvalidArgument(_) => code::INVALID_ARGUMENT_ERROR,
            BridgeError::Internal(_) => code::INTERNAL_ERROR,
        }
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, BridgeError::LockTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Which last-error slot a call reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Store,
    Ttl,
    Lock,
}

/// One last-error slot: the code and message of the most recent call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSlot {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Default)]
struct Slots {
    store: ErrorSlot,
    ttl: ErrorSlot,
    lock: ErrorSlot,
}

impl Slots {
    fn slot_mut(&mut self, kind: ErrorKind) -> &mut ErrorSlot {
        match kind {
            ErrorKind::Store => &mut self.store,
            ErrorKind::Ttl => &mut self.ttl,
            ErrorKind::Lock => &mut self.lock,
        }
    }
}

/// Coarse diagnostic mirror of the most recent outcome per call kind.
///
/// Shared by every thread using the bridge, so under concurrency a slot may
/// describe another caller's call. The per-call `Result` is authoritative.
#[derive(Debug, Default)]
pub struct LastErrors {
    slots: Mutex<Slots>,
}

impl LastErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot for `kind` with the outcome of a call.
    pub fn record<T>(&self, kind: ErrorKind, result: &Result<T>) {
        let mut slots = self.slots.lock();
        let slot = slots.slot_mut(kind);
        match result {
            Ok(_) => {
                slot.code = code::NO_ERROR;
                slot.message.clear();
            }
            Err(e) => {
                slot.code = e.code();
                slot.message = e.to_string();
            }
        }
    }

    pub fn get(&self, kind: ErrorKind) -> ErrorSlot {
        self.slots.lock().slot_mut(kind).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(BridgeError::StoreExists("s".into()).code(), 109);
        assert_eq!(BridgeError::InvalidStore(7).code(), 143);
        assert_eq!(
            BridgeError::LockTimeout {
                lock: 1,
                waited: Duration::from_millis(100)
            }
            .code(),
            513
        );
        assert_eq!(BridgeError::backend(4242, "boom").code(), 4242);
    }

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = BridgeError::backend(77, "replica unavailable");
        assert_eq!(err.to_string(), "replica unavailable");
    }

    #[test]
    fn test_slots_are_independent() {
        let errors = LastErrors::new();
        errors.record::<()>(ErrorKind::Store, &Err(BridgeError::InvalidStore(3)));
        errors.record::<()>(ErrorKind::Ttl, &Ok(()));

        let store = errors.get(ErrorKind::Store);
        assert_eq!(store.code, code::INVALID_STORE_ID_ERROR);
        assert!(store.message.contains("StoreId 3"));
        assert_eq!(errors.get(ErrorKind::Ttl), ErrorSlot::default());
        assert_eq!(errors.get(ErrorKind::Lock).code, code::NO_ERROR);
    }

    #[test]
    fn test_success_resets_slot() {
        let errors = LastErrors::new();
        errors.record::<()>(ErrorKind::Lock, &Err(BridgeError::InvalidLock(9)));
        errors.record(ErrorKind::Lock, &Ok(5u32));
        assert_eq!(errors.get(ErrorKind::Lock), ErrorSlot::default());
    }
}
