//! Managed-runtime bindings for the distributed process store.
//!
//! [`Bridge`] is the Rust API over a [`Backend`] and a [`LockService`]. The
//! [`ffi`] module exposes the process-global bridge through a C ABI, and the
//! `node` feature adds NAPI-RS bindings.

#![deny(clippy::all)]

pub mod backend;
pub mod bridge;
pub mod buffer;
pub mod command;
pub mod config;
pub mod cursor;
pub mod encoding;
pub mod error;
pub mod ffi;
pub mod global;
pub mod host;
pub mod logging;
pub mod memory;
pub mod text;

#[cfg(feature = "node")]
pub mod node;

pub use backend::{Backend, LockId, LockService, Services, StoreCursor, StoreDescriptor, StoreId};
pub use bridge::{Bridge, DEFAULT_LOCK_LEASE, DEFAULT_LOCK_WAIT};
pub use buffer::{RawBuffer, TransferredBuffer};
pub use command::{ArgList, Command, CommandScope, HttpCommand, HttpVerb};
pub use config::{BackendConfig, BackendRegistry};
pub use cursor::IterationId;
pub use encoding::{DecodedResult, EncodedResult};
pub use error::{BridgeError, ErrorCode, ErrorKind, ErrorSlot, Result};
pub use memory::MemoryBackend;
