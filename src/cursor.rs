//! Handle table for open iteration cursors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::backend::{StoreCursor, StoreId};
use crate::error::{BridgeError, Result};

pub type IterationId = u64;

// ============================================================================
// HANDLE ALLOCATION
// ============================================================================

/// Hands out cursor handles, starting at 1 so that 0 never names a cursor.
struct HandleAllocator {
    next_handle: AtomicU64,
}

impl HandleAllocator {
    fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

// ============================================================================
// CURSOR TABLE
// ============================================================================

struct OpenCursor {
    store: StoreId,
    cursor: Box<dyn StoreCursor>,
    exhausted: bool,
}

/// Open cursors keyed by iteration handle.
///
/// A cursor is bound to the store it was opened on; naming it together with
/// any other store handle is treated as an unknown cursor.
pub struct CursorTable {
    cursors: DashMap<IterationId, Arc<Mutex<OpenCursor>>>,
    allocator: HandleAllocator,
}

impl CursorTable {
    pub fn new() -> Self {
        Self {
            cursors: DashMap::new(),
            allocator: HandleAllocator::new(),
        }
    }

    pub fn open(&self, store: StoreId, cursor: Box<dyn StoreCursor>) -> IterationId {
        let handle = self.allocator.allocate();
        let open = OpenCursor {
            store,
            cursor,
            exhausted: false,
        };
        self.cursors.insert(handle, Arc::new(Mutex::new(open)));
        handle
    }

    /// Advance a cursor. Once it reports exhaustion it keeps doing so.
    pub fn next(&self, store: StoreId, iteration: IterationId) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let entry = self
            .cursors
            .get(&iteration)
            .map(|entry| Arc::clone(&entry))
            .ok_or(BridgeError::InvalidIterator(iteration))?;

        let mut open = entry.lock();
        if open.store != store {
            return Err(BridgeError::InvalidIterator(iteration));
        }
        if open.exhausted {
            return Ok(None);
        }
        let next = open.cursor.next_entry()?;
        if next.is_none() {
            open.exhausted = true;
        }
        Ok(next)
    }

    pub fn close(&self, store: StoreId, iteration: IterationId) -> Result<()> {
        self.cursors
            .remove_if(&iteration, |_, open| open.lock().store == store)
            .map(|_| ())
            .ok_or(BridgeError::InvalidIterator(iteration))
    }

    /// Drop every cursor opened on `store`. Returns how many were open.
    pub fn close_store(&self, store: StoreId) -> usize {
        let before = self.cursors.len();
        self.cursors.retain(|_, open| open.lock().store != store);
        before.saturating_sub(self.cursors.len())
    }

    /// Stores that currently have at least one open cursor.
    pub fn stores(&self) -> Vec<StoreId> {
        let mut stores: Vec<StoreId> = self
            .cursors
            .iter()
            .map(|entry| entry.value().lock().store)
            .collect();
        stores.sort_unstable();
        stores.dedup();
        stores
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

impl Default for CursorTable {
    fn default() -> Self {
        Self::new()
    }
}
