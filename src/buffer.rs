//! Ownership of binary payloads crossing the boundary.
//!
//! Bytes produced by a read (get, get-safe, get-ttl, iteration next) are
//! handed to the caller as a [`TransferredBuffer`]. Inside Rust the buffer is
//! move-only and [`TransferredBuffer::release`] consumes it, so a double
//! release does not compile. Across the C ABI the same bytes travel as a
//! [`RawBuffer`] and must come back through [`release_raw`] exactly once.

use std::ptr;

/// Producer-allocated bytes owned by the consumer until released.
#[derive(Debug, PartialEq, Eq)]
pub struct TransferredBuffer {
    bytes: Box<[u8]>,
}

impl TransferredBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Give the bytes back to the producer.
    pub fn release(self) {
        drop(self);
    }

    /// Copy out the bytes and release the buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }

    /// Hand the allocation over to a foreign caller.
    pub fn into_raw(self) -> RawBuffer {
        let len = self.bytes.len();
        if len == 0 {
            return RawBuffer::empty();
        }
        let data = Box::into_raw(self.bytes) as *mut u8;
        RawBuffer { data, len }
    }

    /// Take back an allocation produced by [`TransferredBuffer::into_raw`].
    ///
    /// Returns `None` for the empty view.
    ///
    /// # Safety
    /// `raw` must come from `into_raw` and must not have been reclaimed before.
    pub unsafe fn from_raw(raw: RawBuffer) -> Option<Self> {
        if raw.data.is_null() || raw.len == 0 {
            return None;
        }
        let slice = ptr::slice_from_raw_parts_mut(raw.data, raw.len);
        Some(Self {
            bytes: Box::from_raw(slice),
        })
    }
}

impl AsRef<[u8]> for TransferredBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// FFI-safe view of a transferred buffer.
///
/// A null `data` pointer with zero `len` is the empty view.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl RawBuffer {
    pub const fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_null() || self.len == 0
    }

    /// Borrow the bytes behind the view.
    ///
    /// # Safety
    /// The view must be live (not yet released).
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.is_empty() {
            return &[];
        }
        std::slice::from_raw_parts(self.data, self.len)
    }
}

impl Default for RawBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Option<TransferredBuffer>> for RawBuffer {
    fn from(buffer: Option<TransferredBuffer>) -> Self {
        buffer.map(TransferredBuffer::into_raw).unwrap_or_default()
    }
}

/// Release a view handed out over the C ABI. Releasing the empty view is a no-op.
///
/// # Safety
/// `raw` must be a view produced by this crate and not released before.
pub unsafe fn release_raw(raw: RawBuffer) {
    if let Some(buffer) = TransferredBuffer::from_raw(raw) {
        buffer.release();
    }
}

/// Borrow caller-owned input bytes for the duration of one call.
///
/// # Safety
/// `data` must be readable for `len` bytes, or null with `len == 0`.
pub unsafe fn borrow_input<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(data, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip_preserves_bytes() {
        let bytes = vec![0u8, b',', 0xff, b'\n', 0];
        let raw = TransferredBuffer::new(bytes.clone()).into_raw();
        assert_eq!(raw.len, bytes.len());
        assert_eq!(unsafe { raw.as_slice() }, bytes.as_slice());

        let back = unsafe { TransferredBuffer::from_raw(raw) }.unwrap();
        assert_eq!(back.into_vec(), bytes);
    }

    #[test]
    fn test_empty_buffer_has_no_allocation() {
        let raw = TransferredBuffer::new(Vec::new()).into_raw();
        assert!(raw.data.is_null());
        assert!(unsafe { TransferredBuffer::from_raw(raw) }.is_none());
    }

    #[test]
    fn test_release_of_empty_view_is_noop() {
        unsafe {
            release_raw(RawBuffer::empty());
            release_raw(RawBuffer::from(None));
        }
    }

    #[test]
    fn test_release_raw_reclaims() {
        let raw = RawBuffer::from(Some(TransferredBuffer::new(b"value".to_vec())));
        assert!(!raw.is_empty());
        unsafe { release_raw(raw) };
    }

    #[test]
    fn test_borrow_input_null() {
        let bytes = unsafe { borrow_input(ptr::null(), 12) };
        assert!(bytes.is_empty());
    }
}
