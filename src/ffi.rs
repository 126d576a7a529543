//! C ABI entry points over the process-global bridge.
//!
//! Every fallible call returns a [`DpsResult`]: `text` is the comma-encoded
//! result, `first`/`second` carry binary payloads out of band. The caller
//! owns all three and gives each back exactly once, through
//! [`dps_release_text`], [`dps_release_buffer`] or [`dps_release_result`].
//! Null pointers and empty buffers are accepted by every release call.
//!
//! Entry points never unwind: a panic inside one is reported as
//! `false,161`.

use std::ffi::{c_char, CStr, CString};
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use crate::bridge::{duration_from_secs, Bridge};
use crate::buffer::{borrow_input, release_raw, RawBuffer, TransferredBuffer};
use crate::command::{Command, HttpCommand};
use crate::encoding::{
    encode_done, encode_flag, encode_number, encode_reply, EncodedResult, ResultText,
    PAYLOAD_CEILING,
};
use crate::error::{code, BridgeError, ErrorCode, ErrorKind, ErrorSlot, Result};
use crate::global;
use crate::host::HostDetails;
use crate::text;

/// Result tuple handed across the C ABI.
#[repr(C)]
#[derive(Debug)]
pub struct DpsResult {
    /// NUL-terminated encoded result. Never null.
    pub text: *mut c_char,
    pub first: RawBuffer,
    pub second: RawBuffer,
}

impl DpsResult {
    fn text(text: String) -> Self {
        Self {
            text: into_c_text(text),
            first: RawBuffer::empty(),
            second: RawBuffer::empty(),
        }
    }
}

impl From<EncodedResult> for DpsResult {
    fn from(encoded: EncodedResult) -> Self {
        Self {
            text: into_c_text(encoded.text),
            first: encoded.first.into(),
            second: encoded.second.into(),
        }
    }
}

fn into_c_text(text: String) -> *mut c_char {
    // interior NULs would cut the text short on the other side
    let text = if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text
    };
    CString::new(text).unwrap_or_default().into_raw()
}

// ============================================================================
// Argument and result plumbing
// ============================================================================

unsafe fn arg_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument(format!("{what} is null")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BridgeError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

unsafe fn arg_bytes<'a>(ptr: *const u8, len: usize, what: &str) -> Result<&'a [u8]> {
    if ptr.is_null() && len != 0 {
        return Err(BridgeError::InvalidArgument(format!(
            "{what} is null but claims {len} bytes"
        )));
    }
    Ok(borrow_input(ptr, len))
}

unsafe fn store_args<'a>(
    name: *const c_char,
    key_type: *const c_char,
    value_type: *const c_char,
) -> Result<(&'a str, &'a str, &'a str)> {
    Ok((
        arg_str(name, "store name")?,
        arg_str(key_type, "key type")?,
        arg_str(value_type, "value type")?,
    ))
}

unsafe fn key_value<'a>(
    key: *const u8,
    key_len: usize,
    value: *const u8,
    value_len: usize,
) -> Result<(&'a [u8], &'a [u8])> {
    Ok((arg_bytes(key, key_len, "key")?, arg_bytes(value, value_len, "value")?))
}

unsafe fn http_args(
    command_type: u32,
    verb: *const c_char,
    base_url: *const c_char,
    endpoint: *const c_char,
    query_params: *const c_char,
    body: *const c_char,
) -> Result<Command> {
    HttpCommand::from_raw(
        command_type,
        arg_str(verb, "verb")?,
        arg_str(base_url, "base url")?,
        arg_str(endpoint, "endpoint")?,
        arg_str(query_params, "query params")?,
        arg_str(body, "json body")?,
    )
    .map(Command::Http)
}

fn guarded(call: impl FnOnce() -> DpsResult) -> DpsResult {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(_) => {
            error!("panic caught at the C boundary");
            DpsResult::text(encode_flag(&Err(BridgeError::Internal("panic".into()))))
        }
    }
}

fn with_bridge<T>(call: impl FnOnce(&Bridge) -> Result<T>) -> Result<T> {
    call(global::bridge()?)
}

/// Like [`with_bridge`], but an argument error still lands in the slot for `kind`.
fn with_args<A, T>(
    kind: ErrorKind,
    args: Result<A>,
    call: impl FnOnce(&Bridge, A) -> Result<T>,
) -> Result<T> {
    let bridge = global::bridge()?;
    match args {
        Ok(args) => call(bridge, args),
        Err(e) => Err(bridge.record_failure(kind, e)),
    }
}

fn status(call: impl FnOnce() -> Result<()>) -> DpsResult {
    guarded(|| DpsResult::text(encode_done(&call())))
}

fn flag(call: impl FnOnce() -> Result<bool>) -> DpsResult {
    guarded(|| DpsResult::text(encode_flag(&call())))
}

fn number<T: Display>(call: impl FnOnce() -> Result<T>) -> DpsResult {
    guarded(|| DpsResult::text(encode_number(&call())))
}

fn reply(call: impl FnOnce() -> Result<String>) -> DpsResult {
    guarded(|| DpsResult::text(encode_reply(&call(), PAYLOAD_CEILING)))
}

fn read(call: impl FnOnce() -> Result<Option<TransferredBuffer>>) -> DpsResult {
    guarded(|| EncodedResult::from_read(call()).into())
}

fn last_error(slot: impl FnOnce(&Bridge) -> ErrorSlot) -> ErrorSlot {
    match global::bridge() {
        Ok(bridge) => slot(bridge),
        Err(e) => ErrorSlot {
            code: e.code(),
            message: e.to_string(),
        },
    }
}

fn last_error_code(slot: impl FnOnce(&Bridge) -> ErrorSlot) -> ErrorCode {
    catch_unwind(AssertUnwindSafe(|| last_error(slot).code)).unwrap_or(code::INTERNAL_ERROR)
}

fn last_error_text(slot: impl FnOnce(&Bridge) -> ErrorSlot) -> DpsResult {
    guarded(|| DpsResult::text(last_error(slot).message))
}

// ============================================================================
// Release
// ============================================================================

/// Give back a result text.
///
/// # Safety
/// `text` must be null or a text returned by this library, not yet released.
#[no_mangle]
pub unsafe extern "C" fn dps_release_text(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

/// Give back a transferred buffer. The empty buffer is accepted and ignored.
///
/// # Safety
/// `buffer` must be empty or a buffer returned by this library, not yet released.
#[no_mangle]
pub unsafe extern "C" fn dps_release_buffer(buffer: RawBuffer) {
    release_raw(buffer);
}

/// Give back everything a result holds.
///
/// # Safety
/// None of the result's parts may have been released already.
#[no_mangle]
pub unsafe extern "C" fn dps_release_result(result: DpsResult) {
    dps_release_text(result.text);
    release_raw(result.first);
    release_raw(result.second);
}

// ============================================================================
// Configuration and diagnostics
// ============================================================================

/// Must come before any other call. Returns `false` once the bridge is live
/// or when `path` is not a valid string.
///
/// # Safety
/// `path` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dps_set_config_file(path: *const c_char) -> bool {
    match arg_str(path, "config file") {
        Ok(path) => global::set_config_file(path),
        Err(_) => false,
    }
}

/// Product name of the configured backend, empty if initialization failed.
#[no_mangle]
pub extern "C" fn dps_get_nosql_db_product_name() -> DpsResult {
    guarded(|| {
        let name = global::bridge()
            .map(|bridge| bridge.product_name().to_string())
            .unwrap_or_default();
        DpsResult::text(name)
    })
}

/// `machineName,osVersion,cpuArchitecture`.
#[no_mangle]
pub extern "C" fn dps_get_details_about_this_machine() -> DpsResult {
    guarded(|| {
        let text = HostDetails::current().encode().unwrap_or_default();
        DpsResult::text(text)
    })
}

#[no_mangle]
pub extern "C" fn dps_get_last_store_error_code() -> ErrorCode {
    last_error_code(Bridge::last_store_error)
}

#[no_mangle]
pub extern "C" fn dps_get_last_store_error_string() -> DpsResult {
    last_error_text(Bridge::last_store_error)
}

#[no_mangle]
pub extern "C" fn dps_get_last_error_code_ttl() -> ErrorCode {
    last_error_code(Bridge::last_ttl_error)
}

#[no_mangle]
pub extern "C" fn dps_get_last_error_string_ttl() -> DpsResult {
    last_error_text(Bridge::last_ttl_error)
}

#[no_mangle]
pub extern "C" fn dl_get_last_lock_error_code() -> ErrorCode {
    last_error_code(Bridge::last_lock_error)
}

#[no_mangle]
pub extern "C" fn dl_get_last_lock_error_string() -> DpsResult {
    last_error_text(Bridge::last_lock_error)
}

#[no_mangle]
pub extern "C" fn dps_is_connected() -> bool {
    catch_unwind(|| global::bridge().is_ok_and(|bridge| bridge.is_connected())).unwrap_or(false)
}

/// Reconnect, optionally to a new newline-separated server list.
///
/// # Safety
/// `servers` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dps_reconnect(servers: *const c_char) -> DpsResult {
    status(|| {
        let servers = if servers.is_null() {
            Ok(Vec::new())
        } else {
            arg_str(servers, "server list").map(|list| {
                list.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
        };
        with_args(ErrorKind::Store, servers, |bridge, servers| {
            bridge.reconnect(&servers)
        })
    })
}

#[no_mangle]
pub extern "C" fn dps_persist() -> DpsResult {
    status(|| with_bridge(Bridge::persist))
}

/// `true,<base64>`.
///
/// # Safety
/// `input` must be readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_base64_encode(input: *const u8, len: usize) -> DpsResult {
    guarded(|| {
        let encoded = arg_bytes(input, len, "input").and_then(|input| {
            ResultText::fields(["true", text::base64_encode(input).as_str()])
                .with_ceiling(PAYLOAD_CEILING)
                .finish()
        });
        DpsResult::text(encoded.unwrap_or_else(|_| "false,".to_string()))
    })
}

/// `true,<decoded text>` with the exact decoded bytes in the first slot, or
/// `false,` for invalid input.
///
/// # Safety
/// `input` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dps_base64_decode(input: *const c_char) -> DpsResult {
    guarded(|| {
        let decoded = arg_str(input, "input").and_then(text::base64_decode);
        let text = decoded.as_ref().map_err(Clone::clone).and_then(|bytes| {
            ResultText::fields(["true", String::from_utf8_lossy(bytes).as_ref()])
                .with_ceiling(PAYLOAD_CEILING)
                .finish()
        });
        match (text, decoded) {
            (Ok(text), Ok(bytes)) => EncodedResult {
                text,
                first: Some(TransferredBuffer::new(bytes)),
                second: None,
            }
            .into(),
            _ => DpsResult::text("false,".to_string()),
        }
    })
}

// ============================================================================
// Store sessions
// ============================================================================

/// `storeId,errorCode`.
///
/// # Safety
/// All arguments must be NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn dps_create_store(
    name: *const c_char,
    key_type: *const c_char,
    value_type: *const c_char,
) -> DpsResult {
    number(|| {
        let args = store_args(name, key_type, value_type);
        with_args(ErrorKind::Store, args, |bridge, (name, key_type, value_type)| {
            bridge.create_store(name, key_type, value_type)
        })
    })
}

/// `storeId,errorCode`; the existing store when the name is taken.
///
/// # Safety
/// All arguments must be NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn dps_create_or_get_store(
    name: *const c_char,
    key_type: *const c_char,
    value_type: *const c_char,
) -> DpsResult {
    number(|| {
        let args = store_args(name, key_type, value_type);
        with_args(ErrorKind::Store, args, |bridge, (name, key_type, value_type)| {
            bridge.create_or_get_store(name, key_type, value_type)
        })
    })
}

/// `storeId,errorCode`, `0,110` when no such store exists.
///
/// # Safety
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dps_find_store(name: *const c_char) -> DpsResult {
    number(|| {
        with_args(ErrorKind::Store, arg_str(name, "store name"), |bridge, name| {
            bridge.find_store(name)
        })
    })
}

#[no_mangle]
pub extern "C" fn dps_remove_store(store: u64) -> DpsResult {
    flag(|| with_bridge(|bridge| bridge.remove_store(store)))
}

#[no_mangle]
pub extern "C" fn dps_get_store_name(store: u64) -> DpsResult {
    reply(|| with_bridge(|bridge| bridge.get_store_name(store)))
}

#[no_mangle]
pub extern "C" fn dps_get_key_type_name(store: u64) -> DpsResult {
    reply(|| with_bridge(|bridge| bridge.get_key_type_name(store)))
}

#[no_mangle]
pub extern "C" fn dps_get_value_type_name(store: u64) -> DpsResult {
    reply(|| with_bridge(|bridge| bridge.get_value_type_name(store)))
}

/// # Safety
/// `key` and `value` must be readable for their lengths.
#[no_mangle]
pub unsafe extern "C" fn dps_put(
    store: u64,
    key: *const u8,
    key_len: usize,
    value: *const u8,
    value_len: usize,
) -> DpsResult {
    status(|| {
        with_args(
            ErrorKind::Store,
            key_value(key, key_len, value, value_len),
            |bridge, (key, value)| bridge.put(store, key, value),
        )
    })
}

/// # Safety
/// `key` and `value` must be readable for their lengths.
#[no_mangle]
pub unsafe extern "C" fn dps_put_safe(
    store: u64,
    key: *const u8,
    key_len: usize,
    value: *const u8,
    value_len: usize,
) -> DpsResult {
    status(|| {
        with_args(
            ErrorKind::Store,
            key_value(key, key_len, value, value_len),
            |bridge, (key, value)| bridge.put_safe(store, key, value),
        )
    })
}

/// `true,0` with the value in `first`, `false,0` when absent.
///
/// # Safety
/// `key` must be readable for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_get(store: u64, key: *const u8, key_len: usize) -> DpsResult {
    read(|| {
        with_args(ErrorKind::Store, arg_bytes(key, key_len, "key"), |bridge, key| {
            bridge.get(store, key)
        })
    })
}

/// # Safety
/// `key` must be readable for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_get_safe(store: u64, key: *const u8, key_len: usize) -> DpsResult {
    read(|| {
        with_args(ErrorKind::Store, arg_bytes(key, key_len, "key"), |bridge, key| {
            bridge.get_safe(store, key)
        })
    })
}

/// # Safety
/// `key` must be readable for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_remove(store: u64, key: *const u8, key_len: usize) -> DpsResult {
    flag(|| {
        with_args(ErrorKind::Store, arg_bytes(key, key_len, "key"), |bridge, key| {
            bridge.remove(store, key)
        })
    })
}

/// `true,0` when the key is present.
///
/// # Safety
/// `key` must be readable for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_has(store: u64, key: *const u8, key_len: usize) -> DpsResult {
    flag(|| {
        with_args(ErrorKind::Store, arg_bytes(key, key_len, "key"), |bridge, key| {
            bridge.has(store, key)
        })
    })
}

#[no_mangle]
pub extern "C" fn dps_clear(store: u64) -> DpsResult {
    status(|| with_bridge(|bridge| bridge.clear(store)))
}

#[no_mangle]
pub extern "C" fn dps_size(store: u64) -> DpsResult {
    number(|| with_bridge(|bridge| bridge.size(store)))
}

// ============================================================================
// Iteration
// ============================================================================

#[no_mangle]
pub extern "C" fn dps_begin_iteration(store: u64) -> DpsResult {
    number(|| with_bridge(|bridge| bridge.begin_iteration(store)))
}

/// `true,0` with key in `first` and value in `second`; `false,0` once exhausted.
#[no_mangle]
pub extern "C" fn dps_get_next(store: u64, iteration: u64) -> DpsResult {
    guarded(|| {
        let next = with_bridge(|bridge| bridge.get_next(store, iteration));
        EncodedResult::from_entry(next).into()
    })
}

#[no_mangle]
pub extern "C" fn dps_end_iteration(store: u64, iteration: u64) -> DpsResult {
    status(|| with_bridge(|bridge| bridge.end_iteration(store, iteration)))
}

// ============================================================================
// TTL facade
// ============================================================================

/// # Safety
/// `key` and `value` must be readable for their lengths.
#[no_mangle]
pub unsafe extern "C" fn dps_put_ttl(
    key: *const u8,
    key_len: usize,
    value: *const u8,
    value_len: usize,
    ttl_seconds: u32,
) -> DpsResult {
    status(|| {
        with_args(
            ErrorKind::Ttl,
            key_value(key, key_len, value, value_len),
            |bridge, (key, value)| bridge.put_ttl(key, value, ttl_seconds),
        )
    })
}

/// # Safety
/// `key` must be readable for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_get_ttl(key: *const u8, key_len: usize) -> DpsResult {
    read(|| {
        with_args(ErrorKind::Ttl, arg_bytes(key, key_len, "key"), |bridge, key| {
            bridge.get_ttl(key)
        })
    })
}

/// # Safety
/// `key` must be readable for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_remove_ttl(key: *const u8, key_len: usize) -> DpsResult {
    flag(|| {
        with_args(ErrorKind::Ttl, arg_bytes(key, key_len, "key"), |bridge, key| {
            bridge.remove_ttl(key)
        })
    })
}

/// # Safety
/// `key` must be readable for `key_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_has_ttl(key: *const u8, key_len: usize) -> DpsResult {
    flag(|| {
        with_args(ErrorKind::Ttl, arg_bytes(key, key_len, "key"), |bridge, key| {
            bridge.has_ttl(key)
        })
    })
}

// ============================================================================
// Command passthrough
// ============================================================================

/// One-way textual command: `ok,errorCode`.
///
/// # Safety
/// `command` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dps_run_command_text(command: *const c_char) -> DpsResult {
    status(|| {
        let command = arg_str(command, "command").map(|text| Command::Text(text.to_string()));
        with_args(ErrorKind::Store, command, |bridge, command| {
            bridge.run_command(&command).map(drop)
        })
    })
}

/// HTTP-shaped command: `ok,errorCode,jsonResponse`.
///
/// # Safety
/// Every string argument must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dps_run_command_http(
    command_type: u32,
    verb: *const c_char,
    base_url: *const c_char,
    endpoint: *const c_char,
    query_params: *const c_char,
    body: *const c_char,
) -> DpsResult {
    reply(|| {
        let command = http_args(command_type, verb, base_url, endpoint, query_params, body);
        with_args(ErrorKind::Store, command, |bridge, command| {
            bridge.run_command(&command)
        })
    })
}

/// Serialized argument-list command: `ok,errorCode,resultString`.
///
/// # Safety
/// `args` must be readable for `args_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn dps_run_command_args(args: *const u8, args_len: usize) -> DpsResult {
    reply(|| {
        let command = arg_bytes(args, args_len, "argument list").map(|args| Command::Args(args.to_vec()));
        with_args(ErrorKind::Store, command, |bridge, command| {
            bridge.run_command(&command)
        })
    })
}

// ============================================================================
// Locks
// ============================================================================

/// `lockId,errorCode`.
///
/// # Safety
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dl_create_or_get_lock(name: *const c_char) -> DpsResult {
    number(|| {
        with_args(ErrorKind::Lock, arg_str(name, "lock name"), |bridge, name| {
            bridge.create_or_get_lock(name)
        })
    })
}

#[no_mangle]
pub extern "C" fn dl_remove_lock(lock: u64) -> DpsResult {
    flag(|| with_bridge(|bridge| bridge.remove_lock(lock)))
}

/// Acquire with the default lease and wait budget.
#[no_mangle]
pub extern "C" fn dl_acquire_lock(lock: u64) -> DpsResult {
    status(|| with_bridge(|bridge| bridge.acquire_lock(lock)))
}

/// `false,513` when `max_wait_seconds` runs out first.
#[no_mangle]
pub extern "C" fn dl_acquire_lock_within(
    lock: u64,
    lease_seconds: f64,
    max_wait_seconds: f64,
) -> DpsResult {
    status(|| {
        with_bridge(|bridge| {
            bridge.acquire_lock_within(
                lock,
                duration_from_secs(lease_seconds),
                duration_from_secs(max_wait_seconds),
            )
        })
    })
}

#[no_mangle]
pub extern "C" fn dl_release_lock(lock: u64) -> DpsResult {
    status(|| with_bridge(|bridge| bridge.release_lock(lock)))
}

/// `pid,errorCode`, pid 0 when nobody holds the lock.
///
/// # Safety
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dl_get_pid_for_lock(name: *const c_char) -> DpsResult {
    number(|| {
        with_args(ErrorKind::Lock, arg_str(name, "lock name"), |bridge, name| {
            bridge.get_owning_pid(name)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn take_text(result: &DpsResult) -> String {
        unsafe { CStr::from_ptr(result.text) }
            .to_string_lossy()
            .into_owned()
    }

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn test_put_get_release() {
        unsafe {
            let name = c("ffi-unit-put-get");
            let created = dps_create_or_get_store(name.as_ptr(), c("k").as_ptr(), c("v").as_ptr());
            let text = take_text(&created);
            dps_release_result(created);
            let store: u64 = text.split(',').next().unwrap().parse().unwrap();
            assert!(store > 0);

            let value = [0u8, b',', 7, 0];
            let put = dps_put(store, b"key".as_ptr(), 3, value.as_ptr(), value.len());
            assert_eq!(take_text(&put), "true,0");
            dps_release_result(put);

            let got = dps_get(store, b"key".as_ptr(), 3);
            assert_eq!(take_text(&got), "true,0");
            assert_eq!(got.first.as_slice(), &value);
            assert!(got.second.is_empty());
            dps_release_result(got);

            let missing = dps_get(store, b"nope".as_ptr(), 4);
            assert_eq!(take_text(&missing), "false,0");
            dps_release_buffer(missing.first);
            dps_release_text(missing.text);
        }
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        unsafe {
            let created = dps_create_store(ptr::null(), ptr::null(), ptr::null());
            assert_eq!(take_text(&created), "0,160");
            dps_release_result(created);

            let put = dps_put(1, ptr::null(), 5, ptr::null(), 0);
            assert_eq!(take_text(&put), "false,160");
            dps_release_result(put);
        }
    }

    #[test]
    fn test_release_of_null_parts_is_noop() {
        unsafe {
            dps_release_text(ptr::null_mut());
            dps_release_buffer(RawBuffer::empty());
        }
    }

    #[test]
    fn test_guarded_reports_panic() {
        let result = guarded(|| panic!("boom"));
        assert_eq!(take_text(&result), "false,161");
        unsafe { dps_release_result(result) };
    }

    #[test]
    fn test_text_never_contains_nul() {
        let result = DpsResult::text("a\0b".to_string());
        assert_eq!(take_text(&result), "ab");
        unsafe { dps_release_result(result) };
    }
}
