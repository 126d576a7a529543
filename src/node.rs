//! Node.js bindings for the bridge.
//!
//! Methods return the same comma-encoded result strings as the C ABI. Reads
//! return a [`TransferredView`] that owns the bytes until `release()`.

use std::ops::Deref;
use std::sync::Arc;

use napi::bindgen_prelude::Buffer;
use napi_derive::napi;

use crate::bridge::{duration_from_secs, Bridge};
use crate::buffer::TransferredBuffer;
use crate::command::{ArgList, Command, HttpCommand};
use crate::encoding::{
    encode_done, encode_flag, encode_number, encode_reply, EncodedResult, ResultText,
    PAYLOAD_CEILING,
};
use crate::error::{BridgeError, ErrorKind};
use crate::global;
use crate::host::HostDetails;
use crate::text;

/// Convert a bridge error to a napi Error.
fn to_napi_err(e: BridgeError) -> napi::Error {
    napi::Error::from_reason(format!("{} (code {})", e, e.code()))
}

/// Handles arrive as JS numbers; anything negative names nothing.
fn handle(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[derive(Clone)]
enum Session {
    Global(&'static Bridge),
    Local(Arc<Bridge>),
}

impl Deref for Session {
    type Target = Bridge;

    fn deref(&self) -> &Bridge {
        match self {
            Session::Global(bridge) => bridge,
            Session::Local(bridge) => bridge,
        }
    }
}

/// Bytes handed to JavaScript by a read. Release exactly once.
#[napi]
pub struct TransferredView {
    result: String,
    first: Option<TransferredBuffer>,
    second: Option<TransferredBuffer>,
    released: bool,
}

impl From<EncodedResult> for TransferredView {
    fn from(encoded: EncodedResult) -> Self {
        Self {
            result: encoded.text,
            first: encoded.first,
            second: encoded.second,
            released: false,
        }
    }
}

impl TransferredView {
    fn slot(&self, slot: &Option<TransferredBuffer>) -> napi::Result<Option<Buffer>> {
        if self.released {
            return Err(napi::Error::from_reason("view already released"));
        }
        Ok(slot.as_ref().map(|b| Buffer::from(b.as_slice().to_vec())))
    }
}

#[napi]
impl TransferredView {
    /// The encoded result, e.g. `true,0`.
    #[napi(getter)]
    pub fn result(&self) -> String {
        self.result.clone()
    }

    /// The value of a get, or the key of an iteration step.
    #[napi]
    pub fn first(&self) -> napi::Result<Option<Buffer>> {
        self.slot(&self.first)
    }

    /// The value of an iteration step.
    #[napi]
    pub fn second(&self) -> napi::Result<Option<Buffer>> {
        self.slot(&self.second)
    }

    #[napi(getter, js_name = "isReleased")]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Give the bytes back. A second call is an error.
    #[napi]
    pub fn release(&mut self) -> napi::Result<()> {
        if self.released {
            return Err(napi::Error::from_reason("view already released"));
        }
        self.released = true;
        if let Some(buffer) = self.first.take() {
            buffer.release();
        }
        if let Some(buffer) = self.second.take() {
            buffer.release();
        }
        Ok(())
    }
}

/// Distributed process store and lock handle.
#[napi]
pub struct DpsHelper {
    inner: Session,
}

#[napi]
impl DpsHelper {
    /// Attach to the process-wide bridge, optionally naming its config file.
    #[napi(factory)]
    pub fn open(config_file: Option<String>) -> napi::Result<Self> {
        if let Some(path) = config_file {
            global::set_config_file(path);
        }
        let bridge = global::bridge().map_err(to_napi_err)?;
        Ok(Self {
            inner: Session::Global(bridge),
        })
    }

    /// A private bridge over an in-process backend.
    #[napi(factory, js_name = "inMemory")]
    pub fn in_memory() -> Self {
        Self {
            inner: Session::Local(Arc::new(Bridge::in_memory())),
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    #[napi(js_name = "dpsGetNoSqlDbProductName")]
    pub fn product_name(&self) -> String {
        self.inner.product_name().to_string()
    }

    #[napi(js_name = "dpsGetDetailsAboutThisMachine")]
    pub fn details_about_this_machine(&self) -> napi::Result<String> {
        HostDetails::current().encode().map_err(to_napi_err)
    }

    #[napi(js_name = "dpsGetLastStoreErrorCode")]
    pub fn last_store_error_code(&self) -> i64 {
        self.inner.last_store_error().code as i64
    }

    #[napi(js_name = "dpsGetLastStoreErrorString")]
    pub fn last_store_error_string(&self) -> String {
        self.inner.last_store_error().message
    }

    #[napi(js_name = "dpsGetLastErrorCodeTTL")]
    pub fn last_ttl_error_code(&self) -> i64 {
        self.inner.last_ttl_error().code as i64
    }

    #[napi(js_name = "dpsGetLastErrorStringTTL")]
    pub fn last_ttl_error_string(&self) -> String {
        self.inner.last_ttl_error().message
    }

    #[napi(js_name = "dlGetLastLockErrorCode")]
    pub fn last_lock_error_code(&self) -> i64 {
        self.inner.last_lock_error().code as i64
    }

    #[napi(js_name = "dlGetLastLockErrorString")]
    pub fn last_lock_error_string(&self) -> String {
        self.inner.last_lock_error().message
    }

    #[napi(js_name = "dpsIsConnected")]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    #[napi(js_name = "dpsReconnect")]
    pub fn reconnect(&self, servers: Option<Vec<String>>) -> String {
        encode_done(&self.inner.reconnect(&servers.unwrap_or_default()))
    }

    #[napi(js_name = "dpsPersist")]
    pub fn persist(&self) -> String {
        encode_done(&self.inner.persist())
    }

    /// `true,<base64>`.
    #[napi(js_name = "dpsBase64Encode")]
    pub fn base64_encode(&self, input: String) -> String {
        ResultText::fields(["true", text::base64_encode(input.as_bytes()).as_str()])
            .with_ceiling(PAYLOAD_CEILING)
            .finish()
            .unwrap_or_else(|_| "false,".to_string())
    }

    /// `true,<decoded>`, or `false,` for invalid input.
    #[napi(js_name = "dpsBase64Decode")]
    pub fn base64_decode(&self, input: String) -> String {
        text::base64_decode(&input)
            .and_then(|bytes| {
                ResultText::fields(["true", String::from_utf8_lossy(&bytes).as_ref()])
                    .with_ceiling(PAYLOAD_CEILING)
                    .finish()
            })
            .unwrap_or_else(|_| "false,".to_string())
    }

    // =========================================================================
    // Stores
    // =========================================================================

    #[napi(js_name = "dpsCreateStore")]
    pub fn create_store(&self, name: String, key_type: String, value_type: String) -> String {
        encode_number(&self.inner.create_store(&name, &key_type, &value_type))
    }

    #[napi(js_name = "dpsCreateOrGetStore")]
    pub fn create_or_get_store(&self, name: String, key_type: String, value_type: String) -> String {
        encode_number(&self.inner.create_or_get_store(&name, &key_type, &value_type))
    }

    #[napi(js_name = "dpsFindStore")]
    pub fn find_store(&self, name: String) -> String {
        encode_number(&self.inner.find_store(&name))
    }

    #[napi(js_name = "dpsRemoveStore")]
    pub fn remove_store(&self, store: i64) -> String {
        encode_flag(&self.inner.remove_store(handle(store)))
    }

    #[napi(js_name = "dpsGetStoreName")]
    pub fn store_name(&self, store: i64) -> String {
        encode_reply(&self.inner.get_store_name(handle(store)), PAYLOAD_CEILING)
    }

    #[napi(js_name = "dpsGetKeyTypeName")]
    pub fn key_type_name(&self, store: i64) -> String {
        encode_reply(&self.inner.get_key_type_name(handle(store)), PAYLOAD_CEILING)
    }

    #[napi(js_name = "dpsGetValueTypeName")]
    pub fn value_type_name(&self, store: i64) -> String {
        encode_reply(&self.inner.get_value_type_name(handle(store)), PAYLOAD_CEILING)
    }

    #[napi(js_name = "dpsPut")]
    pub fn put(&self, store: i64, key: Buffer, value: Buffer) -> String {
        encode_done(&self.inner.put(handle(store), &key, &value))
    }

    #[napi(js_name = "dpsPutSafe")]
    pub fn put_safe(&self, store: i64, key: Buffer, value: Buffer) -> String {
        encode_done(&self.inner.put_safe(handle(store), &key, &value))
    }

    #[napi(js_name = "dpsGet")]
    pub fn get(&self, store: i64, key: Buffer) -> TransferredView {
        EncodedResult::from_read(self.inner.get(handle(store), &key)).into()
    }

    #[napi(js_name = "dpsGetSafe")]
    pub fn get_safe(&self, store: i64, key: Buffer) -> TransferredView {
        EncodedResult::from_read(self.inner.get_safe(handle(store), &key)).into()
    }

    #[napi(js_name = "dpsRemove")]
    pub fn remove(&self, store: i64, key: Buffer) -> String {
        encode_flag(&self.inner.remove(handle(store), &key))
    }

    #[napi(js_name = "dpsHas")]
    pub fn has(&self, store: i64, key: Buffer) -> String {
        encode_flag(&self.inner.has(handle(store), &key))
    }

    #[napi(js_name = "dpsClear")]
    pub fn clear(&self, store: i64) -> String {
        encode_done(&self.inner.clear(handle(store)))
    }

    #[napi(js_name = "dpsSize")]
    pub fn size(&self, store: i64) -> String {
        encode_number(&self.inner.size(handle(store)))
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    #[napi(js_name = "dpsBeginIteration")]
    pub fn begin_iteration(&self, store: i64) -> String {
        encode_number(&self.inner.begin_iteration(handle(store)))
    }

    #[napi(js_name = "dpsGetNext")]
    pub fn get_next(&self, store: i64, iteration: i64) -> TransferredView {
        let next = self.inner.get_next(handle(store), handle(iteration));
        EncodedResult::from_entry(next).into()
    }

    #[napi(js_name = "dpsEndIteration")]
    pub fn end_iteration(&self, store: i64, iteration: i64) -> String {
        encode_done(&self.inner.end_iteration(handle(store), handle(iteration)))
    }

    // =========================================================================
    // TTL
    // =========================================================================

    #[napi(js_name = "dpsPutTTL")]
    pub fn put_ttl(&self, key: Buffer, value: Buffer, ttl_seconds: u32) -> String {
        encode_done(&self.inner.put_ttl(&key, &value, ttl_seconds))
    }

    #[napi(js_name = "dpsGetTTL")]
    pub fn get_ttl(&self, key: Buffer) -> TransferredView {
        EncodedResult::from_read(self.inner.get_ttl(&key)).into()
    }

    #[napi(js_name = "dpsRemoveTTL")]
    pub fn remove_ttl(&self, key: Buffer) -> String {
        encode_flag(&self.inner.remove_ttl(&key))
    }

    #[napi(js_name = "dpsHasTTL")]
    pub fn has_ttl(&self, key: Buffer) -> String {
        encode_flag(&self.inner.has_ttl(&key))
    }

    // =========================================================================
    // Commands
    // =========================================================================

    #[napi(js_name = "dpsRunDataStoreCommand")]
    pub fn run_text_command(&self, command: String) -> String {
        encode_done(&self.inner.run_command(&Command::Text(command)).map(drop))
    }

    #[napi(js_name = "dpsRunDataStoreHttpCommand")]
    pub fn run_http_command(
        &self,
        command_type: u32,
        verb: String,
        base_url: String,
        endpoint: String,
        query_params: String,
        json_body: String,
    ) -> String {
        let result = HttpCommand::from_raw(
            command_type,
            &verb,
            &base_url,
            &endpoint,
            &query_params,
            &json_body,
        )
        .map_err(|e| self.inner.record_failure(ErrorKind::Store, e))
        .and_then(|request| self.inner.run_command(&Command::Http(request)));
        encode_reply(&result, PAYLOAD_CEILING)
    }

    /// Arguments are serialized with the length-prefixed argument list format.
    #[napi(js_name = "dpsRunDataStoreArgsCommand")]
    pub fn run_args_command(&self, args: Vec<Buffer>) -> String {
        let serialized = ArgList::encode(&args);
        encode_reply(&self.inner.run_command(&Command::Args(serialized)), PAYLOAD_CEILING)
    }

    // =========================================================================
    // Locks
    // =========================================================================

    #[napi(js_name = "dlCreateOrGetLock")]
    pub fn create_or_get_lock(&self, name: String) -> String {
        encode_number(&self.inner.create_or_get_lock(&name))
    }

    #[napi(js_name = "dlRemoveLock")]
    pub fn remove_lock(&self, lock: i64) -> String {
        encode_flag(&self.inner.remove_lock(handle(lock)))
    }

    /// Blocks the JS thread; prefer `dlAcquireLockAsync`.
    #[napi(js_name = "dlAcquireLock")]
    pub fn acquire_lock(&self, lock: i64, lease_seconds: Option<f64>, max_wait_seconds: Option<f64>) -> String {
        let result = match (lease_seconds, max_wait_seconds) {
            (Some(lease), Some(wait)) => self.inner.acquire_lock_within(
                handle(lock),
                duration_from_secs(lease),
                duration_from_secs(wait),
            ),
            _ => self.inner.acquire_lock(handle(lock)),
        };
        encode_done(&result)
    }

    /// Acquire on the blocking pool; resolves with the encoded result.
    #[napi(js_name = "dlAcquireLockAsync")]
    pub async fn acquire_lock_async(
        &self,
        lock: i64,
        lease_seconds: f64,
        max_wait_seconds: f64,
    ) -> napi::Result<String> {
        let session = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let result = session.acquire_lock_within(
                handle(lock),
                duration_from_secs(lease_seconds),
                duration_from_secs(max_wait_seconds),
            );
            encode_done(&result)
        })
        .await
        .map_err(|e| napi::Error::from_reason(e.to_string()))
    }

    #[napi(js_name = "dlReleaseLock")]
    pub fn release_lock(&self, lock: i64) -> String {
        encode_done(&self.inner.release_lock(handle(lock)))
    }

    #[napi(js_name = "dlGetPidForLock")]
    pub fn pid_for_lock(&self, name: String) -> String {
        encode_number(&self.inner.get_owning_pid(&name))
    }
}

/// Set the config file before any `DpsHelper.open`. False once too late.
#[napi(js_name = "dpsSetConfigFile")]
pub fn set_config_file(path: String) -> bool {
    global::set_config_file(path)
}
