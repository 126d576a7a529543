//! Runs alone in its own binary: it reads the process-wide last-error slots.

use std::ffi::{CStr, CString};
use std::ptr;

use dps_bridge::ffi::*;

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn text_of(result: DpsResult) -> String {
    let text = unsafe { CStr::from_ptr(result.text) }
        .to_string_lossy()
        .into_owned();
    unsafe { dps_release_result(result) };
    text
}

#[test]
fn test_argument_errors_overwrite_last_error_slots() {
    unsafe {
        assert_eq!(text_of(dps_find_store(c("never-created").as_ptr())), "0,110");
        assert_eq!(dps_get_last_store_error_code(), 110);

        assert_eq!(
            text_of(dps_put(12345, ptr::null(), 5, ptr::null(), 0)),
            "false,160"
        );
        assert_eq!(dps_get_last_store_error_code(), 160);
        assert!(text_of(dps_get_last_store_error_string()).contains("key is null"));

        assert_eq!(text_of(dps_create_store(ptr::null(), ptr::null(), ptr::null())), "0,160");
        assert_eq!(dps_get_last_store_error_code(), 160);

        assert_eq!(text_of(dps_get_ttl(ptr::null(), 3)), "false,160");
        assert_eq!(dps_get_last_error_code_ttl(), 160);

        assert_eq!(text_of(dl_create_or_get_lock(ptr::null())), "0,160");
        assert_eq!(dl_get_last_lock_error_code(), 160);

        let bad_scope = dps_run_command_http(
            9,
            c("GET").as_ptr(),
            c("").as_ptr(),
            c("/").as_ptr(),
            c("").as_ptr(),
            c("").as_ptr(),
        );
        assert_eq!(text_of(bad_scope), "false,99,");
        assert_eq!(dps_get_last_store_error_code(), 99);

        let created = text_of(dps_create_or_get_store(
            c("slots").as_ptr(),
            c("k").as_ptr(),
            c("v").as_ptr(),
        ));
        assert!(created.ends_with(",0"), "{created}");
        assert_eq!(dps_get_last_store_error_code(), 0);
        assert_eq!(dps_get_last_error_code_ttl(), 160);
    }
}
