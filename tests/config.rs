//! Runs alone in its own binary: it configures the process-global bridge.

use std::ffi::{CStr, CString};

use dps_bridge::ffi::*;
use dps_bridge::global;

fn text_of(result: DpsResult) -> String {
    let text = unsafe { CStr::from_ptr(result.text) }
        .to_string_lossy()
        .into_owned();
    unsafe { dps_release_result(result) };
    text
}

#[test]
fn test_config_file_is_honored_until_first_use() {
    let path = std::env::temp_dir().join(format!("dps-bridge-it-{}.cfg", std::process::id()));
    std::fs::write(&path, "# test backend\nmemory\nhost-a:6379\n").unwrap();

    let c_path = CString::new(path.to_string_lossy().into_owned()).unwrap();
    assert!(unsafe { dps_set_config_file(c_path.as_ptr()) });
    assert!(!global::is_initialized());

    assert_eq!(text_of(dps_get_nosql_db_product_name()), "memory");
    assert!(global::is_initialized());
    std::fs::remove_file(&path).unwrap();

    assert!(!unsafe { dps_set_config_file(c_path.as_ptr()) });
    assert!(!global::register_backend("other", |_| unreachable!()));

    let servers = text_of(unsafe {
        dps_run_command_http(
            1,
            CString::new("GET").unwrap().as_ptr(),
            CString::new("").unwrap().as_ptr(),
            CString::new("/").unwrap().as_ptr(),
            CString::new("").unwrap().as_ptr(),
            CString::new("").unwrap().as_ptr(),
        )
    });
    assert!(servers.contains("host-a:6379"), "{servers}");
    assert_eq!(dps_get_last_store_error_code(), 0);
}
