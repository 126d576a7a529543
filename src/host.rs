//! Static host identification.

use crate::encoding::{ResultText, DELIMITER, HOST_DETAILS_CEILING};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDetails {
    pub machine_name: String,
    pub os_version: String,
    pub cpu_architecture: String,
}

impl HostDetails {
    pub fn current() -> Self {
        if let Some(details) = uname() {
            return details;
        }
        Self {
            machine_name: "localhost".to_string(),
            os_version: std::env::consts::OS.to_string(),
            cpu_architecture: std::env::consts::ARCH.to_string(),
        }
    }

    /// `machine,os,arch`, with any delimiter inside a field blanked out.
    pub fn encode(&self) -> Result<String> {
        let clean = |field: &str| field.replace(DELIMITER, " ");
        ResultText::fields([
            clean(&self.machine_name),
            clean(&self.os_version),
            clean(&self.cpu_architecture),
        ])
        .with_ceiling(HOST_DETAILS_CEILING)
        .finish()
    }
}

#[cfg(unix)]
fn uname() -> Option<HostDetails> {
    use std::ffi::CStr;

    // SAFETY: utsname is plain old data and uname fills it in.
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return None;
    }
    let field = |raw: &[libc::c_char]| {
        // SAFETY: uname NUL-terminates every field.
        unsafe { CStr::from_ptr(raw.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    };
    Some(HostDetails {
        machine_name: field(&uts.nodename),
        os_version: format!("{} {}", field(&uts.sysname), field(&uts.release)),
        cpu_architecture: field(&uts.machine),
    })
}

#[cfg(not(unix))]
fn uname() -> Option<HostDetails> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_populated() {
        let details = HostDetails::current();
        assert!(!details.cpu_architecture.is_empty());
        assert!(!details.os_version.is_empty());
    }

    #[test]
    fn test_encode_has_three_fields() {
        let details = HostDetails {
            machine_name: "node,7".into(),
            os_version: "Linux 6.1".into(),
            cpu_architecture: "x86_64".into(),
        };
        let text = details.encode().unwrap();
        assert_eq!(text, "node 7,Linux 6.1,x86_64");
        assert_eq!(text.split(DELIMITER).count(), 3);
    }
}
