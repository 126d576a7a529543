//! The process-global bridge used by the foreign call surfaces.
//!
//! It is built lazily on first use from the configuration set with
//! [`set_config_file`] and the products registered with [`register_backend`].
//! A failed initialization is remembered and reported by every later call.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::backend::Services;
use crate::bridge::Bridge;
use crate::config::{BackendConfig, BackendRegistry};
use crate::error::{BridgeError, Result};
use crate::logging;

static BRIDGE: OnceCell<std::result::Result<Bridge, BridgeError>> = OnceCell::new();
static PENDING: Mutex<Pending> = Mutex::new(Pending {
    sealed: false,
    config_file: None,
    registry: None,
});

struct Pending {
    // set once initialization has consumed the settings
    sealed: bool,
    config_file: Option<PathBuf>,
    registry: Option<BackendRegistry>,
}

fn with_pending<R>(f: impl FnOnce(&mut Pending) -> R) -> Option<R> {
    let mut pending = PENDING.lock();
    if pending.sealed {
        return None;
    }
    Some(f(&mut pending))
}

/// Record the configuration file. Returns `false` once the bridge exists.
pub fn set_config_file(path: impl Into<PathBuf>) -> bool {
    let path = path.into();
    with_pending(|pending| pending.config_file = Some(path)).is_some()
}

/// Make another product selectable by name. Returns `false` once the bridge exists.
pub fn register_backend<F>(product: &str, factory: F) -> bool
where
    F: Fn(&BackendConfig) -> Result<Services> + Send + Sync + 'static,
{
    with_pending(|pending| {
        pending
            .registry
            .get_or_insert_with(BackendRegistry::default)
            .register(product, factory)
    })
    .is_some()
}

fn initialize() -> std::result::Result<Bridge, BridgeError> {
    logging::init();
    let (config_file, registry) = {
        let mut pending = PENDING.lock();
        pending.sealed = true;
        (pending.config_file.take(), pending.registry.take())
    };
    let registry = registry.unwrap_or_default();
    let bridge = BackendConfig::resolve(config_file.as_deref())
        .and_then(|config| Bridge::from_config(&config, &registry));
    match &bridge {
        Ok(bridge) => info!(product = bridge.product_name(), "global bridge ready"),
        Err(e) => error!(error = %e, "global bridge failed to initialize"),
    }
    bridge
}

/// The global bridge, initializing it on first call.
pub fn bridge() -> Result<&'static Bridge> {
    BRIDGE.get_or_init(initialize).as_ref().map_err(Clone::clone)
}

pub fn is_initialized() -> bool {
    BRIDGE.get().is_some()
}
