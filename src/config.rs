//! Backend configuration and the product-name registry.
//!
//! A configuration file lists the NoSQL product on its first meaningful line
//! and one server per following line:
//!
//! ```text
//! # comment lines and blank lines are skipped
//! memory
//! localhost:6379
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::backend::Services;
use crate::error::{BridgeError, Result};
use crate::memory::{self, MemoryBackend};

/// Where the configuration is looked for when none was set explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "etc/no-sql-kv-store-servers.cfg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub product: String,
    pub servers: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            product: memory::PRODUCT_NAME.to_string(),
            servers: Vec::new(),
        }
    }
}

impl BackendConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let product = lines
            .next()
            .ok_or_else(|| BridgeError::Initialize("configuration names no NoSQL product".into()))?
            .to_ascii_lowercase();
        let servers = lines.map(str::to_string).collect();
        Ok(Self { product, servers })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Initialize(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Explicit path, else the default path when present, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.is_file() {
            debug!(path = DEFAULT_CONFIG_PATH, "using default configuration file");
            return Self::from_file(fallback);
        }
        Ok(Self::default())
    }
}

pub type BackendFactory = Arc<dyn Fn(&BackendConfig) -> Result<Services> + Send + Sync>;

/// Maps product names to the factories that build their backends.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// A registry with no products at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, product: &str, factory: F)
    where
        F: Fn(&BackendConfig) -> Result<Services> + Send + Sync + 'static,
    {
        self.factories
            .insert(product.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn products(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(&self, config: &BackendConfig) -> Result<Services> {
        let factory = self
            .factories
            .get(&config.product.to_ascii_lowercase())
            .ok_or_else(|| {
                BridgeError::Initialize(format!("unsupported NoSQL product '{}'", config.product))
            })?;
        factory(config)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(memory::PRODUCT_NAME, |config| {
            Ok(Services::shared(Arc::new(MemoryBackend::with_servers(
                config.servers.clone(),
            ))))
        });
        registry
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("products", &self.products())
            .finish()
    }
}
