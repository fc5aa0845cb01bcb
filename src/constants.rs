use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Context keys whose value is fixed for the lifetime of the process, such
/// as the host platform. Expressions reading them can be folded to
/// `true`/`false` before evaluation.
///
/// Each key may be set exactly once; a registry is safe to share between
/// threads.
#[derive(Debug, Default)]
pub struct ConstantRegistry {
    constants: DashMap<String, bool>,
}

impl ConstantRegistry {
    pub fn new() -> Self {
        Self { constants: DashMap::new() }
    }

    /// Registry seeded with `isMac`, `isLinux` and `isWindows` for the
    /// platform this binary was built for.
    pub fn with_platform() -> Self {
        let registry = Self::new();
        for (key, value) in platform_constants(std::env::consts::OS) {
            // a fresh registry cannot hold duplicates
            let _ = registry.set_constant(key, value);
        }
        registry
    }

    /// Async counterpart of [`with_platform`](Self::with_platform) for
    /// callers bootstrapping from a runtime.
    pub async fn probe_platform() -> Result<Self> {
        tokio::task::spawn_blocking(Self::with_platform)
            .await
            .map_err(|e| Error::host(format!("platform probe failed: {}", e)))
    }

    pub fn set_constant(&self, key: impl Into<String>, value: bool) -> Result<()> {
        match self.constants.entry(key.into()) {
            Entry::Occupied(entry) => {
                tracing::warn!(key = %entry.key(), "constant already set");
                Err(Error::ConstantAlreadySet(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.constants.get(key).map(|v| *v.value())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constants.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.constants.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

fn platform_constants(os: &str) -> [(&'static str, bool); 3] {
    [("isMac", os == "macos"), ("isLinux", os == "linux"), ("isWindows", os == "windows")]
}

lazy_static::lazy_static! {
    static ref GLOBAL: Arc<ConstantRegistry> = Arc::new(ConstantRegistry::with_platform());
}

/// Process-wide registry, seeded with the platform constants on first use.
pub fn global() -> Arc<ConstantRegistry> {
    GLOBAL.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_set_once() {
        let registry = ConstantRegistry::new();
        registry.set_constant("isWeb", false).unwrap();
        assert_eq!(registry.get("isWeb"), Some(false));
        assert_eq!(registry.set_constant("isWeb", true), Err(Error::ConstantAlreadySet("isWeb".to_string())));
        assert_eq!(registry.get("isWeb"), Some(false));
        assert_eq!(registry.get("other"), None);
    }

    #[test]
    fn platform_has_exactly_one_true_key_on_known_targets() {
        let linux = platform_constants("linux");
        assert_eq!(linux.iter().filter(|(_, v)| *v).count(), 1);
        assert_eq!(platform_constants("freebsd").iter().filter(|(_, v)| *v).count(), 0);

        let registry = ConstantRegistry::with_platform();
        assert_eq!(registry.keys(), vec!["isLinux", "isMac", "isWindows"]);
    }

    #[tokio::test]
    async fn async_probe_matches_sync_seed() {
        let probed = ConstantRegistry::probe_platform().await.unwrap();
        let seeded = ConstantRegistry::with_platform();
        for key in seeded.keys() {
            assert_eq!(probed.get(&key), seeded.get(&key));
        }
    }

    #[test]
    fn global_registry_is_seeded_with_the_platform() {
        let registry = global();
        assert!(Arc::ptr_eq(&registry, &global()));
        assert_eq!(registry.keys(), vec!["isLinux", "isMac", "isWindows"]);
        assert_eq!(registry.get("isLinux"), Some(cfg!(target_os = "linux")));
    }
}
