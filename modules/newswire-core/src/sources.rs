use async_trait::async_trait;

use crate::model::SourceConfig;

/// Yields the `SourceConfig` list at startup (§6.1, "Source Config
/// Loader"). Treated as immutable thereafter — loading `SourceConfig`
/// from a file or remote store is out of scope for this core (§1(e));
/// this trait is the seam a caller plugs such a loader into.
#[async_trait]
pub trait SourceConfigLoader: Send + Sync {
    async fn load(&self) -> Vec<SourceConfig>;
}

/// A fixed, in-memory source list, for callers that construct
/// `SourceConfig` values in code (or in tests) rather than from an
/// external file.
pub struct StaticSourceConfigLoader {
    sources: Vec<SourceConfig>,
}

impl StaticSourceConfigLoader {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl SourceConfigLoader for StaticSourceConfigLoader {
    async fn load(&self) -> Vec<SourceConfig> {
        self.sources.clone()
    }
}
