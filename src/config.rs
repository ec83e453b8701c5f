use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Deployment};

pub const DEFAULT_STORAGE_KEY: &str = "value-cards-game";

/// 会话配置。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    #[serde(default)]
    pub deployment: Deployment,
    /// Fixed shuffle seed; `None` seeds from the platform entropy source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deployment: Deployment::default(),
            seed: None,
            storage_key: default_storage_key(),
        }
    }
}

impl SessionConfig {
    pub fn from_deployment(deployment: Deployment) -> Self {
        Self {
            deployment,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.deployment.catalog()
    }

    pub fn make_rng(&self) -> SmallRng {
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        }
    }
}
