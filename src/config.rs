//! Client and mapper configuration.

use std::env;

/// Default transactional-write ceiling of DynamoDB.
pub const DEFAULT_TRANSACTION_BATCH_SIZE: usize = 100;

/// How to build the DynamoDB client.
///
/// Credentials priority: static keys > named profile > default chain.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// AWS region (default chain, then us-east-1, if not set).
    pub region: Option<String>,
    /// Custom endpoint for local testing (LocalStack, DynamoDB Local).
    pub endpoint_url: Option<String>,
    /// Profile from ~/.aws/credentials.
    pub profile: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
}

impl ClientConfig {
    /// Read `DYNOMAP_REGION`, `DYNOMAP_ENDPOINT_URL` and `DYNOMAP_PROFILE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            region: env_string("DYNOMAP_REGION"),
            endpoint_url: env_string("DYNOMAP_ENDPOINT_URL"),
            profile: env_string("DYNOMAP_PROFILE"),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self.session_token = session_token;
        self
    }
}

/// Mapper behaviour.
#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// Items per transactional write. Larger inputs are split into chunks of
    /// this size, each atomic on its own.
    pub transaction_batch_size: usize,
    /// Use strongly consistent reads for `get` and table queries.
    pub consistent_reads: bool,
}

impl MapperConfig {
    /// Read `DYNOMAP_TRANSACTION_BATCH_SIZE` and `DYNOMAP_CONSISTENT_READS`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            transaction_batch_size: env::var("DYNOMAP_TRANSACTION_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.transaction_batch_size),
            consistent_reads: env_bool("DYNOMAP_CONSISTENT_READS", defaults.consistent_reads),
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            transaction_batch_size: DEFAULT_TRANSACTION_BATCH_SIZE,
            consistent_reads: false,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| {
        matches!(v.as_str(), "1" | "true" | "yes" | "TRUE" | "YES")
    })
}
