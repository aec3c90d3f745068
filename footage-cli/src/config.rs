//! Process configuration read from the environment

use std::path::PathBuf;
use std::time::Duration;

use footage_core::{FootageError, FootageResult};
use footage_twelvelabs::{TwelveLabsConfig, TWELVELABS_API_BASE};
use footage_vector::{WeaviateConfig, DEFAULT_COLLECTION};

const DEFAULT_STATUS_DB: &str = "data/embedding_status.db";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub index_id: String,
    pub twelvelabs_base_url: String,
    /// Unset selects the in-memory vector backend
    pub weaviate_url: Option<String>,
    pub weaviate_api_key: Option<String>,
    pub collection: String,
    pub status_db: PathBuf,
    pub http_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> FootageResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> FootageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| FootageError::config(format!("{} must be set", key)))
        };

        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                FootageError::config(format!("HTTP_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key: required("API_KEY")?,
            index_id: required("INDEX_ID")?,
            twelvelabs_base_url: get("TWELVELABS_BASE_URL")
                .unwrap_or_else(|| TWELVELABS_API_BASE.to_string()),
            weaviate_url: get("WEAVIATE_URL"),
            weaviate_api_key: get("WEAVIATE_API_KEY"),
            collection: get("VECTOR_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            status_db: get("EMBEDDING_STATUS_DB")
                .unwrap_or_else(|| DEFAULT_STATUS_DB.to_string())
                .into(),
            http_timeout: Duration::from_secs(http_timeout),
        })
    }

    pub fn twelvelabs(&self) -> TwelveLabsConfig {
        let mut config = TwelveLabsConfig::new(&self.api_key, &self.index_id);
        config.base_url = self.twelvelabs_base_url.clone();
        config.timeout = self.http_timeout;
        config
    }

    pub fn weaviate(&self) -> Option<WeaviateConfig> {
        self.weaviate_url.as_ref().map(|url| WeaviateConfig {
            url: url.clone(),
            api_key: self.weaviate_api_key.clone(),
            timeout: self.http_timeout,
        })
    }
}
