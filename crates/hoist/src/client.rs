use std::sync::Arc;
use std::time::Duration;

use hoist_api::{Account, DatasetStorage};
use hoist_http::{HttpClient, ReqwestClient, Transport};
use hoist_transfer::StorageSession;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::Result;
use crate::services::{
    AccountClient, DatasetClient, ExperimentClient, JobClient, WorkspaceClient,
};

const ACCOUNT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// A client session against the service.
///
/// Cheap accessors hand out per-resource clients; all of them share one
/// transport and its retry policy.
pub struct Hoist {
    config: Config,
    transport: Transport,
    account_cache: TtlCache<String, Account>,
}

impl Hoist {
    pub const API_VERSION: &'static str = "v3";

    /// Build a session from the environment (see [`Config::from_env`]).
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    pub fn new(config: Config) -> Result<Self> {
        let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);
        Ok(Self::with_client(config, client))
    }

    /// Build a session over a caller-supplied HTTP client.
    pub fn with_client(config: Config, client: Arc<dyn HttpClient>) -> Self {
        let base = format!(
            "{}/api/{}",
            config.agent_address.trim_end_matches('/'),
            Self::API_VERSION
        );
        let transport = Transport::new(client, base, &config.user_token);
        Self {
            config,
            transport,
            account_cache: TtlCache::new(ACCOUNT_CACHE_TTL),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    pub(crate) fn account_cache(&self) -> &TtlCache<String, Account> {
        &self.account_cache
    }

    pub(crate) fn storage_session(&self, storage: &DatasetStorage) -> StorageSession {
        StorageSession::new(&self.transport, storage)
    }

    pub fn account(&self) -> AccountClient<'_> {
        AccountClient { hoist: self }
    }

    pub fn workspaces(&self) -> WorkspaceClient<'_> {
        WorkspaceClient { hoist: self }
    }

    pub fn datasets(&self) -> DatasetClient<'_> {
        DatasetClient { hoist: self }
    }

    pub fn experiments(&self) -> ExperimentClient<'_> {
        ExperimentClient { hoist: self }
    }

    pub fn jobs(&self) -> JobClient<'_> {
        JobClient { hoist: self }
    }
}
