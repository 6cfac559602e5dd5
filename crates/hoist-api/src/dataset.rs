use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::digest::Digest;
use crate::time;
use crate::workspace::WorkspaceRef;

/// A transfer session against the dataset storage endpoint.
///
/// The token is a short-lived credential scoped to this one dataset; the
/// address points at the storage host, which is distinct from the main API
/// host. A session is created once per dataset and is void once the dataset
/// has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStorage {
    pub id: String,
    pub token: String,
    pub token_expires: DateTime<Utc>,
    pub address: String,
    /// Size summary, when the remote side has one. Only trust the byte
    /// count once `final` is set.
    #[serde(default)]
    pub size: Option<DatasetSize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSize {
    pub files: u64,
    pub bytes: u64,
    #[serde(rename = "final", default)]
    pub final_: Option<bool>,
}

impl DatasetSize {
    /// Whether the remote side has finished computing the total.
    pub fn is_final(&self) -> bool {
        self.final_.unwrap_or(false)
    }
}

/// One file in a dataset manifest.
///
/// The download URL is transient: it is only valid for the lifetime of the
/// manifest page that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<Digest>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One page of a dataset manifest. An empty cursor marks the final page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPage {
    #[serde(default)]
    pub files: Vec<FileInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<Account>,
    pub created: DateTime<Utc>,
    #[serde(default, with = "time::nullable")]
    pub committed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub workspace_ref: Option<WorkspaceRef>,
    #[serde(default)]
    pub storage: Option<DatasetStorage>,
}

impl Dataset {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<bool>,
}
