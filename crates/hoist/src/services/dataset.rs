use std::path::Path;

use bytes::Bytes;
use hoist_api::{Dataset, DatasetPatch, DatasetSpec, Digest, FileInfo};
use hoist_http::{ByteStream, Method, Payload, Request};
use hoist_transfer::{
    DownloadOptions, FileIterator, TransferError, UploadOptions, fetch, sync_source, upload_bytes,
};
use tracing::debug;

use crate::client::Hoist;
use crate::error::{Error, Result};
use crate::services::{url_quote, validate_name};

/// A dataset argument: either a bare ID/name or an already-fetched record.
#[derive(Debug, Clone, Copy)]
pub enum DatasetRef<'a> {
    Id(&'a str),
    Resolved(&'a Dataset),
}

impl<'a> From<&'a str> for DatasetRef<'a> {
    fn from(id: &'a str) -> Self {
        DatasetRef::Id(id)
    }
}

impl<'a> From<&'a Dataset> for DatasetRef<'a> {
    fn from(dataset: &'a Dataset) -> Self {
        DatasetRef::Resolved(dataset)
    }
}

#[derive(Debug, Clone)]
pub struct CreateDatasetOptions {
    /// Workspace to create the dataset in; defaults to the configured
    /// default workspace.
    pub workspace: Option<String>,
    pub description: Option<String>,
    /// Overwrite an existing dataset by the same name.
    pub force: bool,
    /// Commit the dataset after a successful upload.
    pub commit: bool,
    /// Upload sources under a directory of this name.
    pub target: Option<String>,
    pub upload: UploadOptions,
}

impl Default for CreateDatasetOptions {
    fn default() -> Self {
        Self {
            workspace: None,
            description: None,
            force: false,
            commit: true,
            target: None,
            upload: UploadOptions::default(),
        }
    }
}

pub struct DatasetClient<'a> {
    pub(crate) hoist: &'a Hoist,
}

impl DatasetClient<'_> {
    /// Get info about a dataset by ID or name. A bare name is retried
    /// with the account prefix before giving up.
    pub async fn get(&self, dataset: &str) -> Result<Dataset> {
        match self.get_raw(dataset).await {
            Err(Error::DatasetNotFound(_)) if !dataset.contains('/') => {
                let account = self.hoist.account().whoami().await?;
                match self
                    .get_raw(&format!("{}/{}", account.name, dataset))
                    .await
                {
                    Err(Error::DatasetNotFound(_)) => {
                        Err(Error::DatasetNotFound(dataset.to_string()))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn get_raw(&self, id: &str) -> Result<Dataset> {
        let response = self
            .hoist
            .transport()
            .send(Request::new(
                Method::Get,
                format!("datasets/{}", url_quote(id)),
            ))
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(404) => {
                Err(Error::DatasetNotFound(id.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Create a dataset, optionally populating it from a local file or
    /// directory and committing it.
    pub async fn create(
        &self,
        name: &str,
        source: Option<&Path>,
        options: &CreateDatasetOptions,
    ) -> Result<Dataset> {
        validate_name(name)?;
        let workspace = self
            .hoist
            .workspaces()
            .resolve(options.workspace.as_deref(), false)
            .await?;
        let spec = DatasetSpec {
            workspace: Some(workspace.id.clone()),
            description: options.description.clone(),
        };
        let dataset = match self.post_new(name, &spec).await {
            Err(Error::DatasetConflict(_)) if options.force => {
                let account = self.hoist.account().whoami().await?;
                self.delete(&*format!("{}/{}", account.name, name)).await?;
                self.post_new(name, &spec).await?
            }
            other => other?,
        };
        debug!(id = %dataset.id, name, "created dataset");

        if let Some(source) = source {
            self.sync(&dataset, source, options.target.as_deref(), &options.upload)
                .await?;
        }
        if options.commit {
            self.commit(&dataset).await?;
        }
        self.get(&dataset.id).await
    }

    async fn post_new(&self, name: &str, spec: &DatasetSpec) -> Result<Dataset> {
        let response = self
            .hoist
            .transport()
            .send(
                Request::new(Method::Post, "datasets")
                    .query("name", name)
                    .payload(Payload::Json(serde_json::to_value(spec)?)),
            )
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(409) => {
                Err(Error::DatasetConflict(name.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Commit the dataset, sealing its contents. Committing twice is a
    /// no-op server-side, so a retried request is harmless.
    pub async fn commit<'r>(&self, dataset: impl Into<DatasetRef<'r>>) -> Result<Dataset> {
        let id = self.resolve(dataset.into()).await?.id;
        let patch = DatasetPatch {
            commit: Some(true),
            ..Default::default()
        };
        let response = self
            .hoist
            .transport()
            .send(
                Request::new(Method::Patch, format!("datasets/{}", url_quote(&id)))
                    .payload(Payload::Json(serde_json::to_value(&patch)?)),
            )
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(404) => Err(Error::DatasetNotFound(id)),
            Err(error) => Err(error.into()),
        }
    }

    /// Upload a local file or directory tree into an uncommitted dataset.
    pub async fn sync<'r>(
        &self,
        dataset: impl Into<DatasetRef<'r>>,
        source: &Path,
        target: Option<&str>,
        options: &UploadOptions,
    ) -> Result<()> {
        let (dataset, session) = self.writable_session(dataset.into()).await?;
        debug!(id = %dataset.id, source = %source.display(), "syncing dataset");
        sync_source(&session, source, target, options).await?;
        Ok(())
    }

    /// Upload raw bytes to a path inside an uncommitted dataset.
    pub async fn upload<'r>(
        &self,
        dataset: impl Into<DatasetRef<'r>>,
        source: Bytes,
        target: &str,
        options: &UploadOptions,
    ) -> Result<()> {
        let (_, session) = self.writable_session(dataset.into()).await?;
        upload_bytes(&session, source, target, &options.progress).await?;
        Ok(())
    }

    /// Download the whole dataset into `target_dir`.
    pub async fn fetch<'r>(
        &self,
        dataset: impl Into<DatasetRef<'r>>,
        target_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<()> {
        let dataset = self.resolve_with_storage(dataset.into()).await?;
        let storage = dataset
            .storage
            .as_ref()
            .ok_or_else(|| Error::DatasetReadError(dataset.id.clone()))?;
        let session = self.hoist.storage_session(storage);
        fetch(&session, storage.size.as_ref(), target_dir, options).await?;
        Ok(())
    }

    /// Lazily iterate the dataset's file manifest.
    pub async fn files<'r>(&self, dataset: impl Into<DatasetRef<'r>>) -> Result<FileIterator> {
        let dataset = self.resolve_with_storage(dataset.into()).await?;
        let storage = dataset
            .storage
            .as_ref()
            .ok_or_else(|| Error::DatasetReadError(dataset.id.clone()))?;
        Ok(FileIterator::new(self.hoist.storage_session(storage)))
    }

    /// List every file in the dataset.
    pub async fn ls<'r>(&self, dataset: impl Into<DatasetRef<'r>>) -> Result<Vec<FileInfo>> {
        let mut files = self.files(dataset).await?;
        let mut out = Vec::new();
        while let Some(file) = files.next().await {
            out.push(file?);
        }
        Ok(out)
    }

    /// Total size of the dataset in bytes.
    pub async fn size<'r>(&self, dataset: impl Into<DatasetRef<'r>>) -> Result<u64> {
        let files = self.ls(dataset).await?;
        Ok(files.iter().filter_map(|f| f.size).sum())
    }

    /// Metadata for a single file in the dataset.
    pub async fn file_info<'r>(
        &self,
        dataset: impl Into<DatasetRef<'r>>,
        path: &str,
    ) -> Result<FileInfo> {
        let dataset = self.resolve_with_storage(dataset.into()).await?;
        let storage = dataset
            .storage
            .as_ref()
            .ok_or_else(|| Error::DatasetReadError(dataset.id.clone()))?;
        let session = self.hoist.storage_session(storage);
        match session.file_info(path).await {
            Ok(info) => Ok(info),
            Err(error) if error.status() == Some(404) => {
                Err(Error::FileNotFound(path.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Download the full contents of a single file, verifying its digest.
    pub async fn get_file<'r>(
        &self,
        dataset: impl Into<DatasetRef<'r>>,
        path: &str,
    ) -> Result<Bytes> {
        let dataset = self.resolve_with_storage(dataset.into()).await?;
        let storage = dataset
            .storage
            .as_ref()
            .ok_or_else(|| Error::DatasetReadError(dataset.id.clone()))?;
        let session = self.hoist.storage_session(storage);
        let info = match session.file_info(path).await {
            Ok(info) => Some(info),
            Err(error) if error.status() == Some(404) => {
                return Err(Error::FileNotFound(path.to_string()));
            }
            Err(error) => return Err(error.into()),
        };
        let bytes = match session.get_file(path, 0, None).await {
            Ok(response) => response.bytes().await.map_err(Error::from)?,
            Err(error) if error.status() == Some(404) => {
                return Err(Error::FileNotFound(path.to_string()));
            }
            Err(error) => return Err(error.into()),
        };
        if let Some(expected) = info.and_then(|i| i.digest) {
            let actual = Digest::compute(&bytes);
            if actual != expected {
                return Err(TransferError::ChecksumMismatch {
                    path: path.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                }
                .into());
            }
        }
        Ok(bytes)
    }

    /// Stream the contents of a single file, optionally ranged. Ranged
    /// reads skip checksum validation.
    pub async fn stream_file<'r>(
        &self,
        dataset: impl Into<DatasetRef<'r>>,
        path: &str,
        offset: u64,
        length: Option<u64>,
    ) -> Result<ByteStream> {
        let dataset = self.resolve_with_storage(dataset.into()).await?;
        let storage = dataset
            .storage
            .as_ref()
            .ok_or_else(|| Error::DatasetReadError(dataset.id.clone()))?;
        let session = self.hoist.storage_session(storage);
        match session.get_file(path, offset, length).await {
            Ok(response) => Ok(response.into_body()),
            Err(error) if error.status() == Some(404) => {
                Err(Error::FileNotFound(path.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn delete<'r>(&self, dataset: impl Into<DatasetRef<'r>>) -> Result<()> {
        let id = self.resolve(dataset.into()).await?.id;
        let response = self
            .hoist
            .transport()
            .send(Request::new(
                Method::Delete,
                format!("datasets/{}", url_quote(&id)),
            ))
            .await;
        match response {
            Ok(_) => Ok(()),
            Err(error) if error.status() == Some(404) => Err(Error::DatasetNotFound(id)),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn rename<'r>(
        &self,
        dataset: impl Into<DatasetRef<'r>>,
        name: &str,
    ) -> Result<Dataset> {
        validate_name(name)?;
        let id = self.resolve(dataset.into()).await?.id;
        let patch = DatasetPatch {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let response = self
            .hoist
            .transport()
            .send(
                Request::new(Method::Patch, format!("datasets/{}", url_quote(&id)))
                    .payload(Payload::Json(serde_json::to_value(&patch)?)),
            )
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(409) => {
                Err(Error::DatasetConflict(name.to_string()))
            }
            Err(error) if error.status() == Some(404) => Err(Error::DatasetNotFound(id)),
            Err(error) => Err(error.into()),
        }
    }

    pub fn url(&self, dataset: &Dataset) -> String {
        format!(
            "{}/ds/{}",
            self.hoist.config().agent_address.trim_end_matches('/'),
            url_quote(&dataset.id)
        )
    }

    async fn resolve(&self, dataset: DatasetRef<'_>) -> Result<Dataset> {
        match dataset {
            DatasetRef::Id(id) => self.get(id).await,
            DatasetRef::Resolved(dataset) => Ok(dataset.clone()),
        }
    }

    /// Resolve and make sure the storage session is populated; records
    /// fetched before the server assigned storage need one more get.
    async fn resolve_with_storage(&self, dataset: DatasetRef<'_>) -> Result<Dataset> {
        let mut dataset = self.resolve(dataset).await?;
        if dataset.storage.is_none() {
            dataset = self.get(&dataset.id).await?;
        }
        Ok(dataset)
    }

    /// Resolve for writing: the dataset must be uncommitted and have a
    /// storage session.
    async fn writable_session(
        &self,
        dataset: DatasetRef<'_>,
    ) -> Result<(Dataset, hoist_transfer::StorageSession)> {
        let dataset = self.resolve_with_storage(dataset).await?;
        if dataset.committed.is_some() {
            return Err(Error::DatasetWriteError(dataset.id.clone()));
        }
        let storage = dataset
            .storage
            .as_ref()
            .ok_or_else(|| Error::DatasetReadError(dataset.id.clone()))?;
        let session = self.hoist.storage_session(storage);
        Ok((dataset, session))
    }
}
