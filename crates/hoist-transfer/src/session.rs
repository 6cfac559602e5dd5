use bytes::Bytes;
use hoist_api::{DatasetStorage, Digest, FileInfo, ManifestPage};
use hoist_http::{ByteStream, HttpError, Method, Payload, Request, Response, Transport};

use crate::error::TransferError;

pub const HEADER_UPLOAD_ID: &str = "Upload-ID";
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";
pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";
pub const HEADER_DIGEST: &str = "Digest";
pub const HEADER_LAST_MODIFIED: &str = "Last-Modified";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";

/// The storage-endpoint wire contract for one dataset transfer session.
///
/// Addresses the storage host with the session's own short-lived token,
/// independent of the main API transport it was derived from.
#[derive(Clone)]
pub struct StorageSession {
    transport: Transport,
}

impl StorageSession {
    pub fn new(transport: &Transport, storage: &DatasetStorage) -> Self {
        Self {
            transport: transport.scoped(&storage.address, &storage.token),
        }
    }

    /// Open a resumable upload and return the server-assigned session ID.
    pub async fn create_upload(&self) -> Result<String, TransferError> {
        let response = self
            .transport
            .send(Request::new(Method::Post, "uploads"))
            .await?;
        response
            .header(HEADER_UPLOAD_ID)
            .map(str::to_string)
            .ok_or(TransferError::MissingUploadId)
    }

    /// Write one chunk at `offset` into a resumable upload. A `Digest`
    /// response header means the server has assembled enough to finalize.
    pub async fn patch_chunk(
        &self,
        upload_id: &str,
        chunk: Bytes,
        declared_total: u64,
        offset: u64,
    ) -> Result<Option<Digest>, TransferError> {
        let response = self
            .transport
            .send(
                Request::new(Method::Patch, format!("uploads/{upload_id}"))
                    .header(HEADER_UPLOAD_LENGTH, declared_total.to_string())
                    .header(HEADER_UPLOAD_OFFSET, offset.to_string())
                    .payload(Payload::Bytes(chunk)),
            )
            .await?;
        Ok(response.header(HEADER_DIGEST).map(Digest::from_encoded))
    }

    /// Put a file at its relative path: either the full small-file content,
    /// or an empty finalization of previously staged chunks.
    pub async fn put_file(
        &self,
        path: &str,
        payload: Payload,
        digest: Option<&Digest>,
    ) -> Result<(), TransferError> {
        let mut request = Request::new(Method::Put, format!("files/{path}")).payload(payload);
        if let Some(digest) = digest {
            request = request.header(HEADER_DIGEST, digest.encoded());
        }
        self.transport.send(request).await?;
        Ok(())
    }

    /// Fetch one manifest page. The initial cursor is the empty string.
    pub async fn manifest_page(&self, cursor: &str) -> Result<ManifestPage, TransferError> {
        let response = self
            .transport
            .send(
                Request::new(Method::Get, "manifest")
                    .query("cursor", cursor)
                    .query("path", "")
                    .query("url", "true"),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// HEAD a single file, decoding its metadata out of the headers.
    pub async fn file_info(&self, path: &str) -> Result<FileInfo, HttpError> {
        let response = self
            .transport
            .send(Request::new(Method::Head, format!("files/{path}")))
            .await?;
        let size = response
            .header(HEADER_CONTENT_LENGTH)
            .and_then(|v| v.parse::<u64>().ok());
        let digest = response.header(HEADER_DIGEST).map(Digest::from_encoded);
        let updated = response
            .header(HEADER_LAST_MODIFIED)
            .and_then(chrono_parse)
            .unwrap_or_else(chrono::Utc::now);
        Ok(FileInfo {
            path: path.to_string(),
            size,
            digest,
            updated,
            url: None,
        })
    }

    /// Stream a single file by its relative path, optionally ranged.
    pub async fn get_file(
        &self,
        path: &str,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Response, HttpError> {
        let mut request = Request::new(Method::Get, format!("files/{path}"));
        if offset > 0 {
            let range = match length {
                Some(len) => format!("bytes={}-{}", offset, offset + len - 1),
                None => format!("bytes={offset}-"),
            };
            request = request.header("Range", range);
        }
        self.transport.send(request).await
    }

    /// Stream a file's transient download URL. These are pre-signed, so no
    /// bearer token is attached.
    pub async fn stream_url(&self, url: &str) -> Result<ByteStream, HttpError> {
        let response = self
            .transport
            .send_absolute(Request::new(Method::Get, url))
            .await?;
        Ok(response.into_body())
    }
}

fn chrono_parse(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}
