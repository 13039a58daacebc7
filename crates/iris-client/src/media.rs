//! Media upload pipeline - resumable upload sessions
//!
//! Three phases against the Graph upload API: open a session with the file
//! metadata, stream the file in fixed 5 MiB chunks (sequential, each chunk
//! carrying its byte offset), then finalize to obtain the reusable media
//! handle. Validation happens before the session is opened: a missing file,
//! a MIME type outside the allow-list, or a file over the per-type cap
//! fails with [`Error::InvalidMedia`] and zero network calls.

use crate::endpoints::Endpoint;
use crate::transport::{HttpMethod, Transport};
use iris_core::{Error, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument};

/// Upload chunk size: 5 MiB.
pub const CHUNK_SIZE: usize = 5 * 1024 * 1024;

const MIB: u64 = 1024 * 1024;

/// MIME types accepted for upload, with the maximum file size for each.
const ALLOWED_TYPES: [(&str, u64); 12] = [
    ("image/jpeg", 5 * MIB),
    ("image/png", 5 * MIB),
    ("image/webp", 5 * MIB),
    ("video/mp4", 16 * MIB),
    ("video/3gpp", 16 * MIB),
    ("audio/aac", 16 * MIB),
    ("audio/amr", 16 * MIB),
    ("audio/mp4", 16 * MIB),
    ("audio/mpeg", 16 * MIB),
    ("audio/ogg", 16 * MIB),
    ("text/plain", 100 * MIB),
    ("application/pdf", 100 * MIB),
];

/// Maximum file size for a MIME type, `None` when the type is disallowed.
#[must_use]
pub fn max_size_for(mime_type: &str) -> Option<u64> {
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == mime_type)
        .map(|(_, limit)| *limit)
}

/// The chunked upload pipeline.
pub struct MediaUploader {
    transport: Arc<dyn Transport>,
}

impl MediaUploader {
    /// Create an uploader over a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Validate, open a session, stream the file, finalize.
    /// Returns the reusable media handle.
    #[instrument(skip(self), fields(mime_type))]
    pub async fn upload(&self, file_path: &Path, mime_type: &str) -> Result<String> {
        let file_length = validate_file(file_path, mime_type).await?;
        let session_id = self.init_session(file_path, mime_type, file_length).await?;
        self.upload_file(&session_id, file_path).await?;
        let handle = self.finalize(&session_id).await?;
        info!(handle = %handle, "media upload complete");
        Ok(handle)
    }

    /// Open an upload session. Returns the provider session id.
    pub async fn init_session(
        &self,
        file_path: &Path,
        mime_type: &str,
        file_length: u64,
    ) -> Result<String> {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let path = Endpoint::MediaUploadInit.render(&[])?;
        let query = vec![
            ("file_length".to_string(), file_length.to_string()),
            ("file_type".to_string(), mime_type.to_string()),
            ("file_name".to_string(), file_name),
        ];

        let response = self
            .transport
            .request_json(HttpMethod::Post, &path, &query, None)
            .await?;

        response["id"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::MediaUpload("upload session response has no session id".into())
            })
    }

    /// Stream the file into the session in sequential 5 MiB chunks.
    ///
    /// Each chunk is an independent request carrying its byte offset. There
    /// is no parallel chunk upload and no resumption across process
    /// restarts; a failed chunk fails the whole upload.
    pub async fn upload_file(&self, session_id: &str, file_path: &Path) -> Result<()> {
        let path = Endpoint::MediaUploadSession.render(&[("session_id", session_id)])?;

        let mut file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| Error::MediaUpload(format!("open {}: {e}", file_path.display())))?;

        let mut offset: u64 = 0;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| Error::MediaUpload(format!("read {}: {e}", file_path.display())))?;
            if read == 0 {
                break;
            }
            debug!(offset, bytes = read, "uploading chunk");
            self.transport
                .upload_chunk(&path, offset, buffer[..read].to_vec())
                .await?;
            offset += read as u64;
        }
        Ok(())
    }

    /// Fetch the short-lived download URL for an uploaded media object.
    pub async fn media_url(&self, media_id: &str) -> Result<String> {
        let path = Endpoint::Media.render(&[("media_id", media_id)])?;
        let response = self
            .transport
            .request_json(HttpMethod::Get, &path, &[], None)
            .await?;

        response["url"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| Error::MediaUpload("media object has no download url".into()))
    }

    /// Finalize the session. Returns the media handle; the session is
    /// consumed by the provider on success.
    pub async fn finalize(&self, session_id: &str) -> Result<String> {
        let path = Endpoint::MediaUploadSession.render(&[("session_id", session_id)])?;
        let response = self
            .transport
            .request_json(HttpMethod::Get, &path, &[], None)
            .await?;

        response["h"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::MediaUpload("upload session finished without a media handle".into())
            })
    }
}

/// Pre-upload validation: the file must exist, the MIME type must be in
/// the allow-list, and the file must fit its per-type cap. Returns the
/// file length for the session init call.
async fn validate_file(file_path: &Path, mime_type: &str) -> Result<u64> {
    let allowed: Vec<&str> = ALLOWED_TYPES.iter().map(|(mime, _)| *mime).collect();

    let Some(limit) = max_size_for(mime_type) else {
        return Err(Error::invalid_media(
            format!("media type '{mime_type}' is not allowed"),
            json!({ "mime_type": mime_type, "allowed": allowed }),
        ));
    };

    let metadata = tokio::fs::metadata(file_path).await.map_err(|_| {
        Error::invalid_media(
            format!("file not found: {}", file_path.display()),
            json!({ "path": file_path.display().to_string() }),
        )
    })?;

    let size = metadata.len();
    if size > limit {
        return Err(Error::invalid_media(
            format!(
                "file exceeds the {} byte limit for '{mime_type}'",
                limit
            ),
            json!({ "mime_type": mime_type, "size": size, "limit": limit }),
        ));
    }
    Ok(size)
}
