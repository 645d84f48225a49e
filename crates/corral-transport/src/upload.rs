// SPDX-License-Identifier: Apache-2.0
//! In-flight upload tracking across `upload_start`/`upload_chunk`/
//! `upload_complete`. Chunks must arrive at the offset equal to bytes
//! received so far; any other offset fails the upload outright rather than
//! attempting to reorder or buffer ahead.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::TransportError;

pub struct UploadState {
    pub project_id: String,
    pub session_id: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub received: u64,
    file: File,
    pub dest_path: PathBuf,
}

impl UploadState {
    pub async fn create(
        upload_id: &str,
        staging_dir: &std::path::Path,
        project_id: String,
        session_id: String,
        filename: String,
        size: u64,
        mime_type: String,
    ) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(staging_dir).await?;
        let dest_path = staging_dir.join(upload_id);
        let file = File::create(&dest_path).await?;
        Ok(Self {
            project_id,
            session_id,
            filename,
            size,
            mime_type,
            received: 0,
            file,
            dest_path,
        })
    }

    /// Append `chunk` at `offset`; fails the upload outright on mismatch
    /// rather than buffering out-of-order data.
    pub async fn write_chunk(&mut self, offset: u64, chunk: &[u8]) -> Result<(), TransportError> {
        if offset != self.received {
            return Err(TransportError::UploadOffsetMismatch(
                self.filename.clone(),
                self.received,
                offset,
            ));
        }
        self.file
            .write_all(chunk)
            .await
            .map_err(|_| TransportError::MalformedUploadChunk)?;
        self.received += chunk.len() as u64;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.size
    }

    /// Remove the partial file on cancel/error — every in-flight upload's
    /// partial file is released, never left behind.
    pub async fn discard(self) {
        drop(self.file);
        let _ = tokio::fs::remove_file(&self.dest_path).await;
    }
}

/// All in-flight uploads on one connection, keyed by `uploadId`.
#[derive(Default)]
pub struct UploadTable {
    entries: HashMap<String, UploadState>,
}

impl UploadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, upload_id: String, state: UploadState) {
        self.entries.insert(upload_id, state);
    }

    pub fn get_mut(&mut self, upload_id: &str) -> Option<&mut UploadState> {
        self.entries.get_mut(upload_id)
    }

    pub fn remove(&mut self, upload_id: &str) -> Option<UploadState> {
        self.entries.remove(upload_id)
    }

    pub async fn discard_all(&mut self) {
        for (_, state) in self.entries.drain() {
            state.discard().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_chunks_accumulate_received_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut upload = UploadState::create(
            "up-1",
            dir.path(),
            "proj".into(),
            "sess".into(),
            "file.txt".into(),
            10,
            "text/plain".into(),
        )
        .await
        .unwrap();

        upload.write_chunk(0, b"hello").await.unwrap();
        upload.write_chunk(5, b"world").await.unwrap();
        assert!(upload.is_complete());
    }

    #[tokio::test]
    async fn offset_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut upload = UploadState::create(
            "up-1",
            dir.path(),
            "proj".into(),
            "sess".into(),
            "file.txt".into(),
            10,
            "text/plain".into(),
        )
        .await
        .unwrap();

        upload.write_chunk(0, b"hello").await.unwrap();
        let result = upload.write_chunk(999, b"oops").await;
        assert!(matches!(result, Err(TransportError::UploadOffsetMismatch(_, 5, 999))));
    }

    #[tokio::test]
    async fn discard_removes_the_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload = UploadState::create(
            "up-1",
            dir.path(),
            "proj".into(),
            "sess".into(),
            "file.txt".into(),
            10,
            "text/plain".into(),
        )
        .await
        .unwrap();
        let path = upload.dest_path.clone();
        assert!(path.exists());
        upload.discard().await;
        assert!(!path.exists());
    }
}
