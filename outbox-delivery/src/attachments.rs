//! Lazy attachment resolution.
//!
//! Records store references, not content. Content is loaded at send time,
//! and a reference that no longer resolves fails the attempt the same way a
//! transport failure would.

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use outbox_store::Attachment;

use crate::envelope::ResolvedAttachment;

/// Errors produced while resolving an attachment reference.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The referenced file does not exist.
    #[error("attachment not found: {0}")]
    NotFound(String),

    /// The referenced disk is not configured.
    #[error("unknown disk: {0}")]
    UnknownDisk(String),

    /// Reading the file failed for another reason.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Resolves stored attachment references into content.
#[async_trait]
pub trait AttachmentSource: Send + Sync + std::fmt::Debug {
    /// Load the content an attachment reference points at.
    ///
    /// # Errors
    /// Returns [`ResolutionError`] if the reference no longer resolves.
    async fn resolve(&self, attachment: &Attachment) -> Result<ResolvedAttachment, ResolutionError>;
}

/// Filesystem-backed attachment source.
///
/// Plain paths are read as-is; disk references are resolved against a named
/// root directory registered up front.
#[derive(Debug, Clone, Default)]
pub struct FsAttachmentSource {
    disks: HashMap<String, PathBuf>,
}

impl FsAttachmentSource {
    /// A source with no named disks; only plain paths resolve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named disk rooted at `root`.
    #[must_use]
    pub fn with_disk(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.disks.insert(name.into(), root.into());
        self
    }

    fn full_path(&self, attachment: &Attachment) -> Result<PathBuf, ResolutionError> {
        match &attachment.disk {
            Some(disk) => self
                .disks
                .get(disk)
                .map(|root| root.join(&attachment.path))
                .ok_or_else(|| ResolutionError::UnknownDisk(disk.clone())),
            None => Ok(PathBuf::from(&attachment.path)),
        }
    }
}

#[async_trait]
impl AttachmentSource for FsAttachmentSource {
    async fn resolve(&self, attachment: &Attachment) -> Result<ResolvedAttachment, ResolutionError> {
        let path = self.full_path(attachment)?;

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResolutionError::NotFound(path.display().to_string()));
            }
            Err(source) => {
                return Err(ResolutionError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let filename = attachment.display_name.clone().unwrap_or_else(|| {
            path.file_name()
                .map_or_else(|| attachment.path.clone(), |name| {
                    name.to_string_lossy().into_owned()
                })
        });

        Ok(ResolvedAttachment {
            filename,
            mime: attachment.mime.clone(),
            content,
        })
    }
}
