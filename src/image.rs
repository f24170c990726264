//! Downloadable image entities
//!
//! An [`Image`] is built from list metadata on every fetch and is never
//! persisted on its own. Its on-disk location and verification state are
//! only changed by [`Image::download`].

use crate::cancel::CancelToken;
use crate::checksum::{self, Hasher};
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::transport::Transport;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Size of the blocks streamed from the transport to disk
const TRANSFER_BLOCK: usize = 64 * 1024;

/// Descriptive metadata of an image as published in its list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub identifier: String,
    pub title: String,
    pub description: String,
    pub uri: String,
    pub sha512: String,
    pub format: String,
    pub size: u64,
    pub arch: String,
    pub os: String,
    pub osname: String,
    pub osversion: String,
    pub hypervisor: String,
    pub version: String,
    pub comments: String,
    pub group: String,
    pub mpuri: String,
    pub user_fullname: String,
    pub user_guid: String,
    pub user_uri: String,
}

/// Result of a successful [`Image::download`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A valid copy was already on disk; nothing was transferred
    Cached,
    /// The image was transferred and verified
    Fetched { bytes: u64 },
}

/// A downloadable image artifact
#[derive(Debug, Clone, Serialize)]
pub struct Image {
    #[serde(flatten)]
    metadata: ImageMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<PathBuf>,
    verified: bool,
}

impl Image {
    pub fn new(metadata: ImageMetadata) -> Self {
        Self {
            metadata,
            location: None,
            verified: false,
        }
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn identifier(&self) -> &str {
        &self.metadata.identifier
    }

    pub fn uri(&self) -> &str {
        &self.metadata.uri
    }

    /// Expected hex SHA-512 digest
    pub fn sha512(&self) -> &str {
        &self.metadata.sha512
    }

    /// Where the image was materialized in this run, if it was
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Materialize the image as `dest_dir/<identifier>`.
    ///
    /// A valid file already at the target is adopted without touching the
    /// transport. Otherwise the image is streamed to a `.part` file, moved
    /// into place and verified. A file failing verification is left on disk
    /// for the next sweep.
    pub fn download(
        &mut self,
        dest_dir: &Path,
        transport: &dyn Transport,
        cancel: &CancelToken,
    ) -> ImgsyncResult<DownloadOutcome> {
        if let Some(location) = &self.location {
            return Err(ImgsyncError::AlreadyDownloaded(location.clone()));
        }

        let target = dest_dir.join(&self.metadata.identifier);

        if target.exists() {
            match checksum::verify(&target, &self.metadata.sha512) {
                Ok(true) => {
                    info!(
                        "Image '{}' already downloaded into {}",
                        self.metadata.identifier,
                        target.display()
                    );
                    self.mark_verified(target);
                    return Ok(DownloadOutcome::Cached);
                }
                Ok(false) => warn!(
                    "Image '{}' found in {} is not valid, downloading again",
                    self.metadata.identifier,
                    target.display()
                ),
                Err(e) => warn!(
                    "Could not verify image '{}' in {}: {}, downloading again",
                    self.metadata.identifier,
                    target.display(),
                    e
                ),
            }
        }

        let (bytes, obtained) = self.transfer(&target, transport, cancel)?;

        if !checksum::matches(&obtained, &self.metadata.sha512) {
            let err = ImgsyncError::VerificationFailed {
                id: self.metadata.identifier.clone(),
                expected: self.metadata.sha512.clone(),
                obtained,
            };
            error!("{}", err);
            return Err(err);
        }

        info!(
            "Image '{}' stored as {}",
            self.metadata.identifier,
            target.display()
        );
        self.mark_verified(target);
        Ok(DownloadOutcome::Fetched { bytes })
    }

    fn mark_verified(&mut self, location: PathBuf) {
        self.location = Some(location);
        self.verified = true;
    }

    /// Stream the image to `target`, returning bytes written and their digest
    fn transfer(
        &self,
        target: &Path,
        transport: &dyn Transport,
        cancel: &CancelToken,
    ) -> ImgsyncResult<(u64, String)> {
        info!(
            "Downloading image '{}' from '{}' into {}",
            self.metadata.identifier,
            self.metadata.uri,
            target.display()
        );

        cancel.check()?;
        let mut body = transport
            .open(&self.metadata.uri, None)
            .map_err(|e| self.download_failed(e))?;

        let partial = partial_path(target);
        let mut file = File::create(&partial)
            .map_err(|e| ImgsyncError::io(format!("creating {}", partial.display()), e))?;

        let mut hasher = Hasher::new();
        let mut buf = vec![0u8; TRANSFER_BLOCK];
        let mut total: u64 = 0;

        loop {
            cancel.check()?;
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ImgsyncError::DownloadFailed {
                        id: self.metadata.identifier.clone(),
                        status: None,
                        reason: e.to_string(),
                    })
                }
            };

            file.write_all(&buf[..n])
                .and_then(|()| file.flush())
                .map_err(|e| ImgsyncError::io(format!("writing {}", partial.display()), e))?;
            hasher.update(&buf[..n]);
            total += n as u64;
        }

        file.sync_all()
            .map_err(|e| ImgsyncError::io(format!("syncing {}", partial.display()), e))?;
        drop(file);

        fs::rename(&partial, target).map_err(|e| {
            ImgsyncError::io(
                format!("moving {} to {}", partial.display(), target.display()),
                e,
            )
        })?;

        Ok((total, hasher.finalize_hex()))
    }

    fn download_failed(&self, err: ImgsyncError) -> ImgsyncError {
        match err {
            ImgsyncError::Transport { status, reason, .. } => {
                error!(
                    "Cannot download image '{}': ({:?}) {}",
                    self.metadata.identifier, status, reason
                );
                ImgsyncError::DownloadFailed {
                    id: self.metadata.identifier.clone(),
                    status,
                    reason,
                }
            }
            other => other,
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
pub(crate) fn test_image(identifier: &str, uri: &str, content: &[u8]) -> Image {
    let mut hasher = Hasher::new();
    hasher.update(content);
    Image::new(ImageMetadata {
        identifier: identifier.to_string(),
        uri: uri.to_string(),
        sha512: hasher.finalize_hex(),
        size: content.len() as u64,
        ..Default::default()
    })
}
