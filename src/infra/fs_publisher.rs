use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::app::{PublisherPort, VersionToken, WriteOutcome};
use crate::error::PortError;

/// Publishes into a local directory; used for dry runs. The sha256 of the
/// stored bytes is the version token.
pub struct FsPublisher {
    root: PathBuf,
}

impl FsPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

pub fn content_token(bytes: &[u8]) -> VersionToken {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    VersionToken(hex::encode(hasher.finalize()))
}

fn io_error(path: &Path, err: std::io::Error) -> PortError {
    PortError::Transport(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl PublisherPort for FsPublisher {
    async fn read_current_version(&self, path: &str) -> Result<Option<VersionToken>, PortError> {
        let file = self.resolve(path);
        match fs::read(&file).await {
            Ok(bytes) => Ok(Some(content_token(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&file, e)),
        }
    }

    #[instrument(skip(self, content), fields(root = %self.root.display()))]
    async fn write(
        &self,
        path: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> Result<WriteOutcome, PortError> {
        let current = self.read_current_version(path).await?;
        if current.as_ref() != expected {
            return Ok(WriteOutcome::Conflict);
        }

        let file = self.resolve(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
        }
        fs::write(&file, content.as_bytes()).await.map_err(|e| io_error(&file, e))?;

        let token = content_token(content.as_bytes());
        info!("💾 Wrote {} ({})", file.display(), token);
        Ok(WriteOutcome::Written(token))
    }
}
