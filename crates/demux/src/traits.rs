//! Prober trait definition.

use std::path::PathBuf;

use async_trait::async_trait;

use fp_common::{ProbeError, ProbeResult};

/// Backing input of a media source, as supplied by the storage layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MediaInput {
    File(PathBuf),
    Url(String),
}

impl MediaInput {
    /// String form passed to external tools.
    pub fn location(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Url(_) => None,
        }
    }
}

/// Extracts container and track information from a media input.
///
/// Implementations only report what the container says; decode paths in
/// the returned tracks are placeholders until the capability resolver
/// fills them in.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, input: &MediaInput) -> Result<ProbeResult, ProbeError>;
}
