use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelPackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Source directory {} does not exist", .0.display())]
    SourceDirMissing(PathBuf),
    #[error("{} has no suffix listed in the suffix map", .0.display())]
    UnresolvedSuffix(PathBuf),
    #[error("Failed to decode {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Unsupported channel count: {0} (expected 1, 3 or 4)")]
    UnsupportedChannelCount(usize),
    #[error("Channel size {}x{} does not match canvas {}x{}", actual.0, actual.1, expected.0, expected.1)]
    ChannelSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Failed to write {}: {source}", path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl ChannelPackerError {
    /// Fatal errors abort the whole run; everything else is scoped to a file, role or target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid(_) | Self::SourceDirMissing(_) | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChannelPackerError>;
