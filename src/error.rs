use thiserror::Error;

/// Central error type for the stem-splitter-ui crate.
#[derive(Debug, Error)]
pub enum StemError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // User input
    #[error("No audio file provided")]
    NoAudio,

    #[error("Please enter a YouTube URL")]
    MissingUrl,

    // Acquisition
    #[error("Download failed - no output file found")]
    DownloadFailed,

    #[error("Downloader error: {0}")]
    Downloader(String),

    // Configuration
    #[error("Unknown stem configuration: {0}")]
    UnknownConfig(String),

    #[error("Model `{model}` has no `{stem}` stem")]
    MissingStem { model: String, stem: String },

    #[error("Model `{model}` produces {native} stems, cannot render {requested}")]
    StemCountMismatch {
        model: String,
        native: usize,
        requested: usize,
    },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Checksum mismatch for {path}")]
    Checksum { path: String },

    #[error("Cache dir not available")]
    CacheDirUnavailable,
}

impl StemError {
    /// Errors caused by what the user typed or selected, as opposed to a fault
    /// in acquisition, the model, or the filesystem.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            StemError::NoAudio | StemError::MissingUrl | StemError::UnknownConfig(_)
        )
    }
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for StemError {
    fn from(e: std::io::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for StemError {
    fn from(e: serde_json::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<reqwest::Error> for StemError {
    fn from(e: reqwest::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<hound::Error> for StemError {
    fn from(e: hound::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<symphonia::core::errors::Error> for StemError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<ndarray::ShapeError> for StemError {
    fn from(e: ndarray::ShapeError) -> Self {
        StemError::Anyhow(e.into())
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for StemError {
    fn from(e: ort::Error) -> Self {
        StemError::Anyhow(anyhow::anyhow!("onnx runtime: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, StemError>;
