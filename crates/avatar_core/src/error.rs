use thiserror::Error;

/// Failure reported by whatever fetches assets or textures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("asset {0} contains no scene")]
    EmptyAsset(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("primary asset url is empty")]
    MissingPrimaryAsset,
    #[error("gain for {bucket} must be finite and non-negative, got {gain}")]
    InvalidGain { bucket: &'static str, gain: f32 },
    #[error("invalid pose fit: {0}")]
    InvalidPoseFit(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("morph target {name} points at influence {index} but only {len} exist")]
    MorphIndexOutOfRange { name: String, index: usize, len: usize },
    #[error("unknown parent node {0}")]
    UnknownParent(usize),
}
