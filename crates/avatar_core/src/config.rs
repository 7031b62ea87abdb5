use serde::{Deserialize, Serialize};

use crate::avatar::PlaceholderKind;
use crate::error::ConfigError;
use crate::gain::GainTable;
use crate::loader::AssetSources;
use crate::pose::PoseFit;

pub const DEFAULT_PRIMARY_ASSET: &str = "avatar.glb";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AvatarConfig {
    pub primary_asset_url: String,
    #[serde(default)]
    pub fallback_asset_url: Option<String>,
    #[serde(default)]
    pub texture_url: Option<String>,
    #[serde(default, rename = "gainTable")]
    pub gains: GainTable,
    #[serde(default)]
    pub pose_fit: PoseFit,
    #[serde(default)]
    pub placeholder: PlaceholderKind,
    /// Show the placeholder while the first asset is still loading.
    #[serde(default)]
    pub placeholder_while_loading: bool,
    /// Bone that receives the head pose. The first bone found otherwise.
    #[serde(default)]
    pub pose_bone: Option<String>,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMARY_ASSET)
    }
}

impl AvatarConfig {
    pub fn new(primary_asset_url: impl Into<String>) -> Self {
        Self {
            primary_asset_url: primary_asset_url.into(),
            fallback_asset_url: None,
            texture_url: None,
            gains: GainTable::default(),
            pose_fit: PoseFit::default(),
            placeholder: PlaceholderKind::default(),
            placeholder_while_loading: false,
            pose_bone: None,
        }
    }

    pub fn from_json_slice(src: &[u8]) -> Result<Self, ConfigError> {
        let config = serde_json::from_slice::<AvatarConfig>(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_asset_url.trim().is_empty() {
            return Err(ConfigError::MissingPrimaryAsset);
        }
        self.gains.validate()?;
        self.pose_fit.validate()
    }

    pub fn sources(&self) -> AssetSources {
        AssetSources {
            primary: self.primary_asset_url.clone(),
            fallback: self.fallback_asset_url.clone(),
            texture: self.texture_url.clone(),
        }
    }
}
