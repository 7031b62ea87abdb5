use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Keyword buckets, in the order names are matched against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Mouth,
    Jaw,
    Tongue,
    Eye,
    Brow,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Mouth,
        Category::Jaw,
        Category::Tongue,
        Category::Eye,
        Category::Brow,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Category::Mouth => "mouth",
            Category::Jaw => "jaw",
            Category::Tongue => "tongue",
            Category::Eye => "eye",
            Category::Brow => "brow",
        }
    }

    /// First category whose keyword is contained in `name`, ignoring case.
    pub fn classify(name: &str) -> Option<Category> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| name.contains(c.keyword()))
    }
}

/// Multiplicative gain per category. A name takes the gain of the first
/// category it matches; when that category has no gain of its own the default
/// applies, even if a later category would have matched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GainTable {
    #[serde(default)]
    pub mouth: Option<f32>,
    #[serde(default)]
    pub jaw: Option<f32>,
    #[serde(default)]
    pub tongue: Option<f32>,
    #[serde(default)]
    pub eye: Option<f32>,
    #[serde(default)]
    pub brow: Option<f32>,
    #[serde(default = "default_gain")]
    pub default: f32,
}

fn default_gain() -> f32 {
    1.0
}

impl Default for GainTable {
    fn default() -> Self {
        Self {
            mouth: Some(2.2),
            jaw: Some(1.5),
            tongue: None,
            eye: Some(1.2),
            brow: None,
            default: default_gain(),
        }
    }
}

impl GainTable {
    /// Table where every name uses `default`.
    pub fn uniform(default: f32) -> Self {
        Self {
            mouth: None,
            jaw: None,
            tongue: None,
            eye: None,
            brow: None,
            default,
        }
    }

    pub fn with(mut self, category: Category, gain: f32) -> Self {
        *self.slot_mut(category) = Some(gain);
        self
    }

    fn slot(&self, category: Category) -> Option<f32> {
        match category {
            Category::Mouth => self.mouth,
            Category::Jaw => self.jaw,
            Category::Tongue => self.tongue,
            Category::Eye => self.eye,
            Category::Brow => self.brow,
        }
    }

    fn slot_mut(&mut self, category: Category) -> &mut Option<f32> {
        match category {
            Category::Mouth => &mut self.mouth,
            Category::Jaw => &mut self.jaw,
            Category::Tongue => &mut self.tongue,
            Category::Eye => &mut self.eye,
            Category::Brow => &mut self.brow,
        }
    }

    /// Bucket used for `name`, `None` for the default bucket.
    pub fn bucket(&self, name: &str) -> Option<Category> {
        Category::classify(name)
    }

    pub fn gain(&self, name: &str) -> f32 {
        self.bucket(name)
            .and_then(|c| self.slot(c))
            .unwrap_or(self.default)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let configured = Category::ALL
            .into_iter()
            .filter_map(|c| self.slot(c).map(|g| (c.keyword(), g)))
            .chain(std::iter::once(("default", self.default)));
        for (bucket, gain) in configured {
            if !gain.is_finite() || gain < 0.0 {
                return Err(ConfigError::InvalidGain { bucket, gain });
            }
        }
        Ok(())
    }
}
