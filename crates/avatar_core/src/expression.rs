use std::collections::HashMap;

/// Detected intensity of one named facial feature, e.g. `mouthSmileLeft`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionSample {
    pub name: String,
    pub score: f32,
}

impl ExpressionSample {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// All samples reported for a single video frame. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionFrame {
    pub samples: Vec<ExpressionSample>,
}

impl ExpressionFrame {
    pub fn new(samples: Vec<ExpressionSample>) -> Self {
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for ExpressionFrame {
    fn from_iter<T: IntoIterator<Item = (S, f32)>>(iter: T) -> Self {
        Self {
            samples: iter
                .into_iter()
                .map(|(name, score)| ExpressionSample::new(name, score))
                .collect(),
        }
    }
}

/// Final morph weights keyed by expression name, every value in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetargetedFrame {
    weights: HashMap<String, f32>,
}

impl RetargetedFrame {
    pub(crate) fn insert(&mut self, name: String, weight: f32) {
        self.weights.insert(name, weight);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.weights.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.weights.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
