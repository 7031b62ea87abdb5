use tracing::trace;

use crate::expression::{ExpressionFrame, RetargetedFrame};
use crate::gain::GainTable;

/// Maps raw tracker scores onto morph weights using a fixed gain table.
#[derive(Debug, Clone, Default)]
pub struct Retargeter {
    gains: GainTable,
}

impl Retargeter {
    pub fn new(gains: GainTable) -> Self {
        Self { gains }
    }

    pub fn gains(&self) -> &GainTable {
        &self.gains
    }

    /// Later duplicates of a name overwrite earlier ones.
    pub fn retarget(&self, frame: &ExpressionFrame) -> RetargetedFrame {
        let mut out = RetargetedFrame::default();
        for sample in &frame.samples {
            let gain = self.gains.gain(&sample.name);
            let weight = clamp_weight(sanitize_score(sample.score) * gain);
            trace!(name = %sample.name, score = sample.score, gain, weight, "retarget");
            out.insert(sample.name.clone(), weight);
        }
        out
    }
}

/// Negative and NaN scores count as zero.
fn sanitize_score(score: f32) -> f32 {
    if score > 0.0 {
        score
    } else {
        0.0
    }
}

fn clamp_weight(weight: f32) -> f32 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, 1.0)
    }
}

pub fn retarget(frame: &ExpressionFrame, gains: &GainTable) -> RetargetedFrame {
    Retargeter::new(*gains).retarget(frame)
}
