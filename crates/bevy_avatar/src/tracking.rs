use avatar_api::FaceFrameDto;
use avatar_core::{ExpressionFrame, ExpressionSample, FaceFrame, TrackingStatus};
use bevy::prelude::Resource;

pub fn to_face_frame(dto: FaceFrameDto) -> FaceFrame {
    FaceFrame {
        pose: dto.transform,
        expressions: dto.blend_shapes.map(|shapes| {
            ExpressionFrame::new(
                shapes
                    .into_iter()
                    .map(|s| ExpressionSample::new(s.category_name, s.score))
                    .collect(),
            )
        }),
    }
}

/// Most recent face reported by the tracker, consumed once per frame.
#[derive(Debug, Resource)]
pub struct LatestFace {
    pub pending: Option<FaceFrame>,
    pub received: u64,
    pub status: TrackingStatus,
    pub weights_written: usize,
}

impl Default for LatestFace {
    fn default() -> Self {
        Self {
            pending: None,
            received: 0,
            status: TrackingStatus::Waiting,
            weights_written: 0,
        }
    }
}

impl LatestFace {
    /// Older unconsumed frames are dropped.
    pub fn push(&mut self, frame: FaceFrame) {
        self.received += 1;
        self.pending = Some(frame);
    }
}
