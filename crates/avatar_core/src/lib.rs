//! Drives a 3D avatar from face-tracking results.
//!
//! A tracker reports a head pose and named expression scores each frame.
//! [`Retargeter`] turns the scores into morph weights, [`AvatarState`] pushes
//! pose and weights into whatever is currently shown, and [`LoadMachine`]
//! decides what is shown as assets load or fail.

pub mod avatar;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod gain;
pub mod loader;
pub mod pose;
pub mod retarget;
pub mod scene;

pub use avatar::{AvatarState, LoadedAvatar, Placeholder, PlaceholderKind, Representation};
pub use config::AvatarConfig;
pub use context::{AvatarContext, FaceFrame, FrameReport, LoadEvent, TrackingStatus};
pub use error::{ConfigError, LoadError, SceneError};
pub use expression::{ExpressionFrame, ExpressionSample, RetargetedFrame};
pub use gain::{Category, GainTable};
pub use loader::{AssetSources, Fetch, FetchKind, LoadCommand, LoadMachine, LoadPhase, RequestId};
pub use pose::{with_scale, Placement, PoseFit};
pub use retarget::{retarget, Retargeter};
pub use scene::{
    apply_expressions, AvatarAsset, Material, MorphSurface, MorphTargets, NodeId, NodeKind,
    SceneNode, SceneVisitor, Texture,
};
