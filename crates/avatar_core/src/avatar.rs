use glam::Mat4;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::expression::RetargetedFrame;
use crate::pose::{with_scale, Placement};
use crate::scene::{apply_expressions, AvatarAsset, FirstBone, NodeId, SurfaceCollector};

/// Shape shown when no real avatar could be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaceholderKind {
    #[default]
    Sphere,
    Cube,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAvatar {
    pub url: String,
    pub asset: AvatarAsset,
    surfaces: Vec<NodeId>,
    pose_root: Option<NodeId>,
}

impl LoadedAvatar {
    /// Indexes the surfaces and the pose root of a freshly loaded asset.
    /// `pose_bone` picks a bone by name, otherwise the first bone is used.
    pub fn new(url: impl Into<String>, asset: AvatarAsset, pose_bone: Option<&str>) -> Self {
        let mut surfaces = SurfaceCollector::default();
        asset.accept(&mut surfaces);
        let pose_root = match pose_bone.and_then(|name| asset.find(name)) {
            Some(id) => Some(id),
            None => {
                let mut bone = FirstBone::default();
                asset.accept(&mut bone);
                bone.bone
            }
        };
        Self {
            url: url.into(),
            asset,
            surfaces: surfaces.surfaces,
            pose_root,
        }
    }

    pub fn surfaces(&self) -> &[NodeId] {
        &self.surfaces
    }

    pub fn pose_root(&self) -> Option<NodeId> {
        self.pose_root
    }

    fn pose_placement_mut(&mut self) -> &mut Placement {
        self.asset.placement_mut(self.pose_root)
    }

    pub fn pose_placement(&self) -> &Placement {
        self.asset.placement(self.pose_root)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    Asset(LoadedAvatar),
    Placeholder(Placeholder),
}

impl Representation {
    pub fn placement(&self) -> &Placement {
        match self {
            Representation::Asset(avatar) => avatar.pose_placement(),
            Representation::Placeholder(placeholder) => &placeholder.placement,
        }
    }
}

/// The one representation currently shown, if any.
#[derive(Debug, Default)]
pub struct AvatarState {
    active: Option<Representation>,
}

impl AvatarState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Representation> {
        self.active.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.active, Some(Representation::Placeholder(_)))
    }

    pub fn loaded(&self) -> Option<&LoadedAvatar> {
        match &self.active {
            Some(Representation::Asset(avatar)) => Some(avatar),
            _ => None,
        }
    }

    /// Replaces the active representation, returning the one released.
    pub fn install_asset(&mut self, avatar: LoadedAvatar) -> Option<Representation> {
        info!(
            url = %avatar.url,
            surfaces = avatar.surfaces.len(),
            pose_root = ?avatar.pose_root,
            "installing avatar"
        );
        self.active.replace(Representation::Asset(avatar))
    }

    pub fn show_placeholder(&mut self, kind: PlaceholderKind) -> Option<Representation> {
        info!(?kind, "showing placeholder");
        self.active.replace(Representation::Placeholder(Placeholder {
            kind,
            placement: Placement::default(),
        }))
    }

    pub fn set_pose(&mut self, matrix: Mat4, scale: f32) {
        let matrix = with_scale(matrix, scale);
        match &mut self.active {
            Some(Representation::Asset(avatar)) => avatar.pose_placement_mut().set_matrix(matrix),
            Some(Representation::Placeholder(placeholder)) => placeholder.placement.set_matrix(matrix),
            None => {}
        }
    }

    /// Returns the number of influences written. Placeholders take none.
    pub fn set_expressions(&mut self, frame: &RetargetedFrame) -> usize {
        let Some(Representation::Asset(avatar)) = &mut self.active else {
            return 0;
        };
        let mut written = 0;
        for id in &avatar.surfaces {
            if let Some(targets) = avatar.asset.morph_targets_mut(*id) {
                written += apply_expressions(targets, frame);
            }
        }
        debug!(written, "applied expressions");
        written
    }

    /// Runs the automatic transform update for everything that still has it.
    pub fn refresh(&mut self) {
        match &mut self.active {
            Some(Representation::Asset(avatar)) => avatar.asset.refresh(),
            Some(Representation::Placeholder(placeholder)) => placeholder.placement.refresh(),
            None => {}
        }
    }

    pub fn clear(&mut self) -> Option<Representation> {
        self.active.take()
    }
}
