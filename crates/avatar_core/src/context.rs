use std::fmt;

use glam::Mat4;
use tracing::{info, warn};

use crate::avatar::{AvatarState, LoadedAvatar, PlaceholderKind};
use crate::config::AvatarConfig;
use crate::error::{ConfigError, LoadError};
use crate::expression::ExpressionFrame;
use crate::loader::{AssetSources, Fetch, LoadCommand, LoadMachine, LoadPhase, RequestId};
use crate::pose::PoseFit;
use crate::retarget::Retargeter;
use crate::scene::{AvatarAsset, Texture};

/// What the tracker reported for one video frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceFrame {
    pub pose: Option<Mat4>,
    pub expressions: Option<ExpressionFrame>,
}

impl FaceFrame {
    pub fn is_empty(&self) -> bool {
        self.pose.is_none() && self.expressions.as_ref().map_or(true, |e| e.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    Waiting,
    NoFace,
    Tracking,
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingStatus::Waiting => write!(f, "waiting for tracker"),
            TrackingStatus::NoFace => write!(f, "no face detected"),
            TrackingStatus::Tracking => write!(f, "tracking"),
        }
    }
}

impl TrackingStatus {
    /// Moves to the status implied by `frame`, logging when it changes.
    pub fn observe(&mut self, frame: &FaceFrame) -> TrackingStatus {
        let next = if frame.is_empty() {
            TrackingStatus::NoFace
        } else {
            TrackingStatus::Tracking
        };
        if *self != next {
            match next {
                TrackingStatus::NoFace => info!("no face detected"),
                _ => info!("face tracking started"),
            }
        }
        *self = next;
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub status: TrackingStatus,
    pub weights_written: usize,
}

/// Completion of a [`Fetch`], delivered back by the host.
#[derive(Debug)]
pub enum LoadEvent {
    AssetLoaded { request: RequestId, asset: AvatarAsset },
    AssetFailed { request: RequestId, error: LoadError },
    TextureLoaded { request: RequestId, texture: Texture },
    TextureFailed { request: RequestId, error: LoadError },
}

struct StagedAsset {
    request: RequestId,
    asset: AvatarAsset,
}

/// Everything a frame callback needs, owned by the host application.
///
/// One tick per frame through [`AvatarContext::on_frame`]. Asset fetches are
/// carried out by the host and reported through
/// [`AvatarContext::handle_load_event`]; frames keep applying to whatever is
/// shown in the meantime.
pub struct AvatarContext {
    retargeter: Retargeter,
    pose_fit: PoseFit,
    placeholder: PlaceholderKind,
    placeholder_while_loading: bool,
    pose_bone: Option<String>,
    sources: AssetSources,
    avatar: AvatarState,
    loader: LoadMachine,
    staged: Option<StagedAsset>,
    status: TrackingStatus,
    frames: u64,
}

impl AvatarContext {
    pub fn init(config: &AvatarConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            retargeter: Retargeter::new(config.gains),
            pose_fit: config.pose_fit,
            placeholder: config.placeholder,
            placeholder_while_loading: config.placeholder_while_loading,
            pose_bone: config.pose_bone.clone(),
            sources: config.sources(),
            avatar: AvatarState::new(),
            loader: LoadMachine::new(),
            staged: None,
            status: TrackingStatus::Waiting,
            frames: 0,
        })
    }

    pub fn avatar(&self) -> &AvatarState {
        &self.avatar
    }

    pub fn phase(&self) -> &LoadPhase {
        self.loader.phase()
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Loads the configured sources.
    pub fn begin(&mut self) -> Fetch {
        self.request_load(self.sources.clone())
    }

    pub fn request_load(&mut self, sources: AssetSources) -> Fetch {
        self.staged = None;
        if self.placeholder_while_loading && self.avatar.active().is_none() {
            self.avatar.show_placeholder(self.placeholder);
        }
        self.loader.request(sources)
    }

    /// Feeds a completed fetch back in. Returns the next fetch to perform.
    pub fn handle_load_event(&mut self, event: LoadEvent) -> Option<Fetch> {
        match event {
            LoadEvent::AssetLoaded { request, asset } => {
                let command = self.loader.asset_loaded(request)?;
                self.execute(command, Some(asset), None)
            }
            LoadEvent::AssetFailed { request, error } => {
                let command = self.loader.asset_failed(request, &error)?;
                self.execute(command, None, None)
            }
            LoadEvent::TextureLoaded { request, texture } => {
                let command = self.loader.texture_loaded(request)?;
                self.execute(command, None, Some(texture))
            }
            LoadEvent::TextureFailed { request, error } => {
                let command = self.loader.texture_failed(request, &error)?;
                self.execute(command, None, None)
            }
        }
    }

    fn execute(
        &mut self,
        command: LoadCommand,
        fetched: Option<AvatarAsset>,
        texture: Option<Texture>,
    ) -> Option<Fetch> {
        match command {
            LoadCommand::Fetch(fetch) => {
                if let Some(asset) = fetched {
                    self.staged = Some(StagedAsset {
                        request: fetch.request,
                        asset,
                    });
                }
                Some(fetch)
            }
            LoadCommand::Install {
                request,
                url,
                textured,
            } => {
                let staged = self
                    .staged
                    .take()
                    .filter(|s| s.request == request)
                    .map(|s| s.asset);
                let Some(mut asset) = fetched.or(staged) else {
                    warn!(%request, %url, "no asset staged for install");
                    return None;
                };
                if let Some(texture) = texture.filter(|_| textured) {
                    asset.apply_texture(&texture);
                }
                self.avatar
                    .install_asset(LoadedAvatar::new(url, asset, self.pose_bone.as_deref()));
                None
            }
            LoadCommand::ShowPlaceholder { .. } => {
                self.staged = None;
                self.avatar.show_placeholder(self.placeholder);
                None
            }
        }
    }

    pub fn on_frame(&mut self, frame: FaceFrame) -> FrameReport {
        self.frames += 1;
        let mut weights_written = 0;
        if self.status.observe(&frame) == TrackingStatus::Tracking {
            if let Some(matrix) = frame.pose {
                let (placed, scale) = self.pose_fit.fit(matrix);
                self.avatar.set_pose(placed, scale);
            }
            if let Some(expressions) = frame.expressions.filter(|e| !e.is_empty()) {
                let weights = self.retargeter.retarget(&expressions);
                weights_written = self.avatar.set_expressions(&weights);
            }
        }
        self.avatar.refresh();
        FrameReport {
            status: self.status,
            weights_written,
        }
    }

    pub fn teardown(mut self) {
        self.staged = None;
        self.avatar.clear();
        info!(frames = self.frames, phase = %self.loader.phase(), "avatar context torn down");
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::scene::{MorphTargets, NodeKind};

    fn config() -> AvatarConfig {
        AvatarConfig::new("head.glb")
    }

    #[test]
    fn status_follows_face_presence() {
        let mut status = TrackingStatus::Waiting;
        assert_eq!(status.observe(&FaceFrame::default()), TrackingStatus::NoFace);
        assert_eq!(status, TrackingStatus::NoFace);

        let face = FaceFrame {
            pose: Some(Mat4::IDENTITY),
            expressions: None,
        };
        assert_eq!(status.observe(&face), TrackingStatus::Tracking);
        assert_eq!(status.observe(&face), TrackingStatus::Tracking);

        // A pose-less frame with only empty expressions counts as no face.
        let blank = FaceFrame {
            pose: None,
            expressions: Some(ExpressionFrame::default()),
        };
        assert_eq!(status.observe(&blank), TrackingStatus::NoFace);
    }

    fn asset() -> AvatarAsset {
        let mut asset = AvatarAsset::new();
        asset
            .add_node(None, "Face", NodeKind::MorphableSurface(MorphTargets::new(["jawOpen"])))
            .unwrap();
        asset
    }

    #[test]
    fn init_rejects_invalid_config() {
        assert!(AvatarContext::init(&AvatarConfig::new("")).is_err());
    }

    #[test]
    fn empty_frame_reports_no_face() {
        let mut context = AvatarContext::init(&config()).unwrap();
        assert_eq!(context.status(), TrackingStatus::Waiting);
        let report = context.on_frame(FaceFrame::default());
        assert_eq!(report.status, TrackingStatus::NoFace);
        assert_eq!(context.frames(), 1);
        assert_eq!(report.status.to_string(), "no face detected");
    }

    #[test]
    fn placeholder_while_loading_is_replaced_by_asset() {
        let mut config = config();
        config.placeholder_while_loading = true;
        let mut context = AvatarContext::init(&config).unwrap();
        let fetch = context.begin();
        assert!(context.avatar().is_placeholder());

        context.on_frame(FaceFrame {
            pose: Some(Mat4::from_translation(Vec3::new(0.0, 0.0, -50.0))),
            expressions: None,
        });
        assert!(!context.avatar().active().unwrap().placement().auto_update());

        let next = context.handle_load_event(LoadEvent::AssetLoaded {
            request: fetch.request,
            asset: asset(),
        });
        assert!(next.is_none());
        assert_eq!(context.avatar().loaded().unwrap().url, "head.glb");
    }

    #[test]
    fn stale_asset_is_never_installed() {
        let mut context = AvatarContext::init(&config()).unwrap();
        let first = context.begin();
        let second = context.request_load(AssetSources::primary("other.glb"));
        assert!(context
            .handle_load_event(LoadEvent::AssetLoaded {
                request: first.request,
                asset: asset(),
            })
            .is_none());
        assert!(context.avatar().active().is_none());

        context.handle_load_event(LoadEvent::AssetLoaded {
            request: second.request,
            asset: asset(),
        });
        assert_eq!(context.avatar().loaded().unwrap().url, "other.glb");
    }
}
