use avatar_core::{
    apply_expressions, with_scale, AssetSources, AvatarConfig, Fetch, FetchKind, LoadCommand,
    LoadError, LoadMachine, MorphSurface, PlaceholderKind, PoseFit, RequestId, Retargeter,
    TrackingStatus,
};
use bevy::asset::{LoadState, RecursiveDependencyLoadState};
use bevy::gltf::Gltf;
use bevy::hierarchy::HierarchyQueryExt;
use bevy::prelude::*;
use bevy::render::mesh::morph::MorphWeights;
use tracing::{debug, info, warn};

use crate::tracking::LatestFace;

pub struct AvatarPlugin {
    pub config: AvatarConfig,
}

impl Plugin for AvatarPlugin {
    fn name(&self) -> &str {
        "Avatar"
    }

    fn build(&self, app: &mut App) {
        app.insert_resource(AvatarSettings::new(&self.config))
            .init_resource::<AvatarLoading>()
            .init_resource::<LatestFace>()
            .add_event::<LoadAvatar>()
            .add_systems(Startup, request_configured_avatar)
            .add_systems(
                Update,
                (start_loads, poll_loads, idle_spin, apply_tracking).chain(),
            );
    }
}

#[derive(Resource)]
pub struct AvatarSettings {
    pub retargeter: Retargeter,
    pub pose_fit: PoseFit,
    pub placeholder: PlaceholderKind,
    pub placeholder_while_loading: bool,
    pub pose_bone: Option<String>,
    pub sources: AssetSources,
}

impl AvatarSettings {
    pub fn new(config: &AvatarConfig) -> Self {
        Self {
            retargeter: Retargeter::new(config.gains),
            pose_fit: config.pose_fit,
            placeholder: config.placeholder,
            placeholder_while_loading: config.placeholder_while_loading,
            pose_bone: config.pose_bone.clone(),
            sources: config.sources(),
        }
    }
}

/// Asks for a new avatar; supersedes any load in flight.
#[derive(Event, Debug, Clone)]
pub struct LoadAvatar(pub AssetSources);

enum Pending {
    Asset { fetch: Fetch, handle: Handle<Gltf> },
    Texture { fetch: Fetch, handle: Handle<Image> },
}

#[derive(Resource, Default)]
pub struct AvatarLoading {
    pub machine: LoadMachine,
    pending: Option<Pending>,
    staged: Option<(RequestId, Handle<Gltf>)>,
}

/// The entity currently representing the avatar.
#[derive(Component, Debug)]
pub struct AvatarRoot {
    pub url: Option<String>,
}

impl AvatarRoot {
    pub fn describe(&self) -> &str {
        self.url.as_deref().unwrap_or("placeholder")
    }
}

#[derive(Component, Debug)]
pub struct PlaceholderAvatar;

/// Set once a tracked pose has been applied. The idle animation leaves these
/// entities alone from then on.
#[derive(Component, Debug)]
pub struct PoseLocked;

struct WeightsSurface<'a> {
    names: &'a [String],
    weights: &'a mut [f32],
}

impl MorphSurface for WeightsSurface<'_> {
    fn target_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn influences_mut(&mut self) -> &mut [f32] {
        &mut *self.weights
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Loading,
    Loaded,
    Failed,
}

impl Progress {
    fn of_asset(state: Option<LoadState>) -> Self {
        match state {
            Some(LoadState::Loaded) => Progress::Loaded,
            Some(LoadState::Failed { .. }) => Progress::Failed,
            _ => Progress::Loading,
        }
    }

    fn of_dependencies(state: Option<RecursiveDependencyLoadState>) -> Self {
        match state {
            Some(RecursiveDependencyLoadState::Loaded) => Progress::Loaded,
            Some(RecursiveDependencyLoadState::Failed { .. }) => Progress::Failed,
            _ => Progress::Loading,
        }
    }
}

#[derive(Debug, PartialEq)]
enum FetchState {
    Pending,
    Ready,
    Failed(LoadError),
}

impl FetchState {
    /// A failed dependency (an embedded or sibling image, say) doesn't sink an
    /// asset that itself parsed; it is shown with whatever did load.
    fn resolve(url: &str, asset: Progress, dependencies: Progress) -> Self {
        match (asset, dependencies) {
            (Progress::Failed, _) => FetchState::Failed(LoadError::Fetch {
                url: url.to_owned(),
                reason: "asset failed to load".into(),
            }),
            (Progress::Loaded, Progress::Loaded) => FetchState::Ready,
            (Progress::Loaded, Progress::Failed) => {
                warn!(%url, "some dependencies failed to load");
                FetchState::Ready
            }
            _ => FetchState::Pending,
        }
    }
}

fn fetch_state<A: Asset>(asset_server: &AssetServer, handle: &Handle<A>, url: &str) -> FetchState {
    FetchState::resolve(
        url,
        Progress::of_asset(asset_server.get_load_state(handle)),
        Progress::of_dependencies(asset_server.get_recursive_dependency_load_state(handle)),
    )
}

fn begin_fetch(asset_server: &AssetServer, fetch: Fetch) -> Pending {
    debug!(request = %fetch.request, url = %fetch.url, kind = ?fetch.kind, "fetching");
    match fetch.kind {
        FetchKind::Asset => Pending::Asset {
            handle: asset_server.load(fetch.url.clone()),
            fetch,
        },
        FetchKind::Texture => Pending::Texture {
            handle: asset_server.load(fetch.url.clone()),
            fetch,
        },
    }
}

fn gltf_scene(gltfs: &Assets<Gltf>, handle: &Handle<Gltf>) -> Option<Handle<Scene>> {
    let gltf = gltfs.get(handle)?;
    gltf.default_scene
        .clone()
        .or_else(|| gltf.scenes.first().cloned())
}

fn spawn_placeholder(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    kind: PlaceholderKind,
) {
    let mesh = match kind {
        PlaceholderKind::Sphere => meshes.add(Sphere::new(1.0)),
        PlaceholderKind::Cube => meshes.add(Cuboid::new(1.5, 1.5, 1.5)),
    };
    commands.spawn((
        PbrBundle {
            mesh,
            material: materials.add(StandardMaterial {
                base_color: Color::srgb(1.0, 0.0, 1.0),
                ..default()
            }),
            ..default()
        },
        AvatarRoot { url: None },
        PlaceholderAvatar,
        Name::new("Placeholder"),
    ));
}

fn despawn_roots(commands: &mut Commands, roots: &Query<Entity, With<AvatarRoot>>) {
    for entity in roots {
        commands.entity(entity).despawn_recursive();
    }
}

fn install_scene(
    commands: &mut Commands,
    roots: &Query<Entity, With<AvatarRoot>>,
    scene: Handle<Scene>,
    url: String,
) {
    despawn_roots(commands, roots);
    commands.spawn((
        SceneBundle { scene, ..default() },
        AvatarRoot { url: Some(url) },
        Name::new("Avatar"),
    ));
}

/// Points every material of the staged asset at `texture`. Returns how many
/// materials were updated.
fn apply_texture(
    materials: &mut Assets<StandardMaterial>,
    targets: &[Handle<StandardMaterial>],
    texture: &Handle<Image>,
) -> usize {
    let mut applied = 0;
    for target in targets {
        if let Some(material) = materials.get_mut(target) {
            material.base_color_texture = Some(texture.clone());
            applied += 1;
        }
    }
    applied
}

fn request_configured_avatar(settings: Res<AvatarSettings>, mut loads: EventWriter<LoadAvatar>) {
    loads.send(LoadAvatar(settings.sources.clone()));
}

fn start_loads(
    mut commands: Commands,
    mut events: EventReader<LoadAvatar>,
    mut loading: ResMut<AvatarLoading>,
    asset_server: Res<AssetServer>,
    settings: Res<AvatarSettings>,
    roots: Query<Entity, With<AvatarRoot>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Commands only land after this system, so `roots` can't see a
    // placeholder spawned for an earlier event in the same batch.
    let mut shown = !roots.is_empty();
    for LoadAvatar(sources) in events.read() {
        let fetch = loading.machine.request(sources.clone());
        loading.staged = None;
        loading.pending = Some(begin_fetch(&asset_server, fetch));
        if settings.placeholder_while_loading && !shown {
            spawn_placeholder(&mut commands, &mut meshes, &mut materials, settings.placeholder);
            shown = true;
        }
    }
}

fn poll_loads(
    mut commands: Commands,
    mut loading: ResMut<AvatarLoading>,
    asset_server: Res<AssetServer>,
    settings: Res<AvatarSettings>,
    gltfs: Res<Assets<Gltf>>,
    roots: Query<Entity, With<AvatarRoot>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let loading = &mut *loading;
    let Some(pending) = loading.pending.take() else {
        return;
    };

    let command = match pending {
        Pending::Asset { fetch, handle } => match fetch_state(&asset_server, &handle, &fetch.url) {
            FetchState::Pending => {
                loading.pending = Some(Pending::Asset { fetch, handle });
                return;
            }
            FetchState::Failed(error) => loading.machine.asset_failed(fetch.request, &error),
            FetchState::Ready if gltf_scene(&gltfs, &handle).is_none() => loading
                .machine
                .asset_failed(fetch.request, &LoadError::EmptyAsset(fetch.url.clone())),
            FetchState::Ready => {
                loading.staged = Some((fetch.request, handle));
                loading.machine.asset_loaded(fetch.request)
            }
        },
        Pending::Texture { fetch, handle } => match fetch_state(&asset_server, &handle, &fetch.url) {
            FetchState::Pending => {
                loading.pending = Some(Pending::Texture { fetch, handle });
                return;
            }
            FetchState::Failed(error) => loading.machine.texture_failed(fetch.request, &error),
            FetchState::Ready => {
                let targets = loading
                    .staged
                    .as_ref()
                    .and_then(|(_, gltf)| gltfs.get(gltf))
                    .map(|gltf| gltf.materials.as_slice())
                    .unwrap_or_default();
                let applied = apply_texture(&mut materials, targets, &handle);
                debug!(request = %fetch.request, applied, "texture applied");
                loading.machine.texture_loaded(fetch.request)
            }
        },
    };

    match command {
        None => {}
        Some(LoadCommand::Fetch(fetch)) => {
            loading.pending = Some(begin_fetch(&asset_server, fetch));
        }
        Some(LoadCommand::Install { request, url, .. }) => {
            let scene = loading
                .staged
                .take()
                .filter(|(staged, _)| *staged == request)
                .and_then(|(_, gltf)| gltf_scene(&gltfs, &gltf));
            let Some(scene) = scene else {
                warn!(%request, %url, "no scene staged for install");
                return;
            };
            info!(%request, %url, "installing avatar");
            install_scene(&mut commands, &roots, scene, url);
        }
        Some(LoadCommand::ShowPlaceholder { .. }) => {
            loading.staged = None;
            despawn_roots(&mut commands, &roots);
            spawn_placeholder(&mut commands, &mut meshes, &mut materials, settings.placeholder);
        }
    }
}

/// Slow turntable shown until tracking takes over.
fn idle_spin(time: Res<Time>, mut roots: Query<&mut Transform, (With<AvatarRoot>, Without<PoseLocked>)>) {
    for mut transform in &mut roots {
        transform.rotate_y(0.5 * time.delta_seconds());
    }
}

fn find_named(
    root: Entity,
    name: &str,
    children: &Query<&Children>,
    names: &Query<&Name>,
) -> Option<Entity> {
    children
        .iter_descendants(root)
        .find(|entity| names.get(*entity).is_ok_and(|n| n.as_str() == name))
}

pub fn apply_tracking(
    mut commands: Commands,
    mut latest: ResMut<LatestFace>,
    settings: Res<AvatarSettings>,
    meshes: Res<Assets<Mesh>>,
    roots: Query<(Entity, Has<PlaceholderAvatar>, Has<PoseLocked>), With<AvatarRoot>>,
    children: Query<&Children>,
    names: Query<&Name>,
    mut transforms: Query<&mut Transform>,
    mut morphs: Query<&mut MorphWeights>,
) {
    let Some(frame) = latest.pending.take() else {
        return;
    };
    if latest.status.observe(&frame) != TrackingStatus::Tracking {
        return;
    }

    let weights = frame
        .expressions
        .as_ref()
        .filter(|e| !e.is_empty())
        .map(|e| settings.retargeter.retarget(e));

    let mut written = 0;
    for (root, is_placeholder, locked) in &roots {
        if let Some(matrix) = frame.pose {
            let (placed, scale) = settings.pose_fit.fit(matrix);
            let target = settings
                .pose_bone
                .as_deref()
                .and_then(|bone| find_named(root, bone, &children, &names))
                .unwrap_or(root);
            if let Ok(mut transform) = transforms.get_mut(target) {
                *transform = Transform::from_matrix(with_scale(placed, scale));
            }
            if !locked {
                commands.entity(root).insert(PoseLocked);
            }
        }

        // Placeholders have no morph targets to drive.
        let Some(weights) = weights.as_ref().filter(|_| !is_placeholder) else {
            continue;
        };
        for entity in children.iter_descendants(root) {
            let Ok(mut morph) = morphs.get_mut(entity) else {
                continue;
            };
            let Some(target_names) = morph
                .first_mesh()
                .and_then(|mesh| meshes.get(mesh))
                .and_then(|mesh| mesh.morph_target_names())
            else {
                continue;
            };
            let mut surface = WeightsSurface {
                names: target_names,
                weights: morph.weights_mut(),
            };
            written += apply_expressions(&mut surface, weights);
        }
    }
    latest.weights_written = written;
}
