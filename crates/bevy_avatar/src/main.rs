use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use clap::Parser;
use tracing::{error, info};

use avatar_core::AvatarConfig;

use crate::avatar::AvatarPlugin;

mod api;
mod avatar;
mod status;
mod tracking;

#[derive(Parser, Debug)]
struct Options {
    #[arg(long, default_value = "127.0.0.1:8888")]
    pub api_bind: String,
    /// JSON avatar config; flags below override it.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub primary_asset: Option<String>,
    #[arg(long)]
    pub fallback_asset: Option<String>,
    #[arg(long)]
    pub texture: Option<String>,
}

impl Options {
    fn avatar_config(&self) -> anyhow::Result<AvatarConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                AvatarConfig::from_json_slice(&bytes)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => AvatarConfig::default(),
        };
        if let Some(url) = &self.primary_asset {
            config.primary_asset_url = url.clone();
        }
        if let Some(url) = &self.fallback_asset {
            config.fallback_asset_url = Some(url.clone());
        }
        if let Some(url) = &self.texture {
            config.texture_url = Some(url.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let options = Options::parse();
    let config = options.avatar_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let api_addr: SocketAddr = options.api_bind.parse()?;
    let (api_state, api_resource) = api::ApiState::new();
    runtime.spawn(async move {
        let listener = match tokio::net::TcpListener::bind(api_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("failed to bind API on {}: {}", api_addr, err);
                return;
            }
        };
        info!("serving tracking API on {}", api_addr);
        if let Err(err) = axum::serve(listener, api::new_api().with_state(api_state)).await {
            error!("failed to serve API: {}", err);
        }
    });

    let mut app = App::new();
    app
        // Logging is already set up above.
        .add_plugins(DefaultPlugins.build().disable::<LogPlugin>())
        .add_plugins(EguiPlugin)
        .add_plugins(AvatarPlugin { config })
        .insert_resource(api_resource)
        .add_systems(Startup, init)
        .add_systems(Update, (
            api::update_api.before(avatar::apply_tracking),
            status::status_panel,
        ));
    app.run();
    Ok(())
}

fn init(mut commands: Commands) {
    commands.spawn(DirectionalLightBundle {
        transform: Transform::from_xyz(10., 100., 50.)
            .looking_at(Vec3::ZERO, Vec3::Y),
        ..default()
    });

    commands.spawn(Camera3dBundle {
        transform: Transform::from_xyz(0., 0., 6.)
            .looking_at(Vec3::ZERO, Vec3::Y),
        ..default()
    });
}
