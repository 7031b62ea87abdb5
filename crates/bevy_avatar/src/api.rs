use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Json, Router};
use bevy::prelude::{EventWriter, ResMut, Resource};
use tokio::sync::mpsc;

use avatar_api::{ApiError, LoadAvatarRequest, SetFacesRequest};
use avatar_core::AssetSources;

use crate::avatar::LoadAvatar;
use crate::tracking::{to_face_frame, LatestFace};

pub enum Command {
    SetFaces(SetFacesRequest),
    LoadAvatar(LoadAvatarRequest),
}

pub struct ApiState {
    tx: mpsc::UnboundedSender<Command>,
}

impl ApiState {
    pub fn new() -> (Arc<Self>, ApiResource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), ApiResource { rx })
    }

    fn send(&self, command: Command) -> Result<(), ApiError> {
        self.tx.send(command).map_err(|_| ApiError::unavailable())
    }
}

async fn put_faces(
    State(state): State<Arc<ApiState>>,
    Json(faces): Json<SetFacesRequest>,
) -> Result<StatusCode, ApiError> {
    state.send(Command::SetFaces(faces))?;
    Ok(StatusCode::OK)
}

async fn put_avatar(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<LoadAvatarRequest>,
) -> Result<StatusCode, ApiError> {
    if request.url.trim().is_empty() {
        return Err(ApiError::invalid_argument("url must not be empty"));
    }
    state.send(Command::LoadAvatar(request))?;
    Ok(StatusCode::ACCEPTED)
}

pub fn new_api() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/v1/faces", put(put_faces))
        .route("/v1/avatar", put(put_avatar))
}

#[derive(Resource)]
pub struct ApiResource {
    rx: mpsc::UnboundedReceiver<Command>,
}

pub fn update_api(
    mut api: ResMut<ApiResource>,
    mut latest: ResMut<LatestFace>,
    mut loads: EventWriter<LoadAvatar>,
) {
    while let Ok(command) = api.rx.try_recv() {
        match command {
            Command::SetFaces(request) => {
                // Only the first face drives the avatar.
                let frame = request
                    .faces
                    .into_iter()
                    .next()
                    .map(to_face_frame)
                    .unwrap_or_default();
                latest.push(frame);
            }
            Command::LoadAvatar(request) => {
                loads.send(LoadAvatar(AssetSources {
                    primary: request.url,
                    fallback: request.fallback_url,
                    texture: request.texture_url,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use avatar_api::ErrorCategory;

    use super::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn request(url: &str) -> LoadAvatarRequest {
        LoadAvatarRequest {
            url: url.into(),
            fallback_url: None,
            texture_url: None,
        }
    }

    #[test]
    fn empty_avatar_url_is_rejected() {
        let (state, mut resource) = ApiState::new();
        let err = block_on(put_avatar(State(state), Json(request(" ")))).unwrap_err();
        assert_eq!(err.category, ErrorCategory::InvalidArgument);
        assert!(resource.rx.try_recv().is_err());
    }

    #[test]
    fn commands_reach_the_receiver() {
        let (state, mut resource) = ApiState::new();
        let status = block_on(put_avatar(State(state.clone()), Json(request("fox.glb")))).unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        let status = block_on(put_faces(State(state), Json(SetFacesRequest::default()))).unwrap();
        assert_eq!(status, StatusCode::OK);

        assert!(matches!(resource.rx.try_recv(), Ok(Command::LoadAvatar(r)) if r.url == "fox.glb"));
        assert!(matches!(resource.rx.try_recv(), Ok(Command::SetFaces(r)) if r.faces.is_empty()));
    }

    #[test]
    fn closed_renderer_is_unavailable() {
        let (state, resource) = ApiState::new();
        drop(resource);
        let err = block_on(put_faces(State(state), Json(SetFacesRequest::default()))).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Cancelled);
    }
}
