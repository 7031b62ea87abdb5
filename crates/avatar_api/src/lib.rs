use std::borrow::Cow;

use axum::http::StatusCode;
use axum::Json;
use axum::response::{IntoResponse, Response};
use glam::Mat4;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Cancelled,
    InvalidArgument,
}

impl ErrorCategory {
    pub fn to_status_code(self) -> StatusCode {
        match self {
            ErrorCategory::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::InvalidArgument => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub category: ErrorCategory,
    pub error_code: Cow<'static, str>,
    pub instance_id: String,
    pub message: Cow<'static, str>,
}

impl ApiError {
    pub fn with_message(
        category: ErrorCategory,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            category,
            error_code: code.into(),
            instance_id: nanoid::nanoid!(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::with_message(ErrorCategory::InvalidArgument, "invalidArgument", message)
    }

    /// The renderer has gone away and can't take commands anymore.
    pub fn unavailable() -> Self {
        Self::with_message(ErrorCategory::Cancelled, "unavailable", "service unavailable")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.category.to_status_code();
        (status_code, Json(self)).into_response()
    }
}

/// One expression score, shaped like a MediaPipe face landmarker category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendShapeDto {
    #[serde(default)]
    pub index: Option<u32>,
    pub category_name: String,
    pub score: f32,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceFrameDto {
    /// Column-major head pose.
    #[serde(default)]
    pub transform: Option<Mat4>,
    #[serde(default)]
    pub blend_shapes: Option<Vec<BlendShapeDto>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFacesRequest {
    pub faces: Vec<FaceFrameDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAvatarRequest {
    pub url: String,
    #[serde(default)]
    pub fallback_url: Option<String>,
    #[serde(default)]
    pub texture_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn parses_landmarker_shaped_faces() {
        let request: SetFacesRequest = serde_json::from_str(
            r#"{
                "faces": [{
                    "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 2,3,-40,1],
                    "blendShapes": [
                        {"index": 0, "categoryName": "_neutral", "score": 0.0, "displayName": ""},
                        {"index": 9, "categoryName": "eyeBlinkLeft", "score": 0.75}
                    ]
                }, {}]
            }"#,
        )
        .unwrap();
        assert_eq!(request.faces.len(), 2);

        let face = &request.faces[0];
        let transform = face.transform.unwrap();
        assert_eq!(transform.w_axis.truncate(), Vec3::new(2.0, 3.0, -40.0));
        let shapes = face.blend_shapes.as_ref().unwrap();
        assert_eq!(shapes[1].category_name, "eyeBlinkLeft");
        assert_eq!(shapes[1].score, 0.75);
        assert_eq!(request.faces[1], FaceFrameDto::default());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let error = ApiError::invalid_argument("url must not be empty");
        assert_eq!(error.category.to_status_code(), StatusCode::BAD_REQUEST);
        assert!(!error.instance_id.is_empty());
        assert_eq!(
            ApiError::unavailable().into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let json = serde_json::to_value(error).unwrap();
        assert_eq!(json["category"], "invalidArgument");
        assert_eq!(json["errorCode"], "invalidArgument");
        assert_eq!(json["message"], "url must not be empty");
    }
}
