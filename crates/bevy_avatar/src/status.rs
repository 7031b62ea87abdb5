use bevy::prelude::{Query, Res};
use bevy_egui::{egui, EguiContexts};

use crate::avatar::{AvatarLoading, AvatarRoot};
use crate::tracking::LatestFace;

pub fn status_panel(
    mut contexts: EguiContexts,
    loading: Res<AvatarLoading>,
    latest: Res<LatestFace>,
    roots: Query<&AvatarRoot>,
) {
    egui::Window::new("Avatar").show(contexts.ctx_mut(), |ui| {
        ui.label(format!("Avatar: {}", loading.machine.phase()));
        for root in &roots {
            ui.label(format!("Showing: {}", root.describe()));
        }
        ui.label(format!("Tracking: {}", latest.status));
        ui.label(format!("Frames received: {}", latest.received));
        ui.label(format!("Morph weights written: {}", latest.weights_written));
    });
}
