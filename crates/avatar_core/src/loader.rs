//! Asset loading and fallback policy.
//!
//! The machine performs no IO. It hands out [`LoadCommand`]s for the host to
//! carry out and is told about completions through the `*_loaded` and
//! `*_failed` methods. Completions for a request that has since been
//! superseded are dropped.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSources {
    pub primary: String,
    pub fallback: Option<String>,
    /// Skin applied to the primary asset only.
    pub texture: Option<String>,
}

impl AssetSources {
    pub fn primary(url: impl Into<String>) -> Self {
        Self {
            primary: url.into(),
            fallback: None,
            texture: None,
        }
    }

    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback = Some(url.into());
        self
    }

    pub fn with_texture(mut self, url: impl Into<String>) -> Self {
        self.texture = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading {
        request: RequestId,
        role: AssetRole,
        url: String,
    },
    /// The asset is in, waiting on its texture.
    Texturing {
        request: RequestId,
        url: String,
        texture: String,
    },
    Loaded {
        url: String,
        role: AssetRole,
        textured: bool,
    },
    Placeholder,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::Idle => write!(f, "idle"),
            LoadPhase::Loading { role: AssetRole::Primary, url, .. } => write!(f, "loading {url}"),
            LoadPhase::Loading { role: AssetRole::Fallback, url, .. } => {
                write!(f, "loading fallback {url}")
            }
            LoadPhase::Texturing { texture, .. } => write!(f, "loading texture {texture}"),
            LoadPhase::Loaded { url, textured: true, .. } => write!(f, "loaded {url} (textured)"),
            LoadPhase::Loaded { url, .. } => write!(f, "loaded {url}"),
            LoadPhase::Placeholder => write!(f, "placeholder"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Asset,
    Texture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    pub request: RequestId,
    pub kind: FetchKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadCommand {
    Fetch(Fetch),
    /// Swap the fetched asset in. When `textured` is set the fetched texture
    /// must be applied to its materials first.
    Install {
        request: RequestId,
        url: String,
        textured: bool,
    },
    ShowPlaceholder { request: RequestId },
}

#[derive(Debug)]
pub struct LoadMachine {
    phase: LoadPhase,
    sources: Option<AssetSources>,
    next_request: u64,
}

impl Default for LoadMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadMachine {
    pub fn new() -> Self {
        Self {
            phase: LoadPhase::Idle,
            sources: None,
            next_request: 0,
        }
    }

    pub fn phase(&self) -> &LoadPhase {
        &self.phase
    }

    /// Request id of the chain in flight, if any.
    pub fn in_flight(&self) -> Option<RequestId> {
        match self.phase {
            LoadPhase::Loading { request, .. } | LoadPhase::Texturing { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Starts a new chain, superseding whatever was in flight.
    pub fn request(&mut self, sources: AssetSources) -> Fetch {
        if let Some(previous) = self.in_flight() {
            debug!(%previous, "superseding in-flight load");
        }
        self.next_request += 1;
        let request = RequestId(self.next_request);
        let url = sources.primary.clone();
        info!(%request, %url, "loading avatar");
        self.sources = Some(sources);
        self.phase = LoadPhase::Loading {
            request,
            role: AssetRole::Primary,
            url: url.clone(),
        };
        Fetch {
            request,
            kind: FetchKind::Asset,
            url,
        }
    }

    fn is_stale(&self, request: RequestId) -> bool {
        let stale = self.in_flight() != Some(request);
        if stale {
            debug!(%request, phase = %self.phase, "discarding stale load event");
        }
        stale
    }

    pub fn asset_loaded(&mut self, request: RequestId) -> Option<LoadCommand> {
        if self.is_stale(request) {
            return None;
        }
        let LoadPhase::Loading { role, url, .. } = &self.phase else {
            return None;
        };
        let (role, url) = (*role, url.clone());
        let texture = match role {
            AssetRole::Primary => self.sources.as_ref().and_then(|s| s.texture.clone()),
            AssetRole::Fallback => None,
        };
        match texture {
            Some(texture) => {
                info!(%request, %texture, "asset loaded, fetching texture");
                self.phase = LoadPhase::Texturing {
                    request,
                    url,
                    texture: texture.clone(),
                };
                Some(LoadCommand::Fetch(Fetch {
                    request,
                    kind: FetchKind::Texture,
                    url: texture,
                }))
            }
            None => Some(self.finish(request, url, role, false)),
        }
    }

    pub fn asset_failed(&mut self, request: RequestId, error: &LoadError) -> Option<LoadCommand> {
        if self.is_stale(request) {
            return None;
        }
        let LoadPhase::Loading { role, url, .. } = &self.phase else {
            return None;
        };
        warn!(%request, %url, %error, "failed to load avatar");
        let fallback = match role {
            AssetRole::Primary => self.sources.as_ref().and_then(|s| s.fallback.clone()),
            AssetRole::Fallback => None,
        };
        match fallback {
            Some(url) => {
                info!(%request, %url, "trying fallback avatar");
                self.phase = LoadPhase::Loading {
                    request,
                    role: AssetRole::Fallback,
                    url: url.clone(),
                };
                Some(LoadCommand::Fetch(Fetch {
                    request,
                    kind: FetchKind::Asset,
                    url,
                }))
            }
            None => {
                self.phase = LoadPhase::Placeholder;
                Some(LoadCommand::ShowPlaceholder { request })
            }
        }
    }

    pub fn texture_loaded(&mut self, request: RequestId) -> Option<LoadCommand> {
        self.texture_done(request, true)
    }

    /// A missing texture is not fatal, the asset keeps its own materials.
    pub fn texture_failed(&mut self, request: RequestId, error: &LoadError) -> Option<LoadCommand> {
        if self.in_flight() == Some(request) {
            warn!(%request, %error, "failed to load texture, using embedded materials");
        }
        self.texture_done(request, false)
    }

    fn texture_done(&mut self, request: RequestId, textured: bool) -> Option<LoadCommand> {
        if self.is_stale(request) {
            return None;
        }
        let LoadPhase::Texturing { url, .. } = &self.phase else {
            return None;
        };
        let url = url.clone();
        Some(self.finish(request, url, AssetRole::Primary, textured))
    }

    fn finish(&mut self, request: RequestId, url: String, role: AssetRole, textured: bool) -> LoadCommand {
        self.phase = LoadPhase::Loaded {
            url: url.clone(),
            role,
            textured,
        };
        LoadCommand::Install {
            request,
            url,
            textured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(command: Option<LoadCommand>) -> Fetch {
        match command {
            Some(LoadCommand::Fetch(fetch)) => fetch,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    fn not_found(url: &str) -> LoadError {
        LoadError::NotFound(url.to_string())
    }

    #[test]
    fn primary_without_texture_installs_directly() {
        let mut machine = LoadMachine::new();
        assert_eq!(machine.phase(), &LoadPhase::Idle);
        let fetch = machine.request(AssetSources::primary("head.glb"));
        assert_eq!(fetch.kind, FetchKind::Asset);
        assert_eq!(fetch.url, "head.glb");

        assert_eq!(
            machine.asset_loaded(fetch.request),
            Some(LoadCommand::Install {
                request: fetch.request,
                url: "head.glb".into(),
                textured: false
            })
        );
        assert_eq!(
            machine.phase(),
            &LoadPhase::Loaded {
                url: "head.glb".into(),
                role: AssetRole::Primary,
                textured: false
            }
        );
    }

    #[test]
    fn texture_failure_still_installs() {
        let mut machine = LoadMachine::new();
        let asset = machine.request(AssetSources::primary("head.glb").with_texture("skin.png"));
        let texture = fetched(machine.asset_loaded(asset.request));
        assert_eq!(texture.kind, FetchKind::Texture);
        assert_eq!(texture.url, "skin.png");
        assert!(matches!(machine.phase(), LoadPhase::Texturing { .. }));

        let install = machine.texture_failed(texture.request, &not_found("skin.png"));
        assert!(matches!(install, Some(LoadCommand::Install { textured: false, .. })));
    }

    #[test]
    fn texture_success_installs_textured() {
        let mut machine = LoadMachine::new();
        let asset = machine.request(AssetSources::primary("head.glb").with_texture("skin.png"));
        let texture = fetched(machine.asset_loaded(asset.request));
        let install = machine.texture_loaded(texture.request);
        assert!(matches!(install, Some(LoadCommand::Install { textured: true, .. })));
        assert_eq!(machine.in_flight(), None);
    }

    #[test]
    fn failure_walks_fallback_then_placeholder() {
        let mut machine = LoadMachine::new();
        let sources = AssetSources::primary("head.glb")
            .with_fallback("demo.glb")
            .with_texture("skin.png");
        let primary = machine.request(sources);
        let fallback = fetched(machine.asset_failed(primary.request, &not_found("head.glb")));
        assert_eq!(fallback.url, "demo.glb");
        assert_eq!(fallback.request, primary.request);

        assert_eq!(
            machine.asset_failed(fallback.request, &not_found("demo.glb")),
            Some(LoadCommand::ShowPlaceholder {
                request: primary.request
            })
        );
        assert_eq!(machine.phase(), &LoadPhase::Placeholder);
    }

    #[test]
    fn fallback_skips_texture() {
        let mut machine = LoadMachine::new();
        let sources = AssetSources::primary("head.glb")
            .with_fallback("demo.glb")
            .with_texture("skin.png");
        let primary = machine.request(sources);
        machine.asset_failed(primary.request, &not_found("head.glb"));
        assert!(matches!(
            machine.asset_loaded(primary.request),
            Some(LoadCommand::Install { textured: false, .. })
        ));
        assert!(matches!(
            machine.phase(),
            LoadPhase::Loaded { role: AssetRole::Fallback, .. }
        ));
    }

    #[test]
    fn without_fallback_failure_goes_to_placeholder() {
        let mut machine = LoadMachine::new();
        let primary = machine.request(AssetSources::primary("head.glb"));
        assert!(matches!(
            machine.asset_failed(primary.request, &not_found("head.glb")),
            Some(LoadCommand::ShowPlaceholder { .. })
        ));
    }

    #[test]
    fn superseded_completions_are_dropped() {
        let mut machine = LoadMachine::new();
        let first = machine.request(AssetSources::primary("a.glb"));
        let second = machine.request(AssetSources::primary("b.glb"));
        assert_ne!(first.request, second.request);

        assert_eq!(machine.asset_loaded(first.request), None);
        assert_eq!(machine.asset_failed(first.request, &not_found("a.glb")), None);
        assert_eq!(machine.texture_loaded(first.request), None);
        assert!(matches!(machine.phase(), LoadPhase::Loading { url, .. } if url == "b.glb"));

        assert!(matches!(
            machine.asset_loaded(second.request),
            Some(LoadCommand::Install { url, .. }) if url == "b.glb"
        ));
    }

    #[test]
    fn loaded_and_placeholder_accept_new_requests() {
        let mut machine = LoadMachine::new();
        let first = machine.request(AssetSources::primary("a.glb"));
        machine.asset_failed(first.request, &not_found("a.glb"));
        assert_eq!(machine.phase(), &LoadPhase::Placeholder);
        // Completions after reaching a terminal phase are ignored.
        assert_eq!(machine.asset_loaded(first.request), None);

        let second = machine.request(AssetSources::primary("b.glb"));
        machine.asset_loaded(second.request);
        let third = machine.request(AssetSources::primary("c.glb"));
        assert!(matches!(machine.phase(), LoadPhase::Loading { request, .. } if *request == third.request));
    }

    #[test]
    fn phase_renders_status_text() {
        let mut machine = LoadMachine::new();
        machine.request(AssetSources::primary("head.glb"));
        assert_eq!(machine.phase().to_string(), "loading head.glb");
        assert_eq!(LoadPhase::Placeholder.to_string(), "placeholder");
    }
}
