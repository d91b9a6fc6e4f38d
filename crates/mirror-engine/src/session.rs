use std::sync::{Arc, Mutex, MutexGuard};

use mirror_contracts::assets::ImageAsset;
use mirror_contracts::events::{EventWriter, SessionEvent};
use mirror_contracts::history::{HistoryCache, HistoryEntry};
use mirror_contracts::models::ModelCatalog;
use serde::Serialize;
use thiserror::Error;

use crate::classify::ErrorKind;
use crate::client::{GenerationClient, GenerationResult, GenerationTransport};
use crate::credential::CredentialResolver;
use crate::request::assemble;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Idle,
    Processing,
    Success,
    Error,
}

/// What the UI collects before asking for a generation. Images are optional
/// here; the session refuses to start until both are present.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub person: Option<ImageAsset>,
    pub garment: Option<ImageAsset>,
    pub instruction: String,
    /// Empty selects the catalog default.
    pub model_id: String,
}

impl GenerationRequest {
    pub fn new(person: Option<ImageAsset>, garment: Option<ImageAsset>) -> Self {
        Self {
            person,
            garment,
            ..Self::default()
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    fn images(&self) -> Option<(&ImageAsset, &ImageAsset)> {
        Some((self.person.as_ref()?, self.garment.as_ref()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("upload both a person photo and a garment photo first")]
    MissingImages,
    #[error("a generation is already in progress")]
    Busy,
    #[error("an API key must be selected before generating")]
    NeedsAuthorization,
    #[error("the generation was dismissed before it completed")]
    Dismissed,
    #[error(transparent)]
    Generation(#[from] ErrorKind),
}

impl SessionError {
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::Generation(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Interactive key selection offered by the host environment.
pub trait KeySelector: Send + Sync {
    fn select_key(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: GenerationStatus,
    pub needs_authorization: bool,
    pub result: Option<GenerationResult>,
    pub last_error: Option<ErrorKind>,
}

#[derive(Debug)]
struct SessionState {
    status: GenerationStatus,
    needs_authorization: bool,
    result: Option<GenerationResult>,
    last_error: Option<ErrorKind>,
    /// Bumped whenever in-flight work is started or invalidated; a
    /// completion only applies if the epoch it started under is current.
    epoch: u64,
}

/// Sequences credential resolution, request assembly, the generation call
/// and the history write. At most one generation runs at a time.
pub struct TryOnSession {
    resolver: CredentialResolver,
    client: GenerationClient,
    history: HistoryCache,
    catalog: ModelCatalog,
    events: Option<EventWriter>,
    key_selector: Option<Box<dyn KeySelector>>,
    state: Mutex<SessionState>,
}

impl TryOnSession {
    pub fn new(
        resolver: CredentialResolver,
        transport: Arc<dyn GenerationTransport>,
        history: HistoryCache,
    ) -> Self {
        Self {
            resolver,
            client: GenerationClient::new(transport),
            history,
            catalog: ModelCatalog::default(),
            events: None,
            key_selector: None,
            state: Mutex::new(SessionState {
                status: GenerationStatus::Idle,
                needs_authorization: false,
                result: None,
                last_error: None,
                epoch: 0,
            }),
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_key_selector(mut self, selector: Box<dyn KeySelector>) -> Self {
        self.key_selector = Some(selector);
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        SessionSnapshot {
            status: state.status,
            needs_authorization: state.needs_authorization,
            result: state.result.clone(),
            last_error: state.last_error.clone(),
        }
    }

    pub fn status(&self) -> GenerationStatus {
        self.lock_state().status
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, SessionError> {
        let images = request.images();
        let epoch = {
            let mut state = self.lock_state();
            if state.status == GenerationStatus::Processing {
                tracing::warn!("ignoring generate while a generation is in progress");
                return Err(SessionError::Busy);
            }
            if state.needs_authorization {
                return Err(SessionError::NeedsAuthorization);
            }
            if images.is_none() {
                tracing::warn!("generate requested without both images");
                return Err(SessionError::MissingImages);
            }
            state.status = GenerationStatus::Processing;
            state.result = None;
            state.last_error = None;
            state.epoch += 1;
            state.epoch
        };
        let Some((person, garment)) = images else {
            return Err(SessionError::MissingImages);
        };

        let model = if request.model_id.is_empty() {
            self.catalog.default_id()
        } else {
            request.model_id.as_str()
        };
        tracing::info!(model, epoch, "starting try-on generation");
        self.record(SessionEvent::GenerationStarted {
            model: model.to_string(),
            epoch,
        });

        let outcome = self.run(person, garment, &request.instruction, model);

        let mut state = self.lock_state();
        if state.epoch != epoch || state.status != GenerationStatus::Processing {
            tracing::info!(epoch, "discarding result of a dismissed generation");
            return Err(SessionError::Dismissed);
        }
        match outcome {
            Ok(result) => {
                state.status = GenerationStatus::Success;
                state.result = Some(result.clone());
                drop(state);
                self.history.append(HistoryEntry::new(
                    person.preview(),
                    garment.preview(),
                    result.image_url.clone(),
                    request.instruction.clone(),
                    self.catalog.display_name(model),
                ));
                self.record(SessionEvent::GenerationSucceeded {
                    model: model.to_string(),
                    mime_type: result.mime_type.clone(),
                });
                Ok(result)
            }
            Err(kind) => {
                if kind.forces_reauthorization() {
                    state.status = GenerationStatus::Idle;
                    state.needs_authorization = true;
                } else {
                    state.status = GenerationStatus::Error;
                }
                state.last_error = Some(kind.clone());
                drop(state);
                tracing::error!(code = kind.code(), "try-on generation failed: {kind}");
                self.record(SessionEvent::GenerationFailed {
                    model: model.to_string(),
                    error: kind.code().to_string(),
                    reauthorize: kind.forces_reauthorization(),
                });
                Err(SessionError::Generation(kind))
            }
        }
    }

    fn run(
        &self,
        person: &ImageAsset,
        garment: &ImageAsset,
        instruction: &str,
        model: &str,
    ) -> Result<GenerationResult, ErrorKind> {
        let credential = self.resolver.resolve()?;
        let parts = assemble(person, garment, instruction);
        self.client
            .send(&credential, model, &parts)
            .map_err(|err| err.kind(&credential))
    }

    /// Back to idle from any state. A generation still in flight is left to
    /// finish, but its outcome is discarded.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.status = GenerationStatus::Idle;
        state.result = None;
        state.last_error = None;
        state.epoch += 1;
        drop(state);
        self.record(SessionEvent::SessionReset);
    }

    /// Runs interactive key selection when available, then checks that a
    /// credential resolves. Success re-enables generation.
    pub fn resolve_and_authorize(&self) -> Result<(), ErrorKind> {
        if let Some(selector) = &self.key_selector {
            if let Err(err) = selector.select_key() {
                tracing::error!("API key selection failed: {err:#}");
                return Err(ErrorKind::Unknown(format!("API key selection failed: {err}")));
            }
        }
        let resolved = self.resolver.resolve();
        let authorized = resolved.is_ok();
        {
            let mut state = self.lock_state();
            state.needs_authorization = !authorized;
            if authorized
                && state
                    .last_error
                    .as_ref()
                    .map(ErrorKind::forces_reauthorization)
                    .unwrap_or(false)
            {
                state.last_error = None;
            }
        }
        self.record(SessionEvent::AuthorizationChanged { authorized });
        resolved.map(|_| ())
    }

    pub fn list_history(&self) -> Vec<HistoryEntry> {
        self.history.list()
    }

    /// A past generation by id, for reopening its result.
    pub fn history_entry(&self, id: &str) -> Option<HistoryEntry> {
        self.history.get(id)
    }

    pub fn clear_history(&self) {
        self.history.clear();
        self.record(SessionEvent::HistoryCleared);
    }

    fn record(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            events.record(&event);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
