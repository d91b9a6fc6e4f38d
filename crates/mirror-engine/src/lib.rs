//! Try-on generation core: credential resolution, request assembly, the
//! generation call, error classification and the session state machine.

pub mod classify;
pub mod client;
pub mod config;
pub mod credential;
pub mod request;
pub mod session;

pub use classify::{classify, ErrorKind};
pub use client::{GeminiTransport, GenerationClient, GenerationError, GenerationResult, GenerationTransport};
pub use config::{ConfigProvider, DotenvConfig, EngineConfig, EnvConfig, LayeredConfig, StaticConfig};
pub use credential::{Credential, CredentialResolver};
pub use request::{assemble, InlineData, Part};
pub use session::{
    GenerationRequest, GenerationStatus, KeySelector, SessionError, SessionSnapshot, TryOnSession,
};
