//! Maps upstream failures onto the closed set of error kinds the caller acts on.
//!
//! Classification matches on vendor error text. The markers live here and
//! nowhere else, so they can be adjusted without touching callers.

use serde::Serialize;
use thiserror::Error;

use crate::credential::Credential;

const INVALID_KEY_MARKERS: &[&str] = &["API_KEY_INVALID", "API key not valid"];
const PERMISSION_MARKERS: &[&str] = &["403", "PERMISSION_DENIED", "Requested entity was not found"];

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("no API key is configured; select or configure a key first")]
    MissingCredential,
    #[error(
        "the API key looks malformed; make sure it is not wrapped in quotes and starts with the provider prefix"
    )]
    MalformedCredential,
    #[error("the API key was rejected by the generation service")]
    InvalidCredential,
    #[error("authorization expired or the key lacks permission for this model; reconnect a key from a billing-enabled project")]
    PermissionDenied,
    #[error("the model did not return an image; try a clearer photo or check that the images contain no sensitive content")]
    NoImageProduced,
    #[error("{0}")]
    Unknown(String),
}

impl ErrorKind {
    /// Errors after which the credential flow must restart before another
    /// generation is allowed.
    pub fn forces_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential | Self::InvalidCredential | Self::PermissionDenied
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_API_KEY",
            Self::MalformedCredential => "MALFORMED_API_KEY",
            Self::InvalidCredential => "INVALID_API_KEY",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NoImageProduced => "NO_IMAGE_PRODUCED",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Classifies a raw upstream error message. `credential` is the key the
/// failed call used, if any; a rejected key that also failed the prefix check
/// is reported as malformed rather than invalid.
pub fn classify(message: &str, credential: Option<&Credential>) -> ErrorKind {
    if contains_any(message, INVALID_KEY_MARKERS) {
        let well_formed = credential.map(Credential::is_well_formed).unwrap_or(true);
        return if well_formed {
            ErrorKind::InvalidCredential
        } else {
            ErrorKind::MalformedCredential
        };
    }
    if contains_any(message, PERMISSION_MARKERS) {
        return ErrorKind::PermissionDenied;
    }
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return ErrorKind::Unknown("generation failed, please try again later".to_string());
    }
    ErrorKind::Unknown(trimmed.to_string())
}

fn contains_any(message: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::{classify, ErrorKind};
    use crate::credential::Credential;

    fn key(raw: &str) -> Option<Credential> {
        Credential::sanitize(raw, "AIza")
    }

    #[test]
    fn rejected_key_with_bad_prefix_is_malformed() {
        let credential = key("sk-123456789");
        assert_eq!(
            classify("400 Bad Request: API key not valid. Please pass a valid API key.", credential.as_ref()),
            ErrorKind::MalformedCredential
        );
    }

    #[test]
    fn rejected_well_formed_key_is_invalid() {
        let credential = key("AIzaSy0000000000");
        assert_eq!(
            classify("API key not valid. Please pass a valid API key.", credential.as_ref()),
            ErrorKind::InvalidCredential
        );
        assert_eq!(
            classify("{\"reason\":\"API_KEY_INVALID\"}", credential.as_ref()),
            ErrorKind::InvalidCredential
        );
    }

    #[test]
    fn permission_markers_map_to_permission_denied() {
        let credential = key("AIzaSy0000000000");
        for message in [
            "Gemini request failed (403): forbidden",
            "PERMISSION_DENIED",
            "Requested entity was not found.",
        ] {
            assert_eq!(
                classify(message, credential.as_ref()),
                ErrorKind::PermissionDenied,
                "{message}"
            );
        }
    }

    #[test]
    fn invalid_key_takes_precedence_over_permission() {
        let credential = key("AIzaSy0000000000");
        assert_eq!(
            classify("403 API_KEY_INVALID", credential.as_ref()),
            ErrorKind::InvalidCredential
        );
    }

    #[test]
    fn unrecognized_messages_are_preserved() {
        assert_eq!(
            classify("429 RESOURCE_EXHAUSTED: quota exceeded", None),
            ErrorKind::Unknown("429 RESOURCE_EXHAUSTED: quota exceeded".to_string())
        );
        assert!(matches!(classify("  ", None), ErrorKind::Unknown(message) if !message.is_empty()));
    }

    #[test]
    fn classify_is_deterministic() {
        let credential = key("AIzaSy0000000000");
        let first = classify("PERMISSION_DENIED", credential.as_ref());
        let second = classify("PERMISSION_DENIED", credential.as_ref());
        assert_eq!(first, second);
    }

    #[test]
    fn reauthorization_policy() {
        assert!(ErrorKind::MissingCredential.forces_reauthorization());
        assert!(ErrorKind::InvalidCredential.forces_reauthorization());
        assert!(ErrorKind::PermissionDenied.forces_reauthorization());
        assert!(!ErrorKind::MalformedCredential.forces_reauthorization());
        assert!(!ErrorKind::NoImageProduced.forces_reauthorization());
        assert!(!ErrorKind::Unknown("x".to_string()).forces_reauthorization());
    }
}
