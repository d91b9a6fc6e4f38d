use std::fmt;

use crate::classify::ErrorKind;
use crate::config::ConfigProvider;

pub const CREDENTIAL_KEYS: &[&str] = &["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];
pub const CREDENTIAL_PREFIX: &str = "AIza";

const MASK_HEAD: usize = 5;
const MASK_TAIL: usize = 4;
/// Keys this short or shorter are fully redacted; longer ones keep at least
/// four hidden characters between head and tail.
const MASK_MAX_REDACTED: usize = 12;
const REDACTED: &str = "******";

/// A sanitized API key. `Debug` and `Display` only ever show the masked form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    well_formed: bool,
}

impl Credential {
    /// Strips every quote character and outer whitespace, then records
    /// whether the result carries the expected provider prefix. Returns
    /// `None` when nothing is left.
    pub fn sanitize(raw: &str, prefix: &str) -> Option<Self> {
        let unquoted: String = raw.chars().filter(|ch| *ch != '"' && *ch != '\'').collect();
        let value = unquoted.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self {
            well_formed: value.starts_with(prefix),
            value: value.to_string(),
        })
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Whether the key starts with the provider prefix. A mismatch is only a
    /// hint; the upstream call decides validity.
    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// First 5 and last 4 characters, or a fixed marker for short keys.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.value.chars().collect();
        if chars.len() <= MASK_MAX_REDACTED {
            return REDACTED.to_string();
        }
        let head: String = chars[..MASK_HEAD].iter().collect();
        let tail: String = chars[chars.len() - MASK_TAIL..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("masked", &self.masked())
            .field("well_formed", &self.well_formed)
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Looks the credential up afresh on every call; nothing is cached so a key
/// rotated between attempts is picked up immediately.
pub struct CredentialResolver {
    config: Box<dyn ConfigProvider>,
    keys: Vec<String>,
    prefix: String,
}

impl CredentialResolver {
    pub fn new(config: Box<dyn ConfigProvider>) -> Self {
        Self {
            config,
            keys: CREDENTIAL_KEYS.iter().map(|key| (*key).to_string()).collect(),
            prefix: CREDENTIAL_PREFIX.to_string(),
        }
    }

    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(|key| (*key).to_string()).collect();
        self
    }

    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    pub fn resolve(&self) -> Result<Credential, ErrorKind> {
        let found = self.keys.iter().find_map(|key| {
            let raw = self.config.get(key)?;
            Credential::sanitize(&raw, &self.prefix).map(|credential| (key, credential))
        });
        let Some((key, credential)) = found else {
            tracing::error!(
                keys = %self.keys.join(", "),
                "no API key configured; select a key or set one in the environment"
            );
            return Err(ErrorKind::MissingCredential);
        };

        tracing::info!(
            source = %key,
            "using API key {} (length {})",
            credential.masked(),
            credential.len()
        );
        if !credential.is_well_formed() {
            let shown: String = credential.expose().chars().take(3).collect();
            tracing::warn!(
                "API key does not start with {}; current prefix {shown}... \
                 check the configuration for stray characters",
                self.prefix
            );
        }
        Ok(credential)
    }
}
