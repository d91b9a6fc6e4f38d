use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Source of string settings. Implementations must not cache: every `get`
/// reflects the current state of the underlying source.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigProvider for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Reads a `.env` file, re-parsed on every lookup so edits take effect
/// without a restart. A missing file yields nothing.
#[derive(Debug, Clone)]
pub struct DotenvConfig {
    path: PathBuf,
}

impl DotenvConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for DotenvConfig {
    fn get(&self, key: &str) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        parse_dotenv(&content).remove(key)
    }
}

/// Fixed in-memory settings.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    values: HashMap<String, String>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigProvider for StaticConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// First provider holding a non-blank value wins.
#[derive(Default)]
pub struct LayeredConfig {
    layers: Vec<Box<dyn ConfigProvider>>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.layers.push(Box::new(provider));
        self
    }
}

impl ConfigProvider for LayeredConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.layers
            .iter()
            .filter_map(|layer| layer.get(key))
            .find(|value| !value.trim().is_empty())
    }
}

/// Parses `KEY=value` lines. Blank lines, `#` comments and `export ` prefixes
/// are tolerated. Values are kept verbatim apart from outer whitespace, so
/// stray quotes reach the credential resolver, which strips them.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), value.trim().to_string());
    }
    vars
}

pub const API_BASE_KEY: &str = "GEMINI_API_BASE";
pub const REQUEST_TIMEOUT_KEY: &str = "MIRROR_REQUEST_TIMEOUT";
pub const HISTORY_PATH_KEY: &str = "MIRROR_HISTORY_PATH";

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_S: f64 = 120.0;
const MIN_TIMEOUT_S: f64 = 15.0;
const MAX_TIMEOUT_S: f64 = 600.0;

/// Transport and storage settings resolved from a [`ConfigProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_base: String,
    pub request_timeout: Duration,
    pub history_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_provider(config: &dyn ConfigProvider) -> Self {
        let api_base = config
            .get(API_BASE_KEY)
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout_s = config
            .get(REQUEST_TIMEOUT_KEY)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_TIMEOUT_S)
            .clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S);
        let history_path = config
            .get(HISTORY_PATH_KEY)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            api_base,
            request_timeout: Duration::from_secs_f64(timeout_s),
            history_path,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_provider(&StaticConfig::new())
    }
}
