use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mirror_contracts::assets::decode_data_uri;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::classify::{classify, ErrorKind};
use crate::config::EngineConfig;
use crate::credential::Credential;
use crate::request::{InlineData, Part};

const DEFAULT_RESULT_MIME: &str = "image/png";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// Outbound call to the generation endpoint. Returns the raw JSON body of a
/// successful response; any transport or HTTP failure is an error whose text
/// carries the upstream status and message.
pub trait GenerationTransport: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(&self, credential: &Credential, model: &str, parts: &[Part]) -> Result<Value>;
}

/// `generateContent` over the Gemini REST API.
pub struct GeminiTransport {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiTransport {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base.clone(),
            timeout: config.request_timeout,
            http,
        })
    }

    /// The model id goes into the path exactly as given.
    fn endpoint_for_model(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.api_base)
    }
}

impl GenerationTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(&self, credential: &Credential, model: &str, parts: &[Part]) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
        });
        // Header rather than query string so the key never shows up in
        // transport error messages, which include the URL.
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", credential.expose())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, ERROR_BODY_MAX_CHARS)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts: Vec<Part>,
}

/// Upstream sends `null` and omits fields interchangeably.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A produced image plus any commentary the model returned with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// `data:` URI of the generated image.
    pub image_url: String,
    pub mime_type: String,
    pub description: Option<String>,
}

impl GenerationResult {
    /// Extracts the result from the first candidate: text parts are
    /// concatenated in order, the first non-empty inline-data part is the
    /// image. `None` when no image was produced.
    pub fn from_response(response: &GenerateContentResponse) -> Option<Self> {
        let parts = response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or_default();

        let mut description = String::new();
        let mut image: Option<&InlineData> = None;
        for part in parts {
            match part {
                Part::Text(text) => description.push_str(text),
                Part::InlineData(inline) if image.is_none() && !inline.data.is_empty() => {
                    image = Some(inline);
                }
                Part::InlineData(_) | Part::Other => {}
            }
        }

        let inline = image?;
        let mime_type = inline
            .mime_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_RESULT_MIME)
            .to_string();
        Some(Self {
            image_url: format!("data:{mime_type};base64,{}", inline.data),
            mime_type,
            description: (!description.is_empty()).then_some(description),
        })
    }

    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        let (_, bytes) = decode_data_uri(&self.image_url).context("invalid result image")?;
        Ok(bytes)
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The call succeeded but no image came back, typically a safety refusal.
    #[error("model returned no image")]
    NoImageProduced { response: Value },
    #[error("{message}")]
    Upstream { message: String },
}

impl GenerationError {
    pub fn kind(&self, credential: &Credential) -> ErrorKind {
        match self {
            Self::NoImageProduced { .. } => ErrorKind::NoImageProduced,
            Self::Upstream { message } => classify(message, Some(credential)),
        }
    }
}

/// Sends assembled parts through a [`GenerationTransport`] and turns the
/// response into a [`GenerationResult`]. No retries.
#[derive(Clone)]
pub struct GenerationClient {
    transport: Arc<dyn GenerationTransport>,
}

impl GenerationClient {
    pub fn new(transport: Arc<dyn GenerationTransport>) -> Self {
        Self { transport }
    }

    pub fn send(
        &self,
        credential: &Credential,
        model: &str,
        parts: &[Part],
    ) -> Result<GenerationResult, GenerationError> {
        tracing::info!(
            transport = self.transport.name(),
            model,
            parts = parts.len(),
            "requesting try-on generation"
        );
        let raw = self
            .transport
            .generate_content(credential, model, parts)
            .map_err(|err| {
                let message = error_chain_text(&err, 2048);
                tracing::error!("generation call failed: {message}");
                GenerationError::Upstream { message }
            })?;

        let response: GenerateContentResponse =
            serde_json::from_value(raw.clone()).map_err(|err| {
                tracing::error!("generation response has unexpected shape: {err}");
                GenerationError::Upstream {
                    message: format!("unexpected response shape: {err}"),
                }
            })?;
        tracing::info!(
            candidates = response.candidates.len(),
            "generation response received"
        );

        match GenerationResult::from_response(&response) {
            Some(result) => Ok(result),
            None => {
                tracing::warn!(
                    response = %truncate_text(&raw.to_string(), ERROR_BODY_MAX_CHARS),
                    "no image in response; the model likely declined the request"
                );
                Err(GenerationError::NoImageProduced { response: raw })
            }
        }
    }
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
