//! Minimal Ollama API client.
//!
//! This crate provides a focused client for Ollama's generate endpoint with:
//! - Non-streaming and streaming completions
//! - Sampling options (temperature, top-p, output length, seed)
//! - Buffered NDJSON parsing for streaming responses

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;

const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3";

/// Local models can take minutes to load and answer on modest hardware.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when using the Ollama client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Server reported an error: {0}")]
    Server(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Ollama API client.
#[derive(Clone)]
pub struct Ollama {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl Ollama {
    /// Create a new client for the server at `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            client: build_http_client(DEFAULT_TIMEOUT)?,
            base_url: normalize_base_url(base_url.into())?,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Create a client from the OLLAMA_HOST environment variable,
    /// falling back to the default local server.
    pub fn from_env() -> Result<Self, Error> {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        Self::new(host)
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Replace the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }

    /// The default model used when a request does not name one.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a generate request and return the full response.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, Error> {
        let api_request = self.build_api_request(&request, false);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: extract_error_message(&body),
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        parse_response(api_response)
    }

    /// Send a generate request and stream the response chunks.
    pub async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<GenerateChunk, Error>> + Send>>, Error> {
        let api_request = self.build_api_request(&request, true);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: extract_error_message(&body),
            });
        }

        let stream = ndjson_chunks(response.bytes_stream());
        Ok(Box::pin(stream))
    }

    fn build_api_request(&self, request: &GenerateRequest, stream: bool) -> ApiRequest {
        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            stream,
            options: if request.options.is_empty() {
                None
            } else {
                Some(request.options.clone())
            },
        }
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))
}

fn normalize_base_url(url: String) -> Result<String, Error> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Empty base URL".to_string()));
    }
    // OLLAMA_HOST is commonly set as a bare host:port
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("http://{trimmed}"))
    }
}

/// Ollama reports failures as `{"error": "..."}`; fall back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

fn parse_response(api_response: ApiResponse) -> Result<GenerateResponse, Error> {
    if let Some(message) = api_response.error {
        return Err(Error::Server(message));
    }

    Ok(GenerateResponse {
        model: api_response.model,
        text: api_response.response,
        done_reason: api_response.done_reason.as_deref().map(DoneReason::parse),
        usage: Usage {
            prompt_tokens: api_response.prompt_eval_count.unwrap_or(0),
            completion_tokens: api_response.eval_count.unwrap_or(0),
        },
    })
}

// ============================================================================
// Public types
// ============================================================================

/// A generate request to send to Ollama.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: Option<String>,
    pub prompt: String,
    pub system: Option<String>,
    pub options: Options,
}

impl GenerateRequest {
    /// Create a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            prompt: prompt.into(),
            system: None,
            options: Options::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.options.top_p = Some(top_p);
        self
    }

    /// Cap the number of generated tokens.
    pub fn with_num_predict(mut self, num_predict: i32) -> Self {
        self.options.num_predict = Some(num_predict);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.options.seed = Some(seed);
        self
    }
}

/// Sampling options forwarded verbatim to the model runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl Options {
    fn is_empty(&self) -> bool {
        *self == Options::default()
    }
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub model: String,
    pub text: String,
    pub done_reason: Option<DoneReason>,
    pub usage: Usage,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoneReason {
    Stop,
    Length,
    Load,
    Other(String),
}

impl DoneReason {
    fn parse(reason: &str) -> Self {
        match reason {
            "stop" => DoneReason::Stop,
            "length" => DoneReason::Length,
            "load" => DoneReason::Load,
            other => DoneReason::Other(other.to_string()),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// One line of a streaming response.
#[derive(Debug, Clone)]
pub struct GenerateChunk {
    pub text: String,
    pub done: bool,
    pub done_reason: Option<DoneReason>,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Options>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Turn a byte stream of NDJSON into parsed chunks.
///
/// Network reads split lines, and can split a multi-byte character, at any
/// byte. Bytes are buffered and only complete lines are decoded.
fn ndjson_chunks<S, B, E>(bytes: S) -> impl Stream<Item = Result<GenerateChunk, Error>> + Send
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    bytes
        .scan(Vec::new(), |buffer, result| {
            let chunks = match result {
                Ok(bytes) => {
                    buffer.extend_from_slice(bytes.as_ref());
                    parse_ndjson_buffered(buffer)
                }
                Err(e) => vec![Err(Error::Network(e.to_string()))],
            };
            futures::future::ready(Some(chunks))
        })
        .flat_map(futures::stream::iter)
}

/// Parse complete NDJSON lines from a buffer, leaving any trailing partial
/// line for the next read.
fn parse_ndjson_buffered(buffer: &mut Vec<u8>) -> Vec<Result<GenerateChunk, Error>> {
    let mut chunks = Vec::new();

    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=newline_pos).collect();

        let line = match std::str::from_utf8(&line) {
            Ok(line) => line.trim(),
            Err(e) => {
                chunks.push(Err(Error::Parse(format!("NDJSON line is not UTF-8: {e}"))));
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ApiResponse>(line) {
            Ok(ApiResponse {
                error: Some(message),
                ..
            }) => chunks.push(Err(Error::Server(message))),
            Ok(api) => chunks.push(Ok(GenerateChunk {
                text: api.response,
                done: api.done,
                done_reason: api.done_reason.as_deref().map(DoneReason::parse),
            })),
            Err(e) => chunks.push(Err(Error::Parse(format!("NDJSON parse error: {e}")))),
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Ollama::new("http://localhost:11434/").unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_client_bare_host() {
        let client = Ollama::new("127.0.0.1:11434").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_client_empty_host_rejected() {
        assert!(matches!(Ollama::new("  "), Err(Error::Config(_))));
    }

    #[test]
    fn test_client_with_model() {
        let client = Ollama::new(DEFAULT_HOST).unwrap().with_model("mistral");
        assert_eq!(client.model(), "mistral");
    }

    #[test]
    fn test_request_builder() {
        let request = GenerateRequest::new("Once upon a time")
            .with_system("You are a novelist")
            .with_temperature(0.7)
            .with_num_predict(200);

        assert_eq!(request.prompt, "Once upon a time");
        assert!(request.system.is_some());
        assert_eq!(request.options.temperature, Some(0.7));
        assert_eq!(request.options.num_predict, Some(200));
        assert_eq!(request.options.seed, None);
    }

    #[test]
    fn test_api_request_uses_client_model_by_default() {
        let client = Ollama::new(DEFAULT_HOST).unwrap().with_model("llama3:8b");
        let api = client.build_api_request(&GenerateRequest::new("hi"), false);
        assert_eq!(api.model, "llama3:8b");
        assert!(api.options.is_none());

        let api = client.build_api_request(&GenerateRequest::new("hi").with_model("phi3"), true);
        assert_eq!(api.model, "phi3");
        assert!(api.stream);
    }

    #[test]
    fn test_api_request_serialization_skips_unset_options() {
        let client = Ollama::new(DEFAULT_HOST).unwrap();
        let api = client.build_api_request(&GenerateRequest::new("hi").with_seed(7), false);
        let json = serde_json::to_value(&api).unwrap();

        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["seed"], 7);
        assert!(json["options"].get("temperature").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_parse_response() {
        let api: ApiResponse = serde_json::from_str(
            r#"{"model":"llama3","response":"The door creaked.","done":true,"done_reason":"stop","prompt_eval_count":12,"eval_count":5}"#,
        )
        .unwrap();

        let response = parse_response(api).unwrap();
        assert_eq!(response.text, "The door creaked.");
        assert_eq!(response.done_reason, Some(DoneReason::Stop));
        assert_eq!(response.usage.prompt_tokens, 12);
        assert_eq!(response.usage.completion_tokens, 5);
    }

    #[test]
    fn test_parse_response_in_band_error() {
        let api: ApiResponse = serde_json::from_str(r#"{"error":"model not loaded"}"#).unwrap();
        assert!(matches!(parse_response(api), Err(Error::Server(m)) if m == "model not loaded"));
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":"model 'nope' not found"}"#),
            "model 'nope' not found"
        );
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_ndjson_partial_lines_carry_over() {
        let mut buffer =
            b"{\"response\":\"The \",\"done\":false}\n{\"response\":\"night\",\"do".to_vec();

        let chunks = parse_ndjson_buffered(&mut buffer);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().text, "The ");
        assert!(buffer.starts_with(b"{\"response\":\"night\""));

        buffer.extend_from_slice(b"ne\":true,\"done_reason\":\"length\"}\n");
        let chunks = parse_ndjson_buffered(&mut buffer);
        assert_eq!(chunks.len(), 1);
        let last = chunks[0].as_ref().unwrap();
        assert_eq!(last.text, "night");
        assert!(last.done);
        assert_eq!(last.done_reason, Some(DoneReason::Length));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_ndjson_character_split_across_reads() {
        let line = "{\"response\":\"café\",\"done\":false}\n".as_bytes();
        // 'é' is 0xC3 0xA9; cut between the two bytes.
        let cut = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = line[..cut].to_vec();
        assert!(parse_ndjson_buffered(&mut buffer).is_empty());

        buffer.extend_from_slice(&line[cut..]);
        let chunks = parse_ndjson_buffered(&mut buffer);
        assert_eq!(chunks[0].as_ref().unwrap().text, "café");
    }

    #[test]
    fn test_chunk_stream_reassembles_lines() {
        let body = "{\"response\":\"Élodie \",\"done\":false}\n{\"response\":\"waited\",\"done\":true,\"done_reason\":\"stop\"}\n";
        let reads: Vec<Result<Vec<u8>, std::io::Error>> = body
            .as_bytes()
            .chunks(7)
            .map(|piece| Ok(piece.to_vec()))
            .collect();

        let chunks: Vec<_> =
            futures::executor::block_on(ndjson_chunks(futures::stream::iter(reads)).collect());

        let texts: Vec<String> = chunks.iter().map(|c| c.as_ref().unwrap().text.clone()).collect();
        assert_eq!(texts, vec!["Élodie ", "waited"]);
        assert!(chunks[1].as_ref().unwrap().done);
    }

    #[test]
    fn test_chunk_stream_reports_read_errors() {
        let reads: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))];

        let chunks: Vec<_> =
            futures::executor::block_on(ndjson_chunks(futures::stream::iter(reads)).collect());
        assert!(matches!(&chunks[0], Err(Error::Network(m)) if m.contains("reset")));
    }

    #[test]
    fn test_ndjson_error_and_garbage_lines() {
        let mut buffer = b"{\"error\":\"out of memory\"}\n\nnot json\n".to_vec();
        let chunks = parse_ndjson_buffered(&mut buffer);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[0], Err(Error::Server(_))));
        assert!(matches!(chunks[1], Err(Error::Parse(_))));
    }

    #[test]
    fn test_done_reason_parse() {
        assert_eq!(DoneReason::parse("load"), DoneReason::Load);
        assert_eq!(
            DoneReason::parse("unload"),
            DoneReason::Other("unload".to_string())
        );
    }
}
