use async_trait::async_trait;
use chatrs_core::{
    ChatMessage, FragmentStream, GatewayError, LLMProvider, LLMResponse, Prompt, Role, Usage,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{Stream, StreamExt};
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Gateway for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        info!("Creating OpenAIProvider");
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap on generated tokens per response.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, prompt: &Prompt, model: &str, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: model.to_string(),
            messages: convert_messages(&prompt.to_messages()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    /// Send a request and turn transport or HTTP failures into gateway errors.
    async fn send(&self, request: &OpenAIRequest) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(GatewayError::from_status(
            status.as_u16(),
            error_message(&body),
        ))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, prompt: &Prompt, model: &str) -> Result<LLMResponse, GatewayError> {
        let request = self.build_request(prompt, model, false);

        info!(
            "Sending request to OpenAI API: model={}, messages={}",
            model,
            request.messages.len()
        );

        let body = self
            .send(&request)
            .await?
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let response = parse_completion(&body)?;
        info!("Received response from OpenAI API");
        Ok(response)
    }

    async fn stream(&self, prompt: &Prompt, model: &str) -> Result<FragmentStream, GatewayError> {
        let request = self.build_request(prompt, model, true);

        info!(
            "Opening stream to OpenAI API: model={}, messages={}",
            model,
            request.messages.len()
        );

        let response = self.send(&request).await?;

        let bytes = response.bytes_stream().map(|r| r.map_err(std::io::Error::other));
        let lines = LinesStream::new(BufReader::new(StreamReader::new(bytes)).lines());

        Ok(Box::pin(sse_fragments(lines)))
    }

    fn get_default_model(&self) -> &'static str {
        DEFAULT_MODEL
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIContent>,
    delta: Option<OpenAIContent>,
}

#[derive(Deserialize)]
struct OpenAIContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

const fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Human => "user",
        Role::Assistant => "assistant",
    }
}

fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAIMessage> {
    messages
        .iter()
        .map(|m| OpenAIMessage {
            role: wire_role(m.role()),
            content: m.content().to_string(),
        })
        .collect()
}

/// Prefer the provider's own error message over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<OpenAIError>(body).map_or_else(|_| body.to_string(), |e| e.error.message)
}

fn parse_completion(body: &str) -> Result<LLMResponse, GatewayError> {
    let response: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| GatewayError::MalformedResponse("missing content".to_string()))?;

    let usage = response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(LLMResponse {
        message: ChatMessage::assistant(content),
        usage,
    })
}

/// One decoded server-sent-event line.
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Fragment(String),
    Done,
    /// Keep-alives, non-data lines and empty deltas
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseEvent, GatewayError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: OpenAIResponse = serde_json::from_str(data).map_err(|e| {
        GatewayError::MalformedResponse(format!("failed to parse stream chunk: {e}"))
    })?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|content| !content.is_empty())
        .map_or(SseEvent::Skip, SseEvent::Fragment))
}

/// Content fragments of an SSE body. A body that ends without `[DONE]` was
/// cut off and ends the stream with an error.
fn sse_fragments<S>(lines: S) -> impl Stream<Item = Result<String, GatewayError>> + Send
where
    S: Stream<Item = std::io::Result<String>> + Send,
{
    async_stream::try_stream! {
        let mut lines = std::pin::pin!(lines);
        let mut finished = false;

        while let Some(line) = lines.next().await {
            let line =
                line.map_err(|e| GatewayError::Network(format!("stream read error: {e}")))?;
            match parse_sse_line(&line)? {
                SseEvent::Fragment(content) => yield content,
                SseEvent::Done => {
                    finished = true;
                    break;
                }
                SseEvent::Skip => {}
            }
        }

        if !finished {
            Err::<(), _>(GatewayError::MalformedResponse(
                "stream ended before [DONE]".to_string(),
            ))?;
        }
        debug!("Stream finished");
    }
}
