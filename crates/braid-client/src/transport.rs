//! Duplex transport to the generation backend

use std::time::Duration;

use async_trait::async_trait;
use braid_chat::protocol::{ChatMode, ClientCommand, ServerEvent};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{Error, Result};

/// Bounded exponential backoff for establishing the session connection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of retry attempts after the first failure
    pub max_retries: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Session bootstrap parameters.
///
/// These select backend behavior at connection time and are opaque to
/// the conversation core.
#[derive(Debug, Clone)]
pub struct SessionTarget {
    /// Backend base URL, e.g. `ws://127.0.0.1:8000`
    pub base_url: String,
    /// Storage id of the model to load
    pub model_id: i64,
    /// Conversation style
    pub mode: ChatMode,
    /// Quantization mode, e.g. `float16` or `gguf`
    pub quantization: Option<String>,
    /// Weight-file name, required when `quantization` is `gguf`
    pub gguf_file_name: Option<String>,
}

impl SessionTarget {
    /// Create a target for a plain chat session
    pub fn new(base_url: impl Into<String>, model_id: i64, mode: ChatMode) -> Self {
        Self {
            base_url: base_url.into(),
            model_id,
            mode,
            quantization: None,
            gguf_file_name: None,
        }
    }

    /// Select a quantization mode
    pub fn with_quantization(mut self, quantization: impl Into<String>) -> Self {
        self.quantization = Some(quantization.into());
        self
    }

    /// Select a GGUF weight file
    pub fn with_gguf_file(mut self, file_name: impl Into<String>) -> Self {
        self.gguf_file_name = Some(file_name.into());
        self
    }

    /// Render the websocket URL for this target
    pub fn url(&self) -> String {
        let chat_type = match self.mode {
            ChatMode::Chat => "chat",
            ChatMode::TextGeneration => "text_generation",
        };
        let mut query = format!("chat_type={}&ai_model_id={}", chat_type, self.model_id);
        if let Some(quantization) = &self.quantization {
            query.push_str("&quantization=");
            query.push_str(&urlencoding::encode(quantization));
        }
        if let Some(file_name) = &self.gguf_file_name {
            query.push_str("&gguf_file_name=");
            query.push_str(&urlencoding::encode(file_name));
        }
        format!("{}/ws/chat/?{}", self.base_url.trim_end_matches('/'), query)
    }
}

/// A duplex channel delivering backend events and accepting commands.
///
/// Implementations are consumed by exactly one [`ChatSession`]; closing
/// the channel is the only cancellation primitive the protocol has.
///
/// [`ChatSession`]: crate::session::ChatSession
#[async_trait]
pub trait Transport: Send {
    /// Send one command to the backend
    async fn send(&mut self, command: &ClientCommand) -> Result<()>;

    /// Wait for the next backend event. `Ok(None)` means the connection
    /// closed cleanly.
    async fn recv(&mut self) -> Result<Option<ServerEvent>>;

    /// Close the channel
    async fn close(&mut self) -> Result<()>;
}

/// Websocket transport over tokio-tungstenite
pub struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Connect to a session target with the default reconnect policy
    pub async fn connect(target: &SessionTarget) -> Result<Self> {
        Self::connect_with(target, &ReconnectPolicy::default()).await
    }

    /// Connect to a session target, retrying with backoff on failure
    pub async fn connect_with(target: &SessionTarget, policy: &ReconnectPolicy) -> Result<Self> {
        let url = target.url();
        let mut attempt = 0u32;
        loop {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    tracing::debug!(url = %url, "session connected");
                    return Ok(Self { inner: stream });
                }
                Err(e) => {
                    if attempt >= policy.max_retries {
                        return Err(Error::Connect {
                            attempts: attempt + 1,
                            message: e.to_string(),
                        });
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        "connect failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        policy.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, command: &ClientCommand) -> Result<()> {
        let body = serde_json::to_string(command)?;
        self.inner.send(Message::Text(body)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(frame) = self.inner.next().await {
            match frame? {
                Message::Text(body) => return Ok(Some(serde_json::from_str(&body)?)),
                Message::Binary(body) => return Ok(Some(serde_json::from_slice(&body)?)),
                Message::Close(_) => return Ok(None),
                // Control frames carry no protocol payload.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close(None).await?;
        Ok(())
    }
}
