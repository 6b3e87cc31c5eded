//! LLM API HTTP Client
//!
//! Talks to Azure OpenAI or an OpenAI-compatible API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};

use super::backend::{AssistantBackend, CompletionBackend};
use super::types::*;

/// Messages fetched when looking for the latest assistant reply
const MESSAGE_PAGE_SIZE: &str = "20";

/// LLM API client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_version: String,
    deployment: Option<String>,
    base_url: String,
    provider: LlmProvider,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;

        let base_url = match (&config.base_url, &config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::Azure) => {
                let endpoint = config
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| Error::Config("Azure endpoint not set".to_string()))?;
                format!("{}/openai", endpoint.trim_end_matches('/'))
            }
            (None, LlmProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
        };

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            deployment: config.deployment.clone(),
            base_url,
            provider: config.provider.clone(),
        })
    }

    /// Get the base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an authenticated request for `path` (relative to the base URL)
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.request(method, url);

        match self.provider {
            LlmProvider::Azure => request
                .header("api-key", &self.api_key)
                .query(&[("api-version", self.api_version.as_str())]),
            LlmProvider::OpenAi => request.bearer_auth(&self.api_key),
        }
    }

    /// Same as [`Self::request`], plus the header the assistants API needs
    fn assistants_request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.request(method, path);
        match self.provider {
            LlmProvider::OpenAi => request.header("OpenAI-Beta", "assistants=v2"),
            LlmProvider::Azure => request,
        }
    }

    /// Send a request and decode a JSON body, mapping non-2xx statuses to
    /// [`Error::Api`].
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("LLM API error: {} - {}", status, body);
            return Err(Error::Api(format!("{}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Api(format!("Failed to parse response: {} - {}", e, body)))
    }

    fn completions_path(&self) -> Result<String> {
        match self.provider {
            LlmProvider::Azure => {
                let deployment = self
                    .deployment
                    .as_deref()
                    .ok_or_else(|| Error::Config("Deployment name not set".to_string()))?;
                Ok(format!("/deployments/{}/chat/completions", deployment))
            }
            LlmProvider::OpenAi => Ok("/chat/completions".to_string()),
        }
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        sampling: SamplingParams,
    ) -> Result<ChatCompletionResponse> {
        let path = self.completions_path()?;

        let mut body = ChatCompletionRequest::new(messages.to_vec(), sampling);
        if self.provider == LlmProvider::OpenAi {
            body.model = self.deployment.clone();
        }

        debug!("Sending {} messages to {}", messages.len(), path);

        let response: ChatCompletionResponse =
            self.send(self.request(Method::POST, &path).json(&body)).await?;

        info!(
            "Chat completion: finish_reason={:?}, tokens={}",
            response.choices.first().and_then(|c| c.finish_reason.as_deref()),
            response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0)
        );

        Ok(response)
    }
}

/// Check an id before it is placed in a request path
fn remote_id(id: &str) -> Result<&str> {
    if is_valid_remote_id(id) {
        Ok(id)
    } else {
        Err(Error::Validation(format!("Invalid remote id: {:?}", id)))
    }
}

#[async_trait]
impl AssistantBackend for LlmClient {
    async fn create_thread(&self) -> Result<Thread> {
        let thread: Thread = self
            .send(
                self.assistants_request(Method::POST, "/threads")
                    .json(&serde_json::json!({})),
            )
            .await?;
        info!("Created thread {}", thread.id);
        Ok(thread)
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let body = CreateMessageRequest {
            role: Role::User,
            content: text.to_string(),
        };
        let _: ThreadMessage = self
            .send(
                self.assistants_request(
                    Method::POST,
                    &format!("/threads/{}/messages", remote_id(thread_id)?),
                )
                .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = CreateRunRequest {
            assistant_id: assistant_id.to_string(),
        };
        let run: Run = self
            .send(
                self.assistants_request(
                    Method::POST,
                    &format!("/threads/{}/runs", remote_id(thread_id)?),
                )
                .json(&body),
            )
            .await?;
        debug!("Started run {} on thread {}", run.id, thread_id);
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.send(self.assistants_request(
            Method::GET,
            &format!("/threads/{}/runs/{}", remote_id(thread_id)?, remote_id(run_id)?),
        ))
        .await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<MessageList> {
        self.send(
            self.assistants_request(
                Method::GET,
                &format!("/threads/{}/messages", remote_id(thread_id)?),
            )
            .query(&[("order", "desc"), ("limit", MESSAGE_PAGE_SIZE)]),
        )
        .await
    }
}
