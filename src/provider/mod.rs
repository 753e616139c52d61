//! Model provider abstraction
//!
//! An interface for LLM providers (OpenAI, local stand-ins) decoupled from the
//! run loop.
//!
//! - `ModelService`: `Service<CreateChatCompletionRequest, Response = ProviderResponse>`
//! - `OpenAIProvider`: any OpenAI-compatible endpoint through `async-openai`
//! - `FixedProvider`: always answers with the same response
//! - `FnProvider`: answers by calling a closure over the request, which makes
//!   scripted multi-turn conversations easy to express in tests and demos

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionResponseMessage, ChatCompletionToolType,
        CreateChatCompletionRequest, FunctionCall, Role,
    },
    Client,
};
use tower::{BoxError, Service};
use tracing::debug;

/// One model completion.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub assistant: ChatCompletionResponseMessage,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl ProviderResponse {
    /// An assistant reply with text and no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self::from_assistant(Some(content.into()), None)
    }

    /// An assistant reply carrying a single tool call.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::tool_calls(vec![(id.into(), name.into(), arguments.to_string())])
    }

    /// An assistant reply carrying several tool calls with raw argument strings.
    pub fn tool_calls(calls: Vec<(String, String, String)>) -> Self {
        let calls = calls
            .into_iter()
            .map(|(id, name, arguments)| ChatCompletionMessageToolCall {
                id,
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall { name, arguments },
            })
            .collect();
        Self::from_assistant(None, Some(calls))
    }

    #[allow(deprecated)]
    fn from_assistant(
        content: Option<String>,
        tool_calls: Option<Vec<ChatCompletionMessageToolCall>>,
    ) -> Self {
        Self {
            assistant: ChatCompletionResponseMessage {
                content,
                refusal: None,
                tool_calls,
                role: Role::Assistant,
                function_call: None,
                audio: None,
            },
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }
}

/// Any tower service that turns a chat request into a [`ProviderResponse`].
pub trait ModelService:
    Service<CreateChatCompletionRequest, Response = ProviderResponse, Error = BoxError>
{
}

impl<T> ModelService for T where
    T: Service<CreateChatCompletionRequest, Response = ProviderResponse, Error = BoxError>
{
}

/// Provider backed by the OpenAI chat completions API.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Arc<Client<OpenAIConfig>>,
}

impl OpenAIProvider {
    pub fn new(client: Arc<Client<OpenAIConfig>>) -> Self {
        Self { client }
    }
}

impl Service<CreateChatCompletionRequest> for OpenAIProvider {
    type Response = ProviderResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateChatCompletionRequest) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            debug!(model = %req.model, messages = req.messages.len(), "calling chat completions");
            let resp = client.chat().create(req).await?;
            let (prompt_tokens, completion_tokens) = resp
                .usage
                .as_ref()
                .map(|u| (u.prompt_tokens as usize, u.completion_tokens as usize))
                .unwrap_or((0, 0));
            let choice = resp
                .choices
                .into_iter()
                .next()
                .ok_or("model returned no choices")?;
            Ok(ProviderResponse {
                assistant: choice.message,
                prompt_tokens,
                completion_tokens,
            })
        })
    }
}

/// Always returns the same response.
#[derive(Clone)]
pub struct FixedProvider {
    response: ProviderResponse,
}

impl FixedProvider {
    pub fn new(response: ProviderResponse) -> Self {
        Self { response }
    }
}

impl Service<CreateChatCompletionRequest> for FixedProvider {
    type Response = ProviderResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: CreateChatCompletionRequest) -> Self::Future {
        let response = self.response.clone();
        Box::pin(async move { Ok(response) })
    }
}

/// Answers each request by calling a closure.
#[derive(Clone)]
#[allow(clippy::type_complexity)]
pub struct FnProvider {
    respond: Arc<
        dyn Fn(&CreateChatCompletionRequest) -> Result<ProviderResponse, BoxError> + Send + Sync,
    >,
}

impl FnProvider {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&CreateChatCompletionRequest) -> Result<ProviderResponse, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            respond: Arc::new(respond),
        }
    }
}

impl Service<CreateChatCompletionRequest> for FnProvider {
    type Response = ProviderResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateChatCompletionRequest) -> Self::Future {
        let out = (self.respond)(&req);
        Box::pin(async move { out })
    }
}
