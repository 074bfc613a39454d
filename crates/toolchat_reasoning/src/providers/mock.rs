//! Scripted model client: deterministic responses for testing without API keys.
//!
//! Each call pops the next scripted reply and records the request it was given.
//! An exhausted script answers with an empty response.

use crate::api_types::{
    ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, MessagesRequest,
    MessagesResponse,
};
use crate::llm::{ChatClient, GenerateClient, MessagesClient};
use std::collections::VecDeque;
use std::sync::Mutex;
use toolchat_core::ModelError;

pub struct ScriptedClient<Req, Resp> {
    replies: Mutex<VecDeque<Result<Resp, ModelError>>>,
    requests: Mutex<Vec<Req>>,
}

pub type ScriptedMessagesClient = ScriptedClient<MessagesRequest, MessagesResponse>;
pub type ScriptedChatClient = ScriptedClient<ChatRequest, ChatResponse>;
pub type ScriptedGenerateClient = ScriptedClient<GenerateRequest, GenerateResponse>;

impl<Req: Clone, Resp: Default> ScriptedClient<Req, Resp> {
    pub fn new(replies: Vec<Result<Resp, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Result<Resp, ModelError>) {
        lock(&self.replies).push_back(reply);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Req> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next(&self, request: &Req) -> Result<Resp, ModelError> {
        lock(&self.requests).push(request.clone());
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Ok(Resp::default()))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl MessagesClient for ScriptedMessagesClient {
    async fn create_message(&self, request: &MessagesRequest) -> Result<MessagesResponse, ModelError> {
        self.next(request)
    }
}

#[async_trait::async_trait]
impl ChatClient for ScriptedChatClient {
    async fn create_chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, ModelError> {
        self.next(request)
    }
}

#[async_trait::async_trait]
impl GenerateClient for ScriptedGenerateClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ModelError> {
        self.next(request)
    }
}
