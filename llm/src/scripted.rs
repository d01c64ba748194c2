//! A deterministic client that replays queued replies.
//!
//! Used by tests and dry runs to drive the pipeline without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::{Completion, CompletionRequest, LlmClient};
use crate::error::{LlmError, Result};

/// One queued reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text.
    Text(String),
    /// Fail with an API error carrying this status code.
    Status { status: u16, message: String },
    /// Fail with a connection error.
    ConnectionFailure(String),
    /// Wait before returning this text.
    Delayed { delay: Duration, text: String },
}

impl ScriptedReply {
    /// Convenience constructor for a text reply.
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    /// Convenience constructor for a JSON reply.
    pub fn json(value: &serde_json::Value) -> Self {
        ScriptedReply::Text(value.to_string())
    }
}

/// Client that answers from a queue of scripted replies.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    /// Create a client that will answer with `replies` in order.
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    /// Replies not yet consumed.
    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);

        let reply = self.replies.lock().await.pop_front();
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(Completion::new(text)),
            Some(ScriptedReply::Status { status, message }) => {
                Err(LlmError::Api { status, message })
            }
            Some(ScriptedReply::ConnectionFailure(message)) => Err(LlmError::Connection(message)),
            Some(ScriptedReply::Delayed { delay, text }) => {
                tokio::time::sleep(delay).await;
                Ok(Completion::new(text))
            }
            None => Err(LlmError::InvalidResponse(
                "scripted client has no replies left".to_string(),
            )),
        }
    }
}
