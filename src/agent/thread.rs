//! Thread-aware agent adapter
//!
//! Wraps any `AgentHandle` with chat-framework semantics: typed message
//! roles, a thread identity created lazily on first use, and a message log
//! for that thread. One adapter per conversation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, RwLock};
use uuid::Uuid;

use super::{AgentDefinition, AgentHandle};
use crate::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    System,
    User,
    Assistant,
}

impl AuthorRole {
    fn label(&self) -> &'static str {
        match self {
            AuthorRole::System => "SYSTEM",
            AuthorRole::User => "USER",
            AuthorRole::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: AuthorRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: AuthorRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(AuthorRole::User, content)
    }

    pub fn assistant(name: &str, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::new(AuthorRole::Assistant, content)
        }
    }
}

/// Render messages into one prompt. A single user message is sent verbatim.
pub fn render_messages(messages: &[ChatMessage]) -> String {
    match messages {
        [only] if only.role == AuthorRole::User => only.content.clone(),
        _ => messages
            .iter()
            .map(|m| match &m.name {
                Some(name) => format!("{} ({}) > {}", m.role.label(), name, m.content),
                None => format!("{} > {}", m.role.label(), m.content),
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

pub struct ThreadedAgent {
    inner: Arc<dyn AgentHandle>,
    thread: OnceCell<String>,
    messages: RwLock<Vec<ChatMessage>>,
    /// Held for a whole call so turns on one thread never interleave.
    turn: Mutex<()>,
}

impl ThreadedAgent {
    pub fn new(inner: Arc<dyn AgentHandle>) -> Self {
        Self {
            inner,
            thread: OnceCell::new(),
            messages: RwLock::new(Vec::new()),
            turn: Mutex::new(()),
        }
    }

    async fn ensure_thread(&self) -> String {
        self.thread
            .get_or_init(|| async { format!("thread_{}", Uuid::new_v4().simple()) })
            .await
            .clone()
    }

    /// Framework-style call: answer the given messages and log both sides on
    /// this agent's thread.
    pub async fn get_response(&self, messages: &[ChatMessage]) -> Result<ChatMessage> {
        let _turn = self.turn.lock().await;
        self.ensure_thread().await;

        let prompt = render_messages(messages);
        let text = self.inner.respond(&prompt).await?;
        let reply = ChatMessage::assistant(self.inner.role().as_str(), text);

        let mut log = self.messages.write().await;
        log.extend(messages.iter().cloned());
        log.push(reply.clone());

        Ok(reply)
    }

    /// Continue this thread: prior messages plus the new user message.
    pub async fn send(&self, content: &str) -> Result<ChatMessage> {
        let _turn = self.turn.lock().await;
        let mut messages = self.messages.read().await.clone();
        messages.push(ChatMessage::user(content));

        self.ensure_thread().await;
        let prompt = render_messages(&messages);
        let text = self.inner.respond(&prompt).await?;
        let reply = ChatMessage::assistant(self.inner.role().as_str(), text);

        let mut log = self.messages.write().await;
        log.push(ChatMessage::user(content));
        log.push(reply.clone());

        Ok(reply)
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl AgentHandle for ThreadedAgent {
    fn definition(&self) -> &AgentDefinition {
        self.inner.definition()
    }

    async fn respond(&self, prompt: &str) -> Result<String> {
        let reply = self.get_response(&[ChatMessage::user(prompt)]).await?;
        Ok(reply.content)
    }

    fn thread_id(&self) -> Option<String> {
        self.thread.get().cloned()
    }
}
