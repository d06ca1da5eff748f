// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Model client
//!
//! [`ModelClient`] turns a proof object into a candidate proof. It checks
//! the response store before every request, so a response is paid for
//! once no matter how often a run is interrupted and resumed. The wire
//! protocol sits behind [`CompletionProvider`].

pub mod openai;
pub mod prompt;
pub mod retry;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::{self, KvStore, ResponseKey};
use crate::config::ModelSpec;
use crate::core::{ModelResponse, ProofObject, SamplingParams};
use crate::error::ProviderError;
use retry::RetryPolicy;

pub use openai::OpenAiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One chat completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: ModelSpec,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub params: SamplingParams,
}

impl CompletionRequest {
    /// Messages as sent: the system prompt leads, or is folded into the
    /// first user message for models that reject a system role
    pub fn wire_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if self.model.supports_system_prompt {
            out.push(ChatMessage::new(Role::System, self.system.clone()));
            out.extend(self.messages.iter().cloned());
        } else {
            let mut folded = false;
            for m in &self.messages {
                if !folded && m.role == Role::User {
                    out.push(ChatMessage::new(Role::User, format!("{}\n\n{}", self.system, m.content)));
                    folded = true;
                } else {
                    out.push(m.clone());
                }
            }
        }
        out
    }

    pub fn estimated_tokens(&self) -> u64 {
        prompt::estimate_tokens(&self.system)
            + self
                .messages
                .iter()
                .map(|m| prompt::estimate_tokens(&m.content))
                .sum::<u64>()
    }
}

/// Chat-completion endpoint
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Return the text of the first choice
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

/// A failed candidate and the compiler feedback it received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackTurn {
    pub candidate: String,
    pub feedback: String,
}

/// Cached, retrying front end to a [`CompletionProvider`]
pub struct ModelClient {
    provider: Arc<dyn CompletionProvider>,
    responses: Arc<dyn KvStore>,
    system_prompt: String,
    retry: RetryPolicy,
}

impl ModelClient {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        responses: Arc<dyn KvStore>,
        system_prompt: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            responses,
            system_prompt,
            retry,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Initial candidate for `object`
    pub async fn generate(
        &self,
        object: &ProofObject,
        model: &ModelSpec,
        params: SamplingParams,
    ) -> Result<ModelResponse, ProviderError> {
        self.refine(object, model, params, &[]).await
    }

    /// Candidate after the given feedback rounds; round number is `history.len()`
    pub async fn refine(
        &self,
        object: &ProofObject,
        model: &ModelSpec,
        params: SamplingParams,
        history: &[FeedbackTurn],
    ) -> Result<ModelResponse, ProviderError> {
        let key = ResponseKey {
            fingerprint: &object.fingerprint,
            model: &model.id,
            params,
            round: history.len() as u32,
            feedback: history_digest(history),
        }
        .digest();

        match cache::get_json::<ModelResponse>(self.responses.as_ref(), &key).await {
            Ok(Some(cached)) => {
                debug!(
                    "Response cache hit for {} / {} round {}",
                    object.declaration.qualified_name,
                    model.id,
                    history.len()
                );
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!("Response cache unavailable, requesting anyway: {}", e),
        }

        let mut messages = vec![ChatMessage::new(Role::User, object.context.clone())];
        for turn in history {
            messages.push(ChatMessage::new(Role::Assistant, turn.candidate.clone()));
            messages.push(ChatMessage::new(Role::User, turn.feedback.clone()));
        }
        let request = CompletionRequest {
            model: model.clone(),
            system: self.system_prompt.clone(),
            messages,
            params,
        };

        let estimated = request.estimated_tokens();
        if estimated > model.context_window {
            return Err(ProviderError::ContextTooLong {
                model: model.id.clone(),
                estimated,
                limit: model.context_window,
            });
        }

        let context = format!("{} ({})", object.declaration.qualified_name, model.id);
        let started = Instant::now();
        let raw = self
            .retry
            .run(&context, || self.provider.complete(&request))
            .await?;
        if raw.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let response = ModelResponse {
            model: model.id.clone(),
            params,
            round: history.len() as u32,
            candidate: prompt::normalize(&raw),
            raw,
            elapsed_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
        };
        if let Err(e) = cache::put_json(self.responses.as_ref(), &key, &response).await {
            warn!("Failed to cache response for {}: {}", context, e);
        }
        Ok(response)
    }
}

fn history_digest(history: &[FeedbackTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut hasher = blake3::Hasher::new();
    for turn in history {
        hasher.update(turn.candidate.as_bytes());
        hasher.update(&[0]);
        hasher.update(turn.feedback.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::core::{Ablation, DeclId, DeclKind, Declaration, Fingerprint, Span};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok("Proof. auto. Qed.".to_string())
            } else {
                replies.remove(0)
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn object(context: &str) -> ProofObject {
        let span = Span {
            start: 0,
            end: 1,
            start_line: 1,
            end_line: 1,
        };
        ProofObject {
            fingerprint: Fingerprint::of_fields([context]),
            declaration: Declaration {
                id: DeclId(0),
                name: "add_comm".into(),
                qualified_name: "Demo.add_comm".into(),
                module: "Demo".into(),
                file: PathBuf::from("Demo.v"),
                kind: DeclKind::Lemma,
                statement: span,
                statement_text: "Lemma add_comm : True.".into(),
                proof: None,
                external_refs: vec![],
            },
            ablation: Ablation::FULL,
            dependencies: vec![],
            notations: vec![],
            imports: vec![],
            context: context.to_string(),
        }
    }

    fn client(provider: Arc<Scripted>, store: Arc<MemoryStore>) -> ModelClient {
        ModelClient::new(provider, store, "system".into(), RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let provider = Scripted::new(vec![Ok("```coq\nProof. trivial. Qed.\n```".into())]);
        let store = Arc::new(MemoryStore::new());
        let client = client(Arc::clone(&provider), Arc::clone(&store));
        let model = ModelSpec::chat("gpt-4o-mini", 128_000);
        let obj = object("prove it");

        let first = client.generate(&obj, &model, SamplingParams::default()).await.unwrap();
        let second = client.generate(&obj, &model, SamplingParams::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.candidate, "Proof. trivial. Qed.");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // different sampling parameters are a different request
        let hotter = SamplingParams {
            temperature: 0.8,
            max_tokens: 16384,
        };
        client.generate(&obj, &model, hotter).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_context_too_long_makes_no_call() {
        let provider = Scripted::new(vec![]);
        let client = client(Arc::clone(&provider), Arc::new(MemoryStore::new()));
        let model = ModelSpec::chat("tiny", 10);
        let err = client
            .generate(&object(&"x".repeat(400)), &model, SamplingParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ContextTooLong { limit: 10, .. }));
        assert!(!err.is_retryable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_reply_is_terminal() {
        let provider = Scripted::new(vec![Ok("   ".into())]);
        let store = Arc::new(MemoryStore::new());
        let client = client(Arc::clone(&provider), Arc::clone(&store));
        let err = client
            .generate(&object("p"), &ModelSpec::chat("m", 1000), SamplingParams::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::EmptyResponse);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_refine_sends_history() {
        let provider = Scripted::new(vec![]);
        let client = client(Arc::clone(&provider), Arc::new(MemoryStore::new()));
        let history = vec![FeedbackTurn {
            candidate: "Proof. auto. Qed.".into(),
            feedback: "Error: no".into(),
        }];
        let response = client
            .refine(&object("p"), &ModelSpec::chat("m", 1000), SamplingParams::default(), &history)
            .await
            .unwrap();
        assert_eq!(response.round, 1);
        let seen = provider.seen.lock().unwrap();
        let roles: Vec<Role> = seen[0].wire_messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    }

    #[test]
    fn test_system_prompt_folding() {
        let mut model = ModelSpec::chat("m", 1000);
        model.supports_system_prompt = false;
        let request = CompletionRequest {
            model,
            system: "SYS".into(),
            messages: vec![ChatMessage::new(Role::User, "prompt")],
            params: SamplingParams::default(),
        };
        let wire = request.wire_messages();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].content, "SYS\n\nprompt");
    }
}
