// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mock completion provider for testing

use async_trait::async_trait;
use proofbench::error::ProviderError;
use proofbench::llm::{CompletionProvider, CompletionRequest};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replies from a queue, then with a default reply
pub struct MockProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_reply: String,
    calls: AtomicUsize,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    /// Always answers with `reply`
    pub fn new(reply: &str) -> Self {
        MockProvider {
            replies: Mutex::new(VecDeque::new()),
            default_reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply to return before falling back to the default
    pub fn push_reply(&self, reply: Result<String, ProviderError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_reply.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
