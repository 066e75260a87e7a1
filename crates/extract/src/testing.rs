//! A deterministic [`LanguageModel`] for tests and offline runs.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::llm::LanguageModel;

enum Reply {
    Text(String),
    Fail(String),
}

/// Answers each prompt with the reply of the first rule whose needle occurs in it.
///
/// Unmatched prompts get the default reply (empty unless set). Every prompt is recorded.
pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    default_reply: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: String::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(reply.into())));
        self
    }

    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        let message = format!("no reply for prompt containing {:?}", needle);
        self.rules.push((needle, Reply::Fail(message)));
        self
    }

    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply);

        match reply {
            Some(Reply::Text(text)) => Ok(text.clone()),
            Some(Reply::Fail(message)) => Err(LlmError::Scripted(message.clone())),
            None => Ok(self.default_reply.clone()),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
