//! Deterministic [`TextGenerator`] for tests and offline runs.
//!
//! Replies are chosen by prompt substring rules first, then from a FIFO
//! queue. Once both are exhausted every call fails with a transport error,
//! which is also how [`ScriptedGenerator::failing`] behaves from the start.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{GenerationParams, TextGenerator};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

impl Reply {
    fn into_result(self) -> Result<String> {
        match self {
            Reply::Text(t) => Ok(t),
            Reply::Fail(msg) => Err(Error::transport(msg)),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    rules: Vec<(String, Reply)>,
    queue: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Queue a reply for the next unmatched call.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.queue.lock().push_back(Reply::Text(text.into()));
        self
    }

    /// Queue a failure for the next unmatched call.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.queue.lock().push_back(Reply::Fail(message.into()));
        self
    }

    /// Answer every prompt containing `needle` with `text`.
    pub fn when(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(text.into())));
        self
    }

    /// Fail every prompt containing `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail(message.into())));
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _params: GenerationParams) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());

        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return reply.clone().into_result();
        }
        match self.queue.lock().pop_front() {
            Some(reply) => reply.into_result(),
            None => Err(Error::transport("scripted generator has no reply")),
        }
    }
}
