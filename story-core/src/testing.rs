//! Testing utilities for story generation.
//!
//! `ScriptedGenerator` stands in for a real model so the generation loop can
//! be driven deterministically, without a running server.

use crate::generator::{GenerateError, TextGenerator};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type Responder = Box<dyn Fn(usize, &str) -> Result<String, GenerateError> + Send + Sync>;

/// A generator that returns scripted responses.
///
/// Responses are returned in order, one per call, whatever the prompt.
/// Once the script runs out the fallback is used; without a fallback the
/// call fails with [`GenerateError::Unavailable`]. Every prompt is recorded.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// One call made to a [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
}

impl ScriptedGenerator {
    /// Create a generator that returns `responses` in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A generator whose every call fails.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(Vec::<String>::new())
            .with_responder(move |_, _| Err(GenerateError::Unavailable(message.clone())))
    }

    /// A generator that answers every call with `respond(call_index, prompt)`.
    pub fn from_fn<F>(respond: F) -> Self
    where
        F: Fn(usize, &str) -> Result<String, GenerateError> + Send + Sync + 'static,
    {
        Self::new(Vec::<String>::new()).with_responder(respond)
    }

    /// Answer with `text` once the script is exhausted.
    pub fn repeating(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_responder(move |_, _| Ok(text.clone()))
    }

    /// Use `respond` once the script is exhausted.
    pub fn with_responder<F>(mut self, respond: F) -> Self
    where
        F: Fn(usize, &str) -> Result<String, GenerateError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(respond));
        self
    }

    /// Append a response to the script.
    pub fn push_response(&self, text: impl Into<String>) {
        self.script.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Append a failure to the script.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().unwrap().push_back(Err(message.into()));
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts of every call made so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.prompt).collect()
    }

    /// Scripted responses not yet returned.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                model: model.to_string(),
                prompt: prompt.to_string(),
            });
            calls.len() - 1
        };

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(GenerateError::Unavailable(message)),
            None => match &self.fallback {
                Some(respond) => respond(index, prompt),
                None => Err(GenerateError::Unavailable(
                    "scripted responses exhausted".to_string(),
                )),
            },
        }
    }
}
