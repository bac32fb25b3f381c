use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::tool::{Tool, ToolCall};
use crate::models::turn::Turn;
use crate::providers::base::{Provider, ProviderEvent, ProviderStream, Usage};

/// One step of a scripted generation
#[derive(Debug, Clone)]
pub enum MockStep {
    Event(ProviderEvent),
    /// Terminate the stream with an error
    Fail(String),
    /// Stop producing events without ever ending the stream
    Hang,
}

/// A scripted generation: either a stream of steps or a refusal to start one
#[derive(Debug, Clone)]
pub enum MockScript {
    Steps(Vec<MockStep>),
    Refuse(String),
}

impl MockScript {
    /// A text-only reply split into deltas on whitespace boundaries
    pub fn text(text: &str) -> Self {
        let mut steps: Vec<MockStep> = text
            .split_inclusive(' ')
            .map(|piece| MockStep::Event(ProviderEvent::TextDelta(piece.to_string())))
            .collect();
        steps.push(MockStep::Event(ProviderEvent::Done(Usage::default())));
        MockScript::Steps(steps)
    }

    /// Optional lead-in text followed by one or more tool calls
    pub fn tool_calls(text: &str, calls: Vec<ToolCall>) -> Self {
        let mut steps = Vec::new();
        if !text.is_empty() {
            steps.push(MockStep::Event(ProviderEvent::TextDelta(text.to_string())));
        }
        for (index, call) in calls.into_iter().enumerate() {
            steps.push(MockStep::Event(ProviderEvent::ToolCall {
                id: format!("call_{}", index + 1),
                call,
            }));
        }
        steps.push(MockStep::Event(ProviderEvent::Done(Usage::default())));
        MockScript::Steps(steps)
    }
}

/// What the provider was asked to generate from
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<String>,
}

/// A mock provider that replays pre-configured scripts, one per generation
#[derive(Clone, Default)]
pub struct MockProvider {
    scripts: Arc<Mutex<VecDeque<MockScript>>>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    /// Create a new mock provider with a sequence of scripted generations
    pub fn new(scripts: Vec<MockScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every generation request received so far, oldest first
    pub fn requests(&self) -> Vec<MockRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(&self, system: &str, turns: &[Turn], tools: &[Tool]) -> Result<ProviderStream> {
        lock(&self.requests).push(MockRequest {
            system: system.to_string(),
            turns: turns.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        // Return an empty response if no more scripts are configured
        let script = lock(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| MockScript::text(""));

        let steps = match script {
            MockScript::Refuse(reason) => return Err(anyhow!(reason)),
            MockScript::Steps(steps) => steps,
        };

        let mut events = Vec::new();
        let mut hang = false;
        for step in steps {
            match step {
                MockStep::Event(event) => events.push(Ok(event)),
                MockStep::Fail(reason) => {
                    events.push(Err(anyhow!(reason)));
                    break;
                }
                MockStep::Hang => {
                    hang = true;
                    break;
                }
            }
        }

        let head = stream::iter(events);
        if hang {
            Ok(head.chain(stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    }
}
