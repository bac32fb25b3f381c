use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::conversation::Conversation;
use crate::cycle::{AssistantCycleState, CycleState};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall, ToolOutcome};
use crate::models::turn::{ToolCallRecord, Turn};
use crate::output::AssistantReply;
use crate::prompt_template::render_system_prompt;
use crate::providers::base::{Provider, ProviderEvent};
use crate::tools::ToolRegistry;

/// Stored in place of an answer when a generation misses its deadline
pub const DEGRADED_REPLY: &str =
    "Sorry, I couldn't finish answering that in time. Please try asking again.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on each generation, from request until end-of-stream
    pub generation_timeout: Duration,
    /// Upper bound on each tool executor call
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(15),
        }
    }
}

/// What the caller observes while a cycle runs
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    TextDelta(String),
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: String,
        name: String,
        outcome: ToolOutcome,
    },
    Finished(AssistantReply),
}

/// How a single generation ended
enum Generation {
    Completed { tool_call: Option<(String, ToolCall)> },
    TimedOut,
    Failed(String),
}

/// Agent drives one conversational cycle per user message against a model and the tool registry
pub struct Agent {
    provider: Box<dyn Provider>,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
    system_prompt: String,
}

impl Agent {
    /// Fails if the system prompt cannot be rendered for the registered systems
    pub fn new(
        provider: Box<dyn Provider>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> AgentResult<Self> {
        let system_prompt = render_system_prompt(registry.systems())
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        Ok(Self {
            provider,
            registry,
            config,
            system_prompt,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run one cycle for `message`, streaming its progress.
    ///
    /// The user turn is appended before the stream is returned. Tool and assistant
    /// turns are appended together once the cycle finalizes; a gateway failure ends
    /// the stream with `AgentError::Gateway` and leaves only the user turn behind.
    pub async fn reply<'a>(
        &'a self,
        conversation: &'a mut Conversation,
        message: &str,
    ) -> AgentResult<BoxStream<'a, AgentResult<ReplyEvent>>> {
        if message.trim().is_empty() {
            return Err(AgentError::InvalidUserInput);
        }

        let mut cycle = AssistantCycleState::new();
        cycle.advance(CycleState::Generating)?;
        conversation.append(Turn::user(message));

        Ok(Box::pin(async_stream::stream! {
            let mut staged: Vec<Turn> = Vec::new();
            let mut tools = self.registry.tools();
            let mut timed_out = false;

            loop {
                let history: Vec<Turn> = conversation
                    .turns()
                    .iter()
                    .chain(staged.iter())
                    .cloned()
                    .collect();
                let deadline = Instant::now() + self.config.generation_timeout;

                let mut events = match tokio::time::timeout_at(
                    deadline,
                    self.provider.stream(&self.system_prompt, &history, &tools),
                )
                .await
                {
                    Ok(Ok(events)) => events,
                    Ok(Err(e)) => {
                        cycle.abort();
                        tracing::error!(error = %e, "model gateway refused the generation");
                        yield Err(AgentError::Gateway(e.to_string()));
                        return;
                    }
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                };

                let mut generation = Generation::Failed("stream ended before completion".to_string());
                let mut tool_call: Option<(String, ToolCall)> = None;
                loop {
                    match tokio::time::timeout_at(deadline, events.next()).await {
                        Err(_) => {
                            generation = Generation::TimedOut;
                            break;
                        }
                        Ok(None) => break,
                        Ok(Some(Err(e))) => {
                            generation = Generation::Failed(e.to_string());
                            break;
                        }
                        Ok(Some(Ok(ProviderEvent::TextDelta(delta)))) => {
                            if let Err(e) = cycle.push_text(&delta) {
                                yield Err(e);
                                return;
                            }
                            yield Ok(ReplyEvent::TextDelta(delta));
                        }
                        Ok(Some(Ok(ProviderEvent::ToolCall { id, call }))) => {
                            if tool_call.is_some() || cycle.tool_consumed() || tools.is_empty() {
                                tracing::warn!(tool = %call.name, id = %id, "dropping tool call; one tool call per cycle");
                            } else {
                                tool_call = Some((id, call));
                            }
                        }
                        Ok(Some(Ok(ProviderEvent::Done(usage)))) => {
                            tracing::debug!(?usage, "generation complete");
                            generation = Generation::Completed { tool_call: tool_call.take() };
                            break;
                        }
                    }
                }

                match generation {
                    Generation::Failed(reason) => {
                        cycle.abort();
                        tracing::error!(error = %reason, "model gateway failed mid-generation");
                        yield Err(AgentError::Gateway(reason));
                        return;
                    }
                    Generation::TimedOut => {
                        timed_out = true;
                        break;
                    }
                    Generation::Completed { tool_call: None } => break,
                    Generation::Completed { tool_call: Some((id, call)) } => {
                        if let Err(e) = cycle.advance(CycleState::ToolCallDetected)
                            .and_then(|_| cycle.advance(CycleState::ToolExecuting))
                        {
                            yield Err(e);
                            return;
                        }
                        yield Ok(ReplyEvent::ToolCall {
                            id: id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        });

                        let outcome = self.registry.invoke(&call, self.config.tool_timeout).await;
                        if let Err(e) = settle_tool(&mut cycle, &outcome) {
                            yield Err(e);
                            return;
                        }
                        staged.push(Turn::tool(ToolCallRecord::new(id.clone(), &call), &outcome));
                        yield Ok(ReplyEvent::ToolResult {
                            id,
                            name: call.name,
                            outcome,
                        });

                        // The follow-up answers from the tool result and is never offered tools
                        tools = Vec::<Tool>::new();
                    }
                }
            }

            let reply = if timed_out {
                tracing::warn!(
                    state = %cycle.state(),
                    timeout = ?self.config.generation_timeout,
                    "generation timed out; finalizing with a degraded reply"
                );
                AssistantReply::plain(DEGRADED_REPLY)
            } else {
                AssistantReply::validate(cycle.text())
            };

            if let Err(e) = cycle.advance(CycleState::TurnFinalized) {
                yield Err(e);
                return;
            }
            conversation.extend(staged);
            conversation.append(Turn::assistant(reply.render()));
            if let Err(e) = cycle.advance(CycleState::AwaitingUserInput) {
                yield Err(e);
                return;
            }

            yield Ok(ReplyEvent::Finished(reply));
        }))
    }
}

fn settle_tool(cycle: &mut AssistantCycleState, outcome: &ToolOutcome) -> AgentResult<()> {
    if let Some(error) = outcome.error() {
        tracing::debug!(%error, "tool call failed; passing the failure to the model");
        cycle.advance(CycleState::ToolExecutionFailed)?;
    }
    cycle.advance(CycleState::ResultAppended)?;
    cycle.advance(CycleState::FollowupGenerating)
}
