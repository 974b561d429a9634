//! Conversation driver: user turn -> model -> optional company search -> summary.

use crate::{
    dataset::TableSource,
    error::OracleError,
    filter::SearchOutcome,
    oracle::{Message, Oracle, SEARCH_TOOL_NAME, ToolCall, search_tool_definition},
    sanitize::parse_arguments,
};
use futures::StreamExt;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that helps users find information about Swedish companies. When you receive data from a tool, present it to the user in a clear and friendly summary. If no results are found, say so politely.";
pub const GREETING: &str = "How can I help you find Swedish companies today?";
pub const NO_MATCHES: &str =
    "I searched the data but couldn't find any companies that match your criteria.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    AwaitingUser,
    OracleQueried,
    ToolRequested,
    ToolExecuted,
    OracleSummarizing,
    DirectReply,
}

/// One user's conversation: the transcript sent to the model and where the
/// current turn stands.
#[derive(Debug, Clone)]
pub struct Session {
    messages: Vec<Message>,
    state: ConversationState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_prompt(SYSTEM_PROMPT, GREETING)
    }

    pub fn with_prompt(system: &str, greeting: &str) -> Self {
        Self {
            messages: vec![Message::system(system), Message::assistant(greeting)],
            state: ConversationState::AwaitingUser,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn append(&mut self, message: Message) {
        tracing::trace!(role = message.role(), "append message");
        self.messages.push(message);
    }

    fn transition(&mut self, next: ConversationState) {
        tracing::debug!(from = ?self.state, to = ?next, "conversation state");
        self.state = next;
    }

    fn rollback(&mut self, len: usize) {
        self.messages.truncate(len);
        self.transition(ConversationState::AwaitingUser);
    }

    /// Identifiers of tool calls that have no matching tool-result message
    /// before the next user message.
    pub fn unanswered_tool_calls(&self) -> Vec<&str> {
        let mut unanswered = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for message in &self.messages {
            match message {
                Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                    pending.extend(tool_calls.iter().map(|call| call.id.as_str()));
                }
                Message::Tool { tool_call_id, .. } => {
                    pending.retain(|id| *id != tool_call_id.as_str());
                }
                Message::User { .. } => unanswered.append(&mut pending),
                _ => {}
            }
        }
        unanswered.extend(pending);
        unanswered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// The model answered without searching.
    Direct,
    /// Streamed summary of search results.
    Summary,
    NoMatches,
    DatasetUnavailable,
    /// The model asked for a tool this service does not offer.
    UnsupportedTool,
    /// The model could not be reached; the turn was discarded.
    OracleFailure,
}

/// What the user sees at the end of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    fn new(kind: ReplyKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Whether the text was already delivered fragment by fragment.
    pub fn was_streamed(&self) -> bool {
        self.kind == ReplyKind::Summary
    }
}

fn skipped_call_payload(call: &ToolCall) -> String {
    let message = if call.function.name == SEARCH_TOOL_NAME {
        format!("Only one {} call is processed per turn; this call was skipped.", SEARCH_TOOL_NAME)
    } else {
        format!("Unknown tool '{}'.", call.function.name)
    };
    json!([{ "error": message }]).to_string()
}

pub struct Orchestrator<O> {
    oracle: O,
    source: Arc<dyn TableSource>,
    timeout: Duration,
}

impl<O: Oracle> Orchestrator<O> {
    pub fn new(oracle: O, source: Arc<dyn TableSource>, timeout: Duration) -> Self {
        Self {
            oracle,
            source,
            timeout,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, OracleError>>,
    ) -> Result<T, OracleError> {
        timeout(self.timeout, call)
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
    }

    /// Run one user turn. Summary fragments are passed to `on_fragment` as they
    /// arrive. Never fails: oracle errors discard the turn and come back as an
    /// [`ReplyKind::OracleFailure`] notice.
    pub async fn respond<F>(&self, session: &mut Session, input: &str, mut on_fragment: F) -> Reply
    where
        F: FnMut(&str),
    {
        let unanswered = session.unanswered_tool_calls();
        if !unanswered.is_empty() {
            tracing::error!(?unanswered, "transcript has unanswered tool calls");
        }

        let checkpoint = session.messages.len();
        session.append(Message::user(input));

        match self.run_turn(session, &mut on_fragment).await {
            Ok(reply) => {
                session.transition(ConversationState::AwaitingUser);
                reply
            }
            Err(err) => {
                tracing::warn!(error = %err, "oracle call failed, discarding turn");
                session.rollback(checkpoint);
                Reply::new(
                    ReplyKind::OracleFailure,
                    format!(
                        "Sorry, I couldn't reach the language model ({}). Please try again.",
                        err
                    ),
                )
            }
        }
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<Reply, OracleError> {
        session.transition(ConversationState::OracleQueried);
        let tools = [search_tool_definition()];
        let reply = self
            .bounded(self.oracle.complete(session.messages(), &tools))
            .await?;

        let Some((first, rest)) = reply.tool_calls.split_first() else {
            session.transition(ConversationState::DirectReply);
            let text = reply.content.unwrap_or_default();
            session.append(Message::assistant(text.clone()));
            return Ok(Reply::new(ReplyKind::Direct, text));
        };

        session.transition(ConversationState::ToolRequested);
        session.append(Message::Assistant {
            content: reply.content.clone(),
            tool_calls: reply.tool_calls.clone(),
        });

        let outcome = if first.function.name == SEARCH_TOOL_NAME {
            let raw = parse_arguments(&first.function.arguments);
            tracing::info!(call_id = %first.id, arguments = %first.function.arguments, "search requested");
            let outcome = SearchOutcome::from_arguments(self.source.as_ref(), &raw);
            session.append(Message::tool_result(first, outcome.to_wire()));
            Some(outcome)
        } else {
            tracing::warn!(tool = %first.function.name, "model requested an unknown tool");
            session.append(Message::tool_result(first, skipped_call_payload(first)));
            None
        };
        for extra in rest {
            tracing::warn!(call_id = %extra.id, tool = %extra.function.name, "skipping extra tool call");
            session.append(Message::tool_result(extra, skipped_call_payload(extra)));
        }
        session.transition(ConversationState::ToolExecuted);

        let notice = match outcome {
            None => Reply::new(
                ReplyKind::UnsupportedTool,
                "Sorry, I can only search the Swedish company register.",
            ),
            Some(SearchOutcome::Unavailable(reason)) => Reply::new(
                ReplyKind::DatasetUnavailable,
                format!("Sorry, the company data is not available right now. {}", reason),
            ),
            Some(SearchOutcome::Found(rows)) if rows.is_empty() => {
                Reply::new(ReplyKind::NoMatches, NO_MATCHES)
            }
            Some(SearchOutcome::Found(_)) => {
                session.transition(ConversationState::OracleSummarizing);
                let text = self.summarize(session, on_fragment).await?;
                session.append(Message::assistant(text.clone()));
                return Ok(Reply::new(ReplyKind::Summary, text));
            }
        };
        session.append(Message::assistant(notice.text.clone()));
        Ok(notice)
    }

    async fn summarize(
        &self,
        session: &Session,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<String, OracleError> {
        let mut fragments = self.bounded(self.oracle.stream(session.messages())).await?;

        let mut text = String::new();
        loop {
            let next = timeout(self.timeout, fragments.next())
                .await
                .map_err(|_| OracleError::Timeout(self.timeout))?;
            match next {
                Some(fragment) => {
                    let fragment = fragment?;
                    on_fragment(&fragment);
                    text.push_str(&fragment);
                }
                None => break,
            }
        }
        Ok(text)
    }
}
