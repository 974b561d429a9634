//! The language model as seen by the orchestrator: an OpenAI-style chat
//! completion endpoint that may ask for a tool call.

mod groq;

pub use groq::{GroqClient, OracleConfig, SseDecoder};

use crate::error::OracleError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const SEARCH_TOOL_NAME: &str = "search_companies";

/// One transcript entry, serialized the way chat completion APIs expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: call.id.clone(),
            name: call.function.name.clone(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    /// Text shown to the user, if this message is displayable.
    pub fn visible_text(&self) -> Option<&str> {
        match self {
            Message::User { content } => Some(content.as_str()),
            Message::Assistant {
                content: Some(content),
                tool_calls,
            } if tool_calls.is_empty() => Some(content.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// The model's answer to a non-streaming request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Text fragments of a streamed answer, in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String, OracleError>>;

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Ask for a reply, offering `tools` the model may call instead of answering.
    async fn complete(&self, messages: &[Message], tools: &[Value]) -> Result<OracleReply, OracleError>;

    /// Ask for a plain-text reply delivered incrementally.
    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, OracleError>;
}

/// Function declaration of the company search offered to the model.
pub fn search_tool_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": SEARCH_TOOL_NAME,
            "description": "Searches and filters a database of Swedish companies. Returns at most 10 companies.",
            "parameters": {
                "type": "object",
                "properties": {
                    "company_type": {
                        "type": "string",
                        "description": "The legal form of the company, e.g. Aktiebolag."
                    },
                    "exclude_company_type": {
                        "type": "string",
                        "description": "A legal form to leave out of the results."
                    },
                    "min_employees": {"type": "integer", "description": "The minimum number of employees."},
                    "max_employees": {"type": "integer", "description": "The maximum number of employees."},
                    "min_turnover": {"type": "integer", "description": "The minimum turnover value."},
                    "max_turnover": {"type": "integer", "description": "The maximum turnover value."},
                    "geography": {
                        "type": "string",
                        "description": "A location like a city, municipality or county."
                    },
                    "sni_code": {"type": "string", "description": "An SNI industry code or prefix."}
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_serialize_as_chat_completion_entries() {
        let call = ToolCall::new("call_1", SEARCH_TOOL_NAME, r#"{"geography":"Lund"}"#);
        let messages = vec![
            Message::system("be nice"),
            Message::user("companies in Lund"),
            Message::Assistant {
                content: None,
                tool_calls: vec![call.clone()],
            },
            Message::tool_result(&call, "[]"),
            Message::assistant("None found."),
        ];

        let value = serde_json::to_value(&messages).unwrap();
        assert_eq!(value[0], json!({"role": "system", "content": "be nice"}));
        assert_eq!(
            value[2],
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "search_companies", "arguments": "{\"geography\":\"Lund\"}"}
                }]
            })
        );
        assert_eq!(
            value[3],
            json!({
                "role": "tool",
                "tool_call_id": "call_1",
                "name": "search_companies",
                "content": "[]"
            })
        );
        assert_eq!(value[4], json!({"role": "assistant", "content": "None found."}));
    }

    #[test]
    fn test_visible_text_skips_tool_plumbing() {
        let call = ToolCall::new("c", SEARCH_TOOL_NAME, "{}");
        assert_eq!(Message::system("s").visible_text(), None);
        assert_eq!(Message::tool_result(&call, "[]").visible_text(), None);
        assert_eq!(Message::user("hi").visible_text(), Some("hi"));
        assert_eq!(Message::assistant("hello").visible_text(), Some("hello"));
    }

    #[test]
    fn test_tool_definition_has_no_required_list() {
        let tool = search_tool_definition();
        let parameters = &tool["function"]["parameters"];
        assert!(parameters.get("required").is_none());
        assert_eq!(parameters["properties"].as_object().unwrap().len(), 8);
        assert_eq!(parameters["properties"]["min_employees"]["type"], "integer");
        assert_eq!(parameters["properties"]["sni_code"]["type"], "string");
    }
}
