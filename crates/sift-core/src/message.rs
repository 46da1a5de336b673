use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// What a message represents in a research conversation.
///
/// Derived from the role plus whether an assistant message carries a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    System,
    User,
    Assistant,
    ToolInvocation,
    ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Reduce the call arguments to the single text input a tool consumes.
    ///
    /// Models send either a bare string, an object keyed by the declared
    /// input name, or occasionally an object with some other single string
    /// field. Anything else is passed through as its JSON text.
    pub fn text_input(&self, input_name: &str) -> String {
        use serde_json::Value;

        match &self.arguments {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Object(map) => {
                if let Some(value) = map.get(input_name) {
                    return match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                }
                let mut strings = map.values().filter_map(Value::as_str);
                match (strings.next(), strings.next()) {
                    (Some(only), None) => only.to_string(),
                    _ => self.arguments.to_string(),
                }
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name, set on tool results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// An assistant turn requesting exactly one tool.
    pub fn tool_invocation(call: ToolCall) -> Self {
        Self::assistant_with_tool_calls("", vec![call])
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(tool_name.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.role {
            Role::System => MessageKind::System,
            Role::User => MessageKind::User,
            Role::Assistant if !self.tool_calls.is_empty() => MessageKind::ToolInvocation,
            Role::Assistant => MessageKind::Assistant,
            Role::Tool => MessageKind::ToolResult,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_kinds() {
        assert_eq!(Message::system("rules").kind(), MessageKind::System);
        assert_eq!(Message::user("topic").kind(), MessageKind::User);
        assert_eq!(Message::assistant("report").kind(), MessageKind::Assistant);

        let call = ToolCall::new("call-1", "WebSearch", json!({"input": "rust"}));
        assert_eq!(Message::tool_invocation(call).kind(), MessageKind::ToolInvocation);
        assert_eq!(
            Message::tool_result("call-1", "WebSearch", "results").kind(),
            MessageKind::ToolResult
        );
    }

    #[test]
    fn test_tool_result_carries_name_and_id() {
        let msg = Message::tool_result("call-7", "WebScraper", "page text");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-7"));
        assert_eq!(msg.name.as_deref(), Some("WebScraper"));
    }

    #[test]
    fn test_text_input_variants() {
        let keyed = ToolCall::new("1", "WebSearch", json!({"input": "rust async"}));
        assert_eq!(keyed.text_input("input"), "rust async");

        let bare = ToolCall::new("2", "WebSearch", json!("plain query"));
        assert_eq!(bare.text_input("input"), "plain query");

        let other_key = ToolCall::new("3", "WebScraper", json!({"url": "https://a.example"}));
        assert_eq!(other_key.text_input("input"), "https://a.example");

        let empty = ToolCall::new("4", "WebSearch", serde_json::Value::Null);
        assert_eq!(empty.text_input("input"), "");

        let ambiguous = ToolCall::new("5", "WebSearch", json!({"a": "x", "b": "y"}));
        assert!(ambiguous.text_input("input").contains("\"a\""));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn test_usage_add() {
        let mut total = Usage::default();
        total.add(&Usage::new(10, 5));
        total.add(&Usage::new(1, 1));
        assert_eq!(total, Usage::new(11, 6));
    }
}
