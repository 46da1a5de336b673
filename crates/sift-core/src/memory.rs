//! Conversation memory for a single research session.

use crate::message::{Message, MessageKind, ToolCall};

/// Append-only message log replayed to the model on every turn.
///
/// Entries cannot be removed, replaced or reordered. Each session starts from
/// a fresh `ConversationMemory`.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a log with the system instructions and the user's request.
    pub fn seeded(system: impl Into<String>, user: impl Into<String>) -> Self {
        let mut memory = Self::new();
        memory.push(Message::system(system));
        memory.push(Message::user(user));
        memory
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Record one tool round trip: the invocation followed by its result.
    ///
    /// `note` is any reasoning text the model sent alongside the call.
    pub fn record_tool_exchange(
        &mut self,
        note: impl Into<String>,
        call: ToolCall,
        result: impl Into<String>,
    ) {
        let id = call.id.clone();
        let name = call.name.clone();
        self.push(Message::assistant_with_tool_calls(note, vec![call]));
        self.push(Message::tool_result(id, name, result));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Owned copy of the log for a provider request.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn count_kind(&self, kind: MessageKind) -> usize {
        self.messages.iter().filter(|m| m.kind() == kind).count()
    }

    /// Most recent non-empty assistant text, if the model produced any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.kind() == MessageKind::Assistant || m.kind() == MessageKind::ToolInvocation)
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty())
    }
}
