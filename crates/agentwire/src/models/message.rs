use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::{Content, ImageContent, TextContent};
use super::role::Role;

/// Placeholder rendered in place of an image inside a textual tool result
pub const SCREENSHOT_PLACEHOLDER: &str = "[Screenshot provided]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingContent {
    pub reasoning: String,
    /// Opaque provenance marker handed back by the backend, echoed on later turns
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A tool invocation, either requested by the model or replayed from the user
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
    /// Opaque token some backends attach to a call and expect back on replay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: Vec<Content>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Render the result as a single string: text segments as-is and one placeholder
    /// line per image, newline separated and trimmed. `None` when nothing is left.
    pub fn as_text(&self) -> Option<String> {
        let mut combined = String::new();
        for content in &self.content {
            match content {
                Content::Text(text) => combined.push_str(&text.text),
                Content::Image(_) => combined.push_str(SCREENSHOT_PLACEHOLDER),
            }
            combined.push('\n');
        }

        let trimmed = combined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// A single action performed directly by the user, such as a desktop operation
pub enum UserActionContent {
    ToolUse(ToolUse),
    Image(ImageContent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub content: Vec<UserActionContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// Content passed inside a message, which can be both simple content and tool content
pub enum MessageContent {
    Text(TextContent),
    Image(ImageContent),
    Thinking(ThinkingContent),
    ToolUse(ToolUse),
    ToolResult(ToolResult),
    UserAction(UserAction),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(TextContent { text: text.into() })
    }

    pub fn image<S: Into<String>, T: Into<String>>(data: S, media_type: T) -> Self {
        MessageContent::Image(ImageContent {
            data: data.into(),
            media_type: media_type.into(),
        })
    }

    pub fn thinking<S: Into<String>, T: Into<String>>(reasoning: S, signature: T) -> Self {
        MessageContent::Thinking(ThinkingContent {
            reasoning: reasoning.into(),
            signature: signature.into(),
        })
    }

    pub fn tool_use<S: Into<String>, N: Into<String>>(id: S, name: N, input: Value) -> Self {
        MessageContent::ToolUse(ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            signature: None,
        })
    }

    pub fn tool_result<S: Into<String>>(tool_use_id: S, content: Vec<Content>, is_error: bool) -> Self {
        MessageContent::ToolResult(ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
        })
    }

    pub fn user_action(content: Vec<UserActionContent>) -> Self {
        MessageContent::UserAction(UserAction { content })
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUse> {
        if let MessageContent::ToolUse(ref tool_use) = self {
            Some(tool_use)
        } else {
            None
        }
    }

    pub fn as_thinking(&self) -> Option<&ThinkingContent> {
        if let MessageContent::Thinking(ref thinking) = self {
            Some(thinking)
        } else {
            None
        }
    }
}

impl From<Content> for MessageContent {
    fn from(content: Content) -> Self {
        match content {
            Content::Text(text) => MessageContent::Text(text),
            Content::Image(image) => MessageContent::Image(image),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub content: Vec<MessageContent>,
}

impl Message {
    /// Create a new, empty user message
    pub fn user() -> Self {
        Message {
            role: Role::User,
            content: Vec::new(),
        }
    }

    /// Create a new, empty assistant message
    pub fn assistant() -> Self {
        Message {
            role: Role::Assistant,
            content: Vec::new(),
        }
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    /// Add image content to the message
    pub fn with_image<S: Into<String>, T: Into<String>>(self, data: S, media_type: T) -> Self {
        self.with_content(MessageContent::image(data, media_type))
    }

    pub fn with_thinking<S: Into<String>, T: Into<String>>(self, reasoning: S, signature: T) -> Self {
        self.with_content(MessageContent::thinking(reasoning, signature))
    }

    /// Add a tool use to the message
    pub fn with_tool_use<S: Into<String>, N: Into<String>>(self, id: S, name: N, input: Value) -> Self {
        self.with_content(MessageContent::tool_use(id, name, input))
    }

    /// Add a tool result to the message
    pub fn with_tool_result<S: Into<String>>(
        self,
        tool_use_id: S,
        content: Vec<Content>,
        is_error: bool,
    ) -> Self {
        self.with_content(MessageContent::tool_result(tool_use_id, content, is_error))
    }

    /// Add a batch of replayed user actions to the message
    pub fn with_user_action(self, content: Vec<UserActionContent>) -> Self {
        self.with_content(MessageContent::user_action(content))
    }

    /// True when every block is a user action. Such messages are flattened by the
    /// adapters into one backend turn per nested action.
    pub fn is_user_action_only(&self) -> bool {
        !self.content.is_empty()
            && self
                .content
                .iter()
                .all(|content| matches!(content, MessageContent::UserAction(_)))
    }

    /// The nested actions of every user action block, in order
    pub fn user_actions(&self) -> impl Iterator<Item = &UserActionContent> {
        self.content.iter().flat_map(|content| match content {
            MessageContent::UserAction(action) => action.content.as_slice(),
            _ => &[][..],
        })
    }
}
