use serde::{Deserialize, Serialize};

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

// =============================================================================
// Tools
// =============================================================================

/// A tool entry in the request. Custom tools carry a schema; server tools
/// (web search) are executed provider-side and carry a versioned type tag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub(crate) enum ToolWire {
    Custom {
        name: String,
        description: String,
        input_schema: serde_json::Value,
    },
    Server {
        #[serde(rename = "type")]
        tool_type: String,
        name: String,
        max_uses: u32,
    },
}

pub(crate) const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";
pub(crate) const WEB_SEARCH_TOOL_NAME: &str = "web_search";

// =============================================================================
// Chat Request
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 8192,
            messages: Vec::new(),
            system: None,
            temperature: None,
            tools: None,
            tool_choice: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn message(mut self, message: WireMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn tool(mut self, tool: ToolWire) -> Self {
        self.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    /// Attach the provider-side web search tool.
    pub fn web_search(self, max_uses: u32) -> Self {
        self.tool(ToolWire::Server {
            tool_type: WEB_SEARCH_TOOL_TYPE.to_string(),
            name: WEB_SEARCH_TOOL_NAME.to_string(),
            max_uses,
        })
    }

    /// Force the model to answer through the named custom tool.
    pub fn forced_tool(
        mut self,
        name: &str,
        description: &str,
        input_schema: serde_json::Value,
    ) -> Self {
        self.tool_choice = Some(serde_json::json!({
            "type": "tool",
            "name": name,
        }));
        self.tool(ToolWire::Custom {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        })
    }
}

// =============================================================================
// Chat Response
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[allow(dead_code)]
        id: String,
        #[allow(dead_code)]
        name: String,
        input: serde_json::Value,
    },
    /// Provider-side tool invocation (web search). Present in grounded
    /// responses; carries nothing the caller needs.
    #[serde(rename = "server_tool_use")]
    ServerToolUse {},
    #[serde(rename = "web_search_tool_result")]
    WebSearchToolResult {},
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    #[allow(dead_code)]
    pub stop_reason: Option<String>,
}

impl ChatResponse {
    /// All text blocks joined. Grounded responses interleave text with search
    /// blocks, so a single-block assumption does not hold.
    pub fn text(&self) -> Option<String> {
        let joined: String = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    pub fn tool_input(&self) -> Option<&serde_json::Value> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::ToolUse { input, .. } => Some(input),
            _ => None,
        })
    }
}

// =============================================================================
// Message Batches (long-running research)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchWire {
    pub id: String,
    pub processing_status: String,
    #[serde(default)]
    pub results_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchResultLine {
    #[allow(dead_code)]
    pub custom_id: String,
    pub result: BatchResultWire,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchResultWire {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<ChatResponse>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_mixed_tools() {
        let request = ChatRequest::new("test-model")
            .system("sys")
            .message(WireMessage::user("hi"))
            .web_search(5)
            .forced_tool("structured_response", "Extract.", serde_json::json!({"type": "object"}));

        let value = serde_json::to_value(&request).unwrap();
        let tools = value["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["type"], "web_search_20250305");
        assert_eq!(tools[0]["max_uses"], 5);
        assert_eq!(tools[1]["name"], "structured_response");
        assert_eq!(value["tool_choice"]["name"], "structured_response");
    }

    #[test]
    fn response_text_joins_blocks_around_search() {
        let raw = serde_json::json!({
            "content": [
                {"type": "server_tool_use", "id": "su_1", "name": "web_search", "input": {"query": "q"}},
                {"type": "web_search_tool_result", "tool_use_id": "su_1", "content": []},
                {"type": "text", "text": "part one "},
                {"type": "text", "text": "part two"}
            ],
            "stop_reason": "end_turn"
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.text().unwrap(), "part one part two");
    }

    #[test]
    fn tool_input_found_among_blocks() {
        let raw = serde_json::json!({
            "content": [
                {"type": "text", "text": "thinking aloud"},
                {"type": "tool_use", "id": "t1", "name": "structured_response", "input": {"score": 8}}
            ]
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.tool_input().unwrap()["score"], 8);
    }
}
