use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chat completion exactly as returned by the service.
///
/// The `context` block that carries retrieval results is left loosely typed
/// here; [`crate::normalize`] turns it into [`crate::Context`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// Completion choices, in service order.
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,

    /// Unix timestamp (seconds) of creation.
    #[serde(default)]
    pub created: i64,

    /// Unique completion identifier.
    #[serde(default)]
    pub id: String,

    /// Model that produced the completion.
    #[serde(default)]
    pub model: String,

    /// Object type, normally `chat.completion`.
    #[serde(default)]
    pub object: String,

    /// Backend configuration fingerprint.
    #[serde(default)]
    pub system_fingerprint: Option<String>,

    /// Token accounting for the request.
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

/// A single completion choice as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,

    /// Position of this choice.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: CompletionMessage,
}

/// The assistant message inside a [`CompletionChoice`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionMessage {
    /// Refusal text, when the model declined to answer.
    #[serde(default)]
    pub refusal: Option<String>,

    /// Role of the author, normally `assistant`.
    #[serde(default)]
    pub role: String,

    /// Generated text.
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this message ends the assistant turn.
    #[serde(default)]
    pub end_turn: Option<bool>,

    /// Retrieval context attached by the data-source extension.
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

/// Token counters reported by the service.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionUsage {
    /// Tokens in the generated completion.
    #[serde(default)]
    pub completion_tokens: u32,

    /// Tokens in the prompt, including retrieved documents.
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Sum of prompt and completion tokens.
    #[serde(default)]
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_extension_response() {
        let json = json!({
            "id": "chatcmpl-9",
            "object": "chat.completion",
            "created": 1717000000,
            "model": "gpt-4o",
            "system_fingerprint": "fp_1",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "logprobs": null,
                "message": {
                    "role": "assistant",
                    "content": "The policy allows 20 days [doc1].",
                    "end_turn": true,
                    "context": {
                        "intent": "[\"vacation policy\"]",
                        "citations": [{"title": "handbook.pdf", "filepath": "handbook_pages_3"}]
                    }
                }
            }],
            "usage": {"completion_tokens": 12, "prompt_tokens": 900, "total_tokens": 912}
        });

        let completion: ChatCompletion = serde_json::from_value(json).unwrap();
        assert_eq!(completion.id, "chatcmpl-9");
        assert_eq!(completion.created, 1717000000);
        assert_eq!(completion.system_fingerprint.as_deref(), Some("fp_1"));
        assert_eq!(completion.choices.len(), 1);

        let message = &completion.choices[0].message;
        assert_eq!(message.role, "assistant");
        assert_eq!(message.end_turn, Some(true));
        assert!(message.refusal.is_none());
        let context = message.context.as_ref().unwrap();
        assert!(context["intent"].is_string());
        assert!(context["citations"].is_array());

        let usage = completion.usage.unwrap();
        assert_eq!(usage.total_tokens, 912);
    }

    #[test]
    fn deserialize_without_context() {
        let json = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o",
            "choices": [{"index": 0, "finish_reason": "stop", "message": {"role": "assistant", "content": "hi"}}]
        });

        let completion: ChatCompletion = serde_json::from_value(json).unwrap();
        assert!(completion.usage.is_none());
        assert!(completion.system_fingerprint.is_none());
        assert!(completion.choices[0].message.context.is_none());
    }
}
