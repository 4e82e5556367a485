use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chat completion flattened into plain, JSON-serializable data with its
/// retrieval context parsed into structured fields.
///
/// Produced by [`crate::normalize`]; owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedResponse {
    /// Completion choices, in service order.
    pub choices: Vec<Choice>,

    /// Unix timestamp (seconds) of creation.
    pub created: i64,

    /// Unique completion identifier.
    pub id: String,

    /// Model that produced the completion.
    pub model: String,

    /// Object type, normally `chat.completion`.
    pub object: String,

    /// Backend configuration fingerprint.
    pub system_fingerprint: Option<String>,

    /// Token counters, when the service reported them.
    pub usage: Option<Usage>,
}

impl NormalizedResponse {
    /// The assistant text of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

/// Token counters copied from the completion.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub completion_tokens: u32,
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

/// One completion choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub finish_reason: Option<String>,
    pub index: u32,
    pub message: ResponseMessage,
}

/// The assistant message of a [`Choice`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseMessage {
    pub refusal: Option<String>,
    pub role: String,
    pub content: Option<String>,
    pub end_turn: Option<bool>,
    pub context: Option<Context>,
}

/// Retrieval context attached to an assistant message.
///
/// `intent` and `citations` are lifted into typed fields when present; every
/// other key the service sent is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Context {
    /// The search intent the service derived from the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,

    /// Documents the answer was grounded on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<CitationEntry>>,

    /// Remaining context keys, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Context {
    /// Iterate over the citations that have the expected object shape.
    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        self.citations
            .iter()
            .flatten()
            .filter_map(CitationEntry::as_citation)
    }
}

/// The search intent of a response.
///
/// The service encodes intent as a JSON document inside a string.  When that
/// string parses it is replaced by the parsed value; otherwise the original
/// string is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Intent {
    /// The intent string as sent, because it was not valid JSON.
    Raw(String),

    /// Structured intent.
    Structured(Value),
}

impl Intent {
    /// The original string, when the intent could not be parsed.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Intent::Raw(raw) => Some(raw),
            Intent::Structured(_) => None,
        }
    }

    /// The parsed intent.
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Intent::Raw(_) => None,
            Intent::Structured(value) => Some(value),
        }
    }
}

/// An element of the `citations` list.
///
/// Entries that do not have the shape of a [`Citation`] are carried through
/// unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CitationEntry {
    /// A citation object.
    Document(Citation),

    /// Anything else the service placed in the list.
    Other(Value),
}

impl CitationEntry {
    /// The citation, if this entry has the expected shape.
    pub fn as_citation(&self) -> Option<&Citation> {
        match self {
            CitationEntry::Document(citation) => Some(citation),
            CitationEntry::Other(_) => None,
        }
    }
}

/// A retrieved document cited by the answer.
///
/// `fields` holds the citation object exactly as the service sent it, in its
/// original key order.  `pages` and the `storageaccount_*` fields are derived
/// from `filepath` and `url` during normalization, serialize after the
/// original keys, and are omitted when they could not be derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// The citation keys the service returned, untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    /// Page numbers encoded as `_pages_<n>` in `filepath`, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<String>>,

    /// Storage account name taken from the host of `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storageaccount_name: Option<String>,

    /// Blob container taken from the first path segment of `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storageaccount_container: Option<String>,

    /// Decoded blob path within the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storageaccount_blob: Option<String>,
}

impl Citation {
    /// Wrap a citation object without deriving anything.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.str_field("content")
    }

    pub fn title(&self) -> Option<&str> {
        self.str_field("title")
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("url")
    }

    pub fn filepath(&self) -> Option<&str> {
        self.str_field("filepath")
    }

    pub fn chunk_id(&self) -> Option<&str> {
        self.str_field("chunk_id")
    }

    /// A string-valued key of the citation; `None` when absent or not a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Returns true if storage location fields were derived from the URL.
    pub fn has_storage_location(&self) -> bool {
        self.storageaccount_name.is_some()
            && self.storageaccount_container.is_some()
            && self.storageaccount_blob.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn intent_serializes_untagged() {
        assert_eq!(
            to_value(Intent::Raw("not json".to_string())).unwrap(),
            json!("not json")
        );
        assert_eq!(
            to_value(Intent::Structured(json!({"a": 1}))).unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn citation_omits_underived_fields() {
        let mut citation = Citation::from_fields(
            json!({"title": "handbook.pdf", "filepath": "handbook.pdf"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        citation.pages = Some(vec![]);
        assert_eq!(
            to_value(&citation).unwrap(),
            json!({"title": "handbook.pdf", "filepath": "handbook.pdf", "pages": []})
        );
        assert!(!citation.has_storage_location());
    }

    #[test]
    fn citation_keeps_key_order() {
        let citation: Citation = serde_json::from_value(json!({
            "chunk_id": 7,
            "title": "a",
            "rerank_score": 2.5,
            "url": "https://acct.blob.core.windows.net/c/a.pdf"
        }))
        .unwrap();
        assert_eq!(citation.fields["rerank_score"], json!(2.5));
        assert_eq!(citation.chunk_id(), None);
        assert_eq!(citation.title(), Some("a"));
        assert!(citation.content().is_none());

        let keys: Vec<String> = match to_value(&citation).unwrap() {
            Value::Object(map) => map.keys().cloned().collect(),
            other => panic!("expected an object, got {other}"),
        };
        assert_eq!(keys, vec!["chunk_id", "title", "rerank_score", "url"]);
    }

    #[test]
    fn context_round_trips_extra_keys() {
        let context: Context = serde_json::from_value(json!({
            "intent": "[\"x\"]",
            "all_retrieved_documents": [{"title": "b"}]
        }))
        .unwrap();
        assert_eq!(context.intent, Some(Intent::Raw("[\"x\"]".to_string())));
        assert!(context.citations.is_none());
        assert_eq!(context.extra["all_retrieved_documents"][0]["title"], "b");
    }

    #[test]
    fn context_citations_skip_other_entries() {
        let context = Context {
            citations: Some(vec![
                CitationEntry::Other(json!("opaque")),
                CitationEntry::Document(Citation::from_fields(
                    json!({"title": "doc"}).as_object().cloned().unwrap(),
                )),
            ]),
            ..Default::default()
        };
        let titles: Vec<_> = context
            .citations()
            .map(|c| c.title().unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["doc"]);
    }
}
