//! Flatten a [`ChatCompletion`] into a [`NormalizedResponse`].
//!
//! Normalization is total.  Each optional transformation (intent parsing,
//! page extraction, storage location parsing) is attempted independently and
//! a failure leaves the affected field exactly as the service sent it.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::observability::{CITATIONS_WITH_STORAGE, NORMALIZED_CITATIONS, PARSED_INTENTS};
use crate::types::{
    ChatCompletion, Choice, Citation, CitationEntry, CompletionChoice, Context, Intent,
    NormalizedResponse, ResponseMessage, Usage,
};

static PAGES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_pages_(\d+)").expect("page pattern compiles"));

/// Normalize a completion.
pub fn normalize(completion: &ChatCompletion) -> NormalizedResponse {
    NormalizedResponse {
        choices: completion.choices.iter().map(normalize_choice).collect(),
        created: completion.created,
        id: completion.id.clone(),
        model: completion.model.clone(),
        object: completion.object.clone(),
        system_fingerprint: completion.system_fingerprint.clone(),
        usage: completion.usage.map(|usage| Usage {
            completion_tokens: usage.completion_tokens,
            prompt_tokens: usage.prompt_tokens,
            total_tokens: usage.total_tokens,
        }),
    }
}

fn normalize_choice(choice: &CompletionChoice) -> Choice {
    let message = &choice.message;
    Choice {
        finish_reason: choice.finish_reason.clone(),
        index: choice.index,
        message: ResponseMessage {
            refusal: message.refusal.clone(),
            role: message.role.clone(),
            content: message.content.clone(),
            end_turn: message.end_turn,
            context: message.context.clone().map(normalize_context),
        },
    }
}

/// Lift `intent` and `citations` out of a raw context block.
///
/// Keys with an unexpected type stay in [`Context::extra`] untouched.
pub fn normalize_context(mut raw: Map<String, Value>) -> Context {
    let mut context = Context::default();

    if let Some(Value::String(intent)) = raw.get("intent") {
        let intent = parse_intent(intent);
        raw.remove("intent");
        context.intent = Some(intent);
    }

    if let Some(Value::Array(_)) = raw.get("citations") {
        if let Some(Value::Array(entries)) = raw.remove("citations") {
            context.citations = Some(entries.into_iter().map(normalize_citation).collect());
        }
    }

    context.extra = raw;
    context
}

/// Parse a JSON-encoded intent, keeping the original string if it is not JSON.
pub fn parse_intent(raw: &str) -> Intent {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => {
            PARSED_INTENTS.click();
            Intent::Structured(value)
        }
        Err(_) => Intent::Raw(raw.to_string()),
    }
}

fn normalize_citation(raw: Value) -> CitationEntry {
    NORMALIZED_CITATIONS.click();
    let Value::Object(fields) = raw else {
        return CitationEntry::Other(raw);
    };
    let mut citation = Citation::from_fields(fields);
    augment_citation(&mut citation);
    if citation.has_storage_location() {
        CITATIONS_WITH_STORAGE.click();
    }
    CitationEntry::Document(citation)
}

/// Derive `pages` and the storage location of a citation in place.
///
/// Only `filepath` and `url` are read, and only when they are strings; every
/// other key is left as sent.  Without a string `filepath` nothing is derived.
/// Without a usable `url` only `pages` is derived.
pub fn augment_citation(citation: &mut Citation) {
    let Some(pages) = citation.filepath().map(extract_pages) else {
        return;
    };
    citation.fields.remove("pages");
    citation.pages = Some(pages);

    if let Some(location) = citation.url().and_then(parse_storage_location) {
        for key in [
            "storageaccount_name",
            "storageaccount_container",
            "storageaccount_blob",
        ] {
            citation.fields.remove(key);
        }
        citation.storageaccount_name = Some(location.account);
        citation.storageaccount_container = Some(location.container);
        citation.storageaccount_blob = Some(location.blob);
    }
}

/// All page numbers encoded as `_pages_<digits>` in a file path, in order.
pub fn extract_pages(filepath: &str) -> Vec<String> {
    PAGES
        .captures_iter(filepath)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Where a blob lives in Azure Storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub account: String,
    pub container: String,
    pub blob: String,
}

/// Split a blob URL into account, container and decoded blob path.
///
/// The URL must start with `http` (any case) and name a container, i.e.
/// `scheme://host/container[/blob...]`.  The blob path drops any query string
/// or fragment before it is percent-decoded.
pub fn parse_storage_location(url: &str) -> Option<StorageLocation> {
    let scheme = url.as_bytes().get(..4)?;
    if !scheme.eq_ignore_ascii_case(b"http") {
        return None;
    }
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() < 4 || parts[3].is_empty() {
        return None;
    }
    let account = parts[2].split('.').next().unwrap_or_default();
    let blob = parts[4..].join("/");
    let blob = blob.split('?').next().unwrap_or_default();
    let blob = blob.split('#').next().unwrap_or_default();
    Some(StorageLocation {
        account: account.to_string(),
        container: parts[3].to_string(),
        blob: percent_encoding::percent_decode_str(blob)
            .decode_utf8_lossy()
            .into_owned(),
    })
}
