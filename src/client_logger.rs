//! Logging trait for chat client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! every completion passing through a [`RagChatClient`](crate::RagChatClient).

use crate::{ChatCompletion, NormalizedResponse};

/// A trait for logging chat client operations.
///
/// Implement this trait to record the raw completions the service returns
/// alongside the normalized responses handed back to the caller.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat::{ChatCompletion, ClientLogger, NormalizedResponse};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_completion(&self, completion: &ChatCompletion) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Completion: {}", serde_json::to_string(completion).unwrap()).unwrap();
///     }
///
///     fn log_response(&self, response: &NormalizedResponse) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Response: {}", serde_json::to_string(response).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log the completion exactly as the service returned it.
    ///
    /// Called once per successful `chat` call, before normalization.
    fn log_completion(&self, completion: &ChatCompletion);

    /// Log the normalized response returned to the caller.
    fn log_response(&self, response: &NormalizedResponse);
}
