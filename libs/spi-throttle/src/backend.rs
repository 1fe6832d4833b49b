use async_trait::async_trait;

/// Failure reported by a generative backend for a single request
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("backend quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("backend transport error: {0}")]
    Transport(String),
}

/// One completed generation along with the usage the backend reported for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub total_tokens: u64,
}

/// A generative model endpoint that answers one prompt per call
#[async_trait]
pub trait GenerativeBackend: Send {
    async fn generate(&mut self, prompt: &str) -> Result<Generation, BackendError>;

    /// Pre-call estimate of the prompt's token count, used only to decide
    /// whether to wait before issuing the call
    fn estimate_tokens(&self, _prompt: &str) -> u64 {
        0
    }
}

/// Answers a prompt with up to `repeat` raw text answers.
/// Fewer answers than requested signals an early abort.
#[async_trait]
pub trait PromptResponder: Send {
    async fn respond(&mut self, repeat: usize, prompt: &str) -> Vec<String>;
}
