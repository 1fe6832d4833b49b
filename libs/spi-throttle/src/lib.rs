pub mod backend;
pub mod quota;

pub use backend::{BackendError, Generation, GenerativeBackend, PromptResponder};
pub use quota::{DirectResponder, QuotaLimits, QuotaScheduler, QuotaState, ThrottledResponder};
