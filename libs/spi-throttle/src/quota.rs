/// Quota-Aware Request Scheduling
///
/// **Responsibility:**
/// Keep the per-minute request count, per-minute token count and per-day
/// request count observed against a generative backend within configured
/// limits, sleeping when the next request would break a budget.
///
/// **Window Model:**
/// Fixed windows, not a sliding window. Wall-clock time between
/// observations is folded into a minute timer and a day timer; once a timer
/// passes its window length the counters of that scope are zeroed. Bursts
/// straddling a reset point can therefore exceed the nominal rate.
///
/// **Usage Accounting:**
/// Token usage is only known after a call completes (backend-reported
/// totals). A pre-call estimate of the prompt size is used only to decide
/// whether to wait before issuing the call.

use crate::backend::{GenerativeBackend, PromptResponder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(86_400);
const MIN_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
    pub requests_per_day: u32,
    /// Length of the wait-out window once the daily budget is spent. May be
    /// shorter than a full day to allow a conservative early reset.
    pub daily_window_secs: u64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            requests_per_minute: 15,
            tokens_per_minute: 1_000_000,
            requests_per_day: 1500,
            daily_window_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaState {
    pub requests_this_minute: u32,
    pub tokens_this_minute: u64,
    pub requests_today: u32,
    pub minute_elapsed: Duration,
    pub day_elapsed: Duration,
    pub last_observed: Option<Instant>,
}

/// Fixed-window budget tracker; one instance per backend
#[derive(Debug, Clone)]
pub struct QuotaScheduler {
    limits: QuotaLimits,
    state: QuotaState,
}

impl QuotaScheduler {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            state: QuotaState::default(),
        }
    }

    pub fn state(&self) -> &QuotaState {
        &self.state
    }

    /// Fold the time since the last observation into both timers and roll
    /// over any window that has run out
    fn observe(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.state.last_observed {
            let delta = now.saturating_duration_since(last);
            self.state.minute_elapsed += delta;
            self.state.day_elapsed += delta;
        }
        self.state.last_observed = Some(now);

        if self.state.minute_elapsed > MINUTE {
            self.reset_minute();
        }
        if self.state.day_elapsed > DAY {
            self.reset_day();
        }
    }

    fn reset_minute(&mut self) {
        self.state.requests_this_minute = 0;
        self.state.tokens_this_minute = 0;
        self.state.minute_elapsed = Duration::ZERO;
    }

    fn reset_day(&mut self) {
        self.state.requests_today = 0;
        self.state.day_elapsed = Duration::ZERO;
    }

    fn minute_budget_exhausted(&self, estimated_prompt_tokens: u64) -> bool {
        self.state.requests_this_minute >= self.limits.requests_per_minute
            || self.state.tokens_this_minute + estimated_prompt_tokens + 1
                >= self.limits.tokens_per_minute
    }

    /// Wait until one more request fits the budgets. Returns the total time
    /// slept.
    pub async fn acquire(&mut self, estimated_prompt_tokens: u64) -> Duration {
        self.observe();
        let mut waited = Duration::ZERO;

        if self.minute_budget_exhausted(estimated_prompt_tokens) {
            let wait = MIN_WAIT.max(MINUTE.saturating_sub(self.state.minute_elapsed));
            info!(
                requests = self.state.requests_this_minute,
                tokens = self.state.tokens_this_minute,
                wait_secs = wait.as_secs_f64(),
                "Per-minute quota reached, pausing"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
            self.observe();
            self.reset_minute();
        }

        if self.state.requests_today >= self.limits.requests_per_day {
            let window = Duration::from_secs(self.limits.daily_window_secs);
            let wait = MIN_WAIT.max(window.saturating_sub(self.state.day_elapsed));
            warn!(
                requests_today = self.state.requests_today,
                wait_secs = wait.as_secs_f64(),
                "Daily quota reached, pausing"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
            self.observe();
            self.reset_day();
        }

        waited
    }

    /// Account for one completed request. The call's duration is folded into
    /// both timers.
    pub fn record(&mut self, total_tokens: u64) {
        self.observe();
        self.state.requests_this_minute += 1;
        self.state.requests_today += 1;
        self.state.tokens_this_minute += total_tokens;
        debug!(
            requests_this_minute = self.state.requests_this_minute,
            tokens_this_minute = self.state.tokens_this_minute,
            requests_today = self.state.requests_today,
            "Request accounted"
        );
    }
}

/// Responder that throttles a backend through a [`QuotaScheduler`]
pub struct ThrottledResponder<B> {
    backend: B,
    scheduler: QuotaScheduler,
}

impl<B: GenerativeBackend> ThrottledResponder<B> {
    pub fn new(backend: B, limits: QuotaLimits) -> Self {
        Self {
            backend,
            scheduler: QuotaScheduler::new(limits),
        }
    }

    pub fn scheduler(&self) -> &QuotaScheduler {
        &self.scheduler
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: GenerativeBackend> PromptResponder for ThrottledResponder<B> {
    async fn respond(&mut self, repeat: usize, prompt: &str) -> Vec<String> {
        let estimate = self.backend.estimate_tokens(prompt);
        let mut answers = Vec::with_capacity(repeat);

        for k in 0..repeat {
            self.scheduler.acquire(estimate).await;

            match self.backend.generate(prompt).await {
                Ok(generation) => {
                    self.scheduler.record(generation.total_tokens);
                    answers.push(generation.text);
                }
                Err(e) => {
                    warn!(
                        answer = k,
                        collected = answers.len(),
                        error = %e,
                        "Backend request failed; returning partial answers"
                    );
                    break;
                }
            }
        }

        answers
    }
}

/// Responder for backends without quotas (e.g. a local model)
pub struct DirectResponder<B> {
    backend: B,
}

impl<B: GenerativeBackend> DirectResponder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: GenerativeBackend> PromptResponder for DirectResponder<B> {
    async fn respond(&mut self, repeat: usize, prompt: &str) -> Vec<String> {
        let mut answers = Vec::with_capacity(repeat);
        for k in 0..repeat {
            match self.backend.generate(prompt).await {
                Ok(generation) => answers.push(generation.text.trim().to_string()),
                Err(e) => {
                    warn!(answer = k, error = %e, "Backend request failed");
                    break;
                }
            }
        }
        answers
    }
}
