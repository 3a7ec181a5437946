use rand::Rng;

use crate::config::ReconnectConfig;

pub const JITTER_MIN: f64 = 0.8;
pub const JITTER_MAX: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay_ms: u64 },
    Exhausted { attempts: u32 },
}

/// Exponential backoff with jitter and a bounded attempt budget.
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    config: ReconnectConfig,
    attempts: u32,
    last_attempt_ms: Option<u64>,
}

impl ReconnectionPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
            last_attempt_ms: None,
        }
    }

    /// Backoff before jitter for a 1-based attempt number.
    pub fn base_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.config.base_delay_ms as f64 * self.config.backoff_multiplier.powi(exponent);
        delay.min(self.config.max_delay_ms as f64)
    }

    pub fn compute_delay(&self, attempt: u32) -> u64 {
        self.compute_delay_with(attempt, &mut rand::rng())
    }

    pub fn compute_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> u64 {
        let jitter = rng.random_range(JITTER_MIN..=JITTER_MAX);
        (self.base_delay_ms(attempt) * jitter).round() as u64
    }

    /// Counts a failed attempt and decides whether another one may follow.
    pub fn schedule_retry(&mut self, now_ms: u64) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_ms = Some(now_ms);

        if self.attempts > self.config.max_attempts {
            return RetryDecision::Exhausted {
                attempts: self.attempts - 1,
            };
        }

        RetryDecision::Retry {
            attempt: self.attempts,
            delay_ms: self.compute_delay(self.attempts),
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_attempt_ms = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.config.max_attempts
    }
}
