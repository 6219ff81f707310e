//! Jittered exponential delays between retry attempts.

use std::time::Duration;

use rand::prelude::*;

/// Exponential backoff with decorrelated jitter.
///
/// The first delay is drawn from `[init_backoff, init_backoff * base)`, every
/// following one from `[init_backoff, previous * base)`, capped at `max_backoff`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            base: 3.,
        }
    }
}

type SourceOfRandomness = Box<dyn RngCore + Sync + Send>;

/// Stateful delay generator for one retry sequence.
pub(crate) struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    rng: Option<SourceOfRandomness>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("init_backoff", &self.init_backoff)
            .field("next_backoff_secs", &self.next_backoff_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("base", &self.base)
            .finish()
    }
}

impl Backoff {
    pub(crate) fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    /// Creates a new `Backoff` with an optional `rng`. `thread_rng` is used when `None`.
    pub(crate) fn new_with_rng(config: &BackoffConfig, rng: Option<SourceOfRandomness>) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            rng,
        }
    }

    /// Returns the next delay to wait before retrying.
    pub(crate) fn next(&mut self) -> Duration {
        let upper = self.next_backoff_secs * self.base;
        let rand_backoff = if upper > self.init_backoff {
            let range = self.init_backoff..upper;
            match self.rng.as_mut() {
                Some(rng) => rng.gen_range(range),
                None => thread_rng().gen_range(range),
            }
        } else {
            self.init_backoff
        };

        let next_backoff = self.max_backoff_secs.min(rand_backoff);
        Duration::from_secs_f64(std::mem::replace(&mut self.next_backoff_secs, next_backoff))
    }
}
