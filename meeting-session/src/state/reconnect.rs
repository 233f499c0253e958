// Copyright 2025 LiveKit, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::{Duration, Instant};

use meeting_protocol::TurnCredentialsFrame;
use rand::Rng;

use crate::options::ReconnectOptions;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStatus {
    #[default]
    Idle,
    Reconnecting {
        /// Attempts scheduled so far in this cycle
        attempt: u32,
    },
    /// The reconnect timeout elapsed, the session has to be torn down
    Exhausted,
}

/// Tracks reconnect attempts across negotiations.
///
/// Lives in the session state but moves on its own schedule: tasks call
/// [`ReconnectState::start`] when the transport drops and
/// [`ReconnectState::reset`] once a negotiation completed.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    options: ReconnectOptions,
    status: ReconnectStatus,
    started_at: Option<Instant>,
}

impl ReconnectState {
    pub fn new(options: ReconnectOptions) -> Self {
        Self { options, status: ReconnectStatus::Idle, started_at: None }
    }

    pub fn status(&self) -> ReconnectStatus {
        self.status
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(self.status, ReconnectStatus::Reconnecting { .. })
    }

    pub fn options(&self) -> &ReconnectOptions {
        &self.options
    }

    /// Starts a reconnect cycle, keeping the start time of a cycle already
    /// in progress.
    pub fn start(&mut self, now: Instant) {
        if self.status == ReconnectStatus::Idle {
            self.started_at = Some(now);
            self.status = ReconnectStatus::Reconnecting { attempt: 0 };
        }
    }

    /// Registers a new attempt and returns how long to wait before it, or
    /// `None` once the reconnect timeout has elapsed.
    ///
    /// The first attempt of a cycle waits at most `short_backoff`.
    pub fn next_attempt(&mut self, now: Instant) -> Option<Duration> {
        if self.status == ReconnectStatus::Idle {
            self.start(now);
        }
        let attempt = match self.status {
            ReconnectStatus::Reconnecting { attempt } => attempt,
            ReconnectStatus::Idle | ReconnectStatus::Exhausted => return None,
        };

        let started_at = self.started_at.unwrap_or(now);
        if now.saturating_duration_since(started_at) >= self.options.timeout {
            log::warn!("giving up reconnecting after {:?}", self.options.timeout);
            self.status = ReconnectStatus::Exhausted;
            return None;
        }

        self.status = ReconnectStatus::Reconnecting { attempt: attempt + 1 };
        let wait = self.backoff(attempt, &mut rand::thread_rng());
        log::debug!("reconnect attempt {} in {:?}", attempt, wait);
        Some(wait)
    }

    /// Full jitter: `fixed_wait + random(0..=min(long, short * 2^attempt))`.
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self
            .options
            .short_backoff
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.options.long_backoff)
            .min(self.options.long_backoff);
        let jitter = ceiling.mul_f64(rng.gen::<f64>());
        self.options.fixed_wait + jitter
    }

    pub fn reset(&mut self) {
        self.status = ReconnectStatus::Idle;
        self.started_at = None;
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new(ReconnectOptions::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnCredentials {
    pub username: String,
    pub password: String,
    pub ttl: Duration,
    pub uris: Vec<String>,
    pub obtained_at: Instant,
}

impl TurnCredentials {
    pub fn from_frame(frame: &TurnCredentialsFrame, now: Instant) -> Self {
        Self {
            username: frame.username.clone(),
            password: frame.password.clone(),
            ttl: Duration::from_secs(frame.ttl_seconds.into()),
            uris: frame.uris.clone(),
            obtained_at: now,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.obtained_at) >= self.ttl
    }
}
