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

/// Timings and counters collected while negotiating.
///
/// Values only move forward within a session, [`SessionMetrics::reset`] is
/// reserved for a full restart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub signaling_open_duration: Option<Duration>,
    pub ice_gathering_duration: Option<Duration>,
    pub start_audio_video_at: Option<Instant>,
    pub attendee_presence_duration: Option<Duration>,
    pub meeting_start_duration: Option<Duration>,
    pub video_input_attached_at: Option<Instant>,
    poor_connection_count: u32,
    max_video_tile_count: u32,
}

impl SessionMetrics {
    pub fn poor_connection_count(&self) -> u32 {
        self.poor_connection_count
    }

    pub fn max_video_tile_count(&self) -> u32 {
        self.max_video_tile_count
    }

    pub fn record_poor_connection(&mut self) {
        self.poor_connection_count = self.poor_connection_count.saturating_add(1);
    }

    pub fn observe_video_tile_count(&mut self, count: u32) {
        self.max_video_tile_count = self.max_video_tile_count.max(count);
    }

    /// Keeps the first recorded start time.
    pub fn mark_start_audio_video(&mut self, now: Instant) {
        self.start_audio_video_at.get_or_insert(now);
    }

    /// Duration since the audio/video start mark, if set.
    pub fn since_start(&self, now: Instant) -> Option<Duration> {
        self.start_audio_video_at.map(|start| now.saturating_duration_since(start))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
