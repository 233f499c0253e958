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

use std::time::Duration;

use crate::codec::VideoCodecCapability;
use crate::sdp::compression::MAX_DECOMPRESSED_SDP_SIZE;

pub const DEFAULT_VIDEO_SUBSCRIPTION_LIMIT: usize = 25;
pub const DEFAULT_VIDEO_SLOT_COUNT: usize = 25;
pub const DEFAULT_PIPELINE_QUEUE_SIZE: usize = 8;

pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(120);
pub const RECONNECT_SHORT_BACKOFF: Duration = Duration::from_secs(1);
pub const RECONNECT_LONG_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectOptions {
    /// Give up once reconnecting has taken this long
    pub timeout: Duration,
    pub fixed_wait: Duration,
    pub short_backoff: Duration,
    pub long_backoff: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            timeout: RECONNECT_TIMEOUT,
            fixed_wait: Duration::ZERO,
            short_backoff: RECONNECT_SHORT_BACKOFF,
            long_backoff: RECONNECT_LONG_BACKOFF,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Used until the join ack carries the server's limit
    pub video_subscription_limit: usize,
    /// Number of receive transceivers, fixed for the whole session
    pub video_slot_count: usize,
    /// Most preferred first
    pub video_send_codec_preferences: Vec<VideoCodecCapability>,
    pub fallback_video_codec: VideoCodecCapability,
    pub enable_simulcast: bool,
    pub reconnect: ReconnectOptions,
    pub max_decompressed_sdp_size: usize,
    pub pipeline_queue_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            video_subscription_limit: DEFAULT_VIDEO_SUBSCRIPTION_LIMIT,
            video_slot_count: DEFAULT_VIDEO_SLOT_COUNT,
            video_send_codec_preferences: vec![
                VideoCodecCapability::vp8(),
                VideoCodecCapability::h264_constrained_baseline_profile(),
            ],
            fallback_video_codec: VideoCodecCapability::vp8(),
            enable_simulcast: false,
            reconnect: ReconnectOptions::default(),
            max_decompressed_sdp_size: MAX_DECOMPRESSED_SDP_SIZE,
            pipeline_queue_size: DEFAULT_PIPELINE_QUEUE_SIZE,
        }
    }
}
