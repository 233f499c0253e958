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

use super::VideoCodecCapability;
use crate::sdp::Sdp;

/// Outcome of intersecting the local preferences with what the meeting can
/// receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecResolution {
    /// Non-empty intersection, in local preference order
    Intersection(Vec<VideoCodecCapability>),
    /// Nobody agreed on anything, keep the session up with the fallback
    Degraded { fallback: VideoCodecCapability },
}

impl CodecResolution {
    pub fn effective_preferences(&self) -> Vec<VideoCodecCapability> {
        match self {
            CodecResolution::Intersection(codecs) => codecs.clone(),
            CodecResolution::Degraded { fallback } => vec![fallback.clone()],
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, CodecResolution::Degraded { .. })
    }
}

/// The codec the negotiated answer actually uses for the local video send
/// section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCodec {
    pub capability: VideoCodecCapability,
    pub payload_type: u8,
    /// The answer settled on a codec outside the effective preferences
    pub degraded: bool,
}

/// `preferences ∩ supported`, keeping the order of `preferences`.
pub fn intersect_codec_preferences(
    preferences: &[VideoCodecCapability],
    supported: &[VideoCodecCapability],
) -> Vec<VideoCodecCapability> {
    preferences
        .iter()
        .filter(|preference| supported.iter().any(|codec| codec.matches(preference)))
        .cloned()
        .collect()
}

pub fn resolve_meeting_codecs(
    preferences: &[VideoCodecCapability],
    supported: &[VideoCodecCapability],
    fallback: &VideoCodecCapability,
) -> CodecResolution {
    let intersection = intersect_codec_preferences(preferences, supported);
    if intersection.is_empty() {
        log::warn!(
            "no common video send codec (preferred {:?}, meeting receives {:?}), using {}",
            preferences,
            supported,
            fallback
        );
        return CodecResolution::Degraded { fallback: fallback.clone() };
    }
    CodecResolution::Intersection(intersection)
}

/// Reads the codec in use from the applied answer.
///
/// The first media codec of the video send section is the one the remote
/// side will decode, whatever the local preferences said. An empty
/// `effective` list places no constraint on the selection.
pub fn select_video_send_codec(
    answer: &Sdp,
    effective: &[VideoCodecCapability],
) -> Option<SelectedCodec> {
    let negotiated = answer.video_send_codecs().into_iter().next()?;
    let degraded = !effective.is_empty()
        && !effective.iter().any(|codec| codec.matches(&negotiated.capability));
    if degraded {
        log::warn!(
            "answer selected {} which is not among the preferred send codecs",
            negotiated.capability
        );
    }

    Some(SelectedCodec {
        capability: negotiated.capability,
        payload_type: negotiated.payload_type,
        degraded,
    })
}
