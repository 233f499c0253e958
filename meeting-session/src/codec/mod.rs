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

use std::fmt;

use meeting_protocol::VideoCodecKind;
use serde::{Deserialize, Serialize};

mod negotiation;

pub use negotiation::{
    intersect_codec_preferences, resolve_meeting_codecs, select_video_send_codec,
    CodecResolution, SelectedCodec,
};

pub const VIDEO_CLOCK_RATE: u32 = 90_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    VP8,
    H264,
    VP9,
    AV1,
    H265,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::VP8 => "vp8",
            VideoCodec::H264 => "h264",
            VideoCodec::VP9 => "vp9",
            VideoCodec::AV1 => "av1",
            VideoCodec::H265 => "h265",
        }
    }

    /// Encoding name as written in `a=rtpmap` lines.
    pub fn rtpmap_name(&self) -> &'static str {
        match self {
            VideoCodec::VP8 => "VP8",
            VideoCodec::H264 => "H264",
            VideoCodec::VP9 => "VP9",
            VideoCodec::AV1 => "AV1",
            VideoCodec::H265 => "H265",
        }
    }

    /// Returns `None` for non-media encodings such as rtx, red or ulpfec.
    pub fn from_rtpmap_name(name: &str) -> Option<Self> {
        [VideoCodec::VP8, VideoCodec::H264, VideoCodec::VP9, VideoCodec::AV1, VideoCodec::H265]
            .into_iter()
            .find(|codec| codec.rtpmap_name().eq_ignore_ascii_case(name))
    }
}

/// A codec together with the format parameters that distinguish its
/// profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoCodecCapability {
    pub codec: VideoCodec,
    pub clock_rate: u32,
    /// Content of the `a=fmtp` line after the payload type
    pub fmtp: Option<String>,
}

impl VideoCodecCapability {
    pub fn new(codec: VideoCodec, fmtp: Option<&str>) -> Self {
        Self { codec, clock_rate: VIDEO_CLOCK_RATE, fmtp: fmtp.map(str::to_owned) }
    }

    pub fn vp8() -> Self {
        Self::new(VideoCodec::VP8, None)
    }

    pub fn vp9_profile0() -> Self {
        Self::new(VideoCodec::VP9, Some("profile-id=0"))
    }

    pub fn av1_main_profile() -> Self {
        Self::new(VideoCodec::AV1, Some("level-idx=5;profile=0;tier=0"))
    }

    pub fn h264_constrained_baseline_profile() -> Self {
        Self::new(
            VideoCodec::H264,
            Some("level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"),
        )
    }

    pub fn h264_baseline_profile() -> Self {
        Self::new(
            VideoCodec::H264,
            Some("level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f"),
        )
    }

    pub fn fmtp_param(&self, key: &str) -> Option<&str> {
        let fmtp = self.fmtp.as_deref()?;
        fmtp.split(';')
            .filter_map(|param| param.trim().split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(key))
            .map(|(_, value)| value.trim())
    }

    /// Whether both describe the same codec profile.
    ///
    /// Only the parameters that select a profile are compared; levels and
    /// other tuning parameters may differ.
    pub fn matches(&self, other: &Self) -> bool {
        if self.codec != other.codec || self.clock_rate != other.clock_rate {
            return false;
        }

        let param = |cap: &Self, key: &str, default: &str| {
            cap.fmtp_param(key).unwrap_or(default).to_ascii_lowercase()
        };

        match self.codec {
            VideoCodec::VP8 => true,
            VideoCodec::VP9 => param(self, "profile-id", "0") == param(other, "profile-id", "0"),
            VideoCodec::AV1 => param(self, "profile", "0") == param(other, "profile", "0"),
            VideoCodec::H265 => param(self, "profile-id", "1") == param(other, "profile-id", "1"),
            VideoCodec::H264 => {
                // profile_idc and profile-iop, the level byte is negotiable
                let profile = |cap: &Self| {
                    let id = param(cap, "profile-level-id", "42001f");
                    id.get(..4).map(str::to_owned).unwrap_or(id)
                };
                profile(self) == profile(other)
                    && param(self, "packetization-mode", "0")
                        == param(other, "packetization-mode", "0")
            }
        }
    }
}

impl From<VideoCodecKind> for VideoCodecCapability {
    fn from(kind: VideoCodecKind) -> Self {
        match kind {
            VideoCodecKind::Vp8 => Self::vp8(),
            VideoCodecKind::H264ConstrainedBaselineProfile => {
                Self::h264_constrained_baseline_profile()
            }
            VideoCodecKind::H264BaselineProfile => Self::h264_baseline_profile(),
            VideoCodecKind::Vp9Profile0 => Self::vp9_profile0(),
            VideoCodecKind::Av1MainProfile => Self::av1_main_profile(),
        }
    }
}

impl fmt::Display for VideoCodecCapability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.codec.rtpmap_name(), self.clock_rate)?;
        if let Some(fmtp) = &self.fmtp {
            write!(f, " {}", fmtp)?;
        }
        Ok(())
    }
}
