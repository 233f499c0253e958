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

//! Server-pushed signaling frames.
//!
//! These are the already-decoded messages the negotiation state reads from.
//! Framing and transport of the signaling channel live elsewhere.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamServiceType {
    Rx,
    Tx,
    Duplex,
}

impl StreamServiceType {
    pub fn receives(&self) -> bool {
        matches!(self, Self::Rx | Self::Duplex)
    }

    pub fn sends(&self) -> bool {
        matches!(self, Self::Tx | Self::Duplex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Audio,
    Video,
}

/// Video codec capabilities as advertised by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodecKind {
    Vp8,
    H264ConstrainedBaselineProfile,
    H264BaselineProfile,
    Vp9Profile0,
    Av1MainProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub stream_id: u32,
    /// Simulcast layers of the same source share a group id
    pub group_id: u32,
    pub attendee_id: String,
    #[serde(default)]
    pub external_user_id: String,
    #[serde(default)]
    pub max_bitrate_kbps: u32,
    #[serde(default)]
    pub avg_bitrate_bps: u32,
    pub media_type: MediaType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCredentialsFrame {
    pub username: String,
    pub password: String,
    pub ttl_seconds: u32,
    pub uris: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAckFrame {
    #[serde(default)]
    pub turn_credentials: Option<TurnCredentialsFrame>,
    /// Absent when the server keeps the client default
    #[serde(default)]
    pub video_subscription_limit: Option<u32>,
    #[serde(default)]
    pub wants_compressed_sdp: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFrame {
    #[serde(default)]
    pub at_capacity: bool,
    #[serde(default)]
    pub sources: Vec<StreamDescriptor>,
    #[serde(default)]
    pub paused_at_source_ids: Vec<u32>,
    #[serde(default)]
    pub num_participants: u32,
    /// Codecs every other participant in the meeting is able to receive
    #[serde(default)]
    pub supported_receive_codec_intersection: Vec<VideoCodecKind>,
}

impl IndexFrame {
    pub fn video_sources(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.sources.iter().filter(|source| source.media_type == MediaType::Video)
    }

    pub fn source(&self, stream_id: u32) -> Option<&StreamDescriptor> {
        self.sources.iter().find(|source| source.stream_id == stream_id)
    }

    pub fn group_id_for_stream(&self, stream_id: u32) -> Option<u32> {
        self.source(stream_id).map(|source| source.group_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeAckFrame {
    pub duplex: StreamServiceType,
    #[serde(default)]
    pub sdp_answer: Option<String>,
    #[serde(default)]
    pub compressed_sdp_answer: Option<Vec<u8>>,
}

/// Borrowed view of the answer carried by a [`SubscribeAckFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPayload<'a> {
    Plain(&'a str),
    Compressed(&'a [u8]),
}

impl SubscribeAckFrame {
    /// A non-empty compressed answer takes precedence over the plain one.
    pub fn answer_payload(&self) -> Option<AnswerPayload<'_>> {
        match (&self.compressed_sdp_answer, &self.sdp_answer) {
            (Some(compressed), _) if !compressed.is_empty() => {
                Some(AnswerPayload::Compressed(compressed))
            }
            (_, Some(plain)) if !plain.is_empty() => Some(AnswerPayload::Plain(plain)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalFrame {
    JoinAck(JoinAckFrame),
    Index(IndexFrame),
    SubscribeAck(SubscribeAckFrame),
}
