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

#![allow(dead_code)]

use futures_util::{future::BoxFuture, FutureExt};
use meeting_session::{
    pipeline::{SessionTask, TaskResult},
    protocol::{IndexFrame, MediaType, StreamDescriptor, VideoCodecKind},
    sdp::Sdp,
    state::SessionState,
    video::VideoStreamIdSet,
};
use tokio::sync::oneshot;

pub fn ids(raw: &[u32]) -> VideoStreamIdSet {
    VideoStreamIdSet::from_raw(raw.iter().copied())
}

/// Offer with a VP8/H264 video send section and the given send ssrc.
pub fn offer(ssrc: u32) -> Sdp {
    Sdp::new(format!(
        "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 102\r\na=mid:0\r\na=sendrecv\r\n\
a=rtpmap:96 VP8/90000\r\na=rtpmap:102 H264/90000\r\n\
a=fmtp:102 level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f\r\n\
a=ssrc:{} cname:local\r\n",
        ssrc
    ))
}

/// Answer whose video send section lists `first` ahead of the other codec.
pub fn answer(first: u8, session_version: u32) -> String {
    let payloads = if first == 102 { "102 96" } else { "96 102" };
    format!(
        "v=0\r\no=- 9 {} IN IP4 10.0.0.1\r\ns=-\r\nt=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF {}\r\na=mid:0\r\na=recvonly\r\n\
a=rtpmap:96 VP8/90000\r\na=rtpmap:102 H264/90000\r\n\
a=fmtp:102 level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:1\r\na=sendonly\r\na=rtpmap:96 VP8/90000\r\n",
        session_version, payloads
    )
}

pub fn video_source(stream_id: u32, group_id: u32) -> StreamDescriptor {
    StreamDescriptor {
        stream_id,
        group_id,
        attendee_id: format!("attendee-{}", group_id),
        external_user_id: format!("user-{}", group_id),
        max_bitrate_kbps: 1500,
        avg_bitrate_bps: 0,
        media_type: MediaType::Video,
    }
}

pub fn index(sources: Vec<StreamDescriptor>, codecs: Vec<VideoCodecKind>) -> IndexFrame {
    IndexFrame {
        num_participants: sources.len() as u32 + 1,
        sources,
        supported_receive_codec_intersection: codecs,
        ..Default::default()
    }
}

/// Writes to the state, reports that it started, then never finishes.
pub struct StallingTask {
    started: Option<oneshot::Sender<()>>,
}

impl StallingTask {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (started_tx, started_rx) = oneshot::channel();
        (Self { started: Some(started_tx) }, started_rx)
    }
}

impl SessionTask for StallingTask {
    fn name(&self) -> &str {
        "stalling"
    }

    fn run<'a>(&'a mut self, state: &'a mut SessionState) -> BoxFuture<'a, TaskResult<()>> {
        async move {
            state.sdp_offer = Some(offer(1));
            state.set_videos_to_receive(ids(&[1, 2, 3]));
            if let Some(started) = self.started.take() {
                let _ = started.send(());
            }
            futures_util::future::pending::<()>().await;
            Ok(())
        }
        .boxed()
    }
}
