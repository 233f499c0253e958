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

use serde::{Deserialize, Serialize};

use crate::codec::{VideoCodec, VideoCodecCapability};

pub mod compression;

/// Session description text.
///
/// Only the handful of lines the negotiation state cares about are
/// inspected, everything else is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sdp(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

/// A codec found in a media section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedCodec {
    pub payload_type: u8,
    pub capability: VideoCodecCapability,
}

/// Lines of one `m=` section, starting with the `m=` line itself.
#[derive(Debug, Clone)]
pub struct MediaSection<'a> {
    lines: Vec<&'a str>,
}

impl<'a> MediaSection<'a> {
    fn media_line(&self) -> &'a str {
        self.lines[0]
    }

    /// `audio`, `video`, `application`...
    pub fn kind(&self) -> &'a str {
        self.media_line().trim_start_matches("m=").split_whitespace().next().unwrap_or("")
    }

    /// Payload types in the order listed on the `m=` line.
    pub fn payload_types(&self) -> Vec<u8> {
        self.media_line().split_whitespace().skip(3).filter_map(|pt| pt.parse().ok()).collect()
    }

    pub fn direction(&self) -> Direction {
        for line in &self.lines {
            match line.trim() {
                "a=sendrecv" => return Direction::SendRecv,
                "a=sendonly" => return Direction::SendOnly,
                "a=recvonly" => return Direction::RecvOnly,
                "a=inactive" => return Direction::Inactive,
                _ => {}
            }
        }
        Direction::SendRecv
    }

    /// Encoding name and clock rate of a payload type.
    pub fn rtpmap(&self, payload_type: u8) -> Option<(&'a str, u32)> {
        let prefix = format!("a=rtpmap:{} ", payload_type);
        let line = self.lines.iter().find(|line| line.starts_with(&prefix))?;
        let mut encoding = line[prefix.len()..].trim().split('/');
        let name = encoding.next()?;
        let clock_rate = encoding.next()?.parse().ok()?;
        Some((name, clock_rate))
    }

    pub fn fmtp(&self, payload_type: u8) -> Option<&'a str> {
        let prefix = format!("a=fmtp:{} ", payload_type);
        self.lines
            .iter()
            .find(|line| line.starts_with(&prefix))
            .map(|line| line[prefix.len()..].trim())
    }

    pub fn ssrcs(&self) -> Vec<u32> {
        let mut ssrcs: Vec<u32> = Vec::new();
        for line in &self.lines {
            let Some(rest) = line.strip_prefix("a=ssrc:") else { continue };
            let Some(Ok(ssrc)) = rest.split_whitespace().next().map(str::parse) else { continue };
            if !ssrcs.contains(&ssrc) {
                ssrcs.push(ssrc);
            }
        }
        ssrcs
    }

    /// Video codecs in payload order, retransmission and FEC formats
    /// excluded.
    pub fn video_codecs(&self) -> Vec<NegotiatedCodec> {
        self.payload_types()
            .into_iter()
            .filter_map(|payload_type| {
                let (name, clock_rate) = self.rtpmap(payload_type)?;
                let codec = VideoCodec::from_rtpmap_name(name)?;
                Some(NegotiatedCodec {
                    payload_type,
                    capability: VideoCodecCapability {
                        codec,
                        clock_rate,
                        fmtp: self.fmtp(payload_type).map(str::to_owned),
                    },
                })
            })
            .collect()
    }
}

impl Sdp {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self(sdp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn media_sections(&self) -> Vec<MediaSection<'_>> {
        let (lines, _) = split_lines(&self.0);
        let mut sections: Vec<MediaSection> = Vec::new();
        for line in lines {
            if line.starts_with("m=") {
                sections.push(MediaSection { lines: vec![line] });
            } else if let Some(section) = sections.last_mut() {
                section.lines.push(line);
            }
        }
        sections
    }

    /// The local send transceiver is always created first, so its section is
    /// the first video section of both offers and answers.
    pub fn video_send_section(&self) -> Option<MediaSection<'_>> {
        self.media_sections().into_iter().find(|section| section.kind() == "video")
    }

    pub fn video_send_codecs(&self) -> Vec<NegotiatedCodec> {
        self.video_send_section().map(|section| section.video_codecs()).unwrap_or_default()
    }

    pub fn video_send_ssrcs(&self) -> Vec<u32> {
        self.video_send_section().map(|section| section.ssrcs()).unwrap_or_default()
    }

    /// True when both descriptions announce send SSRCs and they differ,
    /// meaning the local video source was replaced between the two offers.
    pub fn has_different_video_send_ssrc(&self, previous: &Sdp) -> bool {
        let current = self.video_send_ssrcs();
        let previous = previous.video_send_ssrcs();
        !current.is_empty() && !previous.is_empty() && current != previous
    }

    /// Reorders the payload types of the video send section so codecs from
    /// `preferences` come first, in preference order.
    ///
    /// Nothing else is touched, line endings are preserved.
    pub fn with_video_send_codec_preferences(&self, preferences: &[VideoCodecCapability]) -> Sdp {
        if preferences.is_empty() {
            return self.clone();
        }
        let Some(section) = self.video_send_section() else {
            return self.clone();
        };

        let codecs = section.video_codecs();
        let mut ordered: Vec<u8> = Vec::new();
        for preference in preferences {
            for codec in &codecs {
                if codec.capability.matches(preference) && !ordered.contains(&codec.payload_type) {
                    ordered.push(codec.payload_type);
                }
            }
        }
        if ordered.is_empty() {
            return self.clone();
        }
        for payload_type in section.payload_types() {
            if !ordered.contains(&payload_type) {
                ordered.push(payload_type);
            }
        }

        let media_line = section.media_line();
        let header: Vec<&str> = media_line.split_whitespace().take(3).collect();
        let mut munged_line = header.join(" ");
        for payload_type in ordered {
            munged_line.push_str(&format!(" {}", payload_type));
        }

        let (lines, eol) = split_lines(&self.0);
        let mut replaced = false;
        let out: Vec<&str> = lines
            .into_iter()
            .map(|line| {
                if !replaced && line == media_line {
                    replaced = true;
                    munged_line.as_str()
                } else {
                    line
                }
            })
            .collect();

        Sdp(join_lines(&out, eol))
    }
}

impl From<String> for Sdp {
    fn from(sdp: String) -> Self {
        Self(sdp)
    }
}

impl From<&str> for Sdp {
    fn from(sdp: &str) -> Self {
        Self(sdp.to_owned())
    }
}

impl fmt::Display for Sdp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Splits on the line ending the description already uses.
fn split_lines(sdp: &str) -> (Vec<&str>, &'static str) {
    let eol = if sdp.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<&str> = sdp.split(eol).collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    (lines, eol)
}

fn join_lines(lines: &[&str], eol: &str) -> String {
    let mut sdp = lines.join(eol);
    if !sdp.ends_with(eol) {
        sdp.push_str(eol);
    }
    sdp
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=sendrecv\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97 102 103\r\n\
a=recvonly\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtpmap:97 rtx/90000\r\n\
a=fmtp:97 apt=96\r\n\
a=rtpmap:102 H264/90000\r\n\
a=fmtp:102 level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f\r\n\
a=rtpmap:103 rtx/90000\r\n\
a=fmtp:103 apt=102\r\n\
a=ssrc:1111 cname:abc\r\n\
a=ssrc:1111 msid:x y\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=inactive\r\n\
a=rtpmap:96 VP8/90000\r\n";

    #[test]
    fn parses_video_send_section() {
        let sdp = Sdp::from(ANSWER);
        let sections = sdp.media_sections();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].kind(), "audio");

        let video = sdp.video_send_section().unwrap();
        assert_eq!(video.payload_types(), vec![96, 97, 102, 103]);
        assert_eq!(video.direction(), Direction::RecvOnly);
        assert_eq!(video.rtpmap(102), Some(("H264", 90_000)));
        assert_eq!(video.fmtp(97), Some("apt=96"));
        assert_eq!(sections[2].direction(), Direction::Inactive);

        let codecs = sdp.video_send_codecs();
        assert_eq!(codecs.iter().map(|c| c.payload_type).collect::<Vec<_>>(), vec![96, 102]);
        assert!(codecs[1]
            .capability
            .matches(&VideoCodecCapability::h264_constrained_baseline_profile()));
        assert_eq!(sdp.video_send_ssrcs(), vec![1111]);
    }

    #[test]
    fn reorders_payload_types_by_preference() {
        let sdp = Sdp::from(ANSWER);
        let munged = sdp.with_video_send_codec_preferences(&[
            VideoCodecCapability::h264_constrained_baseline_profile(),
            VideoCodecCapability::vp8(),
        ]);

        assert!(munged.as_str().contains("m=video 9 UDP/TLS/RTP/SAVPF 102 96 97 103\r\n"));
        // the receive-only section keeps its order
        assert!(munged.as_str().contains("m=video 9 UDP/TLS/RTP/SAVPF 96\r\n"));
        assert!(munged.as_str().ends_with("\r\n"));
        assert!(!munged.as_str().replace("\r\n", "").contains('\n'));
        assert_eq!(munged.video_send_codecs()[0].capability.codec, VideoCodec::H264);
    }

    #[test]
    fn unknown_preferences_are_a_noop() {
        let sdp = Sdp::from(ANSWER);
        let munged =
            sdp.with_video_send_codec_preferences(&[VideoCodecCapability::av1_main_profile()]);
        assert_eq!(munged, sdp);
        assert_eq!(sdp.with_video_send_codec_preferences(&[]), sdp);
    }

    #[test]
    fn lf_only_descriptions_keep_their_endings() {
        let sdp =
            Sdp::from("v=0\nm=video 9 RTP/AVP 96 98\na=rtpmap:96 VP8/90000\na=rtpmap:98 VP9/90000");
        let munged = sdp.with_video_send_codec_preferences(&[VideoCodecCapability::vp9_profile0()]);
        assert_eq!(
            munged.as_str(),
            "v=0\nm=video 9 RTP/AVP 98 96\na=rtpmap:96 VP8/90000\na=rtpmap:98 VP9/90000\n"
        );
    }

    #[test]
    fn detects_replaced_video_source() {
        let previous = Sdp::from(ANSWER);
        let replaced = Sdp::from(ANSWER.replace("a=ssrc:1111", "a=ssrc:2222"));
        assert!(replaced.has_different_video_send_ssrc(&previous));
        assert!(!previous.has_different_video_send_ssrc(&previous));

        let no_video = Sdp::from("v=0\r\nm=audio 9 RTP/AVP 111\r\n");
        assert!(!no_video.has_different_video_send_ssrc(&previous));
    }
}
