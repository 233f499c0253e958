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

use std::{fmt, str::FromStr, time::Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid ice candidate: {0}")]
pub struct CandidateParseError(String);

impl FromStr for CandidateType {
    type Err = CandidateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(CandidateType::Host),
            "srflx" => Ok(CandidateType::ServerReflexive),
            "prflx" => Ok(CandidateType::PeerReflexive),
            "relay" => Ok(CandidateType::Relay),
            other => Err(CandidateParseError(format!("unknown candidate type {}", other))),
        }
    }
}

/// Which gathered candidates are kept for the offer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IceTransportPolicy {
    #[default]
    All,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateJson {
    pub sdp_mid: String,
    pub sdp_m_line_index: i32,
    pub candidate: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub sdp_mid: String,
    pub sdp_mline_index: i32,
    pub candidate: String,
    pub candidate_type: CandidateType,
}

impl IceCandidate {
    /// Parses the `candidate:` attribute, only the type is extracted.
    pub fn parse(
        sdp_mid: &str,
        sdp_mline_index: i32,
        candidate: &str,
    ) -> Result<Self, CandidateParseError> {
        let mut fields = candidate.trim().trim_start_matches("a=").split_whitespace();
        if !fields.next().is_some_and(|foundation| foundation.starts_with("candidate:")) {
            return Err(CandidateParseError(candidate.to_owned()));
        }

        let candidate_type = loop {
            match fields.next() {
                Some("typ") => {
                    let kind = fields
                        .next()
                        .ok_or_else(|| CandidateParseError(candidate.to_owned()))?;
                    break kind.parse()?;
                }
                Some(_) => continue,
                None => return Err(CandidateParseError(format!("no type in {}", candidate))),
            }
        };

        Ok(Self {
            sdp_mid: sdp_mid.to_owned(),
            sdp_mline_index,
            candidate: candidate.to_owned(),
            candidate_type,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, CandidateParseError> {
        let init: IceCandidateJson =
            serde_json::from_str(json).map_err(|err| CandidateParseError(err.to_string()))?;
        Self::parse(&init.sdp_mid, init.sdp_m_line_index, &init.candidate)
    }

    pub fn to_json(&self) -> IceCandidateJson {
        IceCandidateJson {
            sdp_mid: self.sdp_mid.clone(),
            sdp_m_line_index: self.sdp_mline_index,
            candidate: self.candidate.clone(),
        }
    }

    pub fn is_relay(&self) -> bool {
        self.candidate_type == CandidateType::Relay
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.candidate)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    #[default]
    New,
    Gathering,
    Complete,
}

/// Candidates gathered for the current transport.
///
/// The list only grows while gathering runs, [`IceState::restart`] is the
/// single way to empty it.
#[derive(Debug, Clone, Default)]
pub struct IceState {
    candidates: Vec<IceCandidate>,
    pub policy: IceTransportPolicy,
    pub gathering: IceGatheringState,
    /// Bumped on every restart, lets late callbacks of an old gathering be
    /// told apart
    pub generation: u32,
    pub gathering_started_at: Option<Instant>,
}

impl IceState {
    pub fn new(policy: IceTransportPolicy) -> Self {
        Self { policy, ..Default::default() }
    }

    pub fn candidates(&self) -> &[IceCandidate] {
        &self.candidates
    }

    /// Starts a new gathering, dropping everything collected so far.
    pub fn restart(&mut self, now: Instant) {
        self.candidates.clear();
        self.generation = self.generation.wrapping_add(1);
        self.gathering = IceGatheringState::Gathering;
        self.gathering_started_at = Some(now);
    }

    /// Returns whether the candidate was kept.
    pub fn add_candidate(&mut self, candidate: IceCandidate) -> bool {
        if self.policy == IceTransportPolicy::Relay && !candidate.is_relay() {
            log::trace!("ignoring {} candidate, relay only", candidate.candidate_type.as_str());
            return false;
        }
        if self.candidates.contains(&candidate) {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    /// Marks gathering complete and returns how long it took.
    pub fn complete(&mut self, now: Instant) -> Option<std::time::Duration> {
        self.gathering = IceGatheringState::Complete;
        self.gathering_started_at.map(|started| now.saturating_duration_since(started))
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.gathering = IceGatheringState::New;
        self.gathering_started_at = None;
    }

    pub fn has_relay_candidate(&self) -> bool {
        self.candidates.iter().any(IceCandidate::is_relay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const HOST: &str =
        "candidate:842163049 1 udp 1677729535 192.168.1.2 56143 typ host generation 0";
    const RELAY: &str =
        "candidate:3 1 udp 41885439 10.0.0.1 3478 typ relay raddr 203.0.113.4 rport 5000";

    #[test]
    fn parses_candidate_type() {
        assert_eq!(IceCandidate::parse("0", 0, HOST).unwrap().candidate_type, CandidateType::Host);
        assert!(IceCandidate::parse("0", 0, RELAY).unwrap().is_relay());
        assert!(IceCandidate::parse("0", 0, "candidate:1 1 udp 1 1.1.1.1 1").is_err());
        assert!(IceCandidate::parse("0", 0, "garbage").is_err());
    }

    #[test]
    fn json_uses_browser_field_names() {
        let json = r#"{"sdpMid":"1","sdpMLineIndex":1,
            "candidate":"candidate:1 1 udp 2 10.0.0.1 1 typ srflx"}"#;
        let candidate = IceCandidate::from_json(json).unwrap();
        assert_eq!(candidate.candidate_type, CandidateType::ServerReflexive);
        assert_eq!(candidate.sdp_mline_index, 1);
        assert_eq!(
            serde_json::to_value(candidate.to_json()).unwrap()["sdpMLineIndex"],
            serde_json::json!(1)
        );
    }

    #[test]
    fn relay_policy_filters_candidates() {
        let mut ice = IceState::new(IceTransportPolicy::Relay);
        ice.restart(Instant::now());
        assert!(!ice.add_candidate(IceCandidate::parse("0", 0, HOST).unwrap()));
        assert!(ice.add_candidate(IceCandidate::parse("0", 0, RELAY).unwrap()));
        assert!(!ice.add_candidate(IceCandidate::parse("0", 0, RELAY).unwrap()));
        assert_eq!(ice.candidates().len(), 1);
        assert!(ice.has_relay_candidate());
    }

    #[test]
    fn restart_clears_and_bumps_generation() {
        let start = Instant::now();
        let mut ice = IceState::default();
        ice.restart(start);
        ice.add_candidate(IceCandidate::parse("0", 0, HOST).unwrap());
        assert_eq!(
            ice.complete(start + Duration::from_millis(250)),
            Some(Duration::from_millis(250))
        );

        ice.restart(start);
        assert!(ice.candidates().is_empty());
        assert_eq!(ice.generation, 2);
        assert_eq!(ice.gathering, IceGatheringState::Gathering);
    }
}
