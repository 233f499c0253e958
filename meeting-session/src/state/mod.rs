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

//! The negotiation state shared by every task of a session.
//!
//! A [`SessionState`] is owned by the session pipeline and handed to one
//! task at a time. Fields without invariants are public; the ones that must
//! stay consistent with each other (slots, limit, lifecycle, the previous
//! answer used as decompression dictionary) are changed through methods.

use std::{collections::HashMap, slice, time::Instant};

use meeting_protocol::{
    AnswerPayload, IndexFrame, JoinAckFrame, StreamServiceType, SubscribeAckFrame,
};

use crate::{
    codec::{
        resolve_meeting_codecs, select_video_send_codec, CodecResolution, SelectedCodec,
        VideoCodecCapability,
    },
    id::TransportHandle,
    options::SessionOptions,
    sdp::{
        compression::{decode_sdp_answer, encode_sdp_offer, SdpOfferPayload},
        Sdp,
    },
    video::{
        reconcile_video_subscriptions_grouped, NoGrouping, StreamGrouping,
        SubscriptionReconciliation, VideoStreamIdSet, VideoSubscriptions,
    },
    SessionError, SessionResult,
};

pub mod ice;
pub mod lifecycle;
pub mod metrics;
pub mod reconnect;

pub use ice::{IceCandidate, IceState, IceTransportPolicy};
pub use lifecycle::LifecycleState;
pub use metrics::SessionMetrics;
pub use reconnect::{ReconnectState, ReconnectStatus, TurnCredentials};

#[derive(Debug, Clone)]
pub struct SessionState {
    lifecycle: LifecycleState,
    fallback_video_codec: VideoCodecCapability,
    max_decompressed_sdp_size: usize,

    transport: Option<TransportHandle>,
    /// Last offer that led to an active session
    pub previous_sdp_offer: Option<Sdp>,
    pub sdp_offer: Option<Sdp>,
    pub sdp_answer: Option<Sdp>,
    pub ice: IceState,

    videos_to_receive: VideoStreamIdSet,
    last_videos_to_receive: VideoStreamIdSet,
    video_subscriptions: VideoSubscriptions,
    video_subscription_limit: usize,
    pub videos_paused: VideoStreamIdSet,
    pub video_duplex_mode: Option<StreamServiceType>,
    pub enable_simulcast: bool,
    pub index_frame: Option<IndexFrame>,

    video_send_codec_preferences: Vec<VideoCodecCapability>,
    meeting_receive_codecs: Vec<VideoCodecCapability>,
    meeting_supported_video_send_codec_preferences: Option<CodecResolution>,
    current_video_send_codec: Option<SelectedCodec>,

    previous_sdp_answer: String,
    server_supports_compression: bool,

    pub reconnect: ReconnectState,
    pub turn_credentials: Option<TurnCredentials>,
    pub metrics: SessionMetrics,

    pub audio_device_information: HashMap<String, String>,
    pub video_device_information: HashMap<String, String>,
}

impl SessionState {
    pub fn new(options: &SessionOptions) -> Self {
        Self {
            lifecycle: LifecycleState::Uninitialized,
            fallback_video_codec: options.fallback_video_codec.clone(),
            max_decompressed_sdp_size: options.max_decompressed_sdp_size,
            transport: None,
            previous_sdp_offer: None,
            sdp_offer: None,
            sdp_answer: None,
            ice: IceState::default(),
            videos_to_receive: VideoStreamIdSet::new(),
            last_videos_to_receive: VideoStreamIdSet::new(),
            video_subscriptions: VideoSubscriptions::with_capacity(options.video_slot_count),
            video_subscription_limit: options.video_subscription_limit,
            videos_paused: VideoStreamIdSet::new(),
            video_duplex_mode: None,
            enable_simulcast: options.enable_simulcast,
            index_frame: None,
            video_send_codec_preferences: options.video_send_codec_preferences.clone(),
            meeting_receive_codecs: Vec::new(),
            meeting_supported_video_send_codec_preferences: None,
            current_video_send_codec: None,
            previous_sdp_answer: String::new(),
            server_supports_compression: false,
            reconnect: ReconnectState::new(options.reconnect.clone()),
            turn_credentials: None,
            metrics: SessionMetrics::default(),
            audio_device_information: HashMap::new(),
            video_device_information: HashMap::new(),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Moves to `next`, detaching the transport when `next` cannot hold one.
    fn transition(&mut self, next: LifecycleState) -> SessionResult<Option<TransportHandle>> {
        if !self.lifecycle.can_transition_to(next) {
            return Err(SessionError::InvalidTransition { from: self.lifecycle, to: next });
        }
        log::debug!("session {} -> {}", self.lifecycle, next);
        self.lifecycle = next;
        if next.has_transport() {
            Ok(None)
        } else {
            Ok(self.transport.take())
        }
    }

    pub fn transport(&self) -> Option<TransportHandle> {
        self.transport
    }

    /// Attaches the transport of a new negotiation.
    pub fn begin_negotiation(&mut self, transport: TransportHandle) -> SessionResult<()> {
        if let Some(current) = self.transport {
            return Err(SessionError::TransportAlreadyAttached(current));
        }
        self.transition(LifecycleState::Negotiating)?;
        self.transport = Some(transport);
        Ok(())
    }

    /// The answer has been applied to the transport.
    pub fn mark_active(&mut self) -> SessionResult<()> {
        if self.sdp_offer.is_none() {
            return Err(SessionError::MissingOffer);
        }
        if self.sdp_answer.is_none() {
            return Err(SessionError::MissingAnswer);
        }
        self.transition(LifecycleState::Active)?;
        self.previous_sdp_offer = self.sdp_offer.clone();
        self.reconnect.reset();
        Ok(())
    }

    /// Drops the pending offer/answer, everything else is kept for the next
    /// exchange on the same transport.
    pub fn begin_renegotiation(&mut self) -> SessionResult<()> {
        self.transition(LifecycleState::Renegotiating)?;
        self.sdp_offer = None;
        self.sdp_answer = None;
        Ok(())
    }

    /// Detaches the transport and clears everything tied to it. Returns the
    /// detached handle so the caller can close it.
    ///
    /// Desired subscriptions and codec preferences survive, the next
    /// negotiation re-applies them onto fresh slots.
    pub fn begin_reconnect(&mut self, now: Instant) -> SessionResult<Option<TransportHandle>> {
        let transport = self.transition(LifecycleState::Reconnecting)?;
        self.ice.clear();
        self.sdp_offer = None;
        self.sdp_answer = None;
        self.previous_sdp_offer = None;
        // the new server connection starts a fresh dictionary chain
        self.previous_sdp_answer.clear();
        self.video_subscriptions.clear();
        self.last_videos_to_receive = VideoStreamIdSet::new();
        self.current_video_send_codec = None;
        self.reconnect.start(now);
        Ok(transport)
    }

    pub fn terminate(&mut self) -> SessionResult<Option<TransportHandle>> {
        self.transition(LifecycleState::Terminated)
    }

    pub fn videos_to_receive(&self) -> &VideoStreamIdSet {
        &self.videos_to_receive
    }

    pub fn last_videos_to_receive(&self) -> &VideoStreamIdSet {
        &self.last_videos_to_receive
    }

    pub fn video_subscriptions(&self) -> &VideoSubscriptions {
        &self.video_subscriptions
    }

    pub fn video_subscription_limit(&self) -> usize {
        self.video_subscription_limit
    }

    /// Stores the streams the user wants to see, cut down to the
    /// subscription limit.
    pub fn set_videos_to_receive(&mut self, videos: VideoStreamIdSet) {
        if videos.len() > self.video_subscription_limit {
            log::warn!(
                "{} videos requested, only the first {} are kept",
                videos.len(),
                self.video_subscription_limit
            );
            self.videos_to_receive = videos.truncate(self.video_subscription_limit);
        } else {
            self.videos_to_receive = videos;
        }
    }

    pub fn set_video_subscription_limit(&mut self, limit: usize) {
        if limit == self.video_subscription_limit {
            return;
        }
        log::debug!("video subscription limit {} -> {}", self.video_subscription_limit, limit);
        self.video_subscription_limit = limit;
        let videos = std::mem::take(&mut self.videos_to_receive);
        self.set_videos_to_receive(videos);
    }

    /// Computes the next slot assignment from the current fields.
    ///
    /// With simulcast enabled and an index frame known, layer switches of
    /// the same source keep their slot.
    pub fn reconcile_video_subscriptions(&self) -> SubscriptionReconciliation {
        let grouping: &dyn StreamGrouping = match &self.index_frame {
            Some(index) if self.enable_simulcast => index,
            _ => &NoGrouping,
        };
        reconcile_video_subscriptions_grouped(
            &self.last_videos_to_receive,
            &self.videos_to_receive,
            &self.video_subscriptions,
            self.video_subscription_limit,
            grouping,
        )
    }

    /// # Panics
    ///
    /// Panics if `result` was computed for another slot count or another
    /// subscription limit than the current ones.
    pub fn apply_video_reconciliation(&mut self, result: &SubscriptionReconciliation) {
        assert_eq!(
            result.slots.capacity(),
            self.video_subscriptions.capacity(),
            "video slot count changed during reconciliation"
        );
        assert_eq!(
            result.limit, self.video_subscription_limit,
            "video subscription limit changed during reconciliation"
        );
        self.video_subscriptions = result.slots.clone();
        self.last_videos_to_receive = result.applied.clone();
        self.metrics.observe_video_tile_count(self.video_subscriptions.occupied_count() as u32);
    }

    pub fn update_video_subscriptions(&mut self) -> SubscriptionReconciliation {
        let result = self.reconcile_video_subscriptions();
        self.apply_video_reconciliation(&result);
        result
    }

    pub fn video_send_codec_preferences(&self) -> &[VideoCodecCapability] {
        &self.video_send_codec_preferences
    }

    /// `None` until the meeting's receive codecs are known.
    pub fn meeting_supported_video_send_codec_preferences(
        &self,
    ) -> Option<&[VideoCodecCapability]> {
        self.meeting_supported_video_send_codec_preferences.as_ref().map(|resolution| {
            match resolution {
                CodecResolution::Intersection(codecs) => codecs.as_slice(),
                CodecResolution::Degraded { fallback } => slice::from_ref(fallback),
            }
        })
    }

    pub fn is_video_send_codec_degraded(&self) -> bool {
        self.meeting_supported_video_send_codec_preferences
            .as_ref()
            .is_some_and(CodecResolution::is_degraded)
    }

    /// Preferences to put in the next offer.
    pub fn effective_video_send_codec_preferences(&self) -> &[VideoCodecCapability] {
        self.meeting_supported_video_send_codec_preferences()
            .unwrap_or(&self.video_send_codec_preferences)
    }

    pub fn current_video_send_codec(&self) -> Option<&SelectedCodec> {
        self.current_video_send_codec.as_ref()
    }

    pub fn set_video_send_codec_preferences(&mut self, preferences: Vec<VideoCodecCapability>) {
        self.video_send_codec_preferences = preferences;
        if self.meeting_supported_video_send_codec_preferences.is_some() {
            self.resolve_meeting_codecs();
        }
    }

    /// Returns whether the effective preferences changed, in which case a
    /// renegotiation is needed to apply them.
    pub fn apply_meeting_receive_codecs(&mut self, supported: &[VideoCodecCapability]) -> bool {
        let before = self.meeting_supported_video_send_codec_preferences.clone();
        self.meeting_receive_codecs = supported.to_vec();
        self.resolve_meeting_codecs();
        before != self.meeting_supported_video_send_codec_preferences
    }

    fn resolve_meeting_codecs(&mut self) {
        let resolution = resolve_meeting_codecs(
            &self.video_send_codec_preferences,
            &self.meeting_receive_codecs,
            &self.fallback_video_codec,
        );
        self.meeting_supported_video_send_codec_preferences = Some(resolution);
    }

    /// Reads the codec in use from the current answer.
    pub fn update_current_video_send_codec(&mut self) -> Option<&SelectedCodec> {
        let degraded = self.is_video_send_codec_degraded();
        let selected = self.sdp_answer.as_ref().and_then(|answer| {
            select_video_send_codec(answer, self.effective_video_send_codec_preferences())
        });
        self.current_video_send_codec = selected.map(|mut codec| {
            codec.degraded |= degraded;
            codec
        });
        self.current_video_send_codec.as_ref()
    }

    pub fn server_supports_compression(&self) -> bool {
        self.server_supports_compression
    }

    /// Dictionary for the next compressed answer.
    pub fn previous_sdp_answer(&self) -> &str {
        &self.previous_sdp_answer
    }

    /// Payload for the offer currently in `sdp_offer`.
    pub fn sdp_offer_payload(&self) -> SessionResult<SdpOfferPayload> {
        let offer = self.sdp_offer.as_ref().ok_or(SessionError::MissingOffer)?;
        Ok(encode_sdp_offer(
            offer,
            self.previous_sdp_offer.as_ref(),
            self.server_supports_compression,
        )?)
    }

    /// The local video source changed since the last applied offer.
    pub fn has_new_video_send_source(&self) -> bool {
        match (&self.sdp_offer, &self.previous_sdp_offer) {
            (Some(offer), Some(previous)) => offer.has_different_video_send_ssrc(previous),
            _ => false,
        }
    }

    /// Ends candidate gathering and records how long it took.
    pub fn complete_ice_gathering(&mut self, now: Instant) {
        if let Some(duration) = self.ice.complete(now) {
            log::debug!("ice gathering took {:?}", duration);
            self.metrics.ice_gathering_duration = Some(duration);
        }
    }

    pub fn apply_join_ack(&mut self, frame: &JoinAckFrame, now: Instant) {
        if let Some(limit) = frame.video_subscription_limit {
            self.set_video_subscription_limit(limit as usize);
        }
        self.server_supports_compression = frame.wants_compressed_sdp;
        if let Some(credentials) = &frame.turn_credentials {
            self.turn_credentials = Some(TurnCredentials::from_frame(credentials, now));
        }
    }

    /// Stores the index and refreshes the meeting-wide codec resolution.
    ///
    /// An empty codec list in an index with no other participant carries no
    /// information and leaves the resolution untouched. Returns whether the
    /// effective send codec preferences changed.
    pub fn apply_index_frame(&mut self, frame: IndexFrame) -> bool {
        self.videos_paused = VideoStreamIdSet::from_raw(frame.paused_at_source_ids.iter().copied());
        let supported = supported_receive_codecs(&frame);
        let informative = !supported.is_empty() || frame.num_participants > 1;
        self.index_frame = Some(frame);
        informative && self.apply_meeting_receive_codecs(&supported)
    }

    /// Decodes the answer of a subscribe ack and stores it.
    ///
    /// Nothing is written on failure, in particular the previous answer
    /// stays the dictionary for a retry.
    pub fn accept_subscribe_ack(&mut self, frame: &SubscribeAckFrame) -> SessionResult<&Sdp> {
        let answer = match frame.answer_payload() {
            None => return Err(SessionError::MissingAnswer),
            Some(AnswerPayload::Plain(text)) => Sdp::from(text),
            // zlib bytes are never SDP text, so they are not passed through
            Some(AnswerPayload::Compressed(_)) if !self.server_supports_compression => {
                return Err(SessionError::UnexpectedCompressedAnswer)
            }
            Some(AnswerPayload::Compressed(bytes)) => decode_sdp_answer(
                bytes,
                &self.previous_sdp_answer,
                true,
                self.max_decompressed_sdp_size,
            )?,
        };

        self.video_duplex_mode = Some(frame.duplex);
        self.previous_sdp_answer = answer.as_str().to_owned();
        self.sdp_answer = Some(answer);
        self.update_current_video_send_codec();
        self.sdp_answer.as_ref().ok_or(SessionError::MissingAnswer)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(&SessionOptions::default())
    }
}

fn supported_receive_codecs(frame: &IndexFrame) -> Vec<VideoCodecCapability> {
    frame.supported_receive_codec_intersection.iter().copied().map(Into::into).collect()
}
