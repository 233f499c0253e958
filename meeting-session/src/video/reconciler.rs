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

use meeting_protocol::IndexFrame;

use super::{VideoStreamIdSet, VideoSubscriptions};
use crate::id::{GroupId, StreamId};

/// Tells the reconciler which streams are layers of the same source.
pub trait StreamGrouping {
    fn group_of(&self, stream: StreamId) -> Option<GroupId>;

    /// Streams without a known group only match themselves.
    fn same_group(&self, a: StreamId, b: StreamId) -> bool {
        match (self.group_of(a), self.group_of(b)) {
            (Some(group_a), Some(group_b)) => group_a == group_b,
            _ => a == b,
        }
    }
}

/// Every stream is its own group.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGrouping;

impl StreamGrouping for NoGrouping {
    fn group_of(&self, _stream: StreamId) -> Option<GroupId> {
        None
    }
}

impl StreamGrouping for IndexFrame {
    fn group_of(&self, stream: StreamId) -> Option<GroupId> {
        self.group_id_for_stream(stream.get()).and_then(GroupId::new)
    }
}

/// Result of a reconciliation pass.
///
/// Nothing here has been applied yet, the caller decides whether to commit
/// `slots` and `applied` to the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionReconciliation {
    pub slots: VideoSubscriptions,
    /// Streams that ended up in a slot, the next "previously applied" set
    pub applied: VideoStreamIdSet,
    pub added: Vec<(usize, StreamId)>,
    pub removed: Vec<(usize, StreamId)>,
    /// `(slot, from, to)`: a simulcast layer switch that kept its slot
    pub switched: Vec<(usize, StreamId, StreamId)>,
    /// Requested streams cut by the subscription limit
    pub truncated: Vec<StreamId>,
    /// Requested streams that found no free slot
    pub dropped: Vec<StreamId>,
    /// Limit the pass was computed with
    pub limit: usize,
}

impl SubscriptionReconciliation {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.switched.is_empty()
    }

    pub fn is_over_limit(&self) -> bool {
        !self.truncated.is_empty()
    }

    pub fn is_over_capacity(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Maps the desired streams `want` onto the fixed slots.
///
/// - `want` is first cut down to its `limit` lowest ids.
/// - A stream already sitting in a slot keeps that slot.
/// - Slots holding streams no longer wanted are emptied.
/// - New streams are placed in ascending id order, first into slots that
///   were already empty, then into slots emptied by this pass, lowest index
///   first. Streams left over are reported in `dropped`.
///
/// `slots` is authoritative for positions; `prev` only feeds the removal
/// report for streams that were previously applied.
pub fn reconcile_video_subscriptions(
    prev: &VideoStreamIdSet,
    want: &VideoStreamIdSet,
    slots: &VideoSubscriptions,
    limit: usize,
) -> SubscriptionReconciliation {
    reconcile_video_subscriptions_grouped(prev, want, slots, limit, &NoGrouping)
}

/// Same as [`reconcile_video_subscriptions`], but a removed stream's slot is
/// handed to an added stream of the same group before any other placement,
/// so a simulcast layer switch does not move between transceivers.
pub fn reconcile_video_subscriptions_grouped<G>(
    prev: &VideoStreamIdSet,
    want: &VideoStreamIdSet,
    slots: &VideoSubscriptions,
    limit: usize,
    grouping: &G,
) -> SubscriptionReconciliation
where
    G: StreamGrouping + ?Sized,
{
    let wanted = want.truncate(limit);
    let truncated = want.difference(&wanted).array();
    if !truncated.is_empty() {
        log::warn!(
            "{} video streams requested, subscription limit is {}, ignoring {:?}",
            want.len(),
            limit,
            truncated
        );
    }

    let mut next = slots.clone();
    let mut retained = VideoStreamIdSet::new();
    let mut vacated = Vec::new();
    let mut free = Vec::new();

    for (index, slot) in slots.iter() {
        match slot {
            Some(id) if wanted.contains(id) => {
                retained.add(id);
            }
            Some(id) => {
                next.set(index, None);
                vacated.push((index, id));
            }
            None => free.push(index),
        }
    }

    let mut additions: Vec<StreamId> = wanted.difference(&retained).array();
    let mut removed = Vec::new();
    let mut switched = Vec::new();
    let mut reusable = Vec::new();

    for (index, old) in vacated {
        let layer = additions.iter().position(|id| grouping.same_group(old, *id));
        match layer {
            Some(position) => {
                let id = additions.remove(position);
                log::trace!("slot {}: switching {} -> {}", index, old, id);
                next.set(index, Some(id));
                switched.push((index, old, id));
            }
            None => {
                log::trace!("slot {}: removing {}", index, old);
                if !prev.contains(old) {
                    log::debug!("slot {} held {} which was never applied", index, old);
                }
                removed.push((index, old));
                reusable.push(index);
            }
        }
    }

    let mut added = Vec::new();
    let mut candidates = free.into_iter().chain(reusable);
    let mut dropped = Vec::new();
    for id in additions {
        match candidates.next() {
            Some(index) => {
                log::trace!("slot {}: adding {}", index, id);
                next.set(index, Some(id));
                added.push((index, id));
            }
            None => dropped.push(id),
        }
    }

    if !dropped.is_empty() {
        log::warn!(
            "no free video slot left ({} slots), dropping streams {:?}",
            slots.capacity(),
            dropped
        );
    }

    assert_eq!(next.capacity(), slots.capacity(), "reconciliation changed the slot count");

    SubscriptionReconciliation {
        applied: next.active_streams(),
        slots: next,
        added,
        removed,
        switched,
        truncated,
        dropped,
        limit,
    }
}
