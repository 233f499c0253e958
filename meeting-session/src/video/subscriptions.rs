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

use std::{collections::HashSet, fmt, ops::Index};

use super::VideoStreamIdSet;
use crate::id::StreamId;

/// Assignment of video streams to the receive transceivers of the peer
/// connection.
///
/// The slot index *is* the transceiver position, so the number of slots is
/// fixed once allocated and a stream may appear in at most one slot. An
/// empty slot carries no stream (its transceiver is inactive).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VideoSubscriptions {
    slots: Vec<Option<StreamId>>,
}

impl VideoSubscriptions {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { slots: vec![None; capacity] }
    }

    /// # Panics
    ///
    /// Panics if a stream appears in more than one slot.
    pub fn from_slots(slots: Vec<Option<StreamId>>) -> Self {
        let mut seen = HashSet::with_capacity(slots.len());
        for id in slots.iter().flatten() {
            assert!(seen.insert(*id), "stream {} assigned to more than one slot", id);
        }
        Self { slots }
    }

    /// Decodes the wire form, where `0` marks an inactive slot.
    pub fn from_wire(raw: &[u32]) -> Self {
        Self::from_slots(raw.iter().map(|id| StreamId::new(*id)).collect())
    }

    pub fn to_wire(&self) -> Vec<u32> {
        self.slots.iter().map(|slot| slot.map_or(0, |id| id.get())).collect()
    }

    /// Number of slots, occupied or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Option<StreamId> {
        self.slots.get(index).copied().flatten()
    }

    pub fn slot_of(&self, id: StreamId) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == Some(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<StreamId>)> + '_ {
        self.slots.iter().copied().enumerate()
    }

    pub fn occupied(&self) -> impl Iterator<Item = (usize, StreamId)> + '_ {
        self.iter().filter_map(|(index, slot)| slot.map(|id| (index, id)))
    }

    pub fn free_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.iter().filter(|(_, slot)| slot.is_none()).map(|(index, _)| index)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn active_streams(&self) -> VideoStreamIdSet {
        self.slots.iter().flatten().copied().collect()
    }

    pub fn as_slice(&self) -> &[Option<StreamId>] {
        &self.slots
    }

    pub(crate) fn set(&mut self, index: usize, slot: Option<StreamId>) {
        self.slots[index] = slot;
    }

    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl Index<usize> for VideoSubscriptions {
    type Output = Option<StreamId>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.slots[index]
    }
}

impl fmt::Debug for VideoSubscriptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.to_wire()).finish()
    }
}
