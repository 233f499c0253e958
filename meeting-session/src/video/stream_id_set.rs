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

use std::{collections::BTreeSet, fmt};

use crate::id::StreamId;

/// Unordered set of video stream ids.
///
/// Iteration, [`VideoStreamIdSet::array`] and [`VideoStreamIdSet::truncate`]
/// all use ascending id order, which is the tie-break order used everywhere
/// a deterministic choice between streams is needed.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct VideoStreamIdSet {
    ids: BTreeSet<StreamId>,
}

impl VideoStreamIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the id was not already present.
    pub fn add(&mut self, id: StreamId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: StreamId) -> bool {
        self.ids.remove(&id)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = StreamId> + '_ {
        self.ids.iter().copied()
    }

    /// Ids in ascending order.
    pub fn array(&self) -> Vec<StreamId> {
        self.iter().collect()
    }

    /// The first `len` ids in ascending order.
    pub fn truncate(&self, len: usize) -> Self {
        self.iter().take(len).collect()
    }

    pub fn union(&self, other: &Self) -> Self {
        self.ids.union(&other.ids).copied().collect()
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.ids.difference(&other.ids).copied().collect()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.ids.intersection(&other.ids).copied().collect()
    }

    /// Builds a set from raw wire ids, skipping the `0` placeholder.
    pub fn from_raw(raw: impl IntoIterator<Item = u32>) -> Self {
        raw.into_iter().filter_map(StreamId::new).collect()
    }
}

impl FromIterator<StreamId> for VideoStreamIdSet {
    fn from_iter<I: IntoIterator<Item = StreamId>>(iter: I) -> Self {
        Self { ids: iter.into_iter().collect() }
    }
}

impl Extend<StreamId> for VideoStreamIdSet {
    fn extend<I: IntoIterator<Item = StreamId>>(&mut self, iter: I) {
        self.ids.extend(iter)
    }
}

impl<'a> IntoIterator for &'a VideoStreamIdSet {
    type Item = StreamId;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, StreamId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}

impl fmt::Debug for VideoStreamIdSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.ids.iter().map(|id| id.get())).finish()
    }
}
