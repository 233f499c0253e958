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

/// Where the session is in its negotiation lifecycle.
///
/// The state never changes on its own, every transition is requested by a
/// pipeline task through the methods of [`super::SessionState`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    /// Transport attached, offer/answer and ICE exchange in progress
    Negotiating,
    /// Answer applied, media flowing
    Active,
    Renegotiating,
    /// Transport dropped, waiting for a fresh negotiation
    Reconnecting,
    Terminated,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Uninitialized, Negotiating) => true,
            (Reconnecting, Negotiating) => true,
            (Negotiating, Active) | (Renegotiating, Active) => true,
            (Active, Renegotiating) => true,
            (Negotiating | Active | Renegotiating, Reconnecting) => true,
            _ => false,
        }
    }

    /// States that hold a transport. Leaving them detaches it.
    pub fn has_transport(self) -> bool {
        matches!(
            self,
            LifecycleState::Negotiating | LifecycleState::Active | LifecycleState::Renegotiating
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Negotiating => "negotiating",
            LifecycleState::Active => "active",
            LifecycleState::Renegotiating => "renegotiating",
            LifecycleState::Reconnecting => "reconnecting",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
