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

use std::{fmt, num::NonZeroU32};

use thiserror::Error;

macro_rules! id_num {
    ($($name:ident;)*) => {
        $(
            impl $name {
                /// Returns `None` for `0`, which the wire format reserves for "no stream".
                pub const fn new(raw: u32) -> Option<Self> {
                    match NonZeroU32::new(raw) {
                        Some(id) => Some(Self(id)),
                        None => None,
                    }
                }

                pub const fn get(&self) -> u32 {
                    self.0.get()
                }
            }

            impl TryFrom<u32> for $name {
                type Error = ZeroIdError;

                fn try_from(raw: u32) -> Result<Self, Self::Error> {
                    Self::new(raw).ok_or(ZeroIdError)
                }
            }

            impl From<$name> for u32 {
                fn from(id: $name) -> u32 {
                    id.get()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("0 is not a valid id")]
pub struct ZeroIdError;

/// Opaque identifier of a logical video stream, as assigned by the server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StreamId(NonZeroU32);

/// Simulcast layers published by the same source share a group.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct GroupId(NonZeroU32);

id_num! {
    StreamId;
    GroupId;
}

/// Handle to the live peer connection, issued by whoever owns the transport.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TransportHandle(pub u64);

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TR_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_stream() {
        assert_eq!(StreamId::new(0), None);
        assert_eq!(StreamId::try_from(0), Err(ZeroIdError));
        assert_eq!(StreamId::new(7).map(|id| id.get()), Some(7));
    }

    #[test]
    fn stream_ids_order_numerically() {
        let mut ids: Vec<StreamId> = [10, 2, 33].into_iter().filter_map(StreamId::new).collect();
        ids.sort();
        assert_eq!(ids.iter().map(StreamId::get).collect::<Vec<_>>(), vec![2, 10, 33]);
    }
}
