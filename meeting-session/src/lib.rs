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

use thiserror::Error;

pub mod codec;
pub mod id;
pub mod options;
pub mod pipeline;
pub mod sdp;
pub mod state;
pub mod video;

/// `use meeting_session::prelude::*;` to import the common types
pub mod prelude;

pub use meeting_protocol as protocol;

use crate::{id::TransportHandle, sdp::compression::SdpCompressionError, state::LifecycleState};

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: LifecycleState, to: LifecycleState },
    #[error("transport {0} is still attached")]
    TransportAlreadyAttached(TransportHandle),
    #[error("no sdp offer")]
    MissingOffer,
    #[error("no sdp answer")]
    MissingAnswer,
    #[error("received a compressed answer but compression was not negotiated")]
    UnexpectedCompressedAnswer,
    #[error("failed to decompress sdp answer: {0}")]
    Decompression(#[from] SdpCompressionError),
}
