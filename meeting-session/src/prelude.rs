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

pub use crate::codec::{
    CodecResolution, SelectedCodec, VideoCodec, VideoCodecCapability,
};
pub use crate::id::*;
pub use crate::options::{ReconnectOptions, SessionOptions};
pub use crate::pipeline::{
    task_fn, CancelToken, PipelineError, SessionHandle, SessionTask, TaskError, TaskPipeline,
    TaskResult,
};
pub use crate::sdp::{compression::SdpOfferPayload, Sdp};
pub use crate::state::{LifecycleState, SessionState};
pub use crate::video::{SubscriptionReconciliation, VideoStreamIdSet, VideoSubscriptions};
pub use crate::{SessionError, SessionResult};
