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

use std::time::{Duration, Instant};

use futures_util::{future::BoxFuture, FutureExt};
use meeting_protocol::SignalFrame;

use super::{SessionTask, TaskError, TaskResult};
use crate::state::SessionState;

/// Synchronous task built from a closure.
pub struct FnTask<F> {
    name: String,
    f: F,
}

pub fn task_fn<F>(name: impl Into<String>, f: F) -> FnTask<F>
where
    F: FnMut(&mut SessionState) -> TaskResult<()> + Send,
{
    FnTask { name: name.into(), f }
}

impl<F> SessionTask for FnTask<F>
where
    F: FnMut(&mut SessionState) -> TaskResult<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a mut self, state: &'a mut SessionState) -> BoxFuture<'a, TaskResult<()>> {
        let result = (self.f)(state);
        async move { result }.boxed()
    }
}

/// Fails the wrapped task if it does not finish in time. The wrapped task's
/// writes are dropped with it.
pub struct TimeoutTask<T> {
    inner: T,
    timeout: Duration,
}

impl<T: SessionTask> TimeoutTask<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<T: SessionTask> SessionTask for TimeoutTask<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn run<'a>(&'a mut self, state: &'a mut SessionState) -> BoxFuture<'a, TaskResult<()>> {
        let timeout = self.timeout;
        let name = self.inner.name().to_owned();
        let inner = &mut self.inner;
        async move {
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, inner.run(state)).await;
            match result {
                Ok(result) => {
                    log::trace!("{} finished in {:?}", name, started.elapsed());
                    result
                }
                Err(_) => {
                    log::warn!("{} timed out after {:?}", name, timeout);
                    Err(TaskError::Timeout(timeout))
                }
            }
        }
        .boxed()
    }
}

/// Applies a server frame to the state.
#[derive(Debug)]
pub struct ApplySignalFrameTask {
    frame: SignalFrame,
}

impl ApplySignalFrameTask {
    pub fn new(frame: SignalFrame) -> Self {
        Self { frame }
    }
}

impl SessionTask for ApplySignalFrameTask {
    fn name(&self) -> &str {
        match self.frame {
            SignalFrame::JoinAck(_) => "apply_join_ack",
            SignalFrame::Index(_) => "apply_index_frame",
            SignalFrame::SubscribeAck(_) => "accept_subscribe_ack",
        }
    }

    fn run<'a>(&'a mut self, state: &'a mut SessionState) -> BoxFuture<'a, TaskResult<()>> {
        let result = match &self.frame {
            SignalFrame::JoinAck(frame) => {
                state.apply_join_ack(frame, Instant::now());
                Ok(())
            }
            SignalFrame::Index(frame) => {
                if state.apply_index_frame(frame.clone()) {
                    log::debug!(
                        "video send codecs now {:?}",
                        state.effective_video_send_codec_preferences()
                    );
                }
                Ok(())
            }
            SignalFrame::SubscribeAck(frame) => {
                state.accept_subscribe_ack(frame).map(|_| ()).map_err(TaskError::from)
            }
        };
        async move { result }.boxed()
    }
}

/// Maps the desired videos onto the receive slots.
#[derive(Debug, Default)]
pub struct ReconcileVideoSubscriptionsTask;

impl SessionTask for ReconcileVideoSubscriptionsTask {
    fn name(&self) -> &str {
        "reconcile_video_subscriptions"
    }

    fn run<'a>(&'a mut self, state: &'a mut SessionState) -> BoxFuture<'a, TaskResult<()>> {
        let result = state.update_video_subscriptions();
        if result.has_changes() {
            log::debug!(
                "video subscriptions {:?}: +{} -{} ~{}",
                result.slots,
                result.added.len(),
                result.removed.len(),
                result.switched.len()
            );
        }
        async { Ok(()) }.boxed()
    }
}
