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

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use super::{CancelToken, PipelineError, TaskPipeline};
use crate::{options::SessionOptions, state::SessionState};

enum SessionCommand {
    Run {
        pipeline: TaskPipeline,
        cancel: CancelToken,
        result_tx: oneshot::Sender<Result<(), PipelineError>>,
    },
    Snapshot {
        state_tx: oneshot::Sender<SessionState>,
    },
    Close {
        state_tx: oneshot::Sender<SessionState>,
    },
}

/// Owner of a session's state.
///
/// The state lives inside a spawned task; pipelines are queued to it and run
/// one at a time, so no two tasks can ever write the state concurrently.
#[derive(Debug)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    running: Arc<Mutex<Option<CancelToken>>>,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

/// A queued pipeline, can be cancelled before or while it runs.
#[derive(Debug)]
pub struct PendingPipeline {
    cancel: CancelToken,
    result_rx: oneshot::Receiver<Result<(), PipelineError>>,
}

impl PendingPipeline {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<(), PipelineError> {
        self.result_rx.await.map_err(|_| PipelineError::Closed)?
    }
}

impl SessionHandle {
    /// Spawns the session task. Must be called within a tokio runtime.
    pub fn spawn(options: &SessionOptions) -> Self {
        Self::with_state(SessionState::new(options), options.pipeline_queue_size)
    }

    pub fn with_state(state: SessionState, queue_size: usize) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(queue_size.max(1));
        let running = Arc::new(Mutex::new(None));
        let session_task = tokio::spawn(session_task(state, cmd_rx, running.clone()));

        Self { cmd_tx, running, session_task: Mutex::new(Some(session_task)) }
    }

    pub async fn submit(&self, pipeline: TaskPipeline) -> Result<PendingPipeline, PipelineError> {
        let cancel = CancelToken::new();
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Run { pipeline, cancel: cancel.clone(), result_tx })
            .await
            .map_err(|_| PipelineError::Closed)?;
        Ok(PendingPipeline { cancel, result_rx })
    }

    pub async fn run(&self, pipeline: TaskPipeline) -> Result<(), PipelineError> {
        self.submit(pipeline).await?.wait().await
    }

    /// Copy of the state as committed by the last finished task.
    pub async fn snapshot(&self) -> Result<SessionState, PipelineError> {
        let (state_tx, state_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Snapshot { state_tx })
            .await
            .map_err(|_| PipelineError::Closed)?;
        state_rx.await.map_err(|_| PipelineError::Closed)
    }

    /// Cancels the pipeline currently running, if any. Queued pipelines are
    /// not affected.
    pub fn cancel_current(&self) -> bool {
        match self.running.lock().as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the running pipeline, lets the queued ones drain and returns
    /// the final state.
    pub async fn close(&self) -> Result<SessionState, PipelineError> {
        self.cancel_current();
        let (state_tx, state_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Close { state_tx })
            .await
            .map_err(|_| PipelineError::Closed)?;
        let state = state_rx.await.map_err(|_| PipelineError::Closed)?;

        let session_task = self.session_task.lock().take();
        if let Some(session_task) = session_task {
            let _ = session_task.await;
        }
        Ok(state)
    }
}

async fn session_task(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    running: Arc<Mutex<Option<CancelToken>>>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SessionCommand::Run { mut pipeline, cancel, result_tx } => {
                *running.lock() = Some(cancel.clone());
                let result = pipeline.run(&mut state, &cancel).await;
                *running.lock() = None;
                let _ = result_tx.send(result);
            }
            SessionCommand::Snapshot { state_tx } => {
                let _ = state_tx.send(state.clone());
            }
            SessionCommand::Close { state_tx } => {
                let _ = state_tx.send(state);
                break;
            }
        }
    }

    log::debug!("session_task closed");
}
