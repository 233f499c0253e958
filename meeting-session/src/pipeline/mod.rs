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

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Notify;

use crate::{state::SessionState, SessionError};

mod actor;
mod tasks;

pub use actor::{PendingPipeline, SessionHandle};
pub use tasks::{
    task_fn, ApplySignalFrameTask, FnTask, ReconcileVideoSubscriptionsTask, TimeoutTask,
};

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("task {task} failed: {source}")]
    TaskFailed { task: String, source: TaskError },
    #[error("cancelled while running {task}")]
    Cancelled { task: String },
    #[error("session is closed")]
    Closed,
}

/// One step of a pipeline.
///
/// A task gets exclusive access to the session state for as long as its
/// future runs. It works on a draft: whatever it wrote is only kept when it
/// returns `Ok`.
pub trait SessionTask: Send {
    fn name(&self) -> &str;

    fn run<'a>(&'a mut self, state: &'a mut SessionState) -> BoxFuture<'a, TaskResult<()>>;
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

/// Tasks run strictly one after another against the same state.
pub struct TaskPipeline {
    name: String,
    tasks: Vec<Box<dyn SessionTask>>,
}

impl TaskPipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), tasks: Vec::new() }
    }

    pub fn with_task(mut self, task: impl SessionTask + 'static) -> Self {
        self.push(task);
        self
    }

    pub fn push(&mut self, task: impl SessionTask + 'static) {
        self.tasks.push(Box::new(task));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every task in order, stopping at the first failure.
    ///
    /// Each task's writes are committed before the next task starts. A failed
    /// or cancelled task leaves `state` as the previous task left it.
    pub async fn run(
        &mut self,
        state: &mut SessionState,
        cancel: &CancelToken,
    ) -> Result<(), PipelineError> {
        log::debug!("running pipeline {} ({} tasks)", self.name, self.tasks.len());

        for task in self.tasks.iter_mut() {
            let name = task.name().to_owned();
            if cancel.is_cancelled() {
                log::debug!("pipeline {} cancelled before {}", self.name, name);
                return Err(PipelineError::Cancelled { task: name });
            }

            let mut draft = state.clone();
            log::trace!("{}: starting {}", self.name, name);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("pipeline {} cancelled during {}", self.name, name);
                    return Err(PipelineError::Cancelled { task: name });
                }
                result = task.run(&mut draft) => result,
            };

            match result {
                Ok(()) => *state = draft,
                Err(err) => {
                    log::error!("pipeline {}: task {} failed: {}", self.name, name, err);
                    return Err(PipelineError::TaskFailed { task: name, source: err });
                }
            }
        }

        log::debug!("pipeline {} done", self.name);
        Ok(())
    }
}

impl Debug for TaskPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let tasks: Vec<&str> = self.tasks.iter().map(|task| task.name()).collect();
        f.debug_struct("TaskPipeline").field("name", &self.name).field("tasks", &tasks).finish()
    }
}
