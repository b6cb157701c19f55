//! One-off closures run on the worker pool during a frame stage.
//!
//! A task queued for a stage is launched when that stage begins and joined
//! with a blocking wait when the stage ends. Completion is signalled by
//! dropping the task's channel sender, which wakes every waiting handle at
//! once.

use crate::engine::FrameStage;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rayon::ThreadPool;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
    state: Arc<AtomicU8>,
    done: Sender<()>,
    join: Receiver<()>,
    job: Job,
}

/// Handle to a queued frame task.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<AtomicU8>,
    done: Receiver<()>,
}

impl TaskHandle {
    pub fn is_queued(&self) -> bool {
        self.state.load(Ordering::Acquire) == QUEUED
    }

    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Cancel the task if it has not started. Returns `false` if it is
    /// already running or finished.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Block until the task has run. Returns immediately for cancelled
    /// tasks. There is no timeout.
    pub fn wait(&self) {
        if self.is_cancelled() {
            return;
        }
        // Never sent on; returns once the sender is dropped.
        let _ = self.done.recv();
    }
}

/// Join point for a launched task.
pub(crate) struct TaskJoin(Receiver<()>);

impl TaskJoin {
    pub(crate) fn join(self) {
        let _ = self.0.recv();
    }
}

/// Per-stage task queues.
pub struct FrameTasks {
    queues: [Mutex<Vec<QueuedTask>>; FrameStage::COUNT],
}

impl FrameTasks {
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// Queue `task` to run during the next execution of `stage`.
    pub fn add<F>(&self, stage: FrameStage, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(QUEUED));
        let (tx, rx) = bounded(1);
        self.queues[stage.index()].lock().push(QueuedTask {
            state: state.clone(),
            done: tx,
            join: rx.clone(),
            job: Box::new(task),
        });
        TaskHandle { state, done: rx }
    }

    pub fn pending(&self, stage: FrameStage) -> usize {
        self.queues[stage.index()].lock().len()
    }

    /// Spawn every queued task of `stage` onto `pool`.
    pub(crate) fn launch(&self, stage: FrameStage, pool: &ThreadPool) -> Vec<TaskJoin> {
        let queued = std::mem::take(&mut *self.queues[stage.index()].lock());
        let mut joins = Vec::with_capacity(queued.len());
        for task in queued {
            let QueuedTask {
                state,
                done,
                join,
                job,
            } = task;
            joins.push(TaskJoin(join));
            pool.spawn(move || {
                if state
                    .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    job();
                    state.store(DONE, Ordering::Release);
                }
                drop(done);
            });
        }
        joins
    }
}

impl Default for FrameTasks {
    fn default() -> Self {
        Self::new()
    }
}
