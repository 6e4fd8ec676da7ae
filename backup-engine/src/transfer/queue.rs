//! Unbounded job queue with completion tracking.
//!
//! Producers `put` until they `close` the queue. Consumers `get` a
//! [`JobTicket`]; dropping the ticket acknowledges the job, whether or not
//! the transfer succeeded. `join` returns once every job ever put has been
//! acknowledged.

use super::Job;
use crate::{EngineError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result of a [`JobQueue::get`]
pub enum Dequeue<'q> {
    Job(JobTicket<'q>),
    /// Nothing arrived within the timeout; more input may still come
    Idle,
    /// Closed and empty; no job will ever arrive
    Drained,
}

pub struct JobQueue {
    /// Dropped on `close`; the channel disconnects once it is also empty
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    /// Jobs put but not yet acknowledged
    unfinished: Mutex<usize>,
    finished: Condvar,
}

impl Default for JobQueue {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            unfinished: Mutex::new(0),
            finished: Condvar::new(),
        }
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self) -> MutexGuard<'_, usize> {
        self.unfinished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a job. Never blocks; fails once the queue is closed.
    pub fn put(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(EngineError::QueueClosed);
        };

        // counted before it can be taken, so `done` never runs ahead
        *self.counter() += 1;
        if sender.send(job).is_err() {
            self.done();
            return Err(EngineError::QueueClosed);
        }
        Ok(())
    }

    /// Signal end of input. Consumers drain what is left, then see `Drained`.
    pub fn close(&self) {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Take the next job, waiting at most `timeout` for one to arrive.
    pub fn get(&self, timeout: Duration) -> Dequeue<'_> {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => Dequeue::Job(JobTicket { queue: self, job }),
            Err(RecvTimeoutError::Timeout) => Dequeue::Idle,
            Err(RecvTimeoutError::Disconnected) => Dequeue::Drained,
        }
    }

    /// Block until every job put so far has been acknowledged.
    pub fn join(&self) {
        let mut unfinished = self.counter();
        while *unfinished > 0 {
            unfinished = self.finished.wait(unfinished).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove and acknowledge every job still waiting.
    ///
    /// Used when no consumer is left to take them.
    pub fn abandon_remaining(&self) -> Vec<Job> {
        let abandoned: Vec<Job> = self.receiver.try_iter().collect();
        if !abandoned.is_empty() {
            let mut unfinished = self.counter();
            *unfinished -= abandoned.len();
            if *unfinished == 0 {
                self.finished.notify_all();
            }
        }
        abandoned
    }

    /// Jobs waiting to be taken
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Jobs put but not yet acknowledged, in flight included
    pub fn unfinished(&self) -> usize {
        *self.counter()
    }

    fn done(&self) {
        let mut unfinished = self.counter();
        *unfinished -= 1;
        if *unfinished == 0 {
            self.finished.notify_all();
        }
    }
}

/// A dequeued job. Acknowledged exactly once, when dropped.
pub struct JobTicket<'q> {
    queue: &'q JobQueue,
    job: Job,
}

impl JobTicket<'_> {
    pub fn job(&self) -> &Job {
        &self.job
    }
}

impl Drop for JobTicket<'_> {
    fn drop(&mut self) {
        self.queue.done();
    }
}
