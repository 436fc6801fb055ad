//! Concurrency primitives: a timeout bounded lock, a cancellable timeout
//! wrapper and owned background loops.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::FutureExt;
use log::*;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{cancelled_error, timeout_error, Error, ErrorKind};

/// Mutual exclusion that gives up after `timeout`.
pub struct Locker {
    semaphore: Semaphore,
    timeout: Duration,
}

impl Locker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            semaphore: Semaphore::new(1),
            timeout,
        }
    }

    pub async fn lock(&self) -> Result<SemaphorePermit<'_>, Error> {
        match tokio::time::timeout(self.timeout, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(lock_error("Lock is closed.")),
            Err(_) => Err(lock_error("Timeout during obtaining lock.")),
        }
    }

    /// Return the cached value, initialising it under the lock on first use.
    ///
    /// A failed `init` leaves the slot empty so the next caller tries again.
    pub async fn get_value<T, F, Fut>(&self, slot: &Mutex<Option<T>>, init: F) -> Result<T, Error>
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        if let Some(value) = read(slot) {
            return Ok(value);
        }

        let _permit = self.lock().await?;
        if let Some(value) = read(slot) {
            return Ok(value);
        }

        let value = init().await?;
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(value.clone());
        Ok(value)
    }
}

fn read<T: Clone>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn lock_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Lock,
    }
}

/// Run `future` until it completes, `timeout` elapses or `cancel` fires.
///
/// Elapsing yields `ErrorKind::Timeout`; external cancellation yields
/// `ErrorKind::Cancelled`.
pub async fn with_timeout<T, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    future: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled_error()),
        result = tokio::time::timeout(timeout, future) => match result {
            Ok(result) => result,
            Err(_) => Err(timeout_error(timeout)),
        },
    }
}

/// A spawned loop owned by whoever started it.
///
/// Each iteration's error or panic is logged and the loop carries on; only
/// cancellation ends it. Dropping the task cancels it without waiting.
pub struct BackgroundTask {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Run `job` back to back until cancelled.
    pub fn looping<F, Fut>(name: &str, parent: &CancellationToken, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            while iterate(&task_name, &token, job()).await {}
            debug!("{task_name} stopped");
        });

        Self {
            name: name.to_string(),
            cancel,
            handle: Some(handle),
        }
    }

    /// Run `job` every `period`, first after one full period.
    pub fn periodic<F, Fut>(name: &str, period: Duration, parent: &CancellationToken, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if !iterate(&task_name, &token, job()).await {
                    break;
                }
            }
            debug!("{task_name} stopped");
        });

        Self {
            name: name.to_string(),
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Cancel the loop and wait until it has exited.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("{} terminated with a panic", self.name);
                }
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Runs one iteration. Returns `false` once cancellation was observed.
async fn iterate<Fut>(name: &str, cancel: &CancellationToken, iteration: Fut) -> bool
where
    Fut: Future<Output = Result<(), Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        outcome = AssertUnwindSafe(iteration).catch_unwind() => {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("{name} iteration failed: {e}"),
                Err(_) => error!("{name} iteration panicked"),
            }
            true
        }
    }
}
