//! Running trims off the caller's thread.
//!
//! Each trim gets its own worker; the outcome comes back exactly once through
//! a single-shot channel.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;

use tokio::sync::oneshot;

use crate::media::TrimResult;
use crate::pipeline::{TrimConfig, TrimPipeline, TrimRequest};
use crate::{Error, Result};

fn worker_lost() -> Error {
    Error::Unknown("Trim worker exited without reporting a result".to_string())
}

/// Pending outcome of a trim running on a worker thread.
///
/// Await it from async code, or call [`TrimHandle::wait`] from a plain thread.
#[derive(Debug)]
pub struct TrimHandle {
    receiver: oneshot::Receiver<Result<TrimResult>>,
}

impl TrimHandle {
    /// Blocks until the worker reports.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime; await the handle there.
    pub fn wait(self) -> Result<TrimResult> {
        self.receiver.blocking_recv().unwrap_or_else(|_| Err(worker_lost()))
    }
}

impl Future for TrimHandle {
    type Output = Result<TrimResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(worker_lost())))
    }
}

/// Starts a trim on a dedicated worker thread.
///
/// A missing input is reported straight away, without starting a worker.
pub fn spawn_trim(config: TrimConfig, request: TrimRequest) -> Result<TrimHandle> {
    if !request.input.exists() {
        return Err(Error::NotFound(request.input));
    }

    let (sender, receiver) = oneshot::channel();
    thread::Builder::new()
        .name("trim-worker".to_string())
        .spawn(move || {
            let outcome = TrimPipeline::new(config).run(&request);
            if sender.send(outcome).is_err() {
                log::debug!("Trim of {} finished after its caller went away", request.input.display());
            }
        })?;

    Ok(TrimHandle { receiver })
}

/// Trims on tokio's blocking pool and awaits the outcome.
pub async fn trim(config: TrimConfig, request: TrimRequest) -> Result<TrimResult> {
    if !request.input.exists() {
        return Err(Error::NotFound(request.input));
    }

    tokio::task::spawn_blocking(move || TrimPipeline::new(config).run(&request))
        .await
        .map_err(|e| Error::Unknown(format!("Trim worker failed: {}", e)))?
}
