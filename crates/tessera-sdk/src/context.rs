//! Cancellation of in-flight requests.
//!
//! Every request observes two sources of cancellation: its own, for example a deadline of
//! the caller, and the process-wide stop signal sent by the orchestrator. A [`Context`]
//! fires as soon as either of them does.

use std::future::Future;

use snafu::Snafu;
use tokio::sync::watch;

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("operation canceled"))]
pub struct Canceled;

/// The receiving side of a cancellation signal. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Cancellation {
    watch_rx: watch::Receiver<bool>,
}

/// Fires the [`Cancellation`]s acquired through [`CancelHandle::cancellation`].
#[derive(Debug)]
pub struct CancelHandle {
    watch_tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(false);
        Self { watch_tx }
    }

    pub fn cancellation(&self) -> Cancellation {
        Cancellation {
            watch_rx: self.watch_tx.subscribe(),
        }
    }

    /// Fires the signal. Cancelling more than once has no further effect.
    pub fn cancel(&self) {
        self.watch_tx.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, watch_rx) = watch::channel(false);
        Self { watch_rx }
    }

    /// A signal that fires once `signal` completes. Must be called within a Tokio runtime.
    pub fn from_future<F>(signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (watch_tx, watch_rx) = watch::channel(false);

        tokio::spawn(async move {
            signal.await;
            watch_tx.send_replace(true);
        });

        Self { watch_rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.watch_rx.borrow()
    }

    /// Completes once the signal fires. Never completes if it cannot fire anymore.
    pub async fn cancelled(&self) {
        let mut watch_rx = self.watch_rx.clone();

        if watch_rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// The cancellation context of a single request.
#[derive(Clone, Debug)]
pub struct Context {
    request: Cancellation,
    stop: Cancellation,
}

impl Context {
    pub fn new(request: Cancellation, stop: Cancellation) -> Self {
        Self { request, stop }
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::new(Cancellation::never(), Cancellation::never())
    }

    pub fn is_cancelled(&self) -> bool {
        self.request.is_cancelled() || self.stop.is_cancelled()
    }

    /// Completes once the request is cancelled or the process is asked to stop.
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.request.cancelled() => {},
            () = self.stop.cancelled() => {},
        }
    }

    /// Runs `future` to completion unless the context is cancelled first.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Canceled>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Canceled);
        }

        tokio::select! {
            biased;

            () = self.cancelled() => Err(Canceled),
            output = future => Ok(output),
        }
    }
}
