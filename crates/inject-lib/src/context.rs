//! Execution context threaded through one invocation
//!
//! Carries the structured logger and the cancellation signal. Every backend
//! call and plugin execution runs under [`ExecContext::run`], so Ctrl-C or an
//! external deadline aborts whatever is in flight.

use crate::error::InjectError;
use crate::observability::StructuredLogger;
use std::future::Future;
use tokio::sync::watch;

/// Sending half of the cancellation signal, held by the top level
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every operation running under the paired signal
    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

/// Receiving half of the cancellation signal
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> CancelSignal {
        let (handle, signal) = Self::new();
        // dropping the sender leaves the value at `false` forever
        drop(handle);
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Logger plus cancellation signal for one invocation
#[derive(Debug, Clone)]
pub struct ExecContext {
    logger: StructuredLogger,
    cancel: CancelSignal,
}

impl ExecContext {
    pub fn new(logger: StructuredLogger, cancel: CancelSignal) -> Self {
        Self { logger, cancel }
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Run `fut` unless the invocation is cancelled first
    pub async fn run<T, F>(&self, stage: &'static str, fut: F) -> Result<T, InjectError>
    where
        F: Future<Output = Result<T, InjectError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(InjectError::Cancelled { stage });
        }

        tokio::select! {
            res = fut => res,
            _ = self.cancel.cancelled() => Err(InjectError::Cancelled { stage }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ctx(signal: CancelSignal) -> ExecContext {
        ExecContext::new(StructuredLogger::new("default", "test"), signal)
    }

    #[tokio::test]
    async fn test_run_completes_without_cancellation() {
        let ctx = ctx(CancelSignal::never());
        let value = ctx.run("list", async { Ok::<_, InjectError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_aborts_pending_call() {
        let (handle, signal) = CancelSignal::new();
        let ctx = ctx(signal);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let res = ctx
            .run("status", async {
                std::future::pending::<()>().await;
                Ok::<_, InjectError>(())
            })
            .await;

        assert!(matches!(res, Err(InjectError::Cancelled { stage: "status" })));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_polls() {
        let (handle, signal) = CancelSignal::new();
        handle.cancel();
        let ctx = ctx(signal);

        let res = ctx
            .run::<(), _>("connect", async { panic!("must not be polled") })
            .await;

        assert!(matches!(res, Err(InjectError::Cancelled { stage: "connect" })));
    }
}
