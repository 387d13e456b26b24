use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::{Result, TransactionError};

/// Eventual outcome of a commit or abort.
///
/// The finishing work runs as a detached task: dropping the handle stops
/// waiting for the outcome but never cancels calls already issued to backends.
#[must_use = "a finish handle does nothing unless awaited; the work itself continues"]
pub struct FinishHandle {
    state: FinishState,
}

enum FinishState {
    Ready(Option<Result<()>>),
    Running(JoinHandle<Result<()>>),
}

impl FinishHandle {
    pub(crate) fn ready(result: Result<()>) -> Self {
        Self {
            state: FinishState::Ready(Some(result)),
        }
    }

    pub(crate) fn running(task: JoinHandle<Result<()>>) -> Self {
        Self {
            state: FinishState::Running(task),
        }
    }

    /// Whether the outcome is available without waiting.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            FinishState::Ready(_) => true,
            FinishState::Running(task) => task.is_finished(),
        }
    }
}

impl Future for FinishHandle {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FinishState::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(TransactionError::IllegalState(
                    "finish handle polled after completion".to_string(),
                ))
            })),
            FinishState::Running(task) => match Pin::new(task).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(err)) => Poll::Ready(Err(TransactionError::IllegalState(format!(
                    "finishing task failed: {err}"
                )))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn ready_handle_resolves_immediately() {
        let handle = FinishHandle::ready(Err(TransactionError::ReadOnlyViolation));
        assert!(handle.is_finished());
        assert!(matches!(
            handle.await,
            Err(TransactionError::ReadOnlyViolation)
        ));
    }

    #[tokio::test]
    async fn dropping_a_running_handle_does_not_cancel_the_work() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = FinishHandle::running(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(());
            Ok(())
        }));
        drop(handle);

        rx.await.ok();
        assert!(done.load(Ordering::SeqCst));
    }
}
