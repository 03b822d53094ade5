//! A one-shot `Future<T>` / `Promise<T>` pair.
//!
//! A [`Promise`] is completable exactly once, with a value or an error; the paired [`AsyncResult`]
//! exposes two continuation styles (`.await`, or explicit [`on_success`](AsyncResult::on_success)/
//! [`on_error`](AsyncResult::on_error) callbacks run on the calling task), plus a synchronous
//! fast path ([`AsyncResult::try_take`]) for already-completed results. Completing a `Promise`
//! twice is a logic error and is rejected rather than silently ignored; dropping one without
//! completing it resolves the paired result with [`PromiseDropped::promise_dropped`] rather than
//! leaving a waiter hanging forever.

use std::fmt;

use tokio::sync::oneshot;

/// An error type that can manufacture a sentinel value representing "the promise which should
/// have resolved me was dropped without completion". Implemented by `btrcu-core`'s `BlercuError`
/// so every service-level async operation has a safe default to surface in that situation.
pub trait PromiseDropped {
    fn promise_dropped() -> Self;
}

/// The write side of a one-shot result. Created together with its paired [`AsyncResult`] by
/// [`promise`].
pub struct Promise<T, E: PromiseDropped> {
    sender: Option<oneshot::Sender<Result<T, E>>>,
}

impl<T, E: PromiseDropped> Promise<T, E> {
    /// Complete the promise with a success value. Logs (at `warn`) and does nothing if the
    /// promise has already been completed — never panics, matching "never invoked twice".
    pub fn resolve(mut self, value: T) {
        self.complete(Ok(value));
    }

    /// Complete the promise with an error.
    pub fn reject(mut self, error: E) {
        self.complete(Err(error));
    }

    fn complete(&mut self, result: Result<T, E>) {
        if let Some(sender) = self.sender.take() {
            // The receiver may already have been dropped (caller stopped waiting); that is not
            // this side's problem to report.
            let _ = sender.send(result);
        } else {
            log::error!("promise completed more than once; second completion ignored");
        }
    }
}

impl<T, E: PromiseDropped> Drop for Promise<T, E> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            log::warn!("promise dropped without completion; resolving waiter with an error");
            let _ = sender.send(Err(E::promise_dropped()));
        }
    }
}

/// The read side of a one-shot result.
pub struct AsyncResult<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E: PromiseDropped> AsyncResult<T, E> {
    /// Non-blocking fast path: returns the result immediately if the promise has already been
    /// completed, without suspending.
    pub fn try_take(&mut self) -> Option<Result<T, E>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(E::promise_dropped())),
        }
    }

    /// Wait for completion.
    pub async fn wait(self) -> Result<T, E> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(E::promise_dropped()))
    }
}

impl<T, E> AsyncResult<T, E>
where
    T: Send + 'static,
    E: PromiseDropped + Send + 'static,
{
    /// Register a continuation invoked with the success value, on the current (owning) task's
    /// runtime. Never invoked if the result is an error.
    pub fn on_success<F>(self, mut callback: F)
    where
        F: FnMut(T) + Send + 'static,
    {
        tokio::spawn(async move {
            if let Ok(value) = self.wait().await {
                callback(value);
            }
        });
    }

    /// Register a continuation invoked with the error, on the current (owning) task's runtime.
    /// Never invoked if the result is a success.
    pub fn on_error<F>(self, mut callback: F)
    where
        F: FnMut(E) + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(error) = self.wait().await {
                callback(error);
            }
        });
    }
}

impl<T, E> fmt::Debug for AsyncResult<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult").finish_non_exhaustive()
    }
}

/// Create a new one-shot promise/result pair.
pub fn promise<T, E: PromiseDropped>() -> (Promise<T, E>, AsyncResult<T, E>) {
    let (sender, receiver) = oneshot::channel();
    (
        Promise {
            sender: Some(sender),
        },
        AsyncResult { receiver },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Dropped,
        Custom(&'static str),
    }

    impl PromiseDropped for TestError {
        fn promise_dropped() -> Self {
            TestError::Dropped
        }
    }

    #[tokio::test]
    async fn resolves_success() {
        let (promise, result) = promise::<u32, TestError>();
        promise.resolve(42);
        assert_eq!(result.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn resolves_error() {
        let (promise, result) = promise::<u32, TestError>();
        promise.reject(TestError::Custom("nope"));
        assert_eq!(result.wait().await, Err(TestError::Custom("nope")));
    }

    #[tokio::test]
    async fn dropped_promise_resolves_with_dropped_error() {
        let (promise, result) = promise::<u32, TestError>();
        drop(promise);
        assert_eq!(result.wait().await, Err(TestError::Dropped));
    }

    #[tokio::test]
    async fn fast_path_already_finished() {
        let (promise, mut result) = promise::<u32, TestError>();
        promise.resolve(7);
        // Give the oneshot a moment to deliver; try_take should then see it without awaiting.
        tokio::task::yield_now().await;
        assert_eq!(result.try_take(), Some(Ok(7)));
    }

    #[tokio::test]
    async fn on_success_and_on_error_callbacks() {
        let (p1, r1) = promise::<u32, TestError>();
        let (tx, rx) = tokio::sync::oneshot::channel();
        r1.on_success(move |value| {
            let _ = tx.send(value);
        });
        p1.resolve(99);
        assert_eq!(rx.await.unwrap(), 99);

        let (p2, r2) = promise::<u32, TestError>();
        let (tx2, rx2) = tokio::sync::oneshot::channel();
        r2.on_error(move |error| {
            let _ = tx2.send(error);
        });
        p2.reject(TestError::Custom("boom"));
        assert_eq!(rx2.await.unwrap(), TestError::Custom("boom"));
    }
}
