//! Uniform dispatch for caller-supplied callbacks.
//!
//! A [`Callback`] is tagged at registration time as absent, synchronous, or
//! suspending. Every component invokes callbacks through [`Callback::invoke`]
//! (cooperative drivers) or [`Callback::invoke_blocking`] (blocking
//! drivers) and never needs to know which flavour the caller supplied.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::ErrorReport;
use crate::payload::JobResult;
use crate::progress::ProgressSnapshot;

/// Receives every progress snapshot of a job.
pub type ProgressCallback = Callback<ProgressSnapshot>;

/// Receives the final result of a job.
pub type ResultCallback = Callback<JobResult>;

/// Receives a failed request's report; its return value becomes the
/// effective result of that request.
pub type ErrorCallback = Callback<ErrorReport, Value>;

type SyncFn<A, R> = Box<dyn FnMut(A) -> R + Send>;
type SuspendingFn<A, R> = Box<dyn FnMut(A) -> BoxFuture<'static, R> + Send>;

/// A callback that is absent, plain, or suspending.
pub enum Callback<A, R = ()> {
    /// No callback registered. Invocation is a no-op.
    None,
    /// Invoked inline on the current thread or task.
    Sync(SyncFn<A, R>),
    /// Invoked and awaited; the current task suspends until it completes.
    Suspending(SuspendingFn<A, R>),
}

impl<A, R> Callback<A, R> {
    /// No callback registered.
    pub fn none() -> Self {
        Self::None
    }

    /// Register a plain function.
    pub fn sync<F>(f: F) -> Self
    where
        F: FnMut(A) -> R + Send + 'static,
    {
        Self::Sync(Box::new(f))
    }

    /// Register a function returning a future.
    pub fn suspending<F, Fut>(mut f: F) -> Self
    where
        F: FnMut(A) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        Self::Suspending(Box::new(move |arg| f(arg).boxed()))
    }

    /// Whether no callback is registered.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether a callback is registered.
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Whether the callback returns a future.
    pub fn is_suspending(&self) -> bool {
        matches!(self, Self::Suspending(_))
    }

    /// Invoke the callback, awaiting it if it is suspending.
    ///
    /// Returns `None` when no callback is registered.
    pub async fn invoke(&mut self, arg: A) -> Option<R> {
        match self {
            Self::None => None,
            Self::Sync(f) => Some(f(arg)),
            Self::Suspending(f) => Some(f(arg).await),
        }
    }

    /// Invoke the callback from a blocking context.
    ///
    /// A suspending callback is driven to completion on a local executor,
    /// blocking the calling thread. Such callbacks must not depend on a
    /// tokio reactor (timers, sockets) when used this way.
    pub fn invoke_blocking(&mut self, arg: A) -> Option<R> {
        match self {
            Self::None => None,
            Self::Sync(f) => Some(f(arg)),
            Self::Suspending(f) => Some(futures::executor::block_on(f(arg))),
        }
    }
}

impl<A, R> Default for Callback<A, R> {
    fn default() -> Self {
        Self::None
    }
}

impl<A, R> fmt::Debug for Callback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::None => "None",
            Self::Sync(_) => "Sync",
            Self::Suspending(_) => "Suspending",
        };
        f.debug_tuple("Callback").field(&kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test]
    async fn absent_callback_is_a_no_op() {
        let mut callback: Callback<u32, u32> = Callback::none();
        assert_eq!(callback.invoke(1).await, None);
        assert_eq!(callback.invoke_blocking(1), None);
    }

    #[tokio::test]
    async fn sync_callback_runs_inline() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut callback = Callback::sync(move |n: u32| {
            sink.lock().unwrap().push(n);
            n * 2
        });

        assert_eq!(callback.invoke(2).await, Some(4));
        assert_eq!(callback.invoke_blocking(3), Some(6));
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
        assert!(!callback.is_suspending());
    }

    #[tokio::test]
    async fn suspending_callback_is_awaited() {
        let mut callback = Callback::suspending(|n: u32| async move {
            tokio::task::yield_now().await;
            n + 1
        });

        assert!(callback.is_suspending());
        assert_eq!(callback.invoke(41).await, Some(42));
    }

    #[test]
    fn suspending_callback_blocks_when_invoked_from_sync_code() {
        let mut callback = Callback::suspending(|s: String| async move { s.len() });
        assert_eq!(callback.invoke_blocking("four".to_string()), Some(4));
    }

    #[tokio::test]
    async fn suspending_callback_failure_propagates() {
        let mut callback: Callback<u32, Result<u32, String>> =
            Callback::suspending(|_| async { Err("boom".to_string()) });
        assert_eq!(callback.invoke(1).await, Some(Err("boom".to_string())));
    }
}
