// Main-thread callers
//
// Capabilities for objects that route work through a `MainThreadExecutor`,
// plus helpers that bind a method so every call runs on the main thread.

use super::error::TaskResult;
use super::executor::MainThreadExecutor;
use super::pool::DefaultThreadPool;
use super::sync::SyncFactory;
use super::task::Interruptible;
use std::sync::Arc;

/// An interruptible object with access to a main-thread executor.
///
/// Calls made through it abandon their wait when the object is interrupted.
/// Tasks implement this by holding an `Arc<MainThreadExecutor>`.
pub trait MainThreadCapable: Interruptible {
    type Factory: SyncFactory;

    fn main_thread_executor(&self) -> &MainThreadExecutor<Self::Factory>;

    /// Run `func` on the main thread, giving up with the interruption signal if
    /// this object is interrupted while waiting.
    fn run_on_main_thread<T, F>(&self, func: F) -> TaskResult<T>
    where
        Self: Sized,
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.main_thread_executor().run_on_main_thread(func, Some(self))
    }

    /// Run `func` on the main thread and wait for it regardless of interruption.
    fn run_on_main_thread_ignoring_interrupts<T, F>(&self, func: F) -> TaskResult<T>
    where
        Self: Sized,
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.main_thread_executor().run_on_main_thread(func, None)
    }
}

/// Non-interruptible main-thread caller: waits until the main thread has run
/// each call.
pub struct MainThreadCaller<F: SyncFactory = DefaultThreadPool> {
    executor: Arc<MainThreadExecutor<F>>,
}

impl<F: SyncFactory> MainThreadCaller<F> {
    pub fn new(executor: Arc<MainThreadExecutor<F>>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<MainThreadExecutor<F>> {
        &self.executor
    }

    pub fn run_on_main_thread<T, Func>(&self, func: Func) -> TaskResult<T>
    where
        T: Send + 'static,
        Func: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.executor.run_on_main_thread(func, None)
    }

    /// Bind `method` on `target` so each call of the returned closure runs on
    /// the main thread.
    pub fn bind<S, A, T, M>(&self, target: Arc<S>, method: M) -> impl Fn(A) -> TaskResult<T> + use<F, S, A, T, M>
    where
        S: Send + Sync + 'static,
        A: Send + 'static,
        T: Send + 'static,
        M: Fn(&S, A) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let executor = Arc::clone(&self.executor);
        let method = Arc::new(method);
        move |arg| {
            let target = Arc::clone(&target);
            let method = Arc::clone(&method);
            executor.run_on_main_thread(move || method(&target, arg), None)
        }
    }
}

impl<F: SyncFactory> Clone for MainThreadCaller<F> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
        }
    }
}

/// Bind `method` on `target` so each call runs on the main thread and honours
/// `target`'s interruption.
pub fn main_thread<S, A, T, M>(target: &Arc<S>, method: M) -> impl Fn(A) -> TaskResult<T> + use<S, A, T, M>
where
    S: MainThreadCapable + 'static,
    A: Send + 'static,
    T: Send + 'static,
    M: Fn(&S, A) -> anyhow::Result<T> + Send + Sync + 'static,
{
    bind_to_main_thread(target, method, true)
}

/// Like [`main_thread`], but calls wait for the main thread even after `target`
/// has been interrupted.
pub fn main_thread_ignoring_interrupts<S, A, T, M>(
    target: &Arc<S>,
    method: M,
) -> impl Fn(A) -> TaskResult<T> + use<S, A, T, M>
where
    S: MainThreadCapable + 'static,
    A: Send + 'static,
    T: Send + 'static,
    M: Fn(&S, A) -> anyhow::Result<T> + Send + Sync + 'static,
{
    bind_to_main_thread(target, method, false)
}

fn bind_to_main_thread<S, A, T, M>(
    target: &Arc<S>,
    method: M,
    interruptible: bool,
) -> impl Fn(A) -> TaskResult<T> + use<S, A, T, M>
where
    S: MainThreadCapable + 'static,
    A: Send + 'static,
    T: Send + 'static,
    M: Fn(&S, A) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let target = Arc::clone(target);
    let method = Arc::new(method);
    move |arg| {
        let receiver = Arc::clone(&target);
        let method = Arc::clone(&method);
        let call = move || method(&receiver, arg);
        if interruptible {
            target.run_on_main_thread(call)
        } else {
            target.run_on_main_thread_ignoring_interrupts(call)
        }
    }
}
