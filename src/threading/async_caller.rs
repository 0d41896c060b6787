// Async calls
//
// Runs a callable on the thread pool and delivers its result or error to
// callbacks on the main thread. Every call in flight is tracked so that an owner
// can interrupt all of them at once.

use super::error::{ActionError, TaskError, TaskResult, ThreadPoolError};
use super::executor::MainThreadExecutor;
use super::pool::{DefaultThreadPool, ThreadPool};
use super::sync::{Lock, SyncFactory};
use super::task::{Interruptible, Task, TaskBase};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Handle to an async call, usable to interrupt it.
pub type AsyncCallHandle = Arc<dyn Interruptible>;

/// Body of an async call. Receives its own task for interruption checkpoints.
pub type AsyncBody<T> = Box<dyn FnOnce(&dyn Interruptible) -> TaskResult<T> + Send>;

/// Main-thread callback receiving the call's result
pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;

/// Main-thread callback receiving the call's error
pub type ErrorCallback = Box<dyn FnOnce(anyhow::Error) + Send>;

type InFlight<P> = <P as SyncFactory>::Lock<HashMap<u64, AsyncCallHandle>>;

struct AsyncCall<T> {
    body: AsyncBody<T>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

struct AsyncTask<P: ThreadPool, T: Send + 'static> {
    base: TaskBase,
    call: P::Lock<Option<AsyncCall<T>>>,
    executor: Arc<MainThreadExecutor<P>>,
    in_flight: Arc<InFlight<P>>,
}

impl<P: ThreadPool, T: Send + 'static> AsyncTask<P, T> {
    fn deregister(&self) {
        self.in_flight.with(|calls| {
            calls.remove(&self.base.id());
        });
    }

    fn complete(&self, call: AsyncCall<T>) -> TaskResult<()> {
        let AsyncCall {
            body,
            on_success,
            on_error,
        } = call;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)))
            .unwrap_or_else(|payload| Err(TaskError::Failed(ActionError::from_panic(payload).into())))
            .and_then(|value| match on_success {
                Some(callback) => self.executor.run_on_main_thread(
                    move || {
                        callback(value);
                        Ok(())
                    },
                    Some(self),
                ),
                None => Ok(()),
            });

        match outcome {
            Ok(()) => Ok(()),
            Err(TaskError::Interrupted { .. }) => {
                tracing::debug!(call = self.base.name(), "Async call interrupted");
                Ok(())
            }
            Err(TaskError::Failed(error)) => match on_error {
                Some(callback) => {
                    let delivered = self.executor.run_on_main_thread(
                        move || {
                            callback(error);
                            Ok(())
                        },
                        Some(self),
                    );
                    match delivered {
                        Err(TaskError::Interrupted { .. }) => {
                            tracing::debug!(
                                call = self.base.name(),
                                "Async call interrupted before its error was delivered"
                            );
                            Ok(())
                        }
                        other => other,
                    }
                }
                None => Err(TaskError::Failed(error)),
            },
        }
    }
}

/// Removes the call from the in-flight set when dropped, unwinding included.
struct Registration<'a, P: ThreadPool, T: Send + 'static>(&'a AsyncTask<P, T>);

impl<P: ThreadPool, T: Send + 'static> Drop for Registration<'_, P, T> {
    fn drop(&mut self) {
        self.0.deregister();
    }
}

impl<P: ThreadPool, T: Send + 'static> Interruptible for AsyncTask<P, T> {
    fn task_base(&self) -> &TaskBase {
        &self.base
    }
}

impl<P: ThreadPool, T: Send + 'static> Task for AsyncTask<P, T> {
    fn run(&self) -> TaskResult<()> {
        let _registration = Registration(self);
        match self.call.with(Option::take) {
            Some(call) => self.complete(call),
            None => Ok(()),
        }
    }

    fn on_cancelled(&self) {
        let _registration = Registration(self);
        self.call.with(Option::take);
        tracing::debug!(call = self.base.name(), "Async call cancelled before start");
    }
}

/// Starts async calls on a pool and tracks the ones in flight.
///
/// An in-flight call is one that was started and has neither finished nor been
/// cancelled. Callbacks run on the executor's main thread.
pub struct AsyncCaller<P: ThreadPool = DefaultThreadPool> {
    pool: Arc<P>,
    executor: Arc<MainThreadExecutor<P>>,
    in_flight: Arc<InFlight<P>>,
}

impl<P: ThreadPool> AsyncCaller<P> {
    pub fn new(pool: Arc<P>, executor: Arc<MainThreadExecutor<P>>) -> Self {
        let in_flight = Arc::new(pool.create_lock(HashMap::new()));
        Self {
            pool,
            executor,
            in_flight,
        }
    }

    /// Run `func` on the pool.
    ///
    /// On success, `on_success` receives the value on the main thread. On
    /// failure, `on_error` receives the error on the main thread; without
    /// `on_error` the error goes to the pool's error handling. An error raised by
    /// `on_success` is delivered to `on_error` too. Interruption at any stage
    /// ends the call silently.
    pub fn start_async_call<T, F>(
        &self,
        func: F,
        on_success: Option<SuccessCallback<T>>,
        on_error: Option<ErrorCallback>,
        name: Option<String>,
    ) -> Result<AsyncCallHandle, ThreadPoolError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Interruptible) -> TaskResult<T> + Send + 'static,
    {
        let call = AsyncCall {
            body: Box::new(func),
            on_success,
            on_error,
        };
        let task = Arc::new(AsyncTask::<P, T> {
            base: TaskBase::with_optional_name(name),
            call: self.pool.create_lock(Some(call)),
            executor: Arc::clone(&self.executor),
            in_flight: Arc::clone(&self.in_flight),
        });

        let id = task.base.id();
        let handle: AsyncCallHandle = task.clone();
        self.in_flight.with(|calls| {
            calls.insert(id, Arc::clone(&handle));
        });

        if let Err(err) = self.pool.add_task(task) {
            self.in_flight.with(|calls| {
                calls.remove(&id);
            });
            return Err(err);
        }

        tracing::debug!(call = handle.task_name(), "Async call started");
        Ok(handle)
    }

    /// Interrupt every call in flight. Returns how many were interrupted.
    pub fn interrupt_all_async_calls(&self) -> usize {
        self.in_flight.with(|calls| {
            for call in calls.values() {
                call.interrupt();
            }
            calls.len()
        })
    }

    /// Number of calls started and not yet finished or cancelled
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.with(|calls| calls.len())
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    pub fn executor(&self) -> &Arc<MainThreadExecutor<P>> {
        &self.executor
    }
}

type AsyncMethodBody<S, A, T> =
    Arc<dyn Fn(&S, A, &dyn Interruptible) -> TaskResult<T> + Send + Sync>;

/// A method that always runs asynchronously, with its callbacks bound to the
/// same receiver.
///
/// ```ignore
/// let scan = AsyncMethod::new(|scanner: &Scanner, dir: Utf8PathBuf, task| scanner.scan(&dir, task))
///     .on_success(|scanner, files| scanner.show(files))
///     .on_error(|scanner, err| scanner.report(err));
/// scan.call(&caller, &scanner, dir)?;
/// ```
pub struct AsyncMethod<S, A, T> {
    method: AsyncMethodBody<S, A, T>,
    on_success: Option<Arc<dyn Fn(&S, T) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&S, anyhow::Error) + Send + Sync>>,
    name: Option<String>,
}

impl<S, A, T> AsyncMethod<S, A, T>
where
    S: Send + Sync + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    pub fn new<M>(method: M) -> Self
    where
        M: Fn(&S, A, &dyn Interruptible) -> TaskResult<T> + Send + Sync + 'static,
    {
        Self {
            method: Arc::new(method),
            on_success: None,
            on_error: None,
            name: None,
        }
    }

    pub fn on_success(mut self, callback: impl Fn(&S, T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&S, anyhow::Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Start the method on `target` through `caller`.
    pub fn call<P: ThreadPool>(
        &self,
        caller: &AsyncCaller<P>,
        target: &Arc<S>,
        arg: A,
    ) -> Result<AsyncCallHandle, ThreadPoolError> {
        let method = Arc::clone(&self.method);
        let receiver = Arc::clone(target);
        let body = move |task: &dyn Interruptible| method(&receiver, arg, task);

        let on_success = self.on_success.clone().map(|callback| {
            let receiver = Arc::clone(target);
            Box::new(move |value: T| callback(&receiver, value)) as SuccessCallback<T>
        });
        let on_error = self.on_error.clone().map(|callback| {
            let receiver = Arc::clone(target);
            Box::new(move |error: anyhow::Error| callback(&receiver, error)) as ErrorCallback
        });

        caller.start_async_call(body, on_success, on_error, self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threading::manual_pool::ManualThreadPool;
    use std::sync::Mutex;

    fn manual_caller() -> AsyncCaller<ManualThreadPool> {
        let pool = Arc::new(ManualThreadPool::new());
        let executor = Arc::new(MainThreadExecutor::new(Arc::clone(&pool)));
        AsyncCaller::new(pool, executor)
    }

    #[test]
    fn test_success_callback_receives_result() {
        let caller = manual_caller();
        let received = Arc::new(Mutex::new(None));
        let received_clone = Arc::clone(&received);

        caller
            .start_async_call(
                |_| Ok(6 * 7),
                Some(Box::new(move |value: i32| *received_clone.lock().unwrap() = Some(value))),
                None,
                Some("answer".to_string()),
            )
            .unwrap();

        assert_eq!(caller.in_flight_count(), 1);
        // Running on the main thread, callbacks execute inline
        caller.pool().run_all();

        assert_eq!(*received.lock().unwrap(), Some(42));
        assert_eq!(caller.in_flight_count(), 0);
    }

    #[test]
    fn test_error_callback_receives_error() {
        let caller = manual_caller();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);

        caller
            .start_async_call::<(), _>(
                |_| Err(anyhow::anyhow!("lookup failed").into()),
                Some(Box::new(|_: ()| panic!("success callback must not run"))),
                Some(Box::new(move |err: anyhow::Error| errors_clone.lock().unwrap().push(err.to_string()))),
                None,
            )
            .unwrap();
        caller.pool().run_all();

        assert_eq!(*errors.lock().unwrap(), vec!["lookup failed"]);
        assert_eq!(caller.in_flight_count(), 0);
    }

    #[test]
    fn test_success_callback_error_goes_to_error_callback() {
        let caller = manual_caller();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);

        caller
            .start_async_call(
                |_| Ok(()),
                Some(Box::new(|()| panic!("callback broke"))),
                Some(Box::new(move |err: anyhow::Error| errors_clone.lock().unwrap().push(err.to_string()))),
                None,
            )
            .unwrap();
        caller.pool().run_all();

        assert_eq!(*errors.lock().unwrap(), vec!["Panicked: callback broke"]);
        assert_eq!(caller.in_flight_count(), 0);
    }

    #[test]
    fn test_panicking_body_goes_to_error_callback() {
        let caller = manual_caller();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);

        caller
            .start_async_call::<(), _>(
                |_| panic!("body exploded"),
                Some(Box::new(|_: ()| panic!("success callback must not run"))),
                Some(Box::new(move |err: anyhow::Error| errors_clone.lock().unwrap().push(err.to_string()))),
                Some("exploding".to_string()),
            )
            .unwrap();
        caller.pool().run_all();

        assert_eq!(*errors.lock().unwrap(), vec!["Panicked: body exploded"]);
        assert_eq!(caller.in_flight_count(), 0);
        assert_eq!(caller.pool().metrics().tasks_panicked.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_panicking_body_without_callback_reaches_pool_handler() {
        let pool_errors = Arc::new(Mutex::new(Vec::new()));
        let pool_errors_clone = Arc::clone(&pool_errors);
        let pool = Arc::new(ManualThreadPool::new().with_error_handler(move |name, err, _| {
            pool_errors_clone
                .lock()
                .unwrap()
                .push(format!("{}: {}", name, err));
        }));
        let executor = Arc::new(MainThreadExecutor::new(Arc::clone(&pool)));
        let caller = AsyncCaller::new(Arc::clone(&pool), executor);

        let handle = caller
            .start_async_call::<(), _>(|_| panic!("no one listening"), None, None, Some("loud".to_string()))
            .unwrap();
        pool.run_all();

        assert_eq!(*pool_errors.lock().unwrap(), vec!["loud: Panicked: no one listening"]);
        assert_eq!(caller.in_flight_count(), 0);
        // The pool no longer holds the task, so the handle is the last owner
        assert_eq!(Arc::strong_count(&handle), 1);
    }

    #[test]
    fn test_error_without_callback_reaches_pool_handler() {
        let pool_errors = Arc::new(Mutex::new(Vec::new()));
        let pool_errors_clone = Arc::clone(&pool_errors);
        let pool = Arc::new(ManualThreadPool::new().with_error_handler(move |name, err, _| {
            pool_errors_clone
                .lock()
                .unwrap()
                .push(format!("{}: {}", name, err));
        }));
        let executor = Arc::new(MainThreadExecutor::new(Arc::clone(&pool)));
        let caller = AsyncCaller::new(Arc::clone(&pool), executor);

        caller
            .start_async_call::<(), _>(
                |_| Err(anyhow::anyhow!("unobserved").into()),
                None,
                None,
                Some("orphan".to_string()),
            )
            .unwrap();
        pool.run_all();

        assert_eq!(*pool_errors.lock().unwrap(), vec!["orphan: unobserved"]);
        assert_eq!(caller.in_flight_count(), 0);
    }

    #[test]
    fn test_interrupt_all_before_start_cancels_silently() {
        let caller = manual_caller();
        let callbacks = Arc::new(Mutex::new(0));

        for _ in 0..3 {
            let (ok, err) = (Arc::clone(&callbacks), Arc::clone(&callbacks));
            caller
                .start_async_call(
                    |_| Ok(()),
                    Some(Box::new(move |()| *ok.lock().unwrap() += 1)),
                    Some(Box::new(move |_: anyhow::Error| *err.lock().unwrap() += 1)),
                    None,
                )
                .unwrap();
        }

        assert_eq!(caller.interrupt_all_async_calls(), 3);
        caller.pool().run_all();

        assert_eq!(*callbacks.lock().unwrap(), 0);
        assert_eq!(caller.in_flight_count(), 0);
        assert_eq!(
            caller.pool().metrics().tasks_cancelled.load(std::sync::atomic::Ordering::Relaxed),
            3
        );
    }

    #[test]
    fn test_interrupted_body_skips_callbacks() {
        let caller = manual_caller();
        let callbacks = Arc::new(Mutex::new(0));
        let (ok, err) = (Arc::clone(&callbacks), Arc::clone(&callbacks));

        let handle = caller
            .start_async_call(
                |task| {
                    task.interrupt();
                    task.check_interrupted()?;
                    Ok(())
                },
                Some(Box::new(move |()| *ok.lock().unwrap() += 1)),
                Some(Box::new(move |_: anyhow::Error| *err.lock().unwrap() += 1)),
                None,
            )
            .unwrap();
        caller.pool().run_all();

        assert!(handle.is_interrupted());
        assert_eq!(*callbacks.lock().unwrap(), 0);
        assert_eq!(caller.in_flight_count(), 0);
    }

    struct Counter {
        hits: Mutex<Vec<u32>>,
    }

    #[test]
    fn test_async_method_binds_receiver() {
        let caller = manual_caller();
        let counter = Arc::new(Counter {
            hits: Mutex::new(Vec::new()),
        });

        let double = AsyncMethod::new(|_: &Counter, value: u32, _: &dyn Interruptible| Ok(value * 2))
            .on_success(|counter, doubled| counter.hits.lock().unwrap().push(doubled))
            .named("double");

        let handle = double.call(&caller, &counter, 4).unwrap();
        assert_eq!(handle.task_name(), "double");
        double.call(&caller, &counter, 5).unwrap();
        caller.pool().run_all();

        assert_eq!(*counter.hits.lock().unwrap(), vec![8, 10]);
    }
}
