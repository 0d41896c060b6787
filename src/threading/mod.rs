// Threading module
//
// Cooperative tasks, thread pools and main-thread marshalling

pub mod action;
pub mod async_caller;
pub mod caller;
pub mod error;
pub mod executor;
pub mod manual_pool;
pub mod pool;
pub mod sync;
pub mod task;

pub use action::{ActionResult, MainThreadAction, ResultSink};
pub use async_caller::{
    AsyncCallHandle, AsyncCaller, AsyncMethod, ErrorCallback, SuccessCallback,
};
pub use caller::{MainThreadCapable, MainThreadCaller, main_thread, main_thread_ignoring_interrupts};
pub use error::{ActionError, MainThreadError, TaskError, TaskResult, ThreadPoolError};
pub use executor::{DEFAULT_POLL_INTERVAL, ExecutorHook, MainThreadExecutor};
pub use manual_pool::ManualThreadPool;
pub use pool::{DefaultThreadPool, PoolErrorHandler, ThreadPool, ThreadPoolBuilder};
pub use sync::{
    CountDownLatch, Lock, StdLock, StdSyncFactory, StdWaitCondition, SyncFactory, WaitCondition,
};
pub use task::{FnTask, Interruptible, Task, TaskBase, TaskErrorHandler};
