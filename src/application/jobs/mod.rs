mod dispatch;
mod queue;

pub use dispatch::{DispatchError, IntakeLimits, JobDispatcher, Submission};
pub use queue::{JobReceiver, WeakWorkQueue, WorkQueue, work_queue};
