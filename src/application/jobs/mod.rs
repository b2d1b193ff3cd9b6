mod context;
mod queue;

pub use context::{JobWorkerContext, job_failed};
pub use queue::enqueue_job;
