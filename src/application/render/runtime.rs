use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

/// Tracks render jobs currently executing in this process.
///
/// Complements the persisted status check: two dispatches of the same job id
/// landing on one worker race on this map before either touches the database.
#[derive(Default, Clone)]
pub struct InFlightRenders {
    jobs: Arc<DashMap<Uuid, ()>>,
}

#[derive(Debug, Error)]
pub enum InFlightError {
    #[error("render already in progress for job {job_id}")]
    AlreadyRunning { job_id: Uuid },
}

impl InFlightRenders {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
        }
    }

    pub fn acquire(&self, job_id: Uuid) -> Result<RenderGuard, InFlightError> {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(job_id) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(RenderGuard {
                    job_id,
                    jobs: Arc::clone(&self.jobs),
                })
            }
            Entry::Occupied(_) => Err(InFlightError::AlreadyRunning { job_id }),
        }
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.jobs.contains_key(&job_id)
    }
}

/// Releases the in-flight slot when dropped, on every exit path.
pub struct RenderGuard {
    job_id: Uuid,
    jobs: Arc<DashMap<Uuid, ()>>,
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.jobs.remove(&self.job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_guard_drops() {
        let renders = InFlightRenders::new();
        let job_id = Uuid::new_v4();

        let guard = renders.acquire(job_id).expect("first acquire");
        assert!(renders.is_running(job_id));
        assert!(matches!(
            renders.acquire(job_id),
            Err(InFlightError::AlreadyRunning { job_id: id }) if id == job_id
        ));

        let other = renders.acquire(Uuid::new_v4()).expect("other job");
        drop(other);

        drop(guard);
        assert!(!renders.is_running(job_id));
        assert!(renders.acquire(job_id).is_ok());
    }
}
