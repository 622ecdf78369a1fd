use std::{future::Future, sync::Arc};

use log::{error, warn};
use tokio::{
    sync::Semaphore,
    task::{AbortHandle, JoinError, JoinSet},
};

use crate::error::Result;

type Outcome = (String, Result<()>);

/// Spawning never waits; tasks queue on the semaphore themselves.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    join_set: JoinSet<Outcome>,
}

impl WorkerPool {
    pub fn new(max_tasks: usize) -> Self {
        let semaphore = Arc::new(Semaphore::new(max_tasks.max(1)));
        let join_set = JoinSet::new();
        WorkerPool {
            semaphore,
            join_set,
        }
    }

    pub fn spawn<F>(&mut self, label: String, task: F) -> AbortHandle
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        self.join_set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(permit) => {
                    let result = task.await;
                    drop(permit);
                    result
                }
                Err(err) => Err(err.into()),
            };
            (label, result)
        })
    }

    pub fn reap(&mut self) {
        while let Some(result) = self.join_set.try_join_next() {
            log_outcome(result);
        }
    }

    pub async fn join_all(&mut self) {
        while let Some(result) = self.join_set.join_next().await {
            log_outcome(result);
        }
    }
}

fn log_outcome(result: std::result::Result<Outcome, JoinError>) {
    match result {
        Ok((_, Ok(()))) => {}
        Ok((label, Err(err))) => warn!("{label} failed: {err}"),
        Err(err) if err.is_cancelled() => {}
        Err(err) => error!("handler panicked: {err}"),
    }
}
