//! errgroup-style task groups

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::error;

/// Group of background tasks whose first failure is reported by [`TaskGroup::wait`]
#[derive(Debug)]
pub struct TaskGroup {
    name: &'static str,
    handles: Mutex<Vec<JoinHandle<anyhow::Result<()>>>>,
}

impl TaskGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a task into the group
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        self.handles.lock().push(handle);
    }

    /// Number of tasks not yet collected by `wait`
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task, including ones spawned while waiting.
    ///
    /// Returns the first error any task produced.
    pub async fn wait(&self) -> anyhow::Result<()> {
        let mut first_err = None;
        loop {
            let handles: Vec<_> = self.handles.lock().drain(..).collect();
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join_err) => Err(anyhow::anyhow!("task failed: {join_err}")),
                };
                if let Err(e) = result {
                    error!("{} group: {:#}", self.name, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
