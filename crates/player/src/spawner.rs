// Off-thread execution of blocking transport calls

use needle_core::{NarrationError, Result};
use std::thread;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs controller work (network fetches) away from the owning thread.
/// Completions are posted back through the controller inbox, never returned.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, name: &str, task: Task) -> Result<()>;
}

/// One named OS thread per task
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, task: Task) -> Result<()> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(task)
            .map(|_| ())
            .map_err(|e| {
                NarrationError::InvalidState(format!("Failed to spawn {} thread: {}", name, e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_thread_spawner_runs_task_on_named_thread() {
        let (tx, rx) = mpsc::channel();
        ThreadSpawner
            .spawn(
                "needle-test",
                Box::new(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send(name).unwrap();
                }),
            )
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("needle-test"));
    }
}
