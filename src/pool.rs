//! Fixed-size worker pool shared by the host and GPU staging backends.
//!
//! Jobs are boxed closures drained from a channel FIFO. Dropping the pool
//! closes the channel; workers finish whatever is still queued and exit, so
//! no job runs after the drop returns.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

type Job = Box<dyn FnOnce() + Send>;

pub(crate) struct WorkerPool {
  jobs: Option<Sender<Job>>,
  workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  /// Spawns `count.max(1)` workers named `{name}-{index}`.
  pub fn new(name: &str, count: usize) -> Self {
    let count = count.max(1);
    let (jobs, receiver) = crossbeam_channel::unbounded::<Job>();

    let workers = (0..count)
      .map(|index| {
        let receiver = receiver.clone();
        thread::Builder::new()
          .name(format!("{name}-{index}"))
          .spawn(move || {
            for job in receiver.iter() {
              job();
            }
          })
          .expect("failed to spawn worker thread")
      })
      .collect();

    Self { jobs: Some(jobs), workers }
  }

  pub fn execute<F>(&self, job: F)
  where
    F: FnOnce() + Send + 'static,
  {
    if let Some(jobs) = &self.jobs {
      let _ = jobs.send(Box::new(job));
    }
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    // Closing the channel lets workers drain the remaining jobs and stop.
    drop(self.jobs.take());
    for worker in self.workers.drain(..) {
      let _ = worker.join();
    }
  }
}
