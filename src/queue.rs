//! Front-end request queue.
//!
//! Collects requests, forwards them to a shared [`Backend`] one at a time,
//! tracks the in-flight count, aggregates completion statistics and retains
//! completed records until the caller harvests them with
//! [`take_completed`](Queue::take_completed).

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::backends::Backend;
use crate::request::{Request, RequestStatus};

#[derive(Default)]
struct Lists {
  pending: Vec<Request>,
  completed: Vec<Request>,
}

struct QueueInner {
  backend: Arc<dyn Backend>,
  lists: Mutex<Lists>,
  in_flight: AtomicUsize,
  total_completed: AtomicUsize,
  total_failed: AtomicUsize,
  total_bytes_transferred: AtomicU64,
  // Separate from `lists` so notification never nests inside the list
  // lock.
  wait_lock: Mutex<()>,
  wait_cv: Condvar,
}

/// A queue of I/O requests executed by one backend.
///
/// All methods are thread-safe and none of them blocks on I/O except
/// [`wait_all`](Self::wait_all).
///
/// Dropping the queue does **not** drain in-flight work: callers must reach
/// `in_flight() == 0` (for example via `wait_all`) before dropping it and
/// before invalidating any buffer a submitted request points at.
pub struct Queue {
  inner: Arc<QueueInner>,
}

impl Queue {
  pub fn new(backend: Arc<dyn Backend>) -> Self {
    Self {
      inner: Arc::new(QueueInner {
        backend,
        lists: Mutex::new(Lists::default()),
        in_flight: AtomicUsize::new(0),
        total_completed: AtomicUsize::new(0),
        total_failed: AtomicUsize::new(0),
        total_bytes_transferred: AtomicU64::new(0),
        wait_lock: Mutex::new(()),
        wait_cv: Condvar::new(),
      }),
    }
  }

  /// Buffers a request for a later [`submit_all`](Self::submit_all).
  pub fn enqueue(&self, req: Request) {
    self.inner.lists.lock().pending.push(req);
  }

  /// Drains the pending buffer into the backend.
  ///
  /// Returns once every pending request has been handed over; completion
  /// happens asynchronously.
  pub fn submit_all(&self) {
    let to_submit = mem::take(&mut self.inner.lists.lock().pending);

    for req in to_submit {
      self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
      let inner = Arc::clone(&self.inner);
      self
        .inner
        .backend
        .submit(req, Box::new(move |completed| inner.complete(completed)));
    }
  }

  /// Blocks until the in-flight count reaches zero.
  pub fn wait_all(&self) {
    let mut guard = self.inner.wait_lock.lock();
    while self.inner.in_flight.load(Ordering::Acquire) != 0 {
      self.inner.wait_cv.wait(&mut guard);
    }
  }

  /// Snapshot of the requests submitted but not yet completed.
  pub fn in_flight(&self) -> usize {
    self.inner.in_flight.load(Ordering::Acquire)
  }

  /// Removes and returns all completed records accumulated so far.
  ///
  /// A second call with no intervening completions returns an empty vec.
  pub fn take_completed(&self) -> Vec<Request> {
    mem::take(&mut self.inner.lists.lock().completed)
  }

  /// Requests completed since the queue was created, regardless of status.
  pub fn total_completed(&self) -> usize {
    self.inner.total_completed.load(Ordering::Acquire)
  }

  /// Requests that completed with a status other than `Ok`.
  pub fn total_failed(&self) -> usize {
    self.inner.total_failed.load(Ordering::Acquire)
  }

  /// Sum of `bytes_transferred` over all completed requests.
  pub fn total_bytes_transferred(&self) -> u64 {
    self.inner.total_bytes_transferred.load(Ordering::Acquire)
  }
}

impl QueueInner {
  fn complete(&self, req: Request) {
    self.lists.lock().completed.push(req);

    self.total_completed.fetch_add(1, Ordering::Relaxed);
    if req.status != RequestStatus::Ok {
      self.total_failed.fetch_add(1, Ordering::Relaxed);
    }
    self
      .total_bytes_transferred
      .fetch_add(req.bytes_transferred as u64, Ordering::Relaxed);

    // The release half of the decrement publishes the list append and the
    // totals to any wait_all that observes zero with acquire.
    if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
      // Taking the wait lock first closes the window where a waiter has
      // checked the counter but not yet parked on the condvar.
      let _guard = self.wait_lock.lock();
      self.wait_cv.notify_all();
    }
  }
}
