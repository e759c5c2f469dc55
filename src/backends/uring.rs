//! Kernel completion-ring backend.
//!
//! One dispatcher thread owns an io_uring instance and drives it in
//! batches: it swaps the pending FIFO into a local batch, pushes one SQE
//! per request, submits, then drains exactly as many completions as were
//! submitted. The SQE `user_data` slot carries a heap tracking record that
//! pairs the request with its completion callback.
//!
//! Host memory only; compressed requests are rejected at submission.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use io_uring::{IoUring, opcode, squeue, types};
use libc::{EBUSY, EINVAL, ENOTSUP};
use parking_lot::{Condvar, Mutex};

use crate::backends::Backend;
use crate::request::{
  Compression, CompletionCallback, Request, RequestMemory, RequestOp,
};

struct PendingOp {
  req: Request,
  on_complete: CompletionCallback,
}

#[derive(Default)]
struct State {
  pending: VecDeque<PendingOp>,
  stop: bool,
}

struct Shared {
  state: Mutex<State>,
  cv: Condvar,
}

/// Backend driving a kernel completion ring from a single dispatcher
/// thread.
///
/// If ring setup fails, the backend stays permanently failed: every
/// subsequent submission completes immediately with `IoError(EINVAL)` and a
/// diagnostic.
pub struct RingBackend {
  shared: Arc<Shared>,
  dispatcher: Option<JoinHandle<()>>,
  init_failed: bool,
}

impl RingBackend {
  /// Creates a ring with `entries.max(1)` submission slots.
  pub fn new(entries: u32) -> Self {
    let shared = Arc::new(Shared {
      state: Mutex::new(State::default()),
      cv: Condvar::new(),
    });

    match IoUring::new(entries.max(1)) {
      Ok(ring) => {
        let loop_shared = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
          .name("dsio-ring".into())
          .spawn(move || dispatch_loop(ring, &loop_shared))
          .expect("failed to spawn ring dispatcher thread");
        Self { shared, dispatcher: Some(dispatcher), init_failed: false }
      }
      Err(err) => {
        report_error!(
          "ring",
          "ring_init",
          "failed to initialize the completion ring",
          err.raw_os_error().unwrap_or(EINVAL),
        );
        Self { shared, dispatcher: None, init_failed: true }
      }
    }
  }
}

/// Shared-ownership factory for [`RingBackend`].
pub fn make_ring_backend(entries: u32) -> Arc<dyn Backend> {
  Arc::new(RingBackend::new(entries))
}

impl Backend for RingBackend {
  fn submit(&self, mut req: Request, on_complete: CompletionCallback) {
    if self.init_failed {
      report_request_error!(
        "ring",
        "submit",
        "backend initialization failed",
        &req,
        EINVAL,
      );
      req.mark_failed(EINVAL);
      on_complete(req);
      return;
    }
    if req.dst_mem == RequestMemory::Gpu || req.src_mem == RequestMemory::Gpu
    {
      report_request_error!(
        "ring",
        "submit",
        "GPU memory requested on the ring backend",
        &req,
        EINVAL,
      );
      req.mark_failed(EINVAL);
      on_complete(req);
      return;
    }
    if req.compression != Compression::None {
      let detail = match req.op {
        RequestOp::Write => "compression is not supported for write requests",
        RequestOp::Read => "no decompressor is available on the ring backend",
      };
      report_request_error!("ring", "submit", detail, &req, ENOTSUP);
      req.mark_failed(ENOTSUP);
      on_complete(req);
      return;
    }
    if req.size > u32::MAX as usize {
      report_request_error!(
        "ring",
        "submit",
        "request exceeds the ring transfer limit",
        &req,
        EINVAL,
      );
      req.mark_failed(EINVAL);
      on_complete(req);
      return;
    }

    self.shared.state.lock().pending.push_back(PendingOp {
      req,
      on_complete,
    });
    self.shared.cv.notify_one();
  }
}

impl Drop for RingBackend {
  fn drop(&mut self) {
    self.shared.state.lock().stop = true;
    self.shared.cv.notify_all();
    if let Some(dispatcher) = self.dispatcher.take() {
      let _ = dispatcher.join();
    }
  }
}

fn dispatch_loop(mut ring: IoUring, shared: &Shared) {
  loop {
    let mut batch = {
      let mut state = shared.state.lock();
      while !state.stop && state.pending.is_empty() {
        shared.cv.wait(&mut state);
      }
      if state.stop && state.pending.is_empty() {
        return;
      }
      mem::take(&mut state.pending)
    };

    let mut pushed: usize = 0;
    while let Some(op) = batch.pop_front() {
      let tag = Box::into_raw(Box::new(op));
      // SAFETY: `tag` was just produced by Box::into_raw and is only read
      // here; ownership passes to the completion handler via user_data.
      let entry = prepare_entry(unsafe { &(*tag).req }).user_data(tag as u64);

      // SAFETY: the entry's buffer pointers come from the request, and the
      // caller contract keeps those buffers alive until completion.
      if unsafe { ring.submission().push(&entry) }.is_err() {
        // SAFETY: the push failed, so ownership of `tag` never left us.
        let mut op = unsafe { Box::from_raw(tag) };
        report_request_error!(
          "ring",
          "submit",
          "submission queue is full",
          &op.req,
          EBUSY,
        );
        op.req.mark_failed(EBUSY);
        (op.on_complete)(op.req);
        continue;
      }
      pushed += 1;
    }

    if pushed == 0 {
      continue;
    }

    // Tagged entries that the kernel already consumed keep flowing through
    // the completion queue even if a later submit call fails.
    let submitted = match ring.submit() {
      Ok(submitted) => submitted,
      Err(err) => {
        report_error!(
          "ring",
          "ring_submit",
          "batch submission failed",
          err.raw_os_error().unwrap_or(EINVAL),
        );
        continue;
      }
    };

    let mut seen = 0;
    while seen < submitted {
      let entry = ring.completion().next();
      match entry {
        Some(cqe) => {
          complete(&cqe);
          seen += 1;
        }
        None => {
          if let Err(err) = ring.submit_and_wait(1) {
            report_error!(
              "ring",
              "ring_wait",
              "failed waiting for completions",
              err.raw_os_error().unwrap_or(EINVAL),
            );
            break;
          }
        }
      }
    }
  }
}

fn prepare_entry(req: &Request) -> squeue::Entry {
  match req.op {
    RequestOp::Write => {
      opcode::Write::new(types::Fd(req.fd), req.host_src, req.size as u32)
        .offset(req.offset)
        .build()
    }
    RequestOp::Read => {
      opcode::Read::new(types::Fd(req.fd), req.host_dst, req.size as u32)
        .offset(req.offset)
        .build()
    }
  }
}

fn complete(cqe: &io_uring::cqueue::Entry) {
  let tag = cqe.user_data() as *mut PendingOp;
  if tag.is_null() {
    return;
  }
  // SAFETY: the tag was produced by Box::into_raw when the entry was
  // pushed, and each completion is seen exactly once.
  let mut op = unsafe { Box::from_raw(tag) };

  let res = cqe.result();
  if res < 0 {
    let operation = match op.req.op {
      RequestOp::Read => "pread",
      RequestOp::Write => "pwrite",
    };
    report_request_error!(
      "ring",
      operation,
      "ring I/O failed",
      &op.req,
      -res,
    );
    op.req.mark_failed(-res);
  } else {
    op.req.mark_ok(res as usize);
  }
  (op.on_complete)(op.req);
}
