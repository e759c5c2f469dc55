//! C ABI surface.
//!
//! Backends and queues cross the boundary as opaque heap handles created
//! and released here. Requests stay owned by the embedding process:
//! [`dsio_queue_enqueue`] copies the struct's fields, and on completion the
//! runtime writes `status`, `errno_value` and `bytes_transferred` back into
//! the caller's struct before invoking the per-request callback.
//!
//! # Ownership rules
//!
//! 1. The caller allocates every `dsio_request` and every data buffer.
//! 2. Both must stay valid (and unaliased) from `dsio_queue_enqueue` until
//!    the completion callback has returned for that request.
//! 3. `dsio_queue_wait_all` must reach zero in-flight requests before
//!    `dsio_queue_release`; releasing a busy queue is undefined behavior.
//! 4. Releasing a backend is safe while queues still reference it; the
//!    backend is freed with the last queue.
//!
//! Callbacks are invoked on runtime-owned threads, exactly once per
//! enqueued request.
#![allow(non_camel_case_types)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::c_void;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use libc::c_int;
use parking_lot::{Condvar, Mutex};

use crate::backends::{self, Backend};
use crate::request::{
  Compression, Request, RequestMemory, RequestOp, RequestStatus,
};

/// Request in the C layout. Enums are plain integers:
///
/// - `op`: 0 = read, 1 = write
/// - `dst_memory` / `src_memory`: 0 = host, 1 = GPU
/// - `compression`: 0 = none, 1 = demo transform, 2 = stubbed
/// - `status`: 0 = pending, 1 = ok, 2 = I/O error
#[repr(C)]
pub struct dsio_request {
  pub fd: c_int,
  pub offset: u64,
  pub size: usize,
  pub host_dst: *mut c_void,
  pub host_src: *const c_void,
  pub gpu_buffer: *mut c_void,
  pub gpu_offset: u64,
  pub op: u32,
  pub dst_memory: u32,
  pub src_memory: u32,
  pub compression: u32,
  pub status: u32,
  pub errno_value: c_int,
  pub bytes_transferred: usize,
}

/// Per-request completion callback: receives the caller's (now updated)
/// request struct and the cookie passed to [`dsio_queue_submit_all`].
pub type dsio_completion_callback =
  Option<extern "C" fn(*mut dsio_request, *mut c_void)>;

pub struct dsio_backend {
  inner: Arc<dyn Backend>,
}

pub struct dsio_queue {
  inner: CQueue,
}

fn op_from_c(op: u32) -> RequestOp {
  match op {
    1 => RequestOp::Write,
    _ => RequestOp::Read,
  }
}

fn memory_from_c(memory: u32) -> RequestMemory {
  match memory {
    1 => RequestMemory::Gpu,
    _ => RequestMemory::Host,
  }
}

fn compression_from_c(compression: u32) -> Compression {
  match compression {
    1 => Compression::DemoTransform,
    2 => Compression::Stubbed,
    _ => Compression::None,
  }
}

fn status_to_c(status: RequestStatus) -> u32 {
  match status {
    RequestStatus::Pending => 0,
    RequestStatus::Ok => 1,
    // The C surface has no cancelled state; overlays that produce one
    // surface it as an I/O error.
    RequestStatus::IoError | RequestStatus::Cancelled => 2,
  }
}

fn request_from_c(request: &dsio_request) -> Request {
  Request {
    fd: request.fd,
    offset: request.offset,
    size: request.size,
    host_dst: request.host_dst as *mut u8,
    host_src: request.host_src as *const u8,
    gpu_buffer: request.gpu_buffer as usize as u64,
    gpu_offset: request.gpu_offset,
    op: op_from_c(request.op),
    dst_mem: memory_from_c(request.dst_memory),
    src_mem: memory_from_c(request.src_memory),
    compression: compression_from_c(request.compression),
    status: RequestStatus::Pending,
    errno_value: 0,
    bytes_transferred: 0,
  }
}

struct SendPtr<T>(*mut T);

impl<T> Clone for SendPtr<T> {
  fn clone(&self) -> Self {
    *self
  }
}
impl<T> Copy for SendPtr<T> {}

// SAFETY: the pointee is owned by the embedding process, which guarantees
// (ownership rule 2 above) that it stays valid and unaliased until the
// completion callback has run on the backend thread.
unsafe impl<T> Send for SendPtr<T> {}

/// A converted request paired with the caller's struct for write-back.
struct PendingRequest {
  req: Request,
  c_request: SendPtr<dsio_request>,
}

struct CQueueShared {
  in_flight: AtomicUsize,
  total_completed: AtomicUsize,
  total_failed: AtomicUsize,
  total_bytes_transferred: AtomicU64,
  wait_lock: Mutex<()>,
  wait_cv: Condvar,
}

impl CQueueShared {
  fn complete(&self, req: &Request) {
    self.total_completed.fetch_add(1, Ordering::Relaxed);
    if req.status != RequestStatus::Ok {
      self.total_failed.fetch_add(1, Ordering::Relaxed);
    }
    self
      .total_bytes_transferred
      .fetch_add(req.bytes_transferred as u64, Ordering::Relaxed);

    if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
      let _guard = self.wait_lock.lock();
      self.wait_cv.notify_all();
    }
  }
}

/// Queue twin of [`crate::queue::Queue`] that keeps the caller's structs in
/// the loop: completions are written back before the C callback fires.
struct CQueue {
  backend: Arc<dyn Backend>,
  pending: Mutex<Vec<PendingRequest>>,
  shared: Arc<CQueueShared>,
}

impl CQueue {
  fn new(backend: Arc<dyn Backend>) -> Self {
    Self {
      backend,
      pending: Mutex::new(Vec::new()),
      shared: Arc::new(CQueueShared {
        in_flight: AtomicUsize::new(0),
        total_completed: AtomicUsize::new(0),
        total_failed: AtomicUsize::new(0),
        total_bytes_transferred: AtomicU64::new(0),
        wait_lock: Mutex::new(()),
        wait_cv: Condvar::new(),
      }),
    }
  }

  fn enqueue(&self, request: *mut dsio_request) {
    if request.is_null() {
      return;
    }
    // SAFETY: non-null, and the caller owns the struct per ownership
    // rule 2.
    let c_request = unsafe { &mut *request };
    c_request.status = status_to_c(RequestStatus::Pending);
    c_request.errno_value = 0;
    c_request.bytes_transferred = 0;

    self.pending.lock().push(PendingRequest {
      req: request_from_c(c_request),
      c_request: SendPtr(request),
    });
  }

  fn submit_all(
    &self,
    callback: dsio_completion_callback,
    user_data: *mut c_void,
  ) {
    let to_submit = mem::take(&mut *self.pending.lock());
    let user_data = SendPtr(user_data);

    for pending in to_submit {
      self.shared.in_flight.fetch_add(1, Ordering::Relaxed);
      let shared = Arc::clone(&self.shared);
      let c_request = pending.c_request;

      self.backend.submit(
        pending.req,
        Box::new(move |completed| {
          // SAFETY: enqueue only stores non-null pointers, and the caller
          // keeps the struct alive until this callback returns.
          let target = unsafe { &mut *c_request.0 };
          target.status = status_to_c(completed.status);
          target.errno_value = completed.errno_value;
          target.bytes_transferred = completed.bytes_transferred;

          if let Some(callback) = callback {
            callback(c_request.0, user_data.0);
          }

          shared.complete(&completed);
        }),
      );
    }
  }

  fn wait_all(&self) {
    let mut guard = self.shared.wait_lock.lock();
    while self.shared.in_flight.load(Ordering::Acquire) != 0 {
      self.shared.wait_cv.wait(&mut guard);
    }
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_backend_make_cpu(
  worker_count: usize,
) -> *mut dsio_backend {
  Box::into_raw(Box::new(dsio_backend {
    inner: backends::make_cpu_backend(worker_count),
  }))
}

#[cfg(all(feature = "uring", linux))]
#[unsafe(no_mangle)]
pub extern "C" fn dsio_backend_make_ring(entries: u32) -> *mut dsio_backend {
  Box::into_raw(Box::new(dsio_backend {
    inner: backends::make_ring_backend(entries),
  }))
}

/// GPU backend configuration in the C layout. All handle fields are the
/// raw Vulkan handles; a NULL `device` asks the backend to create its own
/// minimal context, otherwise the handles are borrowed and never destroyed
/// by the runtime.
#[cfg(feature = "vulkan")]
#[repr(C)]
pub struct dsio_gpu_config {
  pub instance: *mut c_void,
  pub physical_device: *mut c_void,
  pub device: *mut c_void,
  pub queue: *mut c_void,
  pub queue_family_index: u32,
  pub command_pool: *mut c_void,
  pub worker_count: usize,
}

#[cfg(feature = "vulkan")]
#[unsafe(no_mangle)]
pub extern "C" fn dsio_backend_make_gpu(
  config: *const dsio_gpu_config,
) -> *mut dsio_backend {
  use ash::vk::{self, Handle};

  if config.is_null() {
    return std::ptr::null_mut();
  }
  // SAFETY: non-null; the caller provides a fully initialized config.
  let config = unsafe { &*config };

  let config = backends::GpuBackendConfig {
    instance: vk::Instance::from_raw(config.instance as usize as u64),
    physical_device: vk::PhysicalDevice::from_raw(
      config.physical_device as usize as u64,
    ),
    device: vk::Device::from_raw(config.device as usize as u64),
    queue: vk::Queue::from_raw(config.queue as usize as u64),
    queue_family_index: config.queue_family_index,
    command_pool: vk::CommandPool::from_raw(
      config.command_pool as usize as u64,
    ),
    worker_count: config.worker_count,
  };

  Box::into_raw(Box::new(dsio_backend {
    inner: backends::make_gpu_backend(&config),
  }))
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_backend_release(backend: *mut dsio_backend) {
  if backend.is_null() {
    return;
  }
  // SAFETY: created by one of the dsio_backend_make_* functions and not
  // released twice per the API contract.
  drop(unsafe { Box::from_raw(backend) });
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_create(
  backend: *mut dsio_backend,
) -> *mut dsio_queue {
  if backend.is_null() {
    return std::ptr::null_mut();
  }
  // SAFETY: a valid handle from dsio_backend_make_*.
  let backend = unsafe { &*backend };
  Box::into_raw(Box::new(dsio_queue {
    inner: CQueue::new(Arc::clone(&backend.inner)),
  }))
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_release(queue: *mut dsio_queue) {
  if queue.is_null() {
    return;
  }
  // SAFETY: created by dsio_queue_create; the caller has quiesced the
  // queue per ownership rule 3.
  drop(unsafe { Box::from_raw(queue) });
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_enqueue(
  queue: *mut dsio_queue,
  request: *mut dsio_request,
) {
  if queue.is_null() {
    return;
  }
  // SAFETY: a valid handle from dsio_queue_create.
  unsafe { &*queue }.inner.enqueue(request);
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_submit_all(
  queue: *mut dsio_queue,
  callback: dsio_completion_callback,
  user_data: *mut c_void,
) {
  if queue.is_null() {
    return;
  }
  // SAFETY: a valid handle from dsio_queue_create.
  unsafe { &*queue }.inner.submit_all(callback, user_data);
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_wait_all(queue: *mut dsio_queue) {
  if queue.is_null() {
    return;
  }
  // SAFETY: a valid handle from dsio_queue_create.
  unsafe { &*queue }.inner.wait_all();
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_in_flight(queue: *const dsio_queue) -> usize {
  if queue.is_null() {
    return 0;
  }
  // SAFETY: a valid handle from dsio_queue_create.
  unsafe { &*queue }.inner.shared.in_flight.load(Ordering::Acquire)
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_total_completed(
  queue: *const dsio_queue,
) -> usize {
  if queue.is_null() {
    return 0;
  }
  // SAFETY: a valid handle from dsio_queue_create.
  unsafe { &*queue }.inner.shared.total_completed.load(Ordering::Acquire)
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_total_failed(queue: *const dsio_queue) -> usize {
  if queue.is_null() {
    return 0;
  }
  // SAFETY: a valid handle from dsio_queue_create.
  unsafe { &*queue }.inner.shared.total_failed.load(Ordering::Acquire)
}

#[unsafe(no_mangle)]
pub extern "C" fn dsio_queue_total_bytes_transferred(
  queue: *const dsio_queue,
) -> u64 {
  if queue.is_null() {
    return 0;
  }
  // SAFETY: a valid handle from dsio_queue_create.
  unsafe { &*queue }
    .inner
    .shared
    .total_bytes_transferred
    .load(Ordering::Acquire)
}
