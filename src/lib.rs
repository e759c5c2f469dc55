#![deny(
  clippy::unnecessary_safety_comment,
  clippy::unsafe_removed_from_name,
  clippy::unnecessary_safety_doc,
  clippy::not_unsafe_ptr_arg_deref,
  clippy::undocumented_unsafe_blocks
)]

//! # dsio — batched asynchronous I/O runtime
//!
//! dsio moves bytes between byte-addressable files, host memory and GPU
//! buffers through a small request/queue/backend pipeline:
//!
//! 1. Fill in a [`Request`] (file descriptor, offset, size, destination or
//!    source buffer).
//! 2. [`Queue::enqueue`] buffers it; [`Queue::submit_all`] hands the batch
//!    to the queue's [`Backend`].
//! 3. The backend executes each request on its own threads and reports the
//!    final `status`, `errno_value` and `bytes_transferred` through a
//!    completion callback; [`Queue::wait_all`] blocks until everything
//!    in flight has completed.
//!
//! Three backends implement the same contract:
//!
//! - [`make_cpu_backend`]: a fixed pool of worker threads doing positional
//!   host reads/writes, with an optional post-read transform.
//! - [`make_ring_backend`]: a single dispatcher thread driving a kernel
//!   completion ring (Linux, feature `uring`, on by default).
//! - [`make_gpu_backend`]: workers pairing positional host I/O with
//!   transient Vulkan staging buffers for file→GPU and GPU→file copies
//!   (feature `vulkan`). Device handles can be borrowed from the embedding
//!   process; the runtime never destroys what it does not own.
//!
//! Requests are logically independent: no ordering is guaranteed between
//! them, and buffers they point at are borrowed from the caller for the
//! lifetime of the request.
//!
//! Failures never panic across the backend boundary. Every failure sets
//! `IoError` with a specific errno on the request and emits a record
//! through the process-wide [diagnostic sink](diag).
//!
//! ### Example
//!
//! ```no_run
//! use dsio::{Queue, Request, make_cpu_backend};
//! use std::os::fd::AsRawFd;
//!
//! let file = std::fs::File::open("assets.bin").unwrap();
//! let mut data = vec![0u8; 4096];
//!
//! let mut req = Request::default();
//! req.fd = file.as_raw_fd();
//! req.size = data.len();
//! req.host_dst = data.as_mut_ptr();
//!
//! let queue = Queue::new(make_cpu_backend(4));
//! queue.enqueue(req);
//! queue.submit_all();
//! queue.wait_all();
//!
//! for done in queue.take_completed() {
//!   println!("read {} bytes ({:?})", done.bytes_transferred, done.status);
//! }
//! ```
//!
//! The `ffi` feature exposes the same surface to C embedders; see [`ffi`].

#[macro_use]
mod macros;

pub mod backends;
pub mod diag;
pub mod gdeflate;
mod pool;
pub mod queue;
pub mod request;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use backends::{Backend, CpuBackend, make_cpu_backend};
#[cfg(all(feature = "uring", linux))]
pub use backends::{RingBackend, make_ring_backend};
#[cfg(feature = "vulkan")]
pub use backends::{GpuBackend, GpuBackendConfig, make_gpu_backend};
pub use diag::{ErrorContext, ErrorSink, RequestSnapshot, set_error_sink};
pub use queue::Queue;
pub use request::{
  Compression, CompletionCallback, Request, RequestMemory, RequestOp,
  RequestStatus,
};
