//! Execution backends.
//!
//! A backend implements the single-operation contract of [`Backend`] for
//! one execution strategy:
//!
//! - [`cpu`]: fixed pool of worker threads doing positional host I/O.
//! - [`uring`]: one dispatcher thread driving a kernel completion ring
//!   (Linux, feature `uring`).
//! - [`vulkan`]: worker pool pairing positional host I/O with transient
//!   device staging buffers (feature `vulkan`).
//!
//! Capability summary:
//!
//! | Backend | host↔host | file→GPU | GPU→file | decompression        |
//! |---------|-----------|----------|----------|----------------------|
//! | cpu     | yes       | no       | no       | `DemoTransform` only |
//! | uring   | yes       | no       | no       | none                 |
//! | vulkan  | yes       | yes      | yes      | none                 |
//!
//! Requests outside a backend's capabilities complete with `IoError` and a
//! diagnostic; they are never silently dropped.

use crate::request::{CompletionCallback, Request};

pub mod cpu;
#[cfg(all(feature = "uring", linux))]
pub mod uring;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use cpu::{CpuBackend, make_cpu_backend};
#[cfg(all(feature = "uring", linux))]
pub use uring::{RingBackend, make_ring_backend};
#[cfg(feature = "vulkan")]
pub use vulkan::{GpuBackend, GpuBackendConfig, make_gpu_backend};

/// Asynchronous executor of single requests.
///
/// # Contract
///
/// Implementations must:
/// - Return from [`submit`](Self::submit) without blocking on I/O.
/// - Eventually invoke `on_complete` exactly once, on a backend-owned
///   thread, with the request carrying its final `status`, `errno_value`
///   and `bytes_transferred`.
/// - On drop, flush or cancel pending work so that no completion fires
///   after the drop returns.
pub trait Backend: Send + Sync {
  fn submit(&self, req: Request, on_complete: CompletionCallback);
}
