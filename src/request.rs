//! Request model: the value type describing one I/O operation.
//!
//! A [`Request`] is filled in by the caller, moved through a
//! [`Queue`](crate::queue::Queue) into a backend, updated in place by the
//! backend, and handed back through the completion callback. The runtime
//! never copies or owns the buffers a request points at; the caller must
//! keep them alive (and unaliased) until the completion callback has run.

use std::fmt;
use std::ptr;

use libc::c_int;

/// Direction of the transfer relative to the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestOp {
  #[default]
  Read,
  Write,
}

impl fmt::Display for RequestOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Read => f.write_str("read"),
      Self::Write => f.write_str("write"),
    }
  }
}

/// Which side of the address space a transfer endpoint lives in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestMemory {
  #[default]
  Host,
  Gpu,
}

impl fmt::Display for RequestMemory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Host => f.write_str("host"),
      Self::Gpu => f.write_str("gpu"),
    }
  }
}

/// Decompression applied after a read completes.
///
/// `DemoTransform` is a stand-in codec (ASCII uppercase) used by demos and
/// tests. `Stubbed` marks streams in the [`gdeflate`](crate::gdeflate)
/// container; no decompressor is wired up yet, so such requests fail with
/// `ENOTSUP`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
  #[default]
  None,
  DemoTransform,
  Stubbed,
}

/// Terminal state of a request.
///
/// `Cancelled` is reserved for overlay layers; nothing in this runtime
/// produces it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestStatus {
  #[default]
  Pending,
  Ok,
  IoError,
  Cancelled,
}

/// Description of a single I/O request plus its result fields.
///
/// Plain value type; enqueueing copies it, so the caller's instance is
/// never written to by the runtime. `status`, `errno_value` and
/// `bytes_transferred` are only meaningful on the copy delivered to the
/// completion callback.
///
/// The default value has `size == 0` and is rejected by every backend's
/// validator.
#[derive(Clone, Copy, Debug)]
pub struct Request {
  /// Open file, byte addressable. Must be `>= 0` at submit time.
  pub fd: c_int,
  /// Byte offset into the file.
  pub offset: u64,
  /// Bytes to transfer. Must be `> 0`.
  pub size: usize,
  /// Host destination for reads. Must point at `size` writable bytes when
  /// `op == Read` and `dst_mem == Host`.
  pub host_dst: *mut u8,
  /// Host source for writes. Must point at `size` readable bytes when
  /// `op == Write` and `src_mem == Host`.
  pub host_src: *const u8,
  /// Raw `VkBuffer` handle value when either memory side is [`RequestMemory::Gpu`];
  /// `0` means null. Kept as an integer so the core builds without the
  /// `vulkan` feature.
  pub gpu_buffer: u64,
  /// Byte offset into `gpu_buffer`.
  pub gpu_offset: u64,
  pub op: RequestOp,
  pub dst_mem: RequestMemory,
  pub src_mem: RequestMemory,
  /// Only consulted for reads.
  pub compression: Compression,
  /// Set exactly once by the executing backend.
  pub status: RequestStatus,
  /// Errno on failure, `0` on success.
  pub errno_value: c_int,
  /// Bytes actually moved; `0` on failure, may be below `size` on a short
  /// read.
  pub bytes_transferred: usize,
}

impl Default for Request {
  fn default() -> Self {
    Self {
      fd: 0,
      offset: 0,
      size: 0,
      host_dst: ptr::null_mut(),
      host_src: ptr::null(),
      gpu_buffer: 0,
      gpu_offset: 0,
      op: RequestOp::default(),
      dst_mem: RequestMemory::default(),
      src_mem: RequestMemory::default(),
      compression: Compression::default(),
      status: RequestStatus::default(),
      errno_value: 0,
      bytes_transferred: 0,
    }
  }
}

// SAFETY: the raw pointers are weak references into caller-owned memory.
// The caller contract (see the type docs) requires those buffers to stay
// valid and unaliased until the completion callback has run, which is the
// whole window in which backend threads touch them.
unsafe impl Send for Request {}

impl Request {
  /// Marks the request failed with `errno`.
  pub(crate) fn mark_failed(&mut self, errno: c_int) {
    self.status = RequestStatus::IoError;
    self.errno_value = errno;
    self.bytes_transferred = 0;
  }

  /// Marks the request completed with `bytes` moved.
  pub(crate) fn mark_ok(&mut self, bytes: usize) {
    self.status = RequestStatus::Ok;
    self.errno_value = 0;
    self.bytes_transferred = bytes;
  }
}

/// Invoked by a backend exactly once per accepted request, on a
/// backend-owned thread, with the final request state.
pub type CompletionCallback = Box<dyn FnOnce(Request) + Send>;
