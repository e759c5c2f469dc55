//! Host thread-pool backend.
//!
//! Runs positional `pread`/`pwrite` on a fixed pool of worker threads and
//! applies the optional post-read transform in place. Host memory only.

use std::ffi::c_void;
use std::sync::Arc;

use libc::{EBADF, EINVAL, EIO, ENOTSUP};

use crate::backends::Backend;
use crate::pool::WorkerPool;
use crate::request::{
  Compression, CompletionCallback, Request, RequestMemory, RequestOp,
  RequestStatus,
};

/// Backend executing requests on `worker_count` host threads.
pub struct CpuBackend {
  pool: WorkerPool,
}

impl CpuBackend {
  pub fn new(worker_count: usize) -> Self {
    Self { pool: WorkerPool::new("dsio-cpu", worker_count) }
  }
}

/// Shared-ownership factory for [`CpuBackend`].
pub fn make_cpu_backend(worker_count: usize) -> Arc<dyn Backend> {
  Arc::new(CpuBackend::new(worker_count))
}

impl Backend for CpuBackend {
  fn submit(&self, mut req: Request, on_complete: CompletionCallback) {
    self.pool.execute(move || {
      run(&mut req);
      on_complete(req);
    });
  }
}

fn run(req: &mut Request) {
  if !validate(req) {
    return;
  }

  let io_result = match req.op {
    RequestOp::Write => syscall!(pwrite(
      req.fd,
      req.host_src as *const c_void,
      req.size,
      req.offset as libc::off_t,
    )),
    RequestOp::Read => syscall!(pread(
      req.fd,
      req.host_dst as *mut c_void,
      req.size,
      req.offset as libc::off_t,
    )),
  };

  let transferred = match io_result {
    Ok(n) => n as usize,
    Err(err) => {
      let errno = err.raw_os_error().unwrap_or(EIO);
      let operation = match req.op {
        RequestOp::Read => "pread",
        RequestOp::Write => "pwrite",
      };
      report_request_error!("cpu", operation, "host I/O failed", req, errno);
      req.mark_failed(errno);
      return;
    }
  };

  req.mark_ok(transferred);

  // Short reads get a trailing NUL so text-mode consumers can treat the
  // buffer as a C string. Binary readers must go by `bytes_transferred`;
  // bytes past that point are not data.
  if req.op == RequestOp::Read && transferred < req.size {
    // SAFETY: host_dst is non-null (validated above) and spans `size`
    // bytes per the caller contract; `transferred < size` keeps the write
    // in bounds.
    unsafe { *req.host_dst.add(transferred) = 0 };
  }

  if req.op == RequestOp::Read && req.status == RequestStatus::Ok {
    decompress(req);
  }
}

fn validate(req: &mut Request) -> bool {
  if req.fd < 0 {
    report_request_error!(
      "cpu",
      "submit",
      "invalid file descriptor",
      req,
      EBADF,
    );
    req.mark_failed(EBADF);
    return false;
  }
  if req.size == 0 {
    report_request_error!(
      "cpu",
      "submit",
      "zero-length request is not allowed",
      req,
      EINVAL,
    );
    req.mark_failed(EINVAL);
    return false;
  }
  if req.op == RequestOp::Read
    && req.dst_mem == RequestMemory::Host
    && req.host_dst.is_null()
  {
    report_request_error!(
      "cpu",
      "submit",
      "read request missing destination buffer",
      req,
      EINVAL,
    );
    req.mark_failed(EINVAL);
    return false;
  }
  if req.op == RequestOp::Write
    && req.src_mem == RequestMemory::Host
    && req.host_src.is_null()
  {
    report_request_error!(
      "cpu",
      "submit",
      "write request missing source buffer",
      req,
      EINVAL,
    );
    req.mark_failed(EINVAL);
    return false;
  }
  if req.dst_mem == RequestMemory::Gpu || req.src_mem == RequestMemory::Gpu {
    report_request_error!(
      "cpu",
      "submit",
      "GPU memory is not supported on the cpu backend",
      req,
      EINVAL,
    );
    req.mark_failed(EINVAL);
    return false;
  }
  true
}

fn decompress(req: &mut Request) {
  match req.compression {
    Compression::None => {}
    Compression::DemoTransform => {
      // SAFETY: host_dst is non-null and spans `size` bytes per the caller
      // contract; the worker has exclusive access until completion.
      let buf =
        unsafe { std::slice::from_raw_parts_mut(req.host_dst, req.size) };
      for byte in buf {
        if *byte == 0 {
          break;
        }
        byte.make_ascii_uppercase();
      }
    }
    Compression::Stubbed => {
      report_request_error!(
        "cpu",
        "decompression",
        "no decompressor is implemented for this stream",
        req,
        ENOTSUP,
      );
      req.mark_failed(ENOTSUP);
    }
  }
}
