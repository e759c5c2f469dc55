//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dsio::{ErrorContext, ErrorSink, set_error_sink};

static NEXT_FILE: AtomicUsize = AtomicUsize::new(0);

/// Unique `/tmp` path for this process.
pub fn make_temp_path(tag: &str) -> CString {
  let unique = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
  CString::new(format!(
    "/tmp/dsio_test_{tag}_{}_{unique}",
    std::process::id()
  ))
  .unwrap()
}

/// Creates (truncating) a file containing `payload` and returns its path.
pub fn write_file(tag: &str, payload: &[u8]) -> CString {
  let path = make_temp_path(tag);
  let fd = unsafe {
    libc::open(
      path.as_ptr(),
      libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC,
      0o644,
    )
  };
  assert!(fd >= 0, "failed to create test file");
  let written = unsafe {
    libc::write(fd, payload.as_ptr() as *const libc::c_void, payload.len())
  };
  assert_eq!(written as usize, payload.len(), "failed to write test file");
  unsafe { libc::close(fd) };
  path
}

pub fn open_read(path: &CString) -> libc::c_int {
  let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY) };
  assert!(fd >= 0, "failed to open test file for reading");
  fd
}

pub fn open_write(path: &CString) -> libc::c_int {
  let fd = unsafe {
    libc::open(
      path.as_ptr(),
      libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC,
      0o644,
    )
  };
  assert!(fd >= 0, "failed to open test file for writing");
  fd
}

pub fn close_and_unlink(fd: libc::c_int, path: &CString) {
  unsafe {
    libc::close(fd);
    libc::unlink(path.as_ptr());
  }
}

static SINK_LOCK: Mutex<()> = Mutex::new(());

/// Captured diagnostic records plus a guard serializing access to the
/// process-wide sink. Dropping it uninstalls the sink.
pub struct CapturedErrors {
  records: Arc<Mutex<Vec<ErrorContext>>>,
  _guard: MutexGuard<'static, ()>,
}

impl CapturedErrors {
  /// Installs a capturing sink. Tests touching the global sink take the
  /// same lock, so they cannot see each other's records.
  pub fn install() -> Self {
    let guard = SINK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink_records = Arc::clone(&records);
    let sink: ErrorSink = Arc::new(move |ctx: &ErrorContext| {
      sink_records.lock().unwrap().push(ctx.clone());
    });
    set_error_sink(Some(sink));
    Self { records, _guard: guard }
  }

  pub fn records(&self) -> Vec<ErrorContext> {
    self.records.lock().unwrap().clone()
  }

  pub fn count(&self) -> usize {
    self.records.lock().unwrap().len()
  }
}

impl Drop for CapturedErrors {
  fn drop(&mut self) {
    set_error_sink(None);
  }
}
