//! Process-wide failure reporting.
//!
//! Every backend failure path emits an [`ErrorContext`] through a single
//! replaceable sink. Embedders install a sink with [`set_error_sink`] to
//! route records into their own logging; with no sink installed, records go
//! to stderr as one `key=value` line (the key set is stable, the order is
//! not).
//!
//! The sink slot is read under a dedicated mutex but invoked outside of it,
//! so a sink may itself call into the reporter without deadlocking.

use std::sync::Arc;

use chrono::{DateTime, Local};
use libc::c_int;
use parking_lot::Mutex;

use crate::request::{Request, RequestMemory, RequestOp};

/// Replaceable destination for diagnostic records.
pub type ErrorSink = Arc<dyn Fn(&ErrorContext) + Send + Sync>;

/// The request fields worth keeping when a failure is reported.
#[derive(Clone, Copy, Debug)]
pub struct RequestSnapshot {
  pub fd: c_int,
  pub offset: u64,
  pub size: usize,
  pub op: RequestOp,
  pub src_mem: RequestMemory,
  pub dst_mem: RequestMemory,
}

impl RequestSnapshot {
  pub fn of(req: &Request) -> Self {
    Self {
      fd: req.fd,
      offset: req.offset,
      size: req.size,
      op: req.op,
      src_mem: req.src_mem,
      dst_mem: req.dst_mem,
    }
  }
}

/// One diagnostic record.
#[derive(Clone, Debug)]
pub struct ErrorContext {
  /// Originating component, e.g. `"cpu"`, `"ring"`, `"gpu"`.
  pub subsystem: &'static str,
  /// The operation that failed, e.g. `"pread"`, `"submit"`.
  pub operation: &'static str,
  /// Human-readable description.
  pub detail: String,
  pub errno_value: c_int,
  pub file: &'static str,
  pub line: u32,
  pub function: &'static str,
  pub timestamp: DateTime<Local>,
  /// Present when the failure is tied to a specific request.
  pub request: Option<RequestSnapshot>,
}

static SINK: Mutex<Option<ErrorSink>> = Mutex::new(None);

/// Installs (or, with `None`, removes) the process-wide sink.
pub fn set_error_sink(sink: Option<ErrorSink>) {
  *SINK.lock() = sink;
}

/// Emits one record. Called through the `report_error!` /
/// `report_request_error!` macros, which capture the source location.
///
/// Never panics; the default sink ignores stderr write failures.
#[allow(clippy::too_many_arguments)]
pub(crate) fn report(
  subsystem: &'static str,
  operation: &'static str,
  detail: &str,
  errno_value: c_int,
  file: &'static str,
  line: u32,
  function: &'static str,
  request: Option<RequestSnapshot>,
) {
  let ctx = ErrorContext {
    subsystem,
    operation,
    detail: detail.to_owned(),
    errno_value,
    file,
    line,
    function,
    timestamp: Local::now(),
    request,
  };

  // Clone the slot and release the lock before invoking, so the sink may
  // re-enter the reporter.
  let sink = SINK.lock().clone();
  match sink {
    Some(sink) => sink(&ctx),
    None => default_sink(&ctx),
  }
}

fn default_sink(ctx: &ErrorContext) {
  use std::io::Write;

  let mut line = format!(
    "timestamp={} subsystem={} operation={} errno={} detail={:?}",
    ctx.timestamp.format("%Y-%m-%d %H:%M:%S"),
    ctx.subsystem,
    ctx.operation,
    ctx.errno_value,
    ctx.detail,
  );
  match &ctx.request {
    Some(req) => {
      line.push_str(&format!(
        " request=yes fd={} offset={} size={} op={} src_mem={} dst_mem={}",
        req.fd, req.offset, req.size, req.op, req.src_mem, req.dst_mem,
      ));
    }
    None => line.push_str(" request=no"),
  }
  line.push_str(&format!(" at {}:{} ({})", ctx.file, ctx.line, ctx.function));

  let _ = writeln!(std::io::stderr().lock(), "{line}");
}
