macro_rules! syscall {
  ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
    #[allow(unused_unsafe)]
    let res = unsafe { libc::$fn($($arg, )*) };
    if res == -1 {
      Err(std::io::Error::last_os_error())
    } else {
      Ok(res)
    }
  }};
}

/// Path of the enclosing function, for diagnostic records.
macro_rules! function_path {
  () => {{
    fn f() {}
    fn type_name_of<T>(_: T) -> &'static str {
      std::any::type_name::<T>()
    }
    let name = type_name_of(f);
    name.strip_suffix("::f").unwrap_or(name)
  }};
}

/// Reports a failure with the source location of the call site.
macro_rules! report_error {
  ($subsystem:expr, $operation:expr, $detail:expr, $errno:expr $(,)?) => {
    $crate::diag::report(
      $subsystem,
      $operation,
      $detail,
      $errno,
      file!(),
      line!(),
      function_path!(),
      None,
    )
  };
}

/// Like [`report_error!`], with a snapshot of the offending request.
macro_rules! report_request_error {
  (
    $subsystem:expr,
    $operation:expr,
    $detail:expr,
    $req:expr,
    $errno:expr $(,)?
  ) => {
    $crate::diag::report(
      $subsystem,
      $operation,
      $detail,
      $errno,
      file!(),
      line!(),
      function_path!(),
      Some($crate::diag::RequestSnapshot::of($req)),
    )
  };
}
