mod common;

use dsio::{
  Compression, Queue, Request, RequestOp, RequestStatus, make_cpu_backend,
};
use proptest::prelude::*;

#[test]
fn test_basic_read_write() {
  let payload = b"test-read-write-data";
  let path = common::make_temp_path("cpu_rw");

  let fd_write = common::open_write(&path);
  let mut write_req = Request::default();
  write_req.fd = fd_write;
  write_req.size = payload.len();
  write_req.host_src = payload.as_ptr();
  write_req.op = RequestOp::Write;

  let write_queue = Queue::new(make_cpu_backend(2));
  write_queue.enqueue(write_req);
  write_queue.submit_all();
  write_queue.wait_all();
  unsafe { libc::close(fd_write) };

  let completed = write_queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::Ok);
  assert_eq!(completed[0].bytes_transferred, payload.len());

  let fd_read = common::open_read(&path);
  let mut buffer = vec![0u8; payload.len()];
  let mut read_req = Request::default();
  read_req.fd = fd_read;
  read_req.size = payload.len();
  read_req.host_dst = buffer.as_mut_ptr();

  let read_queue = Queue::new(make_cpu_backend(2));
  read_queue.enqueue(read_req);
  read_queue.submit_all();
  read_queue.wait_all();

  let completed = read_queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::Ok);
  assert_eq!(completed[0].bytes_transferred, payload.len());
  assert_eq!(&buffer, payload);

  common::close_and_unlink(fd_read, &path);
}

#[test]
fn test_partial_read_is_ok_and_nul_terminated() {
  let payload = b"short";
  let path = common::write_file("cpu_partial", payload);
  let fd = common::open_read(&path);

  let mut buffer = vec![0xffu8; 100];
  let mut req = Request::default();
  req.fd = fd;
  req.size = buffer.len();
  req.host_dst = buffer.as_mut_ptr();

  let queue = Queue::new(make_cpu_backend(1));
  queue.enqueue(req);
  queue.submit_all();
  queue.wait_all();

  let completed = queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::Ok);
  assert_eq!(completed[0].bytes_transferred, payload.len());
  assert_eq!(&buffer[..payload.len()], payload);
  // Short reads are NUL-terminated for text-mode consumers.
  assert_eq!(buffer[payload.len()], 0);

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_demo_transform_uppercases() {
  let payload = b"lowercase text";
  let path = common::write_file("cpu_transform", payload);
  let fd = common::open_read(&path);

  let mut buffer = vec![0u8; payload.len()];
  let mut req = Request::default();
  req.fd = fd;
  req.size = payload.len();
  req.host_dst = buffer.as_mut_ptr();
  req.compression = Compression::DemoTransform;

  let queue = Queue::new(make_cpu_backend(1));
  queue.enqueue(req);
  queue.submit_all();
  queue.wait_all();

  let completed = queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::Ok);
  assert_eq!(&buffer, b"LOWERCASE TEXT");

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_stubbed_compression_fails_with_enotsup() {
  let payload = b"test data";
  let path = common::write_file("cpu_stubbed", payload);
  let fd = common::open_read(&path);

  let mut buffer = vec![0u8; 100];
  let mut req = Request::default();
  req.fd = fd;
  req.size = payload.len();
  req.host_dst = buffer.as_mut_ptr();
  req.compression = Compression::Stubbed;

  let queue = Queue::new(make_cpu_backend(1));
  queue.enqueue(req);
  queue.submit_all();
  queue.wait_all();

  let completed = queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::IoError);
  assert_eq!(completed[0].errno_value, libc::ENOTSUP);
  assert_eq!(completed[0].bytes_transferred, 0);

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_concurrent_offsets() {
  let payload = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
  let path = common::write_file("cpu_offsets", payload);
  let fd = common::open_read(&path);

  let mut buffers = [vec![0u8; 10], vec![0u8; 10], vec![0u8; 10]];
  let offsets = [0u64, 10, 26];

  let queue = Queue::new(make_cpu_backend(3));
  for (buffer, &offset) in buffers.iter_mut().zip(&offsets) {
    let mut req = Request::default();
    req.fd = fd;
    req.offset = offset;
    req.size = buffer.len();
    req.host_dst = buffer.as_mut_ptr();
    queue.enqueue(req);
  }
  queue.submit_all();
  queue.wait_all();

  assert_eq!(&buffers[0], b"0123456789");
  assert_eq!(&buffers[1], b"ABCDEFGHIJ");
  assert_eq!(&buffers[2], b"QRSTUVWXYZ");
  assert_eq!(queue.total_completed(), 3);
  assert_eq!(queue.total_failed(), 0);
  assert_eq!(queue.total_bytes_transferred(), 30);

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_invalid_fd_fails_with_ebadf() {
  let mut buffer = vec![0u8; 64];
  let mut req = Request::default();
  req.fd = -1;
  req.size = buffer.len();
  req.host_dst = buffer.as_mut_ptr();

  let queue = Queue::new(make_cpu_backend(1));
  queue.enqueue(req);
  queue.submit_all();
  queue.wait_all();

  let completed = queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::IoError);
  assert_eq!(completed[0].errno_value, libc::EBADF);
  assert_eq!(completed[0].bytes_transferred, 0);
}

#[test]
fn test_write_missing_source_fails_with_einval() {
  let path = common::make_temp_path("cpu_nosrc");
  let fd = common::open_write(&path);

  let mut req = Request::default();
  req.fd = fd;
  req.size = 16;
  req.op = RequestOp::Write;

  let queue = Queue::new(make_cpu_backend(1));
  queue.enqueue(req);
  queue.submit_all();
  queue.wait_all();

  let completed = queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::IoError);
  assert_eq!(completed[0].errno_value, libc::EINVAL);

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_default_request_is_rejected() {
  let queue = Queue::new(make_cpu_backend(1));
  queue.enqueue(Request::default());
  queue.submit_all();
  queue.wait_all();

  let completed = queue.take_completed();
  assert_eq!(completed.len(), 1);
  assert_eq!(completed[0].status, RequestStatus::IoError);
  assert_eq!(completed[0].errno_value, libc::EINVAL);
}

proptest! {
  #[test]
  fn prop_read_arbitrary_offsets(
    data_size in 0usize..=8192,
    read_offset in 0u64..=4096,
    buffer_size in 1usize..=4096,
    seed in any::<u64>(),
  ) {
    let data: Vec<u8> = (0..data_size)
      .map(|i| (seed.wrapping_add(i as u64) % 256) as u8)
      .collect();
    let path = common::write_file("cpu_prop", &data);
    let fd = common::open_read(&path);

    let mut buffer = vec![0u8; buffer_size];
    let mut req = Request::default();
    req.fd = fd;
    req.offset = read_offset;
    req.size = buffer_size;
    req.host_dst = buffer.as_mut_ptr();

    let queue = Queue::new(make_cpu_backend(2));
    queue.enqueue(req);
    queue.submit_all();
    queue.wait_all();

    let completed = queue.take_completed();
    common::close_and_unlink(fd, &path);

    prop_assert_eq!(completed.len(), 1);
    prop_assert_eq!(completed[0].status, RequestStatus::Ok);

    let offset = read_offset as usize;
    let expected = buffer_size.min(data_size.saturating_sub(offset));
    prop_assert_eq!(completed[0].bytes_transferred, expected);
    prop_assert_eq!(&buffer[..expected], &data[offset..offset + expected]);
  }
}
