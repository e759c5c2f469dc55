mod common;

use std::sync::Arc;
use std::thread;

use dsio::{Queue, Request, RequestStatus, make_cpu_backend};

#[test]
fn test_stats_accumulate_across_batches() {
  let payload = b"statistics-payload";
  let path = common::write_file("queue_stats", payload);
  let fd = common::open_read(&path);

  let queue = Queue::new(make_cpu_backend(2));

  let mut buffers = [vec![0u8; payload.len()], vec![0u8; payload.len()]];
  for buffer in buffers.iter_mut() {
    let mut req = Request::default();
    req.fd = fd;
    req.size = buffer.len();
    req.host_dst = buffer.as_mut_ptr();
    queue.enqueue(req);
  }
  queue.submit_all();
  queue.wait_all();

  assert_eq!(queue.total_completed(), 2);
  assert_eq!(queue.total_failed(), 0);
  assert_eq!(queue.total_bytes_transferred(), 2 * payload.len() as u64);

  // A failing request only bumps the failure counter.
  let mut bad = Request::default();
  bad.fd = -1;
  bad.size = 8;
  bad.host_dst = buffers[0].as_mut_ptr();
  queue.enqueue(bad);
  queue.submit_all();
  queue.wait_all();

  assert_eq!(queue.total_completed(), 3);
  assert_eq!(queue.total_failed(), 1);
  assert_eq!(queue.total_bytes_transferred(), 2 * payload.len() as u64);

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_take_completed_is_idempotent() {
  let payload = b"take-completed";
  let path = common::write_file("queue_take", payload);
  let fd = common::open_read(&path);

  let mut buffer = vec![0u8; payload.len()];
  let mut req = Request::default();
  req.fd = fd;
  req.size = buffer.len();
  req.host_dst = buffer.as_mut_ptr();

  let queue = Queue::new(make_cpu_backend(1));
  queue.enqueue(req);
  queue.submit_all();
  queue.wait_all();

  let first = queue.take_completed();
  assert_eq!(first.len(), 1);
  assert_eq!(first[0].status, RequestStatus::Ok);

  let second = queue.take_completed();
  assert!(second.is_empty());

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_in_flight_returns_to_zero() {
  let payload = b"in-flight";
  let path = common::write_file("queue_inflight", payload);
  let fd = common::open_read(&path);

  let queue = Queue::new(make_cpu_backend(2));
  assert_eq!(queue.in_flight(), 0);

  let mut buffers: Vec<Vec<u8>> = (0..8).map(|_| vec![0u8; 4]).collect();
  for buffer in buffers.iter_mut() {
    let mut req = Request::default();
    req.fd = fd;
    req.size = buffer.len();
    req.host_dst = buffer.as_mut_ptr();
    queue.enqueue(req);
  }
  // Enqueueing alone puts nothing in flight.
  assert_eq!(queue.in_flight(), 0);

  queue.submit_all();
  queue.wait_all();
  assert_eq!(queue.in_flight(), 0);
  assert_eq!(queue.total_completed(), 8);

  common::close_and_unlink(fd, &path);
}

#[test]
fn test_wait_all_with_nothing_submitted_returns() {
  let queue = Queue::new(make_cpu_backend(1));
  queue.wait_all();
  assert!(queue.take_completed().is_empty());
}

#[test]
fn test_enqueue_is_thread_safe() {
  let payload = b"threaded-enqueue";
  let path = common::write_file("queue_threads", payload);
  let fd = common::open_read(&path);

  let queue = Arc::new(Queue::new(make_cpu_backend(4)));
  let threads = 4;
  let per_thread = 16;

  // Each thread owns its buffers for the whole queue lifetime.
  let mut buffer_sets: Vec<Vec<Vec<u8>>> = (0..threads)
    .map(|_| (0..per_thread).map(|_| vec![0u8; payload.len()]).collect())
    .collect();

  thread::scope(|scope| {
    for buffers in buffer_sets.iter_mut() {
      let queue = Arc::clone(&queue);
      scope.spawn(move || {
        for buffer in buffers.iter_mut() {
          let mut req = Request::default();
          req.fd = fd;
          req.size = buffer.len();
          req.host_dst = buffer.as_mut_ptr();
          queue.enqueue(req);
        }
      });
    }
  });

  queue.submit_all();
  queue.wait_all();

  assert_eq!(queue.total_completed(), threads * per_thread);
  assert_eq!(queue.total_failed(), 0);
  assert_eq!(queue.take_completed().len(), threads * per_thread);

  common::close_and_unlink(fd, &path);
}
