//! GPU staging backend.
//!
//! Pairs positional host I/O with transient device staging buffers:
//!
//! - file→GPU: read into a mapped host-visible staging buffer, then a
//!   one-shot command buffer copies staging into the caller's device
//!   buffer.
//! - GPU→file: copy the device buffer into staging, then write the mapped
//!   staging contents to the file.
//! - host↔host: plain positional I/O, no device involvement.
//!
//! Device handles are either borrowed from the embedder (never destroyed
//! here) or created internally as a minimal transfer-only context. Command
//! buffer lifecycle, queue submission and fence waits are serialized by one
//! backend-wide mutex; staging allocation and mapping are not.

use std::ffi::c_void;
use std::sync::Arc;

use ash::vk::{self, Handle};
use libc::{EBADF, EINVAL, EIO, ENODEV, ENOMEM, ENOTSUP, ETIMEDOUT, c_int};
use parking_lot::Mutex;

use crate::backends::Backend;
use crate::pool::WorkerPool;
use crate::request::{
  Compression, CompletionCallback, Request, RequestMemory, RequestOp,
};

/// Bound on every copy-fence wait; a wedged queue fails the request
/// instead of hanging a worker forever.
const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Raw device handles for the backend.
///
/// A null `device` asks the backend to create its own minimal instance and
/// transfer-queue device. Non-null handles are borrowed: the embedder keeps
/// them alive for the backend's lifetime and the backend never destroys
/// them. A null `command_pool` is created (and owned) internally either
/// way.
#[derive(Clone, Copy, Debug)]
pub struct GpuBackendConfig {
  pub instance: vk::Instance,
  pub physical_device: vk::PhysicalDevice,
  pub device: vk::Device,
  pub queue: vk::Queue,
  pub queue_family_index: u32,
  pub command_pool: vk::CommandPool,
  pub worker_count: usize,
}

impl Default for GpuBackendConfig {
  fn default() -> Self {
    Self {
      instance: vk::Instance::null(),
      physical_device: vk::PhysicalDevice::null(),
      device: vk::Device::null(),
      queue: vk::Queue::null(),
      queue_family_index: 0,
      command_pool: vk::CommandPool::null(),
      worker_count: 1,
    }
  }
}

struct DeviceCtx {
  _entry: ash::Entry,
  instance: ash::Instance,
  physical_device: vk::PhysicalDevice,
  device: ash::Device,
  queue: vk::Queue,
  command_pool: vk::CommandPool,
  memory_props: vk::PhysicalDeviceMemoryProperties,
  owns_instance: bool,
  owns_device: bool,
  owns_command_pool: bool,
  // The device queue is externally synchronized; this lock also covers
  // command-buffer allocation and transient teardown on the shared pool.
  queue_lock: Mutex<()>,
}

/// Backend staging file transfers through a Vulkan transfer queue.
///
/// Construction never fails: if the device context cannot be set up, the
/// failure is reported and every subsequent request completes with
/// `IoError(EINVAL)`.
pub struct GpuBackend {
  // Declared before `ctx` so workers drain and join before the device
  // context is torn down.
  pool: WorkerPool,
  ctx: Option<Arc<DeviceCtx>>,
}

impl GpuBackend {
  pub fn new(config: &GpuBackendConfig) -> Self {
    Self {
      pool: WorkerPool::new("dsio-gpu", config.worker_count),
      ctx: DeviceCtx::from_config(config),
    }
  }
}

/// Shared-ownership factory for [`GpuBackend`].
pub fn make_gpu_backend(config: &GpuBackendConfig) -> Arc<dyn Backend> {
  Arc::new(GpuBackend::new(config))
}

impl Backend for GpuBackend {
  fn submit(&self, mut req: Request, on_complete: CompletionCallback) {
    let ctx = self.ctx.clone();
    self.pool.execute(move || {
      run(ctx.as_deref(), &mut req);
      on_complete(req);
    });
  }
}

fn run(ctx: Option<&DeviceCtx>, req: &mut Request) {
  if !validate(req) {
    return;
  }

  let ctx = match ctx {
    Some(ctx) if ctx.physical_device != vk::PhysicalDevice::null() => ctx,
    _ => {
      report_request_error!(
        "gpu",
        "submit",
        "Vulkan device not initialized",
        req,
        EINVAL,
      );
      req.mark_failed(EINVAL);
      return;
    }
  };

  if req.op == RequestOp::Write && req.src_mem == RequestMemory::Gpu {
    gpu_to_file(ctx, req);
  } else if req.op == RequestOp::Read && req.dst_mem == RequestMemory::Gpu {
    file_to_gpu(ctx, req);
  } else {
    host_io(req);
  }
}

fn validate(req: &mut Request) -> bool {
  if req.fd < 0 {
    report_request_error!(
      "gpu",
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
      "gpu",
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
      "gpu",
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
      "gpu",
      "submit",
      "write request missing source buffer",
      req,
      EINVAL,
    );
    req.mark_failed(EINVAL);
    return false;
  }
  if req.compression != Compression::None {
    report_request_error!(
      "gpu",
      "submit",
      "compression is not supported on the gpu backend",
      req,
      ENOTSUP,
    );
    req.mark_failed(ENOTSUP);
    return false;
  }
  true
}

/// Host-only fall-through path.
fn host_io(req: &mut Request) {
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

  match io_result {
    Ok(n) => req.mark_ok(n as usize),
    Err(err) => {
      let errno = err.raw_os_error().unwrap_or(EIO);
      let operation = match req.op {
        RequestOp::Read => "pread",
        RequestOp::Write => "pwrite",
      };
      report_request_error!("gpu", operation, "host I/O failed", req, errno);
      req.mark_failed(errno);
    }
  }
}

/// Read file contents into staging, then copy staging into the device
/// buffer.
fn file_to_gpu(ctx: &DeviceCtx, req: &mut Request) {
  let gpu_buffer = vk::Buffer::from_raw(req.gpu_buffer);
  if gpu_buffer == vk::Buffer::null() {
    report_request_error!(
      "gpu",
      "file_to_gpu",
      "GPU buffer handle is null",
      req,
      EINVAL,
    );
    req.mark_failed(EINVAL);
    return;
  }

  let staging = match StagingBuffer::new(
    ctx,
    req.size,
    vk::BufferUsageFlags::TRANSFER_SRC,
  ) {
    Ok(staging) => staging,
    Err(errno) => {
      report_request_error!(
        "gpu",
        "create_staging_buffer",
        "failed to allocate staging buffer",
        req,
        errno,
      );
      req.mark_failed(errno);
      return;
    }
  };

  let mapped = match staging.map(req.size) {
    Ok(mapped) => mapped,
    Err(errno) => {
      report_request_error!(
        "gpu",
        "map_memory",
        "failed to map staging buffer memory",
        req,
        errno,
      );
      req.mark_failed(errno);
      return;
    }
  };
  let read = syscall!(pread(
    req.fd,
    mapped as *mut c_void,
    req.size,
    req.offset as libc::off_t,
  ));
  staging.unmap();

  let transferred = match read {
    Ok(n) => n as usize,
    Err(err) => {
      let errno = err.raw_os_error().unwrap_or(EIO);
      report_request_error!(
        "gpu",
        "pread",
        "failed to read file into staging buffer",
        req,
        errno,
      );
      req.mark_failed(errno);
      return;
    }
  };

  if let Err(errno) = submit_copy(
    ctx,
    staging.buffer,
    gpu_buffer,
    req.size as vk::DeviceSize,
    0,
    req.gpu_offset,
  ) {
    report_request_error!(
      "gpu",
      "copy_buffer",
      "failed to copy staging buffer to GPU buffer",
      req,
      errno,
    );
    req.mark_failed(errno);
    return;
  }

  req.mark_ok(transferred);
}

/// Copy the device buffer into staging, then write staging to the file.
fn gpu_to_file(ctx: &DeviceCtx, req: &mut Request) {
  let gpu_buffer = vk::Buffer::from_raw(req.gpu_buffer);
  if gpu_buffer == vk::Buffer::null() {
    report_request_error!(
      "gpu",
      "gpu_to_file",
      "GPU buffer handle is null",
      req,
      EINVAL,
    );
    req.mark_failed(EINVAL);
    return;
  }

  let staging = match StagingBuffer::new(
    ctx,
    req.size,
    vk::BufferUsageFlags::TRANSFER_DST,
  ) {
    Ok(staging) => staging,
    Err(errno) => {
      report_request_error!(
        "gpu",
        "create_staging_buffer",
        "failed to allocate staging buffer",
        req,
        errno,
      );
      req.mark_failed(errno);
      return;
    }
  };

  if let Err(errno) = submit_copy(
    ctx,
    gpu_buffer,
    staging.buffer,
    req.size as vk::DeviceSize,
    req.gpu_offset,
    0,
  ) {
    report_request_error!(
      "gpu",
      "copy_buffer",
      "failed to copy GPU buffer to staging buffer",
      req,
      errno,
    );
    req.mark_failed(errno);
    return;
  }

  let mapped = match staging.map(req.size) {
    Ok(mapped) => mapped,
    Err(errno) => {
      report_request_error!(
        "gpu",
        "map_memory",
        "failed to map staging buffer memory",
        req,
        errno,
      );
      req.mark_failed(errno);
      return;
    }
  };
  let written = syscall!(pwrite(
    req.fd,
    mapped as *const c_void,
    req.size,
    req.offset as libc::off_t,
  ));
  staging.unmap();

  match written {
    Ok(n) => req.mark_ok(n as usize),
    Err(err) => {
      let errno = err.raw_os_error().unwrap_or(EIO);
      report_request_error!(
        "gpu",
        "pwrite",
        "failed to write staging buffer to file",
        req,
        errno,
      );
      req.mark_failed(errno);
    }
  }
}

/// Transient host-visible, host-coherent buffer of exactly the request
/// size. Dropping it releases the buffer and its memory.
struct StagingBuffer<'a> {
  ctx: &'a DeviceCtx,
  buffer: vk::Buffer,
  memory: vk::DeviceMemory,
}

impl<'a> StagingBuffer<'a> {
  fn new(
    ctx: &'a DeviceCtx,
    size: usize,
    usage: vk::BufferUsageFlags,
  ) -> Result<Self, c_int> {
    let buffer_info = vk::BufferCreateInfo::default()
      .size(size as vk::DeviceSize)
      .usage(usage)
      .sharing_mode(vk::SharingMode::EXCLUSIVE);
    // SAFETY: the create info is a plain value valid for the call.
    let buffer = match unsafe { ctx.device.create_buffer(&buffer_info, None) }
    {
      Ok(buffer) => buffer,
      Err(_) => {
        report_error!(
          "gpu",
          "create_buffer",
          "failed to create staging buffer",
          EIO,
        );
        return Err(EIO);
      }
    };

    // SAFETY: `buffer` was created on this device above.
    let requirements =
      unsafe { ctx.device.get_buffer_memory_requirements(buffer) };
    let Some(type_index) = find_memory_type(
      &ctx.memory_props,
      requirements.memory_type_bits,
      vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT,
    ) else {
      report_error!(
        "gpu",
        "find_memory_type",
        "no suitable memory type for staging buffer",
        ENOMEM,
      );
      // SAFETY: created above, not yet bound or shared.
      unsafe { ctx.device.destroy_buffer(buffer, None) };
      return Err(ENOMEM);
    };

    let alloc_info = vk::MemoryAllocateInfo::default()
      .allocation_size(requirements.size)
      .memory_type_index(type_index);
    // SAFETY: the allocate info is a plain value valid for the call.
    let memory = match unsafe { ctx.device.allocate_memory(&alloc_info, None) }
    {
      Ok(memory) => memory,
      Err(_) => {
        report_error!(
          "gpu",
          "allocate_memory",
          "failed to allocate staging buffer memory",
          ENOMEM,
        );
        // SAFETY: created above, not yet bound or shared.
        unsafe { ctx.device.destroy_buffer(buffer, None) };
        return Err(ENOMEM);
      }
    };

    // SAFETY: buffer and memory come from this device and are unbound.
    if unsafe { ctx.device.bind_buffer_memory(buffer, memory, 0) }.is_err() {
      report_error!(
        "gpu",
        "bind_buffer_memory",
        "failed to bind staging buffer memory",
        EIO,
      );
      // SAFETY: both were created above and are not in use.
      unsafe {
        ctx.device.destroy_buffer(buffer, None);
        ctx.device.free_memory(memory, None);
      }
      return Err(EIO);
    }

    Ok(Self { ctx, buffer, memory })
  }

  fn map(&self, size: usize) -> Result<*mut u8, c_int> {
    // SAFETY: the memory is host-visible and not currently mapped.
    match unsafe {
      self.ctx.device.map_memory(
        self.memory,
        0,
        size as vk::DeviceSize,
        vk::MemoryMapFlags::empty(),
      )
    } {
      Ok(mapped) => Ok(mapped as *mut u8),
      Err(_) => Err(EIO),
    }
  }

  fn unmap(&self) {
    // SAFETY: only called after a successful map.
    unsafe { self.ctx.device.unmap_memory(self.memory) };
  }
}

impl Drop for StagingBuffer<'_> {
  fn drop(&mut self) {
    // SAFETY: any copy referencing this buffer has been fence-waited by
    // submit_copy before we get here.
    unsafe {
      self.ctx.device.destroy_buffer(self.buffer, None);
      self.ctx.device.free_memory(self.memory, None);
    }
  }
}

fn find_memory_type(
  props: &vk::PhysicalDeviceMemoryProperties,
  type_bits: u32,
  flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
  (0..props.memory_type_count).find(|&index| {
    type_bits & (1 << index) != 0
      && props.memory_types[index as usize].property_flags.contains(flags)
  })
}

/// Records and submits a single buffer-copy region, then waits on a fence
/// bounded by [`FENCE_TIMEOUT_NS`].
fn submit_copy(
  ctx: &DeviceCtx,
  src: vk::Buffer,
  dst: vk::Buffer,
  size: vk::DeviceSize,
  src_offset: vk::DeviceSize,
  dst_offset: vk::DeviceSize,
) -> Result<(), c_int> {
  let _guard = ctx.queue_lock.lock();

  if ctx.command_pool == vk::CommandPool::null()
    || ctx.queue == vk::Queue::null()
  {
    report_error!(
      "gpu",
      "submit_copy",
      "command pool or queue not initialized",
      EINVAL,
    );
    return Err(EINVAL);
  }

  let alloc_info = vk::CommandBufferAllocateInfo::default()
    .command_pool(ctx.command_pool)
    .level(vk::CommandBufferLevel::PRIMARY)
    .command_buffer_count(1);
  // SAFETY: queue_lock serializes use of the shared command pool.
  let cmd = match unsafe { ctx.device.allocate_command_buffers(&alloc_info) }
  {
    Ok(buffers) => buffers[0],
    Err(_) => {
      report_error!(
        "gpu",
        "allocate_command_buffers",
        "failed to allocate command buffer",
        EIO,
      );
      return Err(EIO);
    }
  };

  let free_cmd = || {
    // SAFETY: `cmd` came from this pool and is no longer executing.
    unsafe { ctx.device.free_command_buffers(ctx.command_pool, &[cmd]) };
  };

  let begin_info = vk::CommandBufferBeginInfo::default()
    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
  // SAFETY: `cmd` was just allocated and is in the initial state.
  if unsafe { ctx.device.begin_command_buffer(cmd, &begin_info) }.is_err() {
    report_error!(
      "gpu",
      "begin_command_buffer",
      "failed to begin command buffer",
      EIO,
    );
    free_cmd();
    return Err(EIO);
  }

  let region = vk::BufferCopy { src_offset, dst_offset, size };
  // SAFETY: both buffers are valid for transfer and `cmd` is recording.
  unsafe { ctx.device.cmd_copy_buffer(cmd, src, dst, &[region]) };

  // SAFETY: `cmd` is recording and the copy above is its only command.
  if unsafe { ctx.device.end_command_buffer(cmd) }.is_err() {
    report_error!(
      "gpu",
      "end_command_buffer",
      "failed to end command buffer",
      EIO,
    );
    free_cmd();
    return Err(EIO);
  }

  // SAFETY: the create info is a plain value valid for the call.
  let fence = match unsafe {
    ctx.device.create_fence(&vk::FenceCreateInfo::default(), None)
  } {
    Ok(fence) => fence,
    Err(_) => {
      report_error!("gpu", "create_fence", "failed to create fence", EIO);
      free_cmd();
      return Err(EIO);
    }
  };

  let command_buffers = [cmd];
  let submit_info =
    vk::SubmitInfo::default().command_buffers(&command_buffers);
  // SAFETY: queue access is serialized by queue_lock; `cmd` is executable.
  if unsafe { ctx.device.queue_submit(ctx.queue, &[submit_info], fence) }
    .is_err()
  {
    report_error!("gpu", "queue_submit", "queue submission failed", EIO);
    // SAFETY: the submission failed, so neither object is in use.
    unsafe { ctx.device.destroy_fence(fence, None) };
    free_cmd();
    return Err(EIO);
  }

  // SAFETY: the fence was just submitted on this device.
  let wait = unsafe {
    ctx.device.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS)
  };
  let result = match wait {
    Ok(()) => Ok(()),
    Err(vk::Result::TIMEOUT) => {
      report_error!(
        "gpu",
        "wait_for_fences",
        "timed out waiting for the copy fence",
        ETIMEDOUT,
      );
      Err(ETIMEDOUT)
    }
    Err(_) => {
      report_error!("gpu", "wait_for_fences", "fence wait failed", EIO);
      Err(EIO)
    }
  };

  // SAFETY: execution finished (or the failure is already being reported);
  // transient objects are not referenced past this point.
  unsafe { ctx.device.destroy_fence(fence, None) };
  free_cmd();
  result
}

impl DeviceCtx {
  /// Borrows the configured handles, or creates a minimal context when the
  /// config carries no device. Returns `None` (after reporting) when no
  /// usable device can be set up.
  fn from_config(config: &GpuBackendConfig) -> Option<Arc<Self>> {
    // SAFETY: loading the Vulkan loader library has no preconditions.
    let entry = match unsafe { ash::Entry::load() } {
      Ok(entry) => entry,
      Err(_) => {
        report_error!(
          "gpu",
          "loader_init",
          "failed to load the Vulkan loader",
          ENODEV,
        );
        return None;
      }
    };

    if config.device != vk::Device::null() {
      Self::from_borrowed(entry, config)
    } else {
      Self::create_minimal(entry, config.worker_count)
    }
  }

  fn from_borrowed(
    entry: ash::Entry,
    config: &GpuBackendConfig,
  ) -> Option<Arc<Self>> {
    // SAFETY: the embedder guarantees the handles are valid and outlive
    // the backend.
    let instance =
      unsafe { ash::Instance::load(entry.static_fn(), config.instance) };
    // SAFETY: as above; the device belongs to `instance`.
    let device =
      unsafe { ash::Device::load(instance.fp_v1_0(), config.device) };
    // SAFETY: physical_device is a valid handle from `instance`.
    let memory_props = unsafe {
      instance.get_physical_device_memory_properties(config.physical_device)
    };

    let mut command_pool = config.command_pool;
    let mut owns_command_pool = false;
    if command_pool == vk::CommandPool::null() {
      command_pool =
        create_command_pool(&device, config.queue_family_index)?;
      owns_command_pool = true;
    }

    Some(Arc::new(Self {
      _entry: entry,
      instance,
      physical_device: config.physical_device,
      device,
      queue: config.queue,
      command_pool,
      memory_props,
      owns_instance: false,
      owns_device: false,
      owns_command_pool,
      queue_lock: Mutex::new(()),
    }))
  }

  fn create_minimal(
    entry: ash::Entry,
    _worker_count: usize,
  ) -> Option<Arc<Self>> {
    let app_info = vk::ApplicationInfo::default()
      .application_name(c"dsio")
      .application_version(vk::make_api_version(0, 0, 1, 0))
      .engine_name(c"dsio")
      .engine_version(vk::make_api_version(0, 0, 1, 0))
      .api_version(vk::API_VERSION_1_1);
    let instance_info =
      vk::InstanceCreateInfo::default().application_info(&app_info);

    // SAFETY: the create info is a plain value valid for the call.
    let instance = match unsafe { entry.create_instance(&instance_info, None) }
    {
      Ok(instance) => instance,
      Err(_) => {
        report_error!(
          "gpu",
          "create_instance",
          "failed to create Vulkan instance",
          EIO,
        );
        return None;
      }
    };

    // SAFETY: `instance` is valid.
    let physical_devices =
      unsafe { instance.enumerate_physical_devices() }.unwrap_or_default();
    let Some(&physical_device) = physical_devices.first() else {
      report_error!(
        "gpu",
        "enumerate_devices",
        "no Vulkan devices available",
        ENODEV,
      );
      // SAFETY: we own this instance and nothing else references it.
      unsafe { instance.destroy_instance(None) };
      return None;
    };

    // SAFETY: `physical_device` came from this instance.
    let families = unsafe {
      instance.get_physical_device_queue_family_properties(physical_device)
    };
    let queue_family_index = families
      .iter()
      .position(|family| {
        family.queue_flags.contains(vk::QueueFlags::TRANSFER)
      })
      .unwrap_or(0) as u32;

    let priorities = [1.0f32];
    let queue_infos = [vk::DeviceQueueCreateInfo::default()
      .queue_family_index(queue_family_index)
      .queue_priorities(&priorities)];
    let device_info =
      vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);

    // SAFETY: the create info is a plain value valid for the call.
    let device = match unsafe {
      instance.create_device(physical_device, &device_info, None)
    } {
      Ok(device) => device,
      Err(_) => {
        report_error!(
          "gpu",
          "create_device",
          "failed to create Vulkan device",
          EIO,
        );
        // SAFETY: we own this instance and nothing else references it.
        unsafe { instance.destroy_instance(None) };
        return None;
      }
    };

    // SAFETY: queue 0 of the requested family exists on this device.
    let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

    let Some(command_pool) = create_command_pool(&device, queue_family_index)
    else {
      // SAFETY: we own both and nothing else references them.
      unsafe {
        device.destroy_device(None);
        instance.destroy_instance(None);
      }
      return None;
    };

    // SAFETY: `physical_device` came from this instance.
    let memory_props = unsafe {
      instance.get_physical_device_memory_properties(physical_device)
    };

    Some(Arc::new(Self {
      _entry: entry,
      instance,
      physical_device,
      device,
      queue,
      command_pool,
      memory_props,
      owns_instance: true,
      owns_device: true,
      owns_command_pool: true,
      queue_lock: Mutex::new(()),
    }))
  }
}

fn create_command_pool(
  device: &ash::Device,
  queue_family_index: u32,
) -> Option<vk::CommandPool> {
  let pool_info = vk::CommandPoolCreateInfo::default()
    .queue_family_index(queue_family_index)
    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
  // SAFETY: the create info is a plain value valid for the call.
  match unsafe { device.create_command_pool(&pool_info, None) } {
    Ok(pool) => Some(pool),
    Err(_) => {
      report_error!(
        "gpu",
        "create_command_pool",
        "failed to create command pool",
        EIO,
      );
      None
    }
  }
}

impl Drop for DeviceCtx {
  fn drop(&mut self) {
    // Quiesce all device work, then release only what we own, in reverse
    // creation order. Borrowed handles are left untouched.
    // SAFETY: the worker pool has been joined, so no transient objects
    // remain and nothing else is using the owned handles.
    unsafe {
      let _ = self.device.device_wait_idle();
      if self.owns_command_pool
        && self.command_pool != vk::CommandPool::null()
      {
        self.device.destroy_command_pool(self.command_pool, None);
      }
      if self.owns_device {
        self.device.destroy_device(None);
      }
      if self.owns_instance {
        self.instance.destroy_instance(None);
      }
    }
  }
}
