//! GPU upload abstraction for asset importers
//!
//! Importers never talk to a device directly: the loader opens one
//! [`UploadScope`] (a command buffer plus a copy pass) per batch and hands it
//! to every importer of that batch.

pub mod mock;

use std::fmt::Debug;
use thiserror::Error;

pub use mock::MockUploadDevice;

/// Error type for GPU operations
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Failed to acquire command buffer: {0}")]
    AcquireFailed(String),

    #[error("Buffer upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid buffer size: {0}")]
    InvalidSize(usize),

    #[error("Upload scope is already closed")]
    ScopeClosed,

    #[error("Device lost")]
    DeviceLost,
}

/// Result type for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Command buffer recorded by a device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// Copy pass recorded into a command buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CopyPassId(pub u64);

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Texture,
    Shader,
}

/// Device buffer produced by an upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuBuffer {
    pub id: u64,
    pub size: usize,
    pub usage: BufferUsage,
}

/// Device able to record batched uploads
pub trait UploadDevice: Send + Sync + Debug {
    fn acquire_command_buffer(&self) -> GpuResult<CommandBufferId>;

    fn begin_copy_pass(&self, command_buffer: CommandBufferId) -> GpuResult<CopyPassId>;

    /// Record a copy of `data` into a new device buffer
    fn upload(&self, pass: CopyPassId, usage: BufferUsage, data: &[u8]) -> GpuResult<GpuBuffer>;

    fn end_copy_pass(&self, pass: CopyPassId);

    fn submit(&self, command_buffer: CommandBufferId) -> GpuResult<()>;

    /// Get the name of this GPU backend (for debugging)
    fn backend_name(&self) -> &'static str;
}

/// Command buffer and copy pass shared by one load batch.
///
/// Closed exactly once, by [`UploadScope::finish`] or on drop.
pub struct UploadScope<'a> {
    device: &'a dyn UploadDevice,
    command_buffer: CommandBufferId,
    copy_pass: Option<CopyPassId>,
    uploads: usize,
}

impl<'a> UploadScope<'a> {
    /// Acquire a command buffer and begin a copy pass on it
    pub fn begin(device: &'a dyn UploadDevice) -> GpuResult<Self> {
        let command_buffer = device.acquire_command_buffer()?;
        let copy_pass = match device.begin_copy_pass(command_buffer) {
            Ok(pass) => pass,
            Err(e) => {
                if let Err(submit_err) = device.submit(command_buffer) {
                    tracing::warn!("Failed to submit empty command buffer: {submit_err}");
                }
                return Err(e);
            }
        };
        Ok(Self {
            device,
            command_buffer,
            copy_pass: Some(copy_pass),
            uploads: 0,
        })
    }

    pub fn command_buffer(&self) -> CommandBufferId {
        self.command_buffer
    }

    /// Current copy pass, None once the scope is closed
    pub fn copy_pass(&self) -> Option<CopyPassId> {
        self.copy_pass
    }

    pub fn device(&self) -> &dyn UploadDevice {
        self.device
    }

    /// Upload `data` into a new buffer as part of this batch
    pub fn upload(&mut self, usage: BufferUsage, data: &[u8]) -> GpuResult<GpuBuffer> {
        let pass = self.copy_pass.ok_or(GpuError::ScopeClosed)?;
        let buffer = self.device.upload(pass, usage, data)?;
        self.uploads += 1;
        Ok(buffer)
    }

    /// Number of uploads recorded so far
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    /// End the copy pass and submit the command buffer
    pub fn finish(mut self) -> GpuResult<()> {
        self.close()
    }

    fn close(&mut self) -> GpuResult<()> {
        match self.copy_pass.take() {
            Some(pass) => {
                self.device.end_copy_pass(pass);
                self.device.submit(self.command_buffer)
            }
            None => Ok(()),
        }
    }
}

impl Drop for UploadScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to submit upload batch: {e}");
        }
    }
}
