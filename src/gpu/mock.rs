//! Mock upload device for testing
//!
//! Records every command buffer, copy pass and upload in counters so tests can
//! check how batches were scoped without GPU hardware.

use super::{BufferUsage, CommandBufferId, CopyPassId, GpuBuffer, GpuError, GpuResult, UploadDevice};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicU64,
    command_buffers_acquired: AtomicU64,
    command_buffers_submitted: AtomicU64,
    copy_passes_begun: AtomicU64,
    copy_passes_ended: AtomicU64,
    uploads: AtomicU64,
    bytes_uploaded: AtomicU64,
    fail_acquire: AtomicBool,
}

/// Snapshot of what a [`MockUploadDevice`] recorded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MockUploadStats {
    pub command_buffers_acquired: u64,
    pub command_buffers_submitted: u64,
    pub copy_passes_begun: u64,
    pub copy_passes_ended: u64,
    pub uploads: u64,
    pub bytes_uploaded: u64,
}

impl MockUploadStats {
    /// Copy passes begun but not yet ended
    pub fn open_scopes(&self) -> u64 {
        self.copy_passes_begun - self.copy_passes_ended
    }
}

/// In-memory upload device. Clones share their counters.
#[derive(Clone, Debug, Default)]
pub struct MockUploadDevice {
    counters: Arc<Counters>,
}

impl MockUploadDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MockUploadStats {
        let c = &self.counters;
        MockUploadStats {
            command_buffers_acquired: c.command_buffers_acquired.load(Ordering::Relaxed),
            command_buffers_submitted: c.command_buffers_submitted.load(Ordering::Relaxed),
            copy_passes_begun: c.copy_passes_begun.load(Ordering::Relaxed),
            copy_passes_ended: c.copy_passes_ended.load(Ordering::Relaxed),
            uploads: c.uploads.load(Ordering::Relaxed),
            bytes_uploaded: c.bytes_uploaded.load(Ordering::Relaxed),
        }
    }

    /// Make command buffer acquisition fail, simulating a lost device
    pub fn set_fail_acquire(&self, fail: bool) {
        self.counters.fail_acquire.store(fail, Ordering::Relaxed);
    }

    fn next_id(&self) -> u64 {
        self.counters.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl UploadDevice for MockUploadDevice {
    fn acquire_command_buffer(&self) -> GpuResult<CommandBufferId> {
        if self.counters.fail_acquire.load(Ordering::Relaxed) {
            return Err(GpuError::AcquireFailed("mock device set to fail".to_string()));
        }
        self.counters
            .command_buffers_acquired
            .fetch_add(1, Ordering::Relaxed);
        Ok(CommandBufferId(self.next_id()))
    }

    fn begin_copy_pass(&self, _command_buffer: CommandBufferId) -> GpuResult<CopyPassId> {
        self.counters.copy_passes_begun.fetch_add(1, Ordering::Relaxed);
        Ok(CopyPassId(self.next_id()))
    }

    fn upload(&self, _pass: CopyPassId, usage: BufferUsage, data: &[u8]) -> GpuResult<GpuBuffer> {
        if data.is_empty() {
            return Err(GpuError::InvalidSize(0));
        }
        self.counters.uploads.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_uploaded
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(GpuBuffer {
            id: self.next_id(),
            size: data.len(),
            usage,
        })
    }

    fn end_copy_pass(&self, _pass: CopyPassId) {
        self.counters.copy_passes_ended.fetch_add(1, Ordering::Relaxed);
    }

    fn submit(&self, _command_buffer: CommandBufferId) -> GpuResult<()> {
        self.counters
            .command_buffers_submitted
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_upload_counts_bytes() {
        let device = MockUploadDevice::new();
        let cmd = device.acquire_command_buffer().unwrap();
        let pass = device.begin_copy_pass(cmd).unwrap();
        let buffer = device.upload(pass, BufferUsage::Texture, &[0u8; 64]).unwrap();
        assert_eq!(buffer.size, 64);
        assert_eq!(device.stats().bytes_uploaded, 64);
        assert_eq!(device.stats().open_scopes(), 1);
    }

    #[test]
    fn test_mock_rejects_empty_upload() {
        let device = MockUploadDevice::new();
        let result = device.upload(CopyPassId(1), BufferUsage::Vertex, &[]);
        assert!(matches!(result, Err(GpuError::InvalidSize(0))));
    }

    #[test]
    fn test_mock_fail_acquire() {
        let device = MockUploadDevice::new();
        device.set_fail_acquire(true);
        assert!(device.acquire_command_buffer().is_err());
        assert_eq!(device.backend_name(), "Mock");
    }
}
