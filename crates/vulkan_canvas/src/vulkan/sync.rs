//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! Semaphores order queue submissions on the GPU and are never observed from
//! the CPU. Fences are the only CPU-visible completion signal; every wait on
//! them is bounded and reports a timeout instead of blocking forever.

use ash::vk;
use std::time::Duration;

use super::{DeviceRef, VulkanResult};

/// Default bound on a single fence wait (1 second)
pub const DEFAULT_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// GPU-GPU synchronization primitive with automatic resource management
///
/// Signaled by one queue submission and waited on by exactly one later
/// submission or presentation.
pub struct Semaphore {
    device: DeviceRef,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: DeviceRef) -> VulkanResult<Self> {
        let semaphore = device.create_semaphore()?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Semaphore").field(&self.semaphore).finish()
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: DeviceRef,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: DeviceRef, signaled: bool) -> VulkanResult<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self { device, fence })
    }

    /// Wait for the fence; `Ok(false)` if the timeout expired first
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<bool> {
        self.device.wait_for_fence(self.fence, timeout_ns)
    }

    /// Poll the fence in `step` sized waits until it signals
    ///
    /// After `max_attempts` unsuccessful waits the whole device is waited
    /// idle instead, which also guarantees the fence's work has finished.
    pub fn wait_idle(&self, step: Duration, max_attempts: u32) -> VulkanResult<()> {
        let step_ns = u64::try_from(step.as_nanos()).unwrap_or(u64::MAX);

        for _ in 0..max_attempts {
            if self.wait(step_ns)? {
                return Ok(());
            }
        }

        log::warn!("Fence {:?} did not signal after {} waits, waiting for device idle", self.fence, max_attempts);
        self.device.wait_idle()
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        self.device.reset_fence(self.fence)
    }

    /// Non-blocking status query
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        self.device.fence_signaled(self.fence)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Fence").field(&self.fence).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDevice};

    #[test]
    fn test_fence_lifecycle() {
        let mock = MockDevice::new();
        let fence = Fence::new(mock.device(), true).unwrap();

        assert!(fence.wait(DEFAULT_FENCE_TIMEOUT_NS).unwrap());
        fence.reset().unwrap();
        assert!(!fence.is_signaled().unwrap());
        assert!(!fence.wait(DEFAULT_FENCE_TIMEOUT_NS).unwrap());

        let handle = fence.handle();
        drop(fence);
        assert!(mock.calls().contains(&Call::DestroyFence(handle)));
    }

    #[test]
    fn test_wait_idle_falls_back_to_device() {
        let mock = MockDevice::new();
        let fence = Fence::new(mock.device(), false).unwrap();

        fence.wait_idle(Duration::from_millis(1), 3).unwrap();
        assert_eq!(mock.count(|c| matches!(c, Call::WaitIdle)), 1);
    }

    #[test]
    fn test_semaphore_destroyed_on_drop() {
        let mock = MockDevice::new();
        let semaphore = Semaphore::new(mock.device()).unwrap();
        let handle = semaphore.handle();
        drop(semaphore);
        assert!(mock.calls().contains(&Call::DestroySemaphore(handle)));
    }
}
