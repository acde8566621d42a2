// Frame synchronization
//
// One set of fences/semaphores per frame in flight: CPU waits on the
// fence before reusing a slot, semaphores order acquire -> submit -> present.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Sync objects for one in-flight frame.
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
                in_flight: device.device.create_fence(&fence_info, None)?,
            })
        }
    }

    /// Block until the frame that last used this slot finished. The fence
    /// stays signaled; `reset` rearms it just before resubmission.
    pub fn wait(&self, device: &VulkanDevice) -> Result<()> {
        unsafe {
            device
                .device
                .wait_for_fences(&[self.in_flight], true, u64::MAX)?;
        }
        Ok(())
    }

    pub fn reset(&self, device: &VulkanDevice) -> Result<()> {
        unsafe {
            device.device.reset_fences(&[self.in_flight])?;
        }
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}
