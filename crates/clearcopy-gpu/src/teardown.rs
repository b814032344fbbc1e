//! Ordered destruction of driver objects.
//!
//! Every object is pushed here as soon as its creation call succeeds. Flushing
//! destroys them in reverse creation order, so a failure at any step still
//! releases everything created before it.

use ash::vk;

/// A driver object awaiting destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTeardown {
    Image(vk::Image),
    ImageView(vk::ImageView),
    Memory(vk::DeviceMemory),
    RenderPass(vk::RenderPass),
    Framebuffer(vk::Framebuffer),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
}

impl PendingTeardown {
    /// Destroy the object.
    ///
    /// # Safety
    /// The device must be the one that created the object, and the object
    /// must not be in use.
    unsafe fn destroy(self, device: &ash::Device) {
        unsafe {
            match self {
                Self::Image(image) => device.destroy_image(image, None),
                Self::ImageView(view) => device.destroy_image_view(view, None),
                Self::Memory(memory) => device.free_memory(memory, None),
                Self::RenderPass(pass) => device.destroy_render_pass(pass, None),
                Self::Framebuffer(framebuffer) => device.destroy_framebuffer(framebuffer, None),
                // Frees the command buffers allocated from it as well.
                Self::CommandPool(pool) => device.destroy_command_pool(pool, None),
                Self::Fence(fence) => device.destroy_fence(fence, None),
            }
        }
    }
}

/// LIFO stack of objects to destroy.
#[derive(Debug, Default)]
pub struct TeardownStack {
    pending: Vec<PendingTeardown>,
}

impl TeardownStack {
    /// Create an empty stack.
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Record a freshly created object.
    pub fn push(&mut self, object: PendingTeardown) {
        tracing::trace!(?object, "Tracking for teardown");
        self.pending.push(object);
    }

    /// Get the number of pending objects.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Remove all pending objects, newest first.
    pub fn drain(&mut self) -> impl Iterator<Item = PendingTeardown> + '_ {
        self.pending.drain(..).rev()
    }

    /// Destroy all pending objects in reverse creation order.
    ///
    /// Call this after `device_wait_idle()`.
    ///
    /// # Safety
    /// The device must be the one that created every pending object.
    pub unsafe fn flush(&mut self, device: &ash::Device) {
        let count = self.pending.len();
        for object in self.drain() {
            unsafe { object.destroy(device) };
        }
        if count > 0 {
            tracing::debug!("Destroyed {count} driver objects");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn drains_newest_first() {
        let mut stack = TeardownStack::new();
        stack.push(PendingTeardown::Image(vk::Image::from_raw(1)));
        stack.push(PendingTeardown::Memory(vk::DeviceMemory::from_raw(2)));
        stack.push(PendingTeardown::ImageView(vk::ImageView::from_raw(3)));
        assert_eq!(stack.pending_count(), 3);

        let order: Vec<_> = stack.drain().collect();
        assert_eq!(
            order,
            vec![
                PendingTeardown::ImageView(vk::ImageView::from_raw(3)),
                PendingTeardown::Memory(vk::DeviceMemory::from_raw(2)),
                PendingTeardown::Image(vk::Image::from_raw(1)),
            ]
        );
        assert_eq!(stack.pending_count(), 0);
    }

    #[test]
    fn partial_drain_still_empties() {
        let mut stack = TeardownStack::new();
        stack.push(PendingTeardown::Fence(vk::Fence::from_raw(7)));
        stack.push(PendingTeardown::CommandPool(vk::CommandPool::from_raw(8)));

        let first = stack.drain().next();
        assert_eq!(
            first,
            Some(PendingTeardown::CommandPool(vk::CommandPool::from_raw(8)))
        );
        assert_eq!(stack.pending_count(), 0);
    }
}
