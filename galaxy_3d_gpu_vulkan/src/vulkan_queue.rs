/// Queue family selection and the per-queue-type submission queues

use ash::vk;
use galaxy_3d_gpu::galaxy3d::gpu::QueueType;
use std::sync::{Mutex, MutexGuard};

use crate::vulkan::lock;

/// Queue family chosen for each queue type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueFamilies {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamilies {
    /// Pick the families for a device
    ///
    /// Graphics takes the first family with graphics support. With
    /// `prefer_dedicated`, compute takes a family without graphics and
    /// transfer a family with neither graphics nor compute; otherwise they
    /// share the graphics family.
    pub fn select(families: &[vk::QueueFamilyProperties], prefer_dedicated: bool) -> Option<QueueFamilies> {
        let find = |predicate: &dyn Fn(vk::QueueFlags) -> bool| {
            families
                .iter()
                .position(|family| family.queue_count > 0 && predicate(family.queue_flags))
                .map(|index| index as u32)
        };

        let graphics = find(&|flags| flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))?;
        if !prefer_dedicated {
            return Some(QueueFamilies { graphics, compute: graphics, transfer: graphics });
        }

        let compute = find(&|flags| flags.contains(vk::QueueFlags::COMPUTE) && !flags.contains(vk::QueueFlags::GRAPHICS))
            .unwrap_or(graphics);
        let transfer = find(&|flags| {
            flags.contains(vk::QueueFlags::TRANSFER)
                && !flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .unwrap_or(graphics);

        Some(QueueFamilies { graphics, compute, transfer })
    }

    pub fn family(&self, queue: QueueType) -> u32 {
        match queue {
            QueueType::Graphics => self.graphics,
            QueueType::Compute => self.compute,
            QueueType::Transfer => self.transfer,
        }
    }

    /// Distinct families, in graphics, compute, transfer order
    pub fn unique(&self) -> Vec<u32> {
        let mut unique = Vec::with_capacity(3);
        for family in [self.graphics, self.compute, self.transfer] {
            if !unique.contains(&family) {
                unique.push(family);
            }
        }
        unique
    }

    pub fn dedicated_compute(&self) -> bool {
        self.compute != self.graphics
    }

    pub fn dedicated_transfer(&self) -> bool {
        self.transfer != self.graphics && self.transfer != self.compute
    }
}

/// One queue per distinct family
///
/// Queue types that share a family share the queue and its lock, since
/// Vulkan requires external synchronization of `vkQueueSubmit`.
pub(crate) struct Queues {
    families: QueueFamilies,
    queues: Vec<(u32, Mutex<vk::Queue>)>,
}

impl Queues {
    /// # Safety
    /// `device` must have been created with one queue for each of `families.unique()`
    pub unsafe fn new(device: &ash::Device, families: QueueFamilies) -> Self {
        let queues = families
            .unique()
            .into_iter()
            .map(|family| (family, Mutex::new(device.get_device_queue(family, 0))))
            .collect();
        Self { families, queues }
    }

    pub fn families(&self) -> &QueueFamilies {
        &self.families
    }

    pub fn get(&self, queue: QueueType) -> &Mutex<vk::Queue> {
        let family = self.families.family(queue);
        let index = self.queues.iter().position(|(f, _)| *f == family).unwrap_or(0);
        &self.queues[index].1
    }

    /// Hold every queue, for device-wide operations such as `vkDeviceWaitIdle`
    pub fn lock_all(&self) -> Vec<MutexGuard<'_, vk::Queue>> {
        self.queues.iter().map(|(_, queue)| lock(queue)).collect()
    }
}

/// Preference order when several adapters are present
pub(crate) fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

#[cfg(test)]
#[path = "vulkan_queue_tests.rs"]
mod tests;
