use super::*;

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties { queue_flags: flags, queue_count: 1, ..Default::default() }
}

fn desktop_families() -> Vec<vk::QueueFamilyProperties> {
    vec![
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING),
    ]
}

#[test]
fn test_dedicated_families_are_preferred() {
    let families = QueueFamilies::select(&desktop_families(), true).unwrap();
    assert_eq!(families, QueueFamilies { graphics: 0, compute: 1, transfer: 2 });
    assert!(families.dedicated_compute());
    assert!(families.dedicated_transfer());
    assert_eq!(families.unique(), vec![0, 1, 2]);
}

#[test]
fn test_shared_families_without_preference() {
    let families = QueueFamilies::select(&desktop_families(), false).unwrap();
    assert_eq!(families, QueueFamilies { graphics: 0, compute: 0, transfer: 0 });
    assert!(!families.dedicated_compute());
    assert!(!families.dedicated_transfer());
    assert_eq!(families.unique(), vec![0]);
}

#[test]
fn test_missing_dedicated_families_fall_back_to_graphics() {
    let single = vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
    let families = QueueFamilies::select(&single, true).unwrap();
    assert_eq!(families, QueueFamilies { graphics: 0, compute: 0, transfer: 0 });

    // Async compute but no transfer-only family
    let two = vec![single[0], family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
    let families = QueueFamilies::select(&two, true).unwrap();
    assert_eq!(families, QueueFamilies { graphics: 0, compute: 1, transfer: 0 });
    assert_eq!(families.family(QueueType::Transfer), 0);
    assert_eq!(families.unique(), vec![0, 1]);
}

#[test]
fn test_no_graphics_family_is_rejected() {
    let compute_only = vec![family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
    assert_eq!(QueueFamilies::select(&compute_only, true), None);

    let empty = vec![vk::QueueFamilyProperties {
        queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        queue_count: 0,
        ..Default::default()
    }];
    assert_eq!(QueueFamilies::select(&empty, false), None);
}

#[test]
fn test_discrete_gpus_rank_first() {
    assert!(device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU) > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU));
    assert!(device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU) > device_type_score(vk::PhysicalDeviceType::CPU));
    assert_eq!(device_type_score(vk::PhysicalDeviceType::OTHER), 0);
}
