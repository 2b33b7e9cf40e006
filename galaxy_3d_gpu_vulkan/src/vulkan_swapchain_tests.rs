use super::*;

fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR { format, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR }
}

fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min_count,
        max_image_count: max_count,
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: 1, height: 1 },
        max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
        ..Default::default()
    }
}

// ============================================================================
// Surface format
// ============================================================================

#[test]
fn test_srgb_surface_format_preferred() {
    let formats = [
        surface_format(vk::Format::R8G8B8A8_UNORM),
        surface_format(vk::Format::B8G8R8A8_UNORM),
        surface_format(vk::Format::B8G8R8A8_SRGB),
    ];
    let (chosen, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    assert_eq!(format, Format::B8G8R8A8_SRGB);
}

#[test]
fn test_unorm_surface_format_second_choice() {
    let formats = [surface_format(vk::Format::R8G8B8A8_UNORM), surface_format(vk::Format::B8G8R8A8_UNORM)];
    let (_, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(format, Format::B8G8R8A8_UNORM);
}

#[test]
fn test_first_known_surface_format_as_fallback() {
    let formats = [
        surface_format(vk::Format::R5G6B5_UNORM_PACK16),
        surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
    ];
    let (_, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(format, Format::A2B10G10R10_UNORM);

    assert!(choose_surface_format(&[surface_format(vk::Format::R5G6B5_UNORM_PACK16)]).is_none());
    assert!(choose_surface_format(&[]).is_none());
}

// ============================================================================
// Present mode, extent, image count
// ============================================================================

#[test]
fn test_vsync_always_uses_fifo() {
    let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_no_vsync_prefers_mailbox_then_immediate() {
    let all = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX];
    assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

    let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
    assert_eq!(choose_present_mode(&no_mailbox, false), vk::PresentModeKHR::IMMEDIATE);

    assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO], false), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_extent_follows_surface() {
    let extent = choose_extent(&caps((800, 600), 2, 8), 1920, 1080);
    assert_eq!((extent.width, extent.height), (800, 600));
}

#[test]
fn test_extent_clamped_when_surface_defers() {
    let extent = choose_extent(&caps((u32::MAX, u32::MAX), 2, 8), 1280, 720);
    assert_eq!((extent.width, extent.height), (1280, 720));

    let extent = choose_extent(&caps((u32::MAX, u32::MAX), 2, 8), 10_000, 0);
    assert_eq!((extent.width, extent.height), (4096, 1));
}

#[test]
fn test_image_count_clamped_to_surface_limits() {
    assert_eq!(choose_image_count(&caps((1, 1), 2, 8), 3), 3);
    assert_eq!(choose_image_count(&caps((1, 1), 3, 8), 2), 3);
    assert_eq!(choose_image_count(&caps((1, 1), 2, 2), 3), 2);
    // No upper bound
    assert_eq!(choose_image_count(&caps((1, 1), 2, 0), 5), 5);
}

#[test]
fn test_composite_alpha_prefers_opaque() {
    let all = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
    assert_eq!(choose_composite_alpha(all), vk::CompositeAlphaFlagsKHR::OPAQUE);
    assert_eq!(
        choose_composite_alpha(vk::CompositeAlphaFlagsKHR::INHERIT),
        vk::CompositeAlphaFlagsKHR::INHERIT
    );
}

#[test]
fn test_suboptimal_flag_maps_to_status() {
    assert_eq!(swapchain_status(false), SwapchainStatus::Optimal);
    assert_eq!(swapchain_status(true), SwapchainStatus::Suboptimal);
}
