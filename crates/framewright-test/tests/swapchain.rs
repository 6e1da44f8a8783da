//! Swapchain negotiation, acquisition and recreation.

use std::sync::Arc;

use ash::vk;
use framewright_gpu::{GpuError, SwapchainState, MIN_SWAPCHAIN_IMAGES};
use framewright_test::{swapchain, test_queue, Call, RecordingDispatch, DEFAULT_IMAGE_COUNT, WINDOW_SIZE};
use glam::IVec2;

fn semaphore() -> vk::Semaphore {
    use ash::vk::Handle;
    vk::Semaphore::from_raw(0xdead)
}

#[test]
fn creation_negotiates_format_extent_and_images() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    assert_eq!(swapchain.format(), vk::Format::B8G8R8A8_SRGB);
    assert_eq!(swapchain.size(), WINDOW_SIZE);
    assert_eq!(swapchain.image_count(), DEFAULT_IMAGE_COUNT as usize);
    assert_eq!(swapchain.image_views().count(), DEFAULT_IMAGE_COUNT as usize);
    assert_eq!(swapchain.state(), SwapchainState::Ready);

    let descriptor = swapchain.descriptor();
    assert_eq!(descriptor.present_mode, vk::PresentModeKHR::FIFO);
    assert_eq!(descriptor.min_image_count, MIN_SWAPCHAIN_IMAGES);
    assert_eq!(descriptor.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);

    let calls = dispatch.calls();
    let wait = calls.iter().position(|c| *c == Call::DeviceWaitIdle).unwrap();
    let create = calls
        .iter()
        .position(|c| matches!(c, Call::CreateSwapchain { .. }))
        .unwrap();
    assert!(wait < create);
}

#[test]
fn defined_surface_extent_wins() {
    let dispatch = Arc::new(RecordingDispatch::new().with_surface_extent(800, 600));
    let swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    assert_eq!(swapchain.size(), IVec2::new(800, 600));
}

#[test]
fn surface_image_limit_below_three_is_honored() {
    let dispatch = Arc::new(
        RecordingDispatch::new()
            .with_max_image_count(2)
            .with_image_count(2),
    );
    let swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    assert_eq!(swapchain.descriptor().min_image_count, 2);
    assert_eq!(swapchain.image_count(), 2);
    assert_eq!(
        dispatch.count(|c| matches!(c, Call::CreateSwapchain { min_image_count: 2, .. })),
        1
    );
}

#[test]
fn creation_on_zero_surface_extent_is_an_error() {
    let dispatch = Arc::new(RecordingDispatch::new().with_surface_extent(0, 0));
    let err = swapchain(&dispatch, WINDOW_SIZE).unwrap_err();

    assert!(matches!(err, GpuError::Swapchain(_)));
    assert_eq!(dispatch.count(|c| matches!(c, Call::CreateSwapchain { .. })), 0);
}

#[test]
fn recreate_on_zero_surface_extent_leaves_swapchain_untouched() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();
    let views: Vec<_> = swapchain.image_views().collect();
    dispatch.set_surface_extent(0, 0);
    dispatch.clear_calls();

    assert!(!swapchain.recreate(WINDOW_SIZE).unwrap());

    assert_eq!(dispatch.calls(), vec![Call::SurfaceCapabilities]);
    assert_eq!(swapchain.size(), WINDOW_SIZE);
    assert_eq!(swapchain.image_views().collect::<Vec<_>>(), views);
}

#[test]
fn creation_fails_without_formats() {
    let dispatch = Arc::new(RecordingDispatch::new().with_surface_formats(Vec::new()));
    let err = swapchain(&dispatch, WINDOW_SIZE).unwrap_err();

    assert!(matches!(err, GpuError::Swapchain(_)));
}

#[test]
fn creation_is_retried_once() {
    let dispatch = Arc::new(RecordingDispatch::new());
    dispatch.fail_next_swapchain(vk::Result::ERROR_INITIALIZATION_FAILED);
    assert!(swapchain(&dispatch, WINDOW_SIZE).is_ok());

    let dispatch = Arc::new(RecordingDispatch::new());
    dispatch.fail_next_swapchain(vk::Result::ERROR_INITIALIZATION_FAILED);
    dispatch.fail_next_swapchain(vk::Result::ERROR_INITIALIZATION_FAILED);
    let err = swapchain(&dispatch, WINDOW_SIZE).unwrap_err();
    assert!(matches!(err, GpuError::Swapchain(_)));
}

#[test]
fn creation_rejects_empty_size() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let err = swapchain(&dispatch, IVec2::new(0, 720)).unwrap_err();

    assert!(matches!(err, GpuError::Swapchain(_)));
}

#[test]
#[should_panic(expected = "still acquired")]
fn second_acquire_before_present_panics() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    assert!(swapchain.acquire_next_image(semaphore()).unwrap().is_some());
    let _ = swapchain.acquire_next_image(semaphore());
}

#[test]
fn acquire_then_present_returns_to_ready() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    for expected in [0, 1, 2, 0] {
        let target = swapchain.acquire_next_image(semaphore()).unwrap().unwrap();
        assert_eq!(swapchain.state(), SwapchainState::Acquired);
        assert_eq!(target.extent.width, 1280);
        assert!(swapchain.base_barrier().is_some());

        assert!(swapchain.present(test_queue(), semaphore()).unwrap());
        assert_eq!(swapchain.state(), SwapchainState::Ready);
        assert_eq!(
            dispatch.calls().last(),
            Some(&Call::Present {
                image_index: expected
            })
        );
    }
    assert!(swapchain.base_barrier().is_none());
}

#[test]
fn out_of_date_acquire_marks_stale() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    dispatch.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(swapchain.acquire_next_image(semaphore()).unwrap().is_none());
    assert_eq!(swapchain.state(), SwapchainState::Stale);

    assert!(swapchain.recreate(WINDOW_SIZE).unwrap());
    assert_eq!(swapchain.state(), SwapchainState::Ready);
}

#[test]
fn acquire_while_stale_skips_the_driver() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    dispatch.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(swapchain.acquire_next_image(semaphore()).unwrap().is_none());
    dispatch.clear_calls();

    assert!(swapchain.acquire_next_image(semaphore()).unwrap().is_none());
    assert!(dispatch.calls().is_empty());
    assert_eq!(swapchain.state(), SwapchainState::Stale);

    assert!(swapchain.recreate(WINDOW_SIZE).unwrap());
    assert!(swapchain.acquire_next_image(semaphore()).unwrap().is_some());
}

#[test]
fn out_of_date_present_marks_stale() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    swapchain.acquire_next_image(semaphore()).unwrap().unwrap();
    dispatch.script_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(!swapchain.present(test_queue(), semaphore()).unwrap());
    assert_eq!(swapchain.state(), SwapchainState::Stale);
}

#[test]
fn acquire_errors_are_reported() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    dispatch.script_acquire(Err(vk::Result::TIMEOUT));
    assert!(matches!(
        swapchain.acquire_next_image(semaphore()),
        Err(GpuError::FenceTimeout { .. })
    ));

    dispatch.script_acquire(Ok(7));
    assert!(matches!(
        swapchain.acquire_next_image(semaphore()),
        Err(GpuError::InvalidState(_))
    ));

    dispatch.script_acquire(Err(vk::Result::ERROR_DEVICE_LOST));
    assert!(matches!(
        swapchain.acquire_next_image(semaphore()),
        Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
    ));
    assert_eq!(swapchain.state(), SwapchainState::Ready);
}

#[test]
fn present_without_acquire_is_rejected() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();

    assert!(matches!(
        swapchain.present(test_queue(), semaphore()),
        Err(GpuError::InvalidState(_))
    ));
}

#[test]
fn recreate_with_invalid_size_leaves_swapchain_untouched() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();
    let views: Vec<_> = swapchain.image_views().collect();
    dispatch.clear_calls();

    for size in [IVec2::ZERO, IVec2::new(0, 480), IVec2::new(640, 0), IVec2::new(-640, 480)] {
        assert!(!swapchain.recreate(size).unwrap());
    }

    assert!(dispatch.calls().is_empty());
    assert_eq!(swapchain.size(), WINDOW_SIZE);
    assert_eq!(swapchain.image_views().collect::<Vec<_>>(), views);
}

#[test]
fn recreate_replaces_views_and_swapchain() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut swapchain = swapchain(&dispatch, WINDOW_SIZE).unwrap();
    let old_views: Vec<_> = swapchain.image_views().collect();
    dispatch.clear_calls();

    assert!(swapchain.recreate(IVec2::new(640, 480)).unwrap());

    assert_eq!(swapchain.size(), IVec2::new(640, 480));
    for view in &old_views {
        assert_eq!(
            dispatch.count(|c| *c == Call::DestroyImageView(*view)),
            1
        );
    }
    assert_eq!(dispatch.count(|c| matches!(c, Call::DestroySwapchain(_))), 1);
    assert_eq!(
        dispatch.count(|c| matches!(c, Call::CreateImageView(_))),
        DEFAULT_IMAGE_COUNT as usize
    );
}
