//! Frame engine behaviour against the recording dispatch table.

use std::sync::Arc;

use ash::vk;
use framewright_gpu::{GpuError, SwapchainState, FRAMES_IN_FLIGHT};
use framewright_test::{frame_engine, Call, RecordingDispatch, WINDOW_SIZE};
use glam::IVec2;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn is_submit(call: &Call) -> bool {
    matches!(call, Call::Submit { .. })
}

fn is_present(call: &Call) -> bool {
    matches!(call, Call::Present { .. })
}

fn is_swapchain_creation(call: &Call) -> bool {
    matches!(call, Call::CreateSwapchain { .. })
}

#[test]
fn ten_frames_submit_and_present_ten_times() {
    init_logging();
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    let mut indices = Vec::new();
    for _ in 0..10 {
        assert!(engine.frame(WINDOW_SIZE, |_| {}).unwrap());
        indices.push(engine.frame_index());
    }

    assert_eq!(indices, [1, 0, 1, 0, 1, 0, 1, 0, 1, 0]);
    assert_eq!(dispatch.count(is_submit), 10);
    assert_eq!(dispatch.count(is_present), 10);
    assert_eq!(dispatch.count(is_swapchain_creation), 0);
    assert_eq!(engine.overlay().new_frames, 10);
    assert_eq!(engine.overlay().renders, 10);
}

#[test]
fn frame_index_advances_when_present_is_out_of_date() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    dispatch.script_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(engine.frame(WINDOW_SIZE, |_| {}).unwrap());
    assert_eq!(engine.frame_index(), 1);
    assert_eq!(dispatch.count(is_swapchain_creation), 1);

    dispatch.script_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(engine.frame(WINDOW_SIZE, |_| {}).unwrap());
    assert_eq!(engine.frame_index(), 0);
    assert_eq!(dispatch.count(is_swapchain_creation), 2);
    assert_eq!(engine.swapchain().state(), SwapchainState::Ready);
}

#[test]
fn failed_acquire_keeps_fence_signaled() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    dispatch.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    dispatch.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(!engine.frame(WINDOW_SIZE, |_| {}).unwrap());
    assert!(!engine.frame(WINDOW_SIZE, |_| {}).unwrap());

    assert_eq!(dispatch.count(|c| matches!(c, Call::ResetFence(_))), 0);
    assert_eq!(dispatch.count(is_submit), 0);
    assert_eq!(engine.frame_index(), 0);
    assert_eq!(engine.overlay().new_frames, 0);

    // The next attempt waits on the same, still signaled fence.
    assert!(engine.frame(WINDOW_SIZE, |_| {}).unwrap());
    assert_eq!(engine.frame_index(), 1);
}

#[test]
fn fence_reset_follows_acquire() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    assert!(engine.frame(WINDOW_SIZE, |_| {}).unwrap());

    let calls = dispatch.calls();
    let position = |pred: fn(&Call) -> bool| calls.iter().position(pred).unwrap();
    let wait = position(|c| matches!(c, Call::WaitForFence(_)));
    let acquire = position(|c| matches!(c, Call::AcquireNextImage));
    let reset = position(|c| matches!(c, Call::ResetFence(_)));
    let submit = position(is_submit);
    let present = position(is_present);
    assert!(wait < acquire);
    assert!(acquire < reset);
    assert!(reset < submit);
    assert!(submit < present);

    let (Call::WaitForFence(waited), Call::ResetFence(reset_fence)) = (calls[wait], calls[reset]) else {
        unreachable!();
    };
    assert_eq!(waited, reset_fence);
    assert!(dispatch.is_signaled(reset_fence));
}

#[test]
fn minimized_window_skips_without_gpu_calls() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    for size in [IVec2::ZERO, IVec2::new(0, 720), IVec2::new(1280, 0), IVec2::new(-1, -1)] {
        assert!(engine.acquire_render_target(size).unwrap().is_none());
        assert!(!engine.frame(size, |_| unreachable!()).unwrap());
    }

    assert!(dispatch.calls().is_empty());
    assert_eq!(engine.overlay().new_frames, 0);
    assert_eq!(engine.framebuffer_size(), WINDOW_SIZE);
}

#[test]
fn size_change_recreates_once_after_present() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    assert!(engine.frame(WINDOW_SIZE, |_| {}).unwrap());
    assert_eq!(dispatch.count(is_swapchain_creation), 0);

    let resized = IVec2::new(640, 480);
    assert!(engine.frame(resized, |_| {}).unwrap());
    assert!(engine.frame(resized, |_| {}).unwrap());

    let calls = dispatch.calls();
    let creations: Vec<_> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| is_swapchain_creation(c))
        .collect();
    assert_eq!(creations.len(), 1);

    let (at, creation) = creations[0];
    assert!(matches!(
        creation,
        Call::CreateSwapchain {
            width: 640,
            height: 480,
            ..
        }
    ));
    // Triggered by the size check after the second present, not by an acquire.
    let presents_before = calls[..at].iter().filter(|c| is_present(c)).count();
    assert_eq!(presents_before, 2);
    assert_eq!(engine.swapchain().size(), resized);
}

#[test]
fn frame_records_two_rendering_scopes() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    let mut seen = None;
    assert!(engine
        .frame(WINDOW_SIZE, |frame| {
            seen = Some((frame.frame_index, frame.framebuffer_size, frame.target.extent));
            frame.overlay.new_frames += 100;
        })
        .unwrap());

    assert_eq!(
        seen,
        Some((
            0,
            WINDOW_SIZE,
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        ))
    );
    assert_eq!(engine.overlay().new_frames, 101);
    assert_eq!(engine.overlay().end_frames, 1);

    let recorded: Vec<Call> = dispatch
        .calls()
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                Call::PipelineBarrier { .. } | Call::BeginRendering(_) | Call::EndRendering
            )
        })
        .collect();
    assert_eq!(
        recorded,
        [
            Call::PipelineBarrier {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::ATTACHMENT_OPTIMAL,
            },
            Call::BeginRendering(vk::AttachmentLoadOp::CLEAR),
            Call::EndRendering,
            Call::BeginRendering(vk::AttachmentLoadOp::LOAD),
            Call::EndRendering,
            Call::PipelineBarrier {
                old_layout: vk::ImageLayout::ATTACHMENT_OPTIMAL,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            },
        ]
    );
}

#[test]
fn submit_waits_on_acquire_and_signals_present() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    assert!(engine.frame(WINDOW_SIZE, |_| {}).unwrap());

    let submits: Vec<Call> = dispatch.calls().into_iter().filter(is_submit).collect();
    let [Call::Submit {
        command_buffers,
        wait_semaphores,
        signal_semaphores,
        fence,
    }] = submits[..]
    else {
        panic!("expected one submit, got {submits:?}");
    };
    assert_eq!(command_buffers, 1);
    assert_eq!(wait_semaphores, 1);
    assert_eq!(signal_semaphores, 1);
    assert!(dispatch.is_signaled(fence));
}

#[test]
fn fence_timeout_is_fatal() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();

    dispatch.script_fence_wait(Err(vk::Result::TIMEOUT));
    let err = engine.frame(WINDOW_SIZE, |_| {}).unwrap_err();
    assert!(matches!(err, GpuError::FenceTimeout { .. }));
}

#[test]
fn steps_require_an_acquired_target() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();

    assert!(matches!(engine.begin_frame(), Err(GpuError::InvalidState(_))));
    assert!(matches!(
        engine.submit_and_present(),
        Err(GpuError::InvalidState(_))
    ));
    assert!(engine.render_target().is_none());
}

#[test]
fn manual_steps_match_frame() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let mut engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();

    let target = engine.acquire_render_target(WINDOW_SIZE).unwrap().unwrap();
    assert_eq!(engine.render_target(), Some(target));
    assert_eq!(engine.swapchain().state(), SwapchainState::Acquired);

    let cmd = engine.begin_frame().unwrap();
    engine.transition_for_render(cmd).unwrap();
    engine.render(cmd, |frame| assert_eq!(frame.command_buffer, cmd)).unwrap();
    engine.transition_for_present(cmd).unwrap();
    engine.submit_and_present().unwrap();

    assert!(engine.render_target().is_none());
    assert_eq!(engine.frame_index(), 1 % FRAMES_IN_FLIGHT);
    assert_eq!(engine.swapchain().state(), SwapchainState::Ready);
}

#[test]
fn drop_drains_device_and_releases_sync_objects() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let engine = frame_engine(&dispatch, WINDOW_SIZE).unwrap();
    dispatch.clear_calls();

    drop(engine);

    assert_eq!(dispatch.calls().first(), Some(&Call::DeviceWaitIdle));
    assert_eq!(
        dispatch.count(|c| matches!(c, Call::DestroyFence(_))),
        FRAMES_IN_FLIGHT
    );
    assert_eq!(
        dispatch.count(|c| matches!(c, Call::DestroySemaphore(_))),
        2 * FRAMES_IN_FLIGHT
    );
    assert_eq!(dispatch.count(|c| matches!(c, Call::DestroyCommandPool(_))), 1);
    assert_eq!(dispatch.count(|c| matches!(c, Call::DestroySwapchain(_))), 1);
}
