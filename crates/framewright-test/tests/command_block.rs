//! One-shot command blocks.

use std::sync::Arc;

use ash::vk;
use framewright_gpu::{CommandPool, GpuError};
use framewright_test::{test_queue, Call, RecordingDispatch};

fn pool(dispatch: &Arc<RecordingDispatch>) -> CommandPool<RecordingDispatch> {
    // SAFETY: the recording table accepts any handle.
    unsafe { CommandPool::transient(dispatch, 0).unwrap() }
}

#[test]
fn block_is_recording_on_creation() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let pool = pool(&dispatch);

    // SAFETY: the pool outlives the block.
    let block = unsafe { pool.command_block(test_queue()).unwrap() };

    assert_eq!(
        dispatch.calls().last(),
        Some(&Call::BeginCommandBuffer(block.command_buffer()))
    );
}

#[test]
fn submit_and_wait_completes_and_frees() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let pool = pool(&dispatch);
    // SAFETY: the pool outlives the block.
    let block = unsafe { pool.command_block(test_queue()).unwrap() };
    let cmd = block.command_buffer();
    dispatch.clear_calls();

    block.submit_and_wait().unwrap();

    let calls = dispatch.calls();
    assert_eq!(calls[0], Call::EndCommandBuffer(cmd));
    assert!(matches!(
        calls[1],
        Call::CreateFence {
            signaled: false,
            ..
        }
    ));
    assert!(matches!(
        calls[2],
        Call::Submit {
            command_buffers: 1,
            ..
        }
    ));
    assert!(matches!(calls[3], Call::WaitForFence(_)));
    assert_eq!(dispatch.count(|c| *c == Call::FreeCommandBuffers(1)), 1);
    assert_eq!(dispatch.count(|c| matches!(c, Call::DestroyFence(_))), 1);
    assert_eq!(dispatch.count(|c| *c == Call::DeviceWaitIdle), 0);
}

#[test]
fn timeout_drains_device_and_frees_buffer() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let pool = pool(&dispatch);
    // SAFETY: the pool outlives the block.
    let block = unsafe { pool.command_block(test_queue()).unwrap() };
    dispatch.clear_calls();

    dispatch.script_fence_wait(Err(vk::Result::TIMEOUT));
    let err = block.submit_and_wait().unwrap_err();

    assert!(matches!(
        err,
        GpuError::FenceTimeout {
            what: "command block",
            ..
        }
    ));
    assert_eq!(dispatch.count(|c| *c == Call::DeviceWaitIdle), 1);
    assert_eq!(dispatch.count(|c| *c == Call::FreeCommandBuffers(1)), 1);
}

#[test]
fn dropping_an_unsubmitted_block_frees_without_submitting() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let pool = pool(&dispatch);
    // SAFETY: the pool outlives the block.
    let block = unsafe { pool.command_block(test_queue()).unwrap() };
    dispatch.clear_calls();

    drop(block);

    assert_eq!(dispatch.calls(), [Call::FreeCommandBuffers(1)]);
}

#[test]
fn pool_is_destroyed_on_drop() {
    let dispatch = Arc::new(RecordingDispatch::new());
    let pool = pool(&dispatch);
    let handle = pool.handle();

    drop(pool);

    assert_eq!(dispatch.calls().last(), Some(&Call::DestroyCommandPool(handle)));
}
