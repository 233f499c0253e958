// Copyright 2025 LiveKit, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use common::{answer, ids, index, offer, video_source, StallingTask};
use meeting_session::{
    codec::VideoCodec,
    id::TransportHandle,
    options::SessionOptions,
    pipeline::{
        task_fn, ApplySignalFrameTask, PipelineError, ReconcileVideoSubscriptionsTask,
        SessionHandle, TaskError, TaskPipeline, TimeoutTask,
    },
    protocol::{JoinAckFrame, SignalFrame, StreamServiceType, SubscribeAckFrame, VideoCodecKind},
    sdp::compression::{compress_with_dictionary, SdpOfferPayload},
    state::LifecycleState,
};
use parking_lot::Mutex;

mod common;

#[test_log::test(tokio::test)]
async fn tasks_commit_in_order() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions::default());

    let pipeline = TaskPipeline::new("subscribe")
        .with_task(task_fn("choose_videos", |state| {
            state.set_videos_to_receive(ids(&[4, 2]));
            Ok(())
        }))
        .with_task(ReconcileVideoSubscriptionsTask);
    handle.run(pipeline).await?;

    let state = handle.snapshot().await?;
    assert_eq!(state.video_subscriptions().to_wire()[..3], [2, 4, 0]);
    assert_eq!(state.last_videos_to_receive(), &ids(&[2, 4]));
    assert_eq!(state.metrics.max_video_tile_count(), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn failed_task_discards_only_its_own_writes() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions::default());

    let pipeline = TaskPipeline::new("negotiate")
        .with_task(task_fn("create_offer", |state| {
            state.sdp_offer = Some(offer(1));
            Ok(())
        }))
        .with_task(task_fn("subscribe", |state| {
            state.set_videos_to_receive(ids(&[7]));
            state.update_video_subscriptions();
            Err(TaskError::Failed("signaling channel closed".to_owned()))
        }))
        .with_task(task_fn("never_runs", |state| {
            state.enable_simulcast = true;
            Ok(())
        }));

    let err = handle.run(pipeline).await.unwrap_err();
    assert!(matches!(err, PipelineError::TaskFailed { ref task, .. } if task == "subscribe"));

    let state = handle.snapshot().await?;
    assert_eq!(state.sdp_offer, Some(offer(1)));
    assert!(state.videos_to_receive().is_empty());
    assert_eq!(state.video_subscriptions().occupied_count(), 0);
    assert!(!state.enable_simulcast);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn cancelled_task_leaves_no_partial_writes() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions::default());
    let (stalling, started) = StallingTask::new();

    let pending = handle.submit(TaskPipeline::new("stalls").with_task(stalling)).await?;
    started.await?;
    assert!(handle.cancel_current());

    let err = pending.wait().await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { ref task } if task == "stalling"));

    let state = handle.snapshot().await?;
    assert_eq!(state.sdp_offer, None);
    assert!(state.videos_to_receive().is_empty());
    assert!(!handle.cancel_current());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn queued_pipelines_run_one_at_a_time() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let (stalling, started) = StallingTask::new();
    let first = handle.submit(TaskPipeline::new("first").with_task(stalling)).await?;

    let mut queued = Vec::new();
    for n in 0..3 {
        let order = order.clone();
        let pipeline = TaskPipeline::new(format!("queued-{}", n)).with_task(task_fn(
            "record",
            move |state| {
                // the stalled pipeline's writes must never be visible
                assert!(state.sdp_offer.is_none());
                order.lock().push(n);
                Ok(())
            },
        ));
        queued.push(handle.submit(pipeline).await?);
    }

    // cancelled while still in the queue
    let skipped = handle
        .submit(TaskPipeline::new("skipped").with_task(task_fn("record", |_| Ok(()))))
        .await?;
    skipped.cancel();

    started.await?;
    assert!(order.lock().is_empty());
    first.cancel();
    assert!(matches!(first.wait().await, Err(PipelineError::Cancelled { .. })));

    for pending in queued {
        pending.wait().await?;
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
    assert!(matches!(skipped.wait().await, Err(PipelineError::Cancelled { .. })));
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn slow_task_times_out() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions::default());
    let (stalling, _started) = StallingTask::new();

    let pipeline = TaskPipeline::new("connect")
        .with_task(TimeoutTask::new(stalling, Duration::from_secs(15)));
    let err = handle.run(pipeline).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::TaskFailed { source: TaskError::Timeout(timeout), .. }
            if timeout == Duration::from_secs(15)
    ));
    assert_eq!(handle.snapshot().await?.sdp_offer, None);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn closed_session_rejects_pipelines() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions::default());
    handle
        .run(TaskPipeline::new("attach").with_task(task_fn("attach", |state| {
            state.begin_negotiation(TransportHandle(3))?;
            Ok(())
        })))
        .await?;

    let state = handle.close().await?;
    assert_eq!(state.lifecycle(), LifecycleState::Negotiating);
    assert!(matches!(
        handle.run(TaskPipeline::new("late")).await,
        Err(PipelineError::Closed)
    ));
    assert!(matches!(handle.snapshot().await, Err(PipelineError::Closed)));
    Ok(())
}

fn subscribe_ack(plain: Option<String>, compressed: Option<Vec<u8>>) -> SignalFrame {
    SignalFrame::SubscribeAck(SubscribeAckFrame {
        duplex: StreamServiceType::Duplex,
        sdp_answer: plain,
        compressed_sdp_answer: compressed,
    })
}

#[test_log::test(tokio::test)]
async fn negotiation_with_compressed_renegotiation() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions {
        enable_simulcast: true,
        ..Default::default()
    });

    let join = TaskPipeline::new("join")
        .with_task(ApplySignalFrameTask::new(SignalFrame::JoinAck(JoinAckFrame {
            video_subscription_limit: Some(2),
            wants_compressed_sdp: true,
            turn_credentials: None,
        })))
        .with_task(ApplySignalFrameTask::new(SignalFrame::Index(index(
            vec![
                video_source(11, 1),
                video_source(12, 1),
                video_source(21, 2),
                video_source(31, 3),
            ],
            vec![VideoCodecKind::H264ConstrainedBaselineProfile],
        ))));
    handle.run(join).await?;

    let state = handle.snapshot().await?;
    assert_eq!(state.video_subscription_limit(), 2);
    assert_eq!(state.effective_video_send_codec_preferences().len(), 1);
    assert_eq!(state.effective_video_send_codec_preferences()[0].codec, VideoCodec::H264);

    let negotiate = TaskPipeline::new("negotiate")
        .with_task(task_fn("create_offer", |state| {
            state.begin_negotiation(TransportHandle(1))?;
            state.ice.restart(std::time::Instant::now());
            let preferences = state.effective_video_send_codec_preferences().to_vec();
            state.sdp_offer = Some(offer(1000).with_video_send_codec_preferences(&preferences));
            assert!(matches!(state.sdp_offer_payload()?, SdpOfferPayload::Compressed(_)));
            Ok(())
        }))
        .with_task(task_fn("subscribe", |state| {
            state.set_videos_to_receive(ids(&[11, 21, 31]));
            state.update_video_subscriptions();
            Ok(())
        }))
        .with_task(ApplySignalFrameTask::new(subscribe_ack(Some(answer(102, 1)), None)))
        .with_task(task_fn("apply_answer", |state| {
            state.mark_active()?;
            Ok(())
        }));
    handle.run(negotiate).await?;

    let state = handle.snapshot().await?;
    assert_eq!(state.lifecycle(), LifecycleState::Active);
    assert_eq!(state.videos_to_receive(), &ids(&[11, 21]));
    assert_eq!(state.video_subscriptions().to_wire()[..3], [11, 21, 0]);
    assert_eq!(state.previous_sdp_answer(), answer(102, 1));
    let codec = state.current_video_send_codec().expect("codec selected");
    assert_eq!(
        (codec.capability.codec, codec.payload_type, codec.degraded),
        (VideoCodec::H264, 102, false)
    );

    // the remote switches to a lower layer of source 1
    let compressed =
        compress_with_dictionary(answer(102, 2).as_bytes(), answer(102, 1).as_bytes())?;
    let renegotiate = TaskPipeline::new("renegotiate")
        .with_task(task_fn("switch_layer", |state| {
            state.begin_renegotiation()?;
            state.set_videos_to_receive(ids(&[12, 21]));
            let result = state.update_video_subscriptions();
            assert_eq!(result.switched.len(), 1);
            state.sdp_offer = Some(offer(1000));
            assert!(!state.has_new_video_send_source());
            Ok(())
        }))
        .with_task(ApplySignalFrameTask::new(subscribe_ack(None, Some(compressed))))
        .with_task(task_fn("apply_answer", |state| {
            state.mark_active()?;
            Ok(())
        }));
    handle.run(renegotiate).await?;

    let state = handle.close().await?;
    assert_eq!(state.video_subscriptions().to_wire()[..3], [12, 21, 0]);
    assert_eq!(state.previous_sdp_answer(), answer(102, 2));
    assert_eq!(state.sdp_answer.as_ref().map(|sdp| sdp.as_str().to_owned()), Some(answer(102, 2)));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn corrupt_answer_keeps_previous_dictionary() -> Result<()> {
    let handle = SessionHandle::spawn(&SessionOptions::default());
    let setup = TaskPipeline::new("setup")
        .with_task(ApplySignalFrameTask::new(SignalFrame::JoinAck(JoinAckFrame {
            wants_compressed_sdp: true,
            ..Default::default()
        })))
        .with_task(task_fn("attach", |state| {
            state.begin_negotiation(TransportHandle(1))?;
            state.sdp_offer = Some(offer(1));
            Ok(())
        }))
        .with_task(ApplySignalFrameTask::new(subscribe_ack(Some(answer(96, 1)), None)));
    handle.run(setup).await?;

    let mut compressed =
        compress_with_dictionary(answer(96, 2).as_bytes(), answer(96, 1).as_bytes())?;
    let last = compressed.len() - 1;
    compressed[last] ^= 0x5a;

    let err = handle
        .run(TaskPipeline::new("answer").with_task(ApplySignalFrameTask::new(subscribe_ack(
            None,
            Some(compressed),
        ))))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::TaskFailed { source: TaskError::Session(_), ref task }
            if task == "accept_subscribe_ack"
    ));

    let state = handle.snapshot().await?;
    assert_eq!(state.previous_sdp_answer(), answer(96, 1));
    Ok(())
}
