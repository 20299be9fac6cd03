//! End-to-end worker flow against scripted collaborators: media events in,
//! transcript uploads and agent chat out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use cf_domain::error::Result;
use cf_domain::stream::{AgentEvent, BoxStream};
use cf_domain::transcript::{TranscriptSegmentRequest, TranscriptSegmentResponse};
use cf_providers::stt::{SttClient, SttSegment, SttSession};
use cf_worker::backend::BackendApi;
use cf_worker::media::{InterruptFlag, MediaEvent, MediaTransport};
use cf_worker::worker::RealtimeWorker;
use cf_worker::WorkerEnv;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct FakeBackend {
    segments: Mutex<Vec<(String, TranscriptSegmentRequest)>>,
    context_updates: Mutex<Vec<Option<u64>>>,
    completed: Mutex<Vec<String>>,
    agent_events: Mutex<Vec<AgentEvent>>,
    next_id: Mutex<u64>,
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn send_transcript_segment(
        &self,
        meeting_id: &str,
        segment: &TranscriptSegmentRequest,
    ) -> Result<TranscriptSegmentResponse> {
        self.segments
            .lock()
            .push((meeting_id.to_string(), segment.clone()));
        let mut next = self.next_id.lock();
        *next += 1;
        Ok(TranscriptSegmentResponse { id: *next })
    }

    async fn update_agent_context(
        &self,
        _meeting_id: &str,
        pre_transcript_id: Option<u64>,
    ) -> Result<()> {
        self.context_updates.lock().push(pre_transcript_id);
        Ok(())
    }

    async fn complete_meeting(&self, meeting_id: &str) -> Result<()> {
        self.completed.lock().push(meeting_id.to_string());
        Ok(())
    }

    async fn stream_agent_events(
        &self,
        _meeting_id: &str,
        _transcript_id: u64,
    ) -> Result<BoxStream<'static, Result<AgentEvent>>> {
        let events: Vec<Result<AgentEvent>> =
            self.agent_events.lock().iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}

struct FakeTransport {
    events_rx: Mutex<Option<mpsc::Receiver<MediaEvent>>>,
    chat: Mutex<Vec<String>>,
    states: Mutex<Vec<String>>,
    statuses: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn new() -> (Arc<Self>, mpsc::Sender<MediaEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Arc::new(Self {
                events_rx: Mutex::new(Some(rx)),
                chat: Mutex::new(Vec::new()),
                states: Mutex::new(Vec::new()),
                statuses: Mutex::new(Vec::new()),
            }),
            tx,
        )
    }
}

#[async_trait]
impl MediaTransport for FakeTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<MediaEvent>> {
        Ok(self
            .events_rx
            .lock()
            .take()
            .expect("connect called once per test"))
    }
    async fn disconnect(&self) {}
    async fn play_pcm(&self, _pcm: &[u8], _interrupt: &InterruptFlag) -> Result<bool> {
        Ok(true)
    }
    async fn send_chat_message(&self, text: &str) -> Result<()> {
        self.chat.lock().push(text.to_string());
        Ok(())
    }
    async fn send_agent_state(&self, state: &str) -> Result<()> {
        self.states.lock().push(state.to_string());
        Ok(())
    }
    async fn send_agent_status(&self, text: &str) -> Result<()> {
        self.statuses.lock().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeStt {
    session_txs: Mutex<Vec<mpsc::Sender<SttSegment>>>,
}

struct FakeSession;

#[async_trait]
impl SttSession for FakeSession {
    async fn send_audio(&self, _pcm: &[u8]) -> Result<()> {
        Ok(())
    }
    async fn mark_end_of_speech(&self) -> Result<()> {
        Ok(())
    }
    async fn close(&self) {}
}

#[async_trait]
impl SttClient for FakeStt {
    async fn open_session(&self) -> Result<(Box<dyn SttSession>, mpsc::Receiver<SttSegment>)> {
        let (tx, rx) = mpsc::channel(32);
        self.session_txs.lock().push(tx);
        Ok((Box::new(FakeSession), rx))
    }
}

fn worker_env() -> WorkerEnv {
    WorkerEnv::from_lookup(|key| match key {
        "MEETING_ID" => Some("m1".into()),
        _ => None,
    })
    .unwrap()
}

fn segment(text: &str, is_final: bool) -> SttSegment {
    SttSegment {
        text: text.into(),
        start_ms: 1000,
        end_ms: 2500,
        confidence: 0.93,
        min_confidence: Some(0.8),
        is_final,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn wake_word_final_runs_agent_pipeline() {
    let backend = Arc::new(FakeBackend::default());
    backend.agent_events.lock().extend([
        AgentEvent::Status {
            content: "생각 중...".into(),
        },
        AgentEvent::Message {
            content: "어제 회의 결과는 ".into(),
        },
        AgentEvent::Message {
            content: "공유되었습니다. 추가로 확인".into(),
        },
        AgentEvent::Done,
    ]);
    let (transport, events) = FakeTransport::new();
    let stt = Arc::new(FakeStt::default());

    let worker = Arc::new(RealtimeWorker::new(
        worker_env(),
        backend.clone(),
        transport.clone(),
        stt.clone(),
        None,
    ));
    let run = tokio::spawn(worker.clone().run());

    events
        .send(MediaEvent::ParticipantJoined {
            user_id: "u1".into(),
            user_name: "Ana".into(),
        })
        .await
        .unwrap();
    settle().await;

    // Interim wake word: listening state, no transcript upload yet.
    let session_tx = stt.session_txs.lock()[0].clone();
    session_tx
        .send(segment("부덕아", false))
        .await
        .unwrap();
    settle().await;
    assert!(transport.states.lock().contains(&"listening".to_string()));
    assert!(backend.segments.lock().is_empty());

    // Final result: persisted with the agent flags, pipeline runs.
    session_tx
        .send(segment("부덕아 어제 회의 결과 알려줘", true))
        .await
        .unwrap();
    settle().await;
    settle().await;

    {
        let segments = backend.segments.lock();
        assert_eq!(segments.len(), 1);
        let (meeting, stored) = &segments[0];
        assert_eq!(meeting, "m1");
        assert!(stored.agent_call);
        assert_eq!(stored.agent_call_keyword.as_deref(), Some("부덕아"));
        assert_eq!(stored.agent_call_confidence, Some(0.93));
        assert_eq!(stored.user_name.as_deref(), Some("Ana"));
    }

    // Streamed reply was split into sentences and sent to chat; the tail
    // without a terminator flushed at the end.
    {
        let chat = transport.chat.lock();
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0], "어제 회의 결과는 공유되었습니다.");
        assert_eq!(chat[1], "추가로 확인");
    }
    assert!(transport.statuses.lock().contains(&"생각 중...".to_string()));

    let states = transport.states.lock().clone();
    assert!(states.contains(&"thinking".to_string()));
    assert!(states.contains(&"speaking".to_string()));
    assert!(states.contains(&"idle".to_string()));

    run.abort();
}

#[tokio::test]
async fn plain_final_is_persisted_without_agent_call() {
    let backend = Arc::new(FakeBackend::default());
    let (transport, events) = FakeTransport::new();
    let stt = Arc::new(FakeStt::default());

    let worker = Arc::new(RealtimeWorker::new(
        worker_env(),
        backend.clone(),
        transport.clone(),
        stt.clone(),
        None,
    ));
    let run = tokio::spawn(worker.clone().run());

    events
        .send(MediaEvent::ParticipantJoined {
            user_id: "u1".into(),
            user_name: "Ana".into(),
        })
        .await
        .unwrap();
    settle().await;

    let session_tx = stt.session_txs.lock()[0].clone();
    session_tx
        .send(segment("다음 안건으로 넘어가시죠", true))
        .await
        .unwrap();
    settle().await;

    let segments = backend.segments.lock();
    assert_eq!(segments.len(), 1);
    assert!(!segments[0].1.agent_call);
    assert!(segments[0].1.agent_call_keyword.is_none());
    // Realtime context refresh fired with the new transcript id.
    assert!(backend.context_updates.lock().contains(&Some(1)));

    run.abort();
}

#[tokio::test]
async fn empty_final_is_ignored() {
    let backend = Arc::new(FakeBackend::default());
    let (transport, events) = FakeTransport::new();
    let stt = Arc::new(FakeStt::default());

    let worker = Arc::new(RealtimeWorker::new(
        worker_env(),
        backend.clone(),
        transport,
        stt.clone(),
        None,
    ));
    let run = tokio::spawn(worker.clone().run());

    events
        .send(MediaEvent::ParticipantJoined {
            user_id: "u1".into(),
            user_name: "Ana".into(),
        })
        .await
        .unwrap();
    settle().await;

    let session_tx = stt.session_txs.lock()[0].clone();
    session_tx.send(segment("   ", true)).await.unwrap();
    settle().await;

    assert!(backend.segments.lock().is_empty());
    run.abort();
}

#[tokio::test]
async fn completion_fires_after_grace_period() {
    let backend = Arc::new(FakeBackend::default());
    let (transport, events) = FakeTransport::new();
    let stt = Arc::new(FakeStt::default());

    let worker = Arc::new(
        RealtimeWorker::new(worker_env(), backend.clone(), transport, stt.clone(), None)
            .with_completion_grace(Duration::from_millis(50)),
    );
    let run = tokio::spawn(worker.clone().run());

    events
        .send(MediaEvent::ParticipantJoined {
            user_id: "u1".into(),
            user_name: "Ana".into(),
        })
        .await
        .unwrap();
    settle().await;
    events
        .send(MediaEvent::ParticipantLeft { user_id: "u1".into() })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.completed.lock().as_slice(), ["m1".to_string()]);

    // The worker's run loop exits cleanly after completion.
    tokio::time::timeout(Duration::from_millis(500), run)
        .await
        .expect("worker should stop")
        .expect("task join")
        .expect("clean exit");
}

#[tokio::test]
async fn rejoin_within_grace_cancels_completion() {
    let backend = Arc::new(FakeBackend::default());
    let (transport, events) = FakeTransport::new();
    let stt = Arc::new(FakeStt::default());

    let worker = Arc::new(
        RealtimeWorker::new(worker_env(), backend.clone(), transport, stt.clone(), None)
            .with_completion_grace(Duration::from_millis(100)),
    );
    let run = tokio::spawn(worker.clone().run());

    events
        .send(MediaEvent::ParticipantJoined {
            user_id: "u1".into(),
            user_name: "Ana".into(),
        })
        .await
        .unwrap();
    settle().await;
    events
        .send(MediaEvent::ParticipantLeft { user_id: "u1".into() })
        .await
        .unwrap();
    // Rejoin inside the grace window.
    tokio::time::sleep(Duration::from_millis(20)).await;
    events
        .send(MediaEvent::ParticipantJoined {
            user_id: "u1".into(),
            user_name: "Ana".into(),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(backend.completed.lock().is_empty());

    run.abort();
}

#[tokio::test]
async fn second_wake_word_cancels_previous_pipeline() {
    let backend = Arc::new(FakeBackend::default());
    // A long stream that would keep talking if not cancelled.
    backend.agent_events.lock().extend([
        AgentEvent::Message {
            content: "첫 번째 응답 문장입니다.".into(),
        },
        AgentEvent::Done,
    ]);
    let (transport, events) = FakeTransport::new();
    let stt = Arc::new(FakeStt::default());

    let worker = Arc::new(RealtimeWorker::new(
        worker_env(),
        backend.clone(),
        transport.clone(),
        stt.clone(),
        None,
    ));
    let run = tokio::spawn(worker.clone().run());

    events
        .send(MediaEvent::ParticipantJoined {
            user_id: "u1".into(),
            user_name: "Ana".into(),
        })
        .await
        .unwrap();
    settle().await;

    let session_tx = stt.session_txs.lock()[0].clone();
    session_tx
        .send(segment("부덕아 첫 질문", true))
        .await
        .unwrap();
    settle().await;
    session_tx
        .send(segment("부덕아 두 번째 질문", true))
        .await
        .unwrap();
    settle().await;
    settle().await;

    // Both wake-word finals were persisted as agent calls.
    let segments = backend.segments.lock();
    assert_eq!(segments.len(), 2);
    assert!(segments.iter().all(|(_, s)| s.agent_call));

    run.abort();
}
