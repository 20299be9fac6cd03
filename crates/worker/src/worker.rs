//! The realtime worker: owns one meeting for its lifetime.
//!
//! Audio frames fan out to per-speaker STT sessions; finalized segments go
//! to the transcript API; the wake word barges into TTS, cancels any
//! running agent pipeline and starts a new one whose streamed reply feeds
//! chat and the TTS queue sentence by sentence. When the last human
//! participant leaves, completion fires after a rejoin grace period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use cf_domain::error::Result;
use cf_domain::stream::AgentEvent;
use cf_domain::transcript::TranscriptSegmentRequest;
use cf_providers::stt::{SttClient, SttSegment, SttSession};

use crate::backend::BackendApi;
use crate::config::WorkerEnv;
use crate::media::{MediaEvent, MediaTransport};
use crate::sentence::extract_sentences;
use crate::tts::TtsPipeline;

struct SpeakerSession {
    user_name: String,
    session: Arc<dyn SttSession>,
    results_task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SpeakerSession>,
    /// user_id → confidence at interim wake-word detection.
    wake_word_pending: HashMap<String, f32>,
    /// Latest persisted transcript id (context pre-warm anchor).
    pre_transcript_id: Option<u64>,
    wake_word_detected_at: Option<Instant>,
    current_agent: Option<JoinHandle<()>>,
    context_prep: Option<JoinHandle<()>>,
    context_update: Option<JoinHandle<()>>,
    complete_task: Option<JoinHandle<()>>,
}

pub struct RealtimeWorker {
    env: WorkerEnv,
    backend: Arc<dyn BackendApi>,
    transport: Arc<dyn MediaTransport>,
    stt: Arc<dyn SttClient>,
    tts: Option<Arc<TtsPipeline>>,
    inner: Mutex<Inner>,
    stop: Notify,
    /// Rejoin grace before completion.
    completion_grace: Duration,
}

impl RealtimeWorker {
    pub fn new(
        env: WorkerEnv,
        backend: Arc<dyn BackendApi>,
        transport: Arc<dyn MediaTransport>,
        stt: Arc<dyn SttClient>,
        tts: Option<Arc<TtsPipeline>>,
    ) -> Self {
        Self {
            env,
            backend,
            transport,
            stt,
            tts,
            inner: Mutex::new(Inner::default()),
            stop: Notify::new(),
            completion_grace: Duration::from_secs(5),
        }
    }

    /// Shorten the rejoin grace window (tests).
    pub fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.completion_grace = grace;
        self
    }

    pub fn request_stop(&self) {
        self.stop.notify_waiters();
    }

    /// Main loop: media events in, everything else spawned off it.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        tracing::info!(meeting_id = %self.env.meeting_id, "realtime worker starting");
        let mut events = self.transport.connect().await?;

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::warn!("media event stream ended");
                            break;
                        }
                    }
                }
                _ = self.stop.notified() => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        let sessions: Vec<SpeakerSession> = {
            let mut inner = self.inner.lock();
            if let Some(task) = inner.current_agent.take() {
                task.abort();
            }
            for task in [
                inner.context_prep.take(),
                inner.context_update.take(),
                inner.complete_task.take(),
            ]
            .into_iter()
            .flatten()
            {
                task.abort();
            }
            inner.sessions.drain().map(|(_, s)| s).collect()
        };
        for speaker in sessions {
            speaker.results_task.abort();
            speaker.session.close().await;
        }
        self.transport.disconnect().await;
        tracing::info!(meeting_id = %self.env.meeting_id, "realtime worker stopped");
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Media events
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn handle_event(self: &Arc<Self>, event: MediaEvent) {
        match event {
            MediaEvent::ParticipantJoined { user_id, user_name } => {
                self.on_participant_joined(user_id, user_name).await;
            }
            MediaEvent::ParticipantLeft { user_id } => {
                self.on_participant_left(&user_id).await;
            }
            MediaEvent::AudioFrame { user_id, pcm } => {
                let session = {
                    let inner = self.inner.lock();
                    inner.sessions.get(&user_id).map(|s| s.session.clone())
                };
                if let Some(session) = session {
                    if let Err(e) = session.send_audio(&pcm).await {
                        tracing::debug!(user_id = %user_id, error = %e, "audio frame dropped");
                    }
                }
            }
            MediaEvent::VadSpeechStart { user_id } => {
                tracing::debug!(user_id = %user_id, "vad speech start");
            }
            MediaEvent::VadSpeechEnd { user_id } => {
                let session = {
                    let inner = self.inner.lock();
                    inner.sessions.get(&user_id).map(|s| s.session.clone())
                };
                if let Some(session) = session {
                    let _ = session.mark_end_of_speech().await;
                }
            }
        }
    }

    async fn on_participant_joined(self: &Arc<Self>, user_id: String, user_name: String) {
        // Rejoin within the grace window cancels pending completion.
        if let Some(task) = self.inner.lock().complete_task.take() {
            tracing::info!(user_id = %user_id, "participant rejoined, completion cancelled");
            task.abort();
        }

        if self.inner.lock().sessions.contains_key(&user_id) {
            tracing::warn!(user_id = %user_id, "stt session already exists");
            return;
        }

        let (session, mut results) = match self.stt.open_session().await {
            Ok(opened) => opened,
            Err(e) => {
                // Isolated failure: this speaker has no transcription, the
                // worker stays up.
                tracing::error!(user_id = %user_id, error = %e, "stt session open failed");
                return;
            }
        };
        let session: Arc<dyn SttSession> = Arc::from(session);

        let worker = self.clone();
        let result_user = user_id.clone();
        let result_name = user_name.clone();
        let results_task = tokio::spawn(async move {
            while let Some(segment) = results.recv().await {
                worker
                    .on_stt_result(&result_user, &result_name, segment)
                    .await;
            }
        });

        self.inner.lock().sessions.insert(
            user_id.clone(),
            SpeakerSession {
                user_name,
                session,
                results_task,
            },
        );
        tracing::info!(user_id = %user_id, "stt session started");
    }

    async fn on_participant_left(self: &Arc<Self>, user_id: &str) {
        let (speaker, empty) = {
            let mut inner = self.inner.lock();
            inner.wake_word_pending.remove(user_id);
            let speaker = inner.sessions.remove(user_id);
            (speaker, inner.sessions.is_empty())
        };

        if let Some(speaker) = speaker {
            speaker.results_task.abort();
            speaker.session.close().await;
            tracing::info!(user_id = %user_id, "stt session closed");
        }

        if empty {
            let worker = self.clone();
            let task = tokio::spawn(async move { worker.complete_meeting().await });
            self.inner.lock().complete_task = Some(task);
        }
    }

    /// Completion path: grace sleep → recheck → report → stop.
    async fn complete_meeting(self: Arc<Self>) {
        tracing::info!(
            grace_secs = self.completion_grace.as_secs_f32(),
            "last participant left, waiting for rejoin"
        );
        tokio::time::sleep(self.completion_grace).await;

        if !self.inner.lock().sessions.is_empty() {
            tracing::info!("participant rejoined during grace period, completion aborted");
            return;
        }

        match self.backend.complete_meeting(&self.env.meeting_id).await {
            Ok(()) => tracing::info!("meeting completed"),
            Err(e) => tracing::error!(error = %e, "meeting completion failed"),
        }
        self.stop.notify_waiters();
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // STT results
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn on_stt_result(self: &Arc<Self>, user_id: &str, user_name: &str, segment: SttSegment) {
        if segment.text.trim().is_empty() {
            return;
        }

        if !segment.is_final {
            self.on_interim_result(user_id, &segment).await;
            return;
        }

        tracing::info!(
            user = user_name,
            text = %segment.text,
            start_ms = segment.start_ms,
            end_ms = segment.end_ms,
            confidence = segment.confidence,
            "stt final"
        );

        // Wake word: either flagged on an interim result or present here.
        let pending_confidence = self.inner.lock().wake_word_pending.remove(user_id);
        let mut wake_word_triggered = pending_confidence.is_some();
        let mut wake_word_confidence = pending_confidence;
        if !wake_word_triggered
            && self.env.agent_enabled
            && segment.text.contains(&self.env.wake_word)
        {
            wake_word_triggered = true;
            wake_word_confidence = Some(segment.confidence);
            self.inner.lock().wake_word_detected_at = Some(Instant::now());
        }

        let request = TranscriptSegmentRequest {
            user_id: user_id.to_string(),
            user_name: Some(user_name.to_string()),
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
            text: segment.text.clone(),
            confidence: segment.confidence,
            min_confidence: segment.min_confidence,
            agent_call: wake_word_triggered,
            agent_call_keyword: wake_word_triggered.then(|| self.env.wake_word.clone()),
            agent_call_confidence: wake_word_confidence,
        };

        let response = match self
            .backend
            .send_transcript_segment(&self.env.meeting_id, &request)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Per-speaker isolation: a failed upload never kills the
                // worker; the segment is lost, the pipeline continues.
                tracing::warn!(user_id, error = %e, "transcript upload failed");
                return;
            }
        };
        tracing::debug!(transcript_id = response.id, "transcript stored");

        // Realtime context refresh, one in flight at a time.
        if self.env.agent_enabled {
            let worker = self.clone();
            let transcript_id = response.id;
            let update = tokio::spawn(async move {
                if let Err(e) = worker
                    .backend
                    .update_agent_context(&worker.env.meeting_id, Some(transcript_id))
                    .await
                {
                    tracing::debug!(error = %e, "realtime context update failed");
                }
            });
            let mut inner = self.inner.lock();
            if let Some(prior) = inner.context_update.replace(update) {
                prior.abort();
            }
        }

        if wake_word_triggered {
            tracing::info!(text = %segment.text, "wake word finalized, starting agent pipeline");
            self.cancel_current_agent();
            if let Some(tts) = &self.tts {
                tts.barge_in();
            }
            let worker = self.clone();
            let transcript_id = response.id;
            let task = tokio::spawn(async move { worker.run_agent_pipeline(transcript_id).await });
            self.inner.lock().current_agent = Some(task);
        }

        self.inner.lock().pre_transcript_id = Some(response.id);
    }

    /// Interim handling: early wake-word detection → immediate barge-in and
    /// context pre-warm.
    async fn on_interim_result(self: &Arc<Self>, user_id: &str, segment: &SttSegment) {
        if !self.env.agent_enabled || !segment.text.contains(&self.env.wake_word) {
            return;
        }

        let pre_transcript_id = {
            let mut inner = self.inner.lock();
            if inner.wake_word_pending.contains_key(user_id) {
                return;
            }
            inner.wake_word_pending.insert(user_id.to_string(), segment.confidence);
            inner.wake_word_detected_at = Some(Instant::now());
            inner.pre_transcript_id
        };

        tracing::info!(
            user_id,
            text = %segment.text,
            confidence = segment.confidence,
            "wake word detected on interim result"
        );

        // Barge-in right away: cancel the running agent, drop queued TTS.
        self.cancel_current_agent();
        if let Some(tts) = &self.tts {
            tts.barge_in();
        }
        let _ = self.transport.send_agent_state("listening").await;

        // Context pre-warm keyed on the previous transcript id.
        if let Some(pre_id) = pre_transcript_id {
            let worker = self.clone();
            let prep = tokio::spawn(async move {
                if let Err(e) = worker
                    .backend
                    .update_agent_context(&worker.env.meeting_id, Some(pre_id))
                    .await
                {
                    tracing::warn!(error = %e, "context pre-warm failed");
                }
            });
            let mut inner = self.inner.lock();
            if let Some(prior) = inner.context_prep.replace(prep) {
                prior.abort();
            }
        }
    }

    fn cancel_current_agent(&self) {
        let task = self.inner.lock().current_agent.take();
        if let Some(task) = task {
            tracing::info!("cancelling running agent pipeline");
            task.abort();
            if let Some(tts) = &self.tts {
                tts.barge_in();
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Agent pipeline
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn run_agent_pipeline(self: Arc<Self>, transcript_id: u64) {
        // Await a pre-warm started at interim detection, if any.
        let prep = self.inner.lock().context_prep.take();
        if let Some(prep) = prep {
            let _ = prep.await;
        }

        // A fresh reply starts clean: the barge-in that launched this
        // pipeline must not kill its own TTS.
        if let Some(tts) = &self.tts {
            tts.interrupt().clear();
        }
        let _ = self.transport.send_agent_state("thinking").await;

        let started = Instant::now();
        let wake_at = self.inner.lock().wake_word_detected_at;

        let mut stream = match self
            .backend
            .stream_agent_events(&self.env.meeting_id, transcript_id)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "agent stream failed to open");
                let _ = self.transport.send_agent_state("idle").await;
                return;
            }
        };

        let mut buffer = String::new();
        let mut first_message = true;

        while let Some(event) = stream.next().await {
            match event {
                Ok(AgentEvent::Status { content }) => {
                    if !content.is_empty() {
                        let _ = self.transport.send_agent_status(&content).await;
                    }
                }
                Ok(AgentEvent::Message { content }) => {
                    if first_message {
                        first_message = false;
                        if let Some(wake_at) = wake_at {
                            tracing::info!(
                                latency_ms = wake_at.elapsed().as_millis() as u64,
                                "first agent token"
                            );
                        }
                        let _ = self.transport.send_agent_state("speaking").await;
                    }
                    buffer.push_str(&content);
                    let (sentences, rest) = extract_sentences(&buffer);
                    buffer = rest;
                    for sentence in sentences {
                        self.publish_sentence(&sentence).await;
                    }
                }
                Ok(AgentEvent::Done) => break,
                Ok(AgentEvent::Error { message }) => {
                    tracing::warn!(error = %message, "agent stream error");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "agent stream failed");
                    break;
                }
            }
        }

        let tail = buffer.trim();
        if !tail.is_empty() {
            self.publish_sentence(tail).await;
        }

        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            "agent pipeline finished"
        );
        let _ = self.transport.send_agent_state("idle").await;
    }

    async fn publish_sentence(&self, sentence: &str) {
        if let Err(e) = self.transport.send_chat_message(sentence).await {
            tracing::warn!(error = %e, "chat send failed");
        }
        if let Some(tts) = &self.tts {
            tts.enqueue(sentence);
        }
    }
}
