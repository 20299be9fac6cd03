//! Single-consumer TTS pipeline.
//!
//! Sentences queue up; the loop synthesizes and plays them one at a time.
//! The interrupt flag is checked before synthesis and again before
//! playback, so a barge-in drops in-flight items instead of speaking over
//! the user. Repeated synthesis failures flush the queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use cf_providers::TtsClient;

use crate::media::{InterruptFlag, MediaTransport};
use crate::sentence::normalize_tts_text;

pub struct TtsPipeline {
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
    interrupt: InterruptFlag,
    capacity: usize,
    max_consecutive_failures: u32,
}

impl TtsPipeline {
    pub fn new(capacity: usize, max_consecutive_failures: u32) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            interrupt: InterruptFlag::new(),
            capacity,
            max_consecutive_failures,
        })
    }

    pub fn interrupt(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    /// Barge-in: abort current playback and drop everything queued.
    pub fn barge_in(&self) {
        self.interrupt.set();
        self.clear();
    }

    /// Normalize and enqueue one sentence. Overflow drops with a warning.
    pub fn enqueue(&self, text: &str) {
        let message = normalize_tts_text(text);
        if message.is_empty() {
            return;
        }
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                tracing::warn!(dropped = %truncate(&message, 50), "TTS queue full, sentence dropped");
                return;
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    async fn pop(&self) -> String {
        loop {
            if let Some(item) = self.queue.lock().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Consumer loop; runs for the worker's lifetime.
    pub async fn run(
        self: Arc<Self>,
        tts: Arc<dyn TtsClient>,
        transport: Arc<dyn MediaTransport>,
    ) {
        let mut consecutive_failures: u32 = 0;

        loop {
            let sentence = self.pop().await;

            // Interrupt raised after this item was queued: skip it.
            if self.interrupt.is_set() {
                tracing::info!(skipped = %truncate(&sentence, 30), "interrupt before synthesis, sentence skipped");
                continue;
            }

            match tts.synthesize(&sentence).await {
                Ok(Some(pcm)) => {
                    // The interrupt may have fired mid-synthesis.
                    if self.interrupt.is_set() {
                        tracing::info!("interrupt after synthesis, playback skipped");
                        continue;
                    }

                    // Only a NEW barge-in should abort this playback.
                    self.interrupt.clear();
                    match transport.play_pcm(&pcm, &self.interrupt).await {
                        Ok(true) => {
                            consecutive_failures = 0;
                        }
                        Ok(false) => {
                            tracing::info!("playback interrupted, flushing TTS queue");
                            self.clear();
                            consecutive_failures = 0;
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            tracing::warn!(
                                error = %e,
                                consecutive_failures,
                                "TTS playback failed"
                            );
                        }
                    }
                }
                Ok(None) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        sentence = %truncate(&sentence, 30),
                        consecutive_failures,
                        "TTS synthesis returned nothing"
                    );
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(error = %e, consecutive_failures, "TTS synthesis failed");
                }
            }

            if consecutive_failures >= self.max_consecutive_failures {
                tracing::error!(
                    threshold = self.max_consecutive_failures,
                    "consecutive TTS failures reached threshold, flushing queue"
                );
                self.clear();
                consecutive_failures = 0;
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaEvent;
    use cf_domain::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct FakeTts {
        fail: bool,
        synthesized: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TtsClient for FakeTts {
        async fn synthesize(&self, _text: &str) -> Result<Option<Vec<u8>>> {
            self.synthesized.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Ok(None)
            } else {
                Ok(Some(vec![0u8; 9600]))
            }
        }
    }

    struct FakeTransport {
        /// Frames "played" per play_pcm call; playback blocks on a notify
        /// so tests can interrupt mid-sentence.
        plays: AtomicUsize,
        completions: AtomicUsize,
        slow: bool,
    }

    impl FakeTransport {
        fn new(slow: bool) -> Arc<Self> {
            Arc::new(Self {
                plays: AtomicUsize::new(0),
                completions: AtomicUsize::new(0),
                slow,
            })
        }
    }

    #[async_trait::async_trait]
    impl MediaTransport for FakeTransport {
        async fn connect(&self) -> Result<mpsc::Receiver<MediaEvent>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn disconnect(&self) {}
        async fn play_pcm(&self, pcm: &[u8], interrupt: &InterruptFlag) -> Result<bool> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            for _frame in pcm.chunks(1920) {
                if interrupt.is_set() {
                    return Ok(false);
                }
                let wait = if self.slow { 20 } else { 1 };
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(wait)) => {}
                    _ = interrupt.triggered() => return Ok(false),
                }
            }
            self.completions.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        async fn send_chat_message(&self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn send_agent_state(&self, _state: &str) -> Result<()> {
            Ok(())
        }
        async fn send_agent_status(&self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn sentences_play_in_order() {
        let pipeline = TtsPipeline::new(50, 5);
        let tts = Arc::new(FakeTts {
            fail: false,
            synthesized: AtomicUsize::new(0),
        });
        let transport = FakeTransport::new(false);

        let consumer = tokio::spawn(pipeline.clone().run(tts.clone(), transport.clone()));
        pipeline.enqueue("첫 문장입니다.");
        pipeline.enqueue("둘째 문장입니다.");

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while transport.completions.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both sentences should play");
        assert_eq!(tts.synthesized.load(Ordering::SeqCst), 2);
        consumer.abort();
    }

    #[tokio::test]
    async fn barge_in_aborts_playback_and_flushes_queue() {
        let pipeline = TtsPipeline::new(50, 5);
        let tts = Arc::new(FakeTts {
            fail: false,
            synthesized: AtomicUsize::new(0),
        });
        let transport = FakeTransport::new(true); // slow playback

        let consumer = tokio::spawn(pipeline.clone().run(tts.clone(), transport.clone()));
        pipeline.enqueue("어제 회의 결과는 이렇습니다.");
        pipeline.enqueue("절대 재생되면 안 되는 문장.");

        // Wait until the first sentence is playing.
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while transport.plays.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("playback should start");

        // Wake-word barge-in.
        pipeline.barge_in();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        // The first playback never completed and the queue is empty.
        assert_eq!(transport.completions.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.queued(), 0);
        // The queued second sentence was flushed, not synthesized.
        assert_eq!(tts.synthesized.load(Ordering::SeqCst), 1);
        consumer.abort();
    }

    #[tokio::test]
    async fn consecutive_failures_flush_queue() {
        let pipeline = TtsPipeline::new(50, 2);
        let tts = Arc::new(FakeTts {
            fail: true,
            synthesized: AtomicUsize::new(0),
        });
        let transport = FakeTransport::new(false);

        let consumer = tokio::spawn(pipeline.clone().run(tts.clone(), transport.clone()));
        for i in 0..5 {
            pipeline.enqueue(&format!("문장 {i}입니다."));
        }

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while tts.synthesized.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("failures should accumulate");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // After hitting the threshold the queue was flushed.
        assert_eq!(pipeline.queued(), 0);
        assert!(tts.synthesized.load(Ordering::SeqCst) <= 3);
        consumer.abort();
    }

    #[tokio::test]
    async fn queue_overflow_drops() {
        let pipeline = TtsPipeline::new(2, 5);
        pipeline.enqueue("하나.");
        pipeline.enqueue("둘.");
        pipeline.enqueue("셋."); // dropped
        assert_eq!(pipeline.queued(), 2);
    }

    #[tokio::test]
    async fn empty_after_normalization_is_skipped() {
        let pipeline = TtsPipeline::new(10, 5);
        pipeline.enqueue("** ** `` ");
        assert_eq!(pipeline.queued(), 0);
    }
}
