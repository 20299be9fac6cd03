//! Per-meeting realtime worker: audio in → STT → transcript API →
//! wake word → agent pipeline → TTS out.

pub mod backend;
pub mod config;
pub mod media;
pub mod sentence;
pub mod tts;
pub mod worker;

pub use config::WorkerEnv;
pub use worker::RealtimeWorker;
