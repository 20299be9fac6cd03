//! External AI provider adapters: LLM (chat completions), streaming STT and
//! TTS synthesis. Each adapter translates between our internal types and one
//! provider's wire format; the rest of the system only sees the traits.

pub mod chat;
pub mod json;
pub mod sse;
pub mod stt;
pub mod traits;
pub mod tts;

pub use chat::ChatApiProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
pub use tts::{HttpTtsClient, TtsClient};
