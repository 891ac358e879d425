//! Roast generation: prompt assembly, text generation and speech synthesis.
//!
//! - [`ContextAssembler`]: person + annotations -> [`GenerationRequest`]
//! - [`TextGenerator`]: request -> [`GeneratedText`], implemented by
//!   [`ChatCompletionGenerator`] for OpenAI-compatible chat APIs
//! - [`SpeechSynthesizer`]: text -> [`AudioStream`], implemented by
//!   [`ElevenLabsSynthesizer`]
//!
//! Every provider call is a single attempt. Failures are classified into
//! [`ProviderError`] so callers can tell transient from terminal ones.

mod error;
mod http;
mod prompt;
mod speech;
mod text;

pub use error::{ProviderError, ProviderErrorKind};
pub use prompt::{ContextAssembler, GenerationRequest, ANNOTATION_DELIMITER};
pub use speech::{
    AudioStream, ElevenLabsConfig, ElevenLabsSynthesizer, SpeechSynthesizer,
    DEFAULT_ELEVENLABS_URL, DEFAULT_OUTPUT_FORMAT, DEFAULT_TTS_MODEL, DEFAULT_VOICE_ID,
};
pub use text::{
    strip_reasoning, ChatCompletionConfig, ChatCompletionGenerator, GeneratedText, TextGenerator,
    DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL, DEFAULT_SYSTEM_PROMPT,
};
