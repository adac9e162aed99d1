//! Chapter pipeline for web novels: glossary-aware translation, EPUB
//! packaging and narration through a TTS server, optionally with a voice per
//! speaker.

pub mod audio;
pub mod config;
pub mod epub;
pub mod glossary;
pub mod narrate;
pub mod pipeline;
pub mod project;
pub mod text;
pub mod translate;
pub mod tts;
pub mod voices;
