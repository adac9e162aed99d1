//! Audio assembly: joining chunk WAVs into chapter files.

pub mod wav;

pub use wav::{AssemblySummary, DEFAULT_CHUNK_PAUSE_MS, concatenate_wavs};
