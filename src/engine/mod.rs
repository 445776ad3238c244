// engine - The external media engine and its named working storage

mod ffmpeg;
#[cfg(test)]
pub mod memory;

pub use ffmpeg::FfmpegEngine;

use crate::error::EngineError;

/// Command-driven media processor with a flat, name-addressed staging area.
///
/// Implementations are shared between threads but must never run two
/// commands at once; the working storage has no isolation between runs.
pub trait MediaEngine: Send + Sync {
    /// Place `bytes` in working storage under `name`, replacing any previous content.
    fn stage(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError>;

    /// Run one command. `args` excludes the program name.
    fn run(&self, args: &[String]) -> Result<(), EngineError>;

    fn retrieve(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Remove `name` from working storage. Releasing an absent name is not an error.
    fn release(&self, name: &str) -> Result<(), EngineError>;

    /// Names currently held in working storage, sorted.
    fn staged_names(&self) -> Result<Vec<String>, EngineError>;
}

/// Working storage names must be plain file names.
pub(crate) fn check_name(name: &str) -> Result<(), EngineError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(EngineError::InvalidName(name.to_string()))
    }
}
