// pipeline.rs - Converting one file: stage, try candidates in order, retrieve, clean up

use crate::command::{build_candidates, ConversionParameters, OutputFormat};
use crate::engine::MediaEngine;
use crate::error::EngineError;
use crate::source::{MediaType, SourceFile};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub source: SourceFile,
    /// `<stem>_converted.<ext>`
    pub display_name: String,
    pub bytes: Arc<[u8]>,
    pub format: OutputFormat,
    /// Read back from the produced bytes; `None` if they could not be probed.
    pub dimensions: Option<(u32, u32)>,
    /// Working storage name of the candidate that succeeded.
    pub produced_by: String,
    /// Candidates run, including the successful one.
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct FileFailure {
    pub file: SourceFile,
    pub reason: String,
    pub attempts: usize,
}

/// Names acquired in working storage for one file. Everything still held is
/// released when the guard goes out of scope.
struct StagedNames<'a, E: MediaEngine + ?Sized> {
    engine: &'a E,
    names: Vec<String>,
}

impl<'a, E: MediaEngine + ?Sized> StagedNames<'a, E> {
    fn new(engine: &'a E) -> Self {
        Self {
            engine,
            names: Vec::new(),
        }
    }

    fn stage(&mut self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.track(name);
        self.engine.stage(name, bytes)
    }

    fn track(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }

    fn release(&mut self, name: &str) {
        self.names.retain(|n| n != name);
        if let Err(e) = self.engine.release(name) {
            warn!(name, error = %e, "failed to release working storage name");
        }
    }
}

impl<E: MediaEngine + ?Sized> Drop for StagedNames<'_, E> {
    fn drop(&mut self) {
        for name in std::mem::take(&mut self.names) {
            if let Err(e) = self.engine.release(&name) {
                warn!(name = %name, error = %e, "failed to release working storage name");
            }
        }
    }
}

/// Convert one file. `index` is its position in the batch and keeps working
/// storage names unique across files with the same original name.
pub fn convert_file<E: MediaEngine + ?Sized>(
    engine: &E,
    index: usize,
    file: &SourceFile,
    params: &ConversionParameters,
) -> Result<ConversionResult, FileFailure> {
    let fail = |reason: String, attempts: usize| FileFailure {
        file: file.clone(),
        reason,
        attempts,
    };

    let bytes = file
        .read_bytes()
        .map_err(|e| fail(format!("Failed to read: {e}"), 0))?;

    // Extensionless or mislabeled files: trust the content.
    let media_type = match file.media_type() {
        MediaType::Unknown => MediaType::sniff(&bytes),
        known => known,
    };
    let input_name = format!("input{}.{}", index, media_type.extension());
    let output_base = format!("output{index}");
    let mut staged = StagedNames::new(engine);
    staged
        .stage(&input_name, &bytes)
        .map_err(|e| fail(e.to_string(), 0))?;
    drop(bytes);

    let transparent = media_type.may_have_transparency();
    let candidates = build_candidates(params, &input_name, &output_base, transparent);

    let mut last_reason = String::from("no command candidates");
    for (attempt, candidate) in candidates.iter().enumerate() {
        staged.track(&candidate.output_name);
        debug!(
            file = file.name(),
            attempt,
            strategy = ?candidate.strategy,
            color = %candidate.color,
            "trying candidate"
        );

        let produced = engine
            .run(&candidate.args)
            .and_then(|()| engine.retrieve(&candidate.output_name));

        match produced {
            Ok(output) => {
                return Ok(ConversionResult {
                    source: file.clone(),
                    display_name: format!("{}_converted.{}", file.stem(), params.format.file_extension()),
                    dimensions: probe_dimensions(&output),
                    bytes: output.into(),
                    format: params.format,
                    produced_by: candidate.output_name.clone(),
                    attempts: attempt + 1,
                });
            }
            Err(e) => {
                warn!(file = file.name(), attempt, error = %e, "candidate failed");
                last_reason = e.to_string();
                staged.release(&candidate.output_name);
            }
        }
    }

    Err(fail(last_reason, candidates.len()))
}

fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ScaleMode, Strategy};
    use crate::engine::memory::MemoryEngine;

    fn params() -> ConversionParameters {
        ConversionParameters::parse("1920", "1080", "#FFFFFF", ScaleMode::Fit).unwrap()
    }

    fn png(name: &str) -> SourceFile {
        SourceFile::from_bytes(name, MediaType::Png, b"png-bytes".to_vec())
    }

    #[test]
    fn first_success_resolves_chain() {
        let engine = MemoryEngine::succeeding();
        let result = convert_file(&engine, 0, &png("logo.png"), &params()).unwrap();

        assert_eq!(result.display_name, "logo_converted.jpg");
        assert_eq!(&result.bytes[..], b"converted");
        assert_eq!(result.attempts, 1);
        assert_eq!(result.produced_by, "output0_0.jpg");
        assert_eq!(engine.calls().len(), 1);
        assert!(engine.staged_names().unwrap().is_empty());
    }

    #[test]
    fn transparent_source_tries_composite_first() {
        let engine = MemoryEngine::succeeding();
        convert_file(&engine, 0, &png("logo.png"), &params()).unwrap();
        let call = &engine.calls()[0];
        assert!(call.contains(&"-filter_complex".to_string()));
        assert!(call.contains(&"lavfi".to_string()));
    }

    #[test]
    fn fallback_output_name_is_used() {
        let engine = MemoryEngine::new(|args| {
            if args.iter().any(|a| a.contains("#FFFFFFFF")) {
                Err("Unable to parse option value \"#FFFFFFFF\" as color".into())
            } else {
                Ok(b"fallback".to_vec())
            }
        })
        .leaving_partial_output();

        let result = convert_file(&engine, 4, &png("a.png"), &params()).unwrap();

        // Both strategies with the first encoding fail, the third candidate wins.
        assert_eq!(result.attempts, 3);
        assert_eq!(result.produced_by, "output4_2.jpg");
        assert_eq!(&result.bytes[..], b"fallback");
        assert_eq!(engine.calls().len(), 3);
        assert!(engine.staged_names().unwrap().is_empty());
    }

    #[test]
    fn exhausted_chain_reports_last_reason_and_cleans_up() {
        let engine = MemoryEngine::new(|args| {
            Err(format!("failed {}", args.last().unwrap()))
        })
        .leaving_partial_output();

        let failure = convert_file(&engine, 1, &png("broken.png"), &params()).unwrap_err();

        let expected = build_candidates(&params(), "input1.png", "output1", true);
        assert_eq!(failure.attempts, expected.len());
        assert_eq!(
            failure.reason,
            format!("Processing failed: failed {}", expected.last().unwrap().output_name)
        );
        assert_eq!(failure.file.name(), "broken.png");
        assert_eq!(engine.calls().len(), expected.len());
        assert!(engine.staged_names().unwrap().is_empty());
    }

    #[test]
    fn opaque_source_uses_pad_filter_first() {
        let engine = MemoryEngine::succeeding();
        let jpeg = SourceFile::from_bytes("photo.jpeg", MediaType::Jpeg, b"jpg".to_vec());
        convert_file(&engine, 2, &jpeg, &params()).unwrap();

        let call = &engine.calls()[0];
        assert!(call.contains(&"-vf".to_string()));
        assert!(call.contains(&"input2.jpg".to_string()));
        let expected = build_candidates(&params(), "input2.jpg", "output2", false);
        assert_eq!(expected[0].strategy, Strategy::PadFilter);
        assert_eq!(call, &expected[0].args);
    }

    #[test]
    fn unreadable_source_fails_without_engine_calls() {
        let engine = MemoryEngine::succeeding();
        let missing = SourceFile::from_path("/nonexistent/dir/photo.png");
        let failure = convert_file(&engine, 0, &missing, &params()).unwrap_err();

        assert!(failure.reason.starts_with("Failed to read"));
        assert_eq!(failure.attempts, 0);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn dimensions_are_probed_from_output() {
        let mut encoded = Vec::new();
        image::DynamicImage::new_rgb8(32, 18)
            .write_to(&mut Cursor::new(&mut encoded), image::ImageOutputFormat::Png)
            .unwrap();
        let engine = MemoryEngine::new(move |_| Ok(encoded.clone()));

        let result = convert_file(&engine, 0, &png("x.png"), &params()).unwrap();
        assert_eq!(result.dimensions, Some((32, 18)));
    }
}
