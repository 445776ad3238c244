// ffmpeg.rs - MediaEngine backed by the ffmpeg executable and a private temp directory

use super::{check_name, MediaEngine};
use crate::error::EngineError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing::{debug, info};

#[derive(Debug)]
pub struct FfmpegEngine {
    binary: PathBuf,
    version: String,
    workdir: TempDir,
    run_lock: Mutex<()>,
}

impl FfmpegEngine {
    /// Locate ffmpeg (explicit path first, then `PATH`), check that it runs,
    /// and create the working storage directory.
    pub fn load(configured: Option<&Path>) -> Result<Self, EngineError> {
        let binary = Self::locate(configured)?;
        let version = probe_version(&binary)?;
        let engine = Self::with_binary(binary, version)?;
        info!(
            binary = %engine.binary.display(),
            version = %engine.version,
            workdir = %engine.workdir.path().display(),
            "media engine ready"
        );
        Ok(engine)
    }

    pub fn locate(configured: Option<&Path>) -> Result<PathBuf, EngineError> {
        match configured {
            Some(path) if path.is_file() => Ok(path.to_path_buf()),
            Some(path) => Err(EngineError::Unavailable(format!(
                "configured ffmpeg binary {} does not exist",
                path.display()
            ))),
            None => which::which("ffmpeg").map_err(|e| {
                EngineError::Unavailable(format!(
                    "ffmpeg was not found on PATH ({e}). Install ffmpeg or set ffmpeg_path in the settings file"
                ))
            }),
        }
    }

    fn with_binary(binary: PathBuf, version: String) -> Result<Self, EngineError> {
        let workdir = tempfile::Builder::new()
            .prefix("image-batch-converter-")
            .tempdir()?;
        Ok(Self {
            binary,
            version,
            workdir,
            run_lock: Mutex::new(()),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, EngineError> {
        check_name(name)?;
        Ok(self.workdir.path().join(name))
    }
}

fn probe_version(binary: &Path) -> Result<String, EngineError> {
    let output = Command::new(binary)
        .args(["-hide_banner", "-version"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| EngineError::Unavailable(format!("failed to start {}: {e}", binary.display())))?;

    if !output.status.success() {
        return Err(EngineError::Unavailable(format!(
            "{} -version exited with {}",
            binary.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or("ffmpeg").trim().to_string())
}

/// Last non-empty stderr line, which is where ffmpeg puts the actual error.
fn failure_reason(stderr: &[u8], status: std::process::ExitStatus) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("ffmpeg exited with {status}"))
}

impl MediaEngine for FfmpegEngine {
    fn stage(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn run(&self, args: &[String]) -> Result<(), EngineError> {
        // A poisoned lock only means an earlier run panicked; the directory is still usable.
        let _guard = self.run_lock.lock().unwrap_or_else(|e| e.into_inner());
        debug!(args = ?args, "running ffmpeg");

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(self.workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    EngineError::Unavailable(format!("{} disappeared", self.binary.display()))
                } else {
                    EngineError::Storage(e)
                }
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::Processing(failure_reason(&output.stderr, output.status)))
        }
    }

    fn retrieve(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => EngineError::NotFound(name.to_string()),
            _ => EngineError::Storage(e),
        })
    }

    fn release(&self, name: &str) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Storage(e)),
        }
    }

    fn staged_names(&self) -> Result<Vec<String>, EngineError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.workdir.path())? {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::HexColor;
    use crate::command::{build_candidates, ConversionParameters, ScaleMode};
    use std::io::Cursor;

    fn engine_without_probe() -> FfmpegEngine {
        FfmpegEngine::with_binary(PathBuf::from("ffmpeg"), "test".into()).unwrap()
    }

    #[test]
    fn working_storage_round_trip() {
        let engine = engine_without_probe();
        engine.stage("input0.png", b"abc").unwrap();
        assert_eq!(engine.staged_names().unwrap(), vec!["input0.png"]);
        assert_eq!(engine.retrieve("input0.png").unwrap(), b"abc");

        engine.release("input0.png").unwrap();
        engine.release("input0.png").unwrap();
        assert!(engine.staged_names().unwrap().is_empty());
        assert!(matches!(
            engine.retrieve("input0.png"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn storage_names_cannot_escape_workdir() {
        let engine = engine_without_probe();
        assert!(matches!(
            engine.stage("../outside.png", b"x"),
            Err(EngineError::InvalidName(_))
        ));
    }

    #[test]
    fn missing_configured_binary_is_unavailable() {
        let result = FfmpegEngine::locate(Some(Path::new("/definitely/not/here/ffmpeg")));
        assert!(matches!(result, Err(EngineError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn reason_is_last_stderr_line() {
        use std::os::unix::process::ExitStatusExt;
        let status = std::process::ExitStatus::from_raw(256);
        let stderr = b"[Parsed_pad_1] Unable to parse color\nError initializing filter\n\n";
        assert_eq!(failure_reason(stderr, status), "Error initializing filter");
        assert!(failure_reason(b"", status).starts_with("ffmpeg exited with"));
    }

    /// Converts a 40x20 half-transparent PNG and returns the decoded size.
    fn real_conversion_size(engine: &FfmpegEngine, mode: ScaleMode, width: u32, height: u32) -> (u32, u32) {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(40, 20, image::Rgba([255, 0, 0, 128])))
            .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();
        engine.stage("input0.png", &png).unwrap();

        let params = ConversionParameters::new(width, height, HexColor::parse("#00FF00").unwrap(), mode).unwrap();
        let candidates = build_candidates(&params, "input0.png", "output0", true);
        let produced = candidates
            .iter()
            .find(|c| engine.run(&c.args).is_ok())
            .expect("one candidate succeeds");

        let bytes = engine.retrieve(&produced.output_name).unwrap();
        for name in engine.staged_names().unwrap() {
            engine.release(&name).unwrap();
        }
        let decoded = image::load_from_memory(&bytes).unwrap();
        (decoded.width(), decoded.height())
    }

    // Exercises a real ffmpeg when one is installed.
    #[test]
    fn converts_with_real_ffmpeg() {
        let Ok(engine) = FfmpegEngine::load(None) else {
            return;
        };
        assert_eq!(real_conversion_size(&engine, ScaleMode::Fit, 64, 64), (64, 64));
        // 2:1 source into a 3:4 frame: fill must crop to the exact box.
        assert_eq!(real_conversion_size(&engine, ScaleMode::Fill, 48, 64), (48, 64));
    }
}
