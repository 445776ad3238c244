// command.rs - Conversion parameters and the ffmpeg argument vectors built from them

use crate::color::HexColor;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    /// Whole image visible, letterboxed with the background color.
    #[default]
    Fit,
    /// Target box fully covered, overflow cropped from the center.
    Fill,
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fit => write!(f, "Fit (letterbox)"),
            Self::Fill => write!(f, "Fill (crop)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    fn pixel_format(&self) -> &'static str {
        match self {
            Self::Jpeg => "yuvj444p",
            Self::Png => "rgb24",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => write!(f, "JPEG"),
            Self::Png => write!(f, "PNG"),
        }
    }
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionParameters {
    pub width: u32,
    pub height: u32,
    pub background: HexColor,
    pub mode: ScaleMode,
    pub format: OutputFormat,
    /// ffmpeg `-q:v` value, 2 (best) to 31.
    pub jpeg_quality: u8,
}

impl ConversionParameters {
    pub fn new(
        width: u32,
        height: u32,
        background: HexColor,
        mode: ScaleMode,
    ) -> Result<Self, ValidationError> {
        check_positive("width", width)?;
        check_positive("height", height)?;
        Ok(Self {
            width,
            height,
            background,
            mode,
            format: OutputFormat::Jpeg,
            jpeg_quality: 2,
        })
    }

    /// Validate raw form input. Dimensions are checked before the color.
    pub fn parse(
        width: &str,
        height: &str,
        background: &str,
        mode: ScaleMode,
    ) -> Result<Self, ValidationError> {
        let width = parse_dimension("width", width)?;
        let height = parse_dimension("height", height)?;
        let background = HexColor::parse(background)?;
        Self::new(width, height, background, mode)
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(2, 31);
        self
    }
}

fn check_positive(field: &'static str, value: u32) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::InvalidDimension {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_dimension(field: &'static str, value: &str) -> Result<u32, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingDimension { field });
    }
    match trimmed.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ValidationError::InvalidDimension {
            field,
            value: trimmed.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One input: scale, pad or crop to size, normalize pixel format.
    PadFilter,
    /// Two inputs: a solid canvas with the scaled source overlaid at its center.
    Composite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCandidate {
    pub args: Vec<String>,
    pub output_name: String,
    pub strategy: Strategy,
    pub color: String,
}

/// Build the fallback chain for one file, most preferred first.
///
/// Sources that may be transparent lead with the composite strategy; opaque
/// ones lead with the single-input pad filter. Each color encoding is tried
/// with both strategies before moving to the next encoding. Each candidate
/// writes to its own output name (`<output_base>_<attempt>.<ext>`).
///
/// The ordering is tuned against ffmpeg's observed color parsing, not derived
/// from its documentation.
pub fn build_candidates(
    params: &ConversionParameters,
    input_name: &str,
    output_base: &str,
    transparent: bool,
) -> Vec<CommandCandidate> {
    let strategies = if transparent {
        [Strategy::Composite, Strategy::PadFilter]
    } else {
        [Strategy::PadFilter, Strategy::Composite]
    };

    let mut candidates = Vec::new();
    for color in params.background.encodings() {
        for strategy in strategies {
            let output_name = format!(
                "{}_{}.{}",
                output_base,
                candidates.len(),
                params.format.file_extension()
            );
            let args = match strategy {
                Strategy::PadFilter => pad_filter_args(params, input_name, &color, &output_name),
                Strategy::Composite => composite_args(params, input_name, &color, &output_name),
            };
            candidates.push(CommandCandidate {
                args,
                output_name,
                strategy,
                color: color.clone(),
            });
        }
    }
    candidates
}

fn scale_filter(params: &ConversionParameters) -> String {
    let (w, h) = (params.width, params.height);
    match params.mode {
        ScaleMode::Fit => format!("scale={w}:{h}:force_original_aspect_ratio=decrease:flags=lanczos"),
        ScaleMode::Fill => format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase:flags=lanczos,crop={w}:{h}"
        ),
    }
}

fn pad_filter_args(
    params: &ConversionParameters,
    input_name: &str,
    color: &str,
    output_name: &str,
) -> Vec<String> {
    let (w, h) = (params.width, params.height);
    let filter = format!(
        "{},pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color={color},format={}",
        scale_filter(params),
        params.format.pixel_format()
    );

    let mut args = leading_args();
    args.extend(["-i".to_string(), input_name.to_string()]);
    args.extend(["-vf".to_string(), filter]);
    args.extend(trailing_args(params, output_name));
    args
}

fn composite_args(
    params: &ConversionParameters,
    input_name: &str,
    color: &str,
    output_name: &str,
) -> Vec<String> {
    let (w, h) = (params.width, params.height);
    let canvas = format!("color=c={color}:s={w}x{h}");
    let graph = format!(
        "[1:v]{}[fg];[0:v][fg]overlay=x=(W-w)/2:y=(H-h)/2:format=auto,format={}",
        scale_filter(params),
        params.format.pixel_format()
    );

    let mut args = leading_args();
    args.extend(["-f".to_string(), "lavfi".to_string(), "-i".to_string(), canvas]);
    args.extend(["-i".to_string(), input_name.to_string()]);
    args.extend(["-filter_complex".to_string(), graph]);
    args.extend(trailing_args(params, output_name));
    args
}

fn leading_args() -> Vec<String> {
    ["-hide_banner", "-loglevel", "error", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn trailing_args(params: &ConversionParameters, output_name: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-frames:v".into(), "1".into(), "-update".into(), "1".into()];
    if params.format == OutputFormat::Jpeg {
        args.extend(["-q:v".to_string(), params.jpeg_quality.to_string()]);
    }
    args.push(output_name.to_string());
    args
}
