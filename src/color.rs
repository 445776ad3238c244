// color.rs - Background color parsing and the encodings the engine accepts

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9A-Fa-f]{3}|[0-9A-Fa-f]{6})$").expect("hex color pattern compiles")
});

/// A validated `#RRGGBB` color. Short `#RGB` input is expanded by doubling each digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexColor {
    digits: String,
    original: String,
}

impl HexColor {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if !HEX_COLOR.is_match(trimmed) {
            return Err(ValidationError::InvalidColor(input.to_string()));
        }

        let raw = &trimmed[1..];
        let digits: String = if raw.len() == 3 {
            raw.chars().flat_map(|c| [c, c]).collect()
        } else {
            raw.to_string()
        };

        Ok(Self {
            digits: digits.to_ascii_uppercase(),
            original: trimmed.to_string(),
        })
    }

    /// Cheap check for live feedback while the user is typing.
    pub fn is_valid(input: &str) -> bool {
        HEX_COLOR.is_match(input.trim())
    }

    /// Equivalent spellings in preference order: alpha-suffixed, bare digits,
    /// `0x` prefix, then the form the user typed. Duplicates are dropped.
    pub fn encodings(&self) -> Vec<String> {
        let candidates = [
            format!("#{}FF", self.digits),
            self.digits.clone(),
            format!("0x{}", self.digits),
            self.original.clone(),
        ];

        let mut encodings: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !encodings.contains(&candidate) {
                encodings.push(candidate);
            }
        }
        encodings
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.digits)
    }
}
