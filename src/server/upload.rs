//! Request input validation and reference-audio staging

use std::io::Write;
use std::path::Path;

use base64::Engine as _;
use tempfile::NamedTempFile;

use crate::core::error::{Result, TtsError};

/// Reject empty text and text over `max_chars` characters
pub fn validate_text(text: &str, max_chars: usize) -> Result<()> {
    if text.is_empty() {
        return Err(TtsError::validation("text", "Text must not be empty"));
    }
    let chars = text.chars().count();
    if chars > max_chars {
        return Err(TtsError::validation(
            "text",
            format!("Text is too long: {} characters (max {})", chars, max_chars),
        ));
    }
    Ok(())
}

/// Lowercased extension of `filename` (with dot), if it is in `allowed`
pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    if ext.is_empty() || !allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
        return Err(TtsError::validation(
            "reference_audio",
            format!("Unsupported audio format, allowed: {}", allowed.join(", ")),
        ));
    }
    Ok(ext)
}

/// Decode a base64 reference-audio payload.
///
/// Accepts an optional `data:...;base64,` prefix and surrounding whitespace.
pub fn decode_base64_audio(encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| {
            TtsError::validation(
                "reference_audio_base64",
                format!("Invalid base64 audio data: {}", e),
            )
        })?;

    if bytes.is_empty() {
        return Err(TtsError::validation(
            "reference_audio_base64",
            "Reference audio is empty",
        ));
    }
    Ok(bytes)
}

/// Parse a form boolean
pub fn parse_form_bool(field: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(TtsError::validation(
            field,
            format!("Invalid boolean for {}: {:?}", field, other),
        )),
    }
}

/// Reference recording staged on disk for the model.
///
/// The file is removed when this value drops.
#[derive(Debug)]
pub struct ReferenceAudio {
    file: NamedTempFile,
}

impl ReferenceAudio {
    /// Write `bytes` to a fresh temp file with the given suffix (e.g. `.wav`)
    pub fn stage(bytes: &[u8], suffix: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("indextts_ref_")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| TtsError::Io {
                message: format!("Failed to create temp reference file: {}", e),
                path: None,
            })?;

        file.write_all(bytes).and_then(|_| file.flush()).map_err(|e| TtsError::Io {
            message: format!("Failed to write temp reference file: {}", e),
            path: Some(file.path().to_path_buf()),
        })?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
