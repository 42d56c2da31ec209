//! Sketch data-URL utilities
//!
//! Backends receive the sketch as a base64 data URL. These helpers build
//! one from raw image bytes and sanity-check caller input before any
//! network traffic happens.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{ClientError, Result};

/// Create a data URL from binary image data
pub fn encode_data_url(data: &[u8], format: &str) -> String {
    format!("data:image/{};base64,{}", format, STANDARD.encode(data))
}

/// Decode the payload of a sketch data URL back to bytes
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let payload = data_url.split(',').last().unwrap_or(data_url);
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ClientError::Validation(format!("Invalid base64 sketch data: {}", e)))
}

/// Get the image format from a data URL prefix
pub fn format_from_data_url(data_url: &str) -> Option<&str> {
    if data_url.starts_with("data:image/") {
        let end = data_url.find(';')?;
        Some(&data_url[11..end])
    } else {
        None
    }
}

/// Reject sketches that are not image data URLs before contacting any node.
pub fn validate_sketch(data_url: &str) -> Result<()> {
    if !data_url.starts_with("data:image/") {
        return Err(ClientError::Validation(
            "Sketch must be a data:image/... URL".to_string(),
        ));
    }
    if !data_url.contains(";base64,") {
        return Err(ClientError::Validation(
            "Sketch data URL must be base64 encoded".to_string(),
        ));
    }
    Ok(())
}
