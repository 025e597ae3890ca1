//! Scan encoding: `DecodedImage` → base64 PNG wrapped in `ImageData`.
//!
//! Multimodal APIs take images as base64 payloads inside the JSON request
//! body. The decoded pixels are re-encoded losslessly as PNG at their
//! original size; fine detail in a scan matters more than request size.

use super::extract::DecodedImage;
use crate::error::BackendError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::io::Cursor;
use tracing::debug;

/// Encode a decoded scan as a base64 PNG ready for the vision model.
///
/// `detail: "high"` asks tiling providers to look at the full-resolution
/// image rather than a single low-resolution overview tile.
pub fn encode_scan(img: &DecodedImage) -> Result<ImageData, BackendError> {
    let mut buf = Vec::new();
    img.pixels()
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| BackendError::ImageEncoding {
            detail: e.to_string(),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} scan → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
