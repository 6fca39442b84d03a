//! Post-conversion output validation.
//!
//! A converter exiting zero proves nothing about its output; the file is
//! checked before the pipeline declares success.

use std::path::Path;

use crate::error::ConvertError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A plaintext transcript: must decode to something non-blank.
    PlainText,
    /// A raster thumbnail: must start with a recognizable image header.
    RasterImage,
}

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
const JPEG_MAGIC: [u8; 3] = [0xff, 0xd8, 0xff];

/// Confirm the converter actually produced the artifact it was asked for.
pub fn validate_output(path: &Path, kind: OutputKind) -> Result<(), ConvertError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Err(ConvertError::OutputMissing(path.to_path_buf())),
    };

    if metadata.len() == 0 {
        return Err(ConvertError::OutputEmpty);
    }

    match kind {
        OutputKind::PlainText => {
            let bytes = std::fs::read(path)
                .map_err(|e| ConvertError::OutputMalformed(format!("unreadable output: {e}")))?;
            let text = String::from_utf8_lossy(&bytes);
            if text.trim().is_empty() {
                return Err(ConvertError::OutputEmpty);
            }
        }
        OutputKind::RasterImage => {
            let bytes = std::fs::read(path)
                .map_err(|e| ConvertError::OutputMalformed(format!("unreadable output: {e}")))?;
            if !has_image_magic(&bytes) {
                return Err(ConvertError::OutputMalformed(
                    "no PNG or JPEG header".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn has_image_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_MAGIC) || bytes.starts_with(&JPEG_MAGIC)
}
