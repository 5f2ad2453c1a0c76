//! EXIF/metadata inspection and stripping. The fast orientation lookup used
//! by the processing pipeline lives in `crate::exif`; this module is for the
//! CLI's `info --exif` display and the `--strip-metadata` flag, both of
//! which want the full tag set rather than just the orientation byte.

use crate::{utils, ImageToolError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub has_exif: bool,
}

pub struct MetadataProcessor;

impl Default for MetadataProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn get_metadata(&self, path: &Path) -> Result<ImageMetadata> {
        let file_size = std::fs::metadata(path).map_err(|e| ImageToolError::InputUnreadable(e.to_string()))?.len();
        let (width, height, format) = utils::get_image_info(path)?;
        let has_exif = self.has_metadata(path);
        Ok(ImageMetadata { file_size, width, height, format, has_exif })
    }

    /// Reads the full EXIF tag set via the `kamadak-exif` crate. Distinct
    /// from `crate::exif::read_jpeg_orientation`, which only hunts for the
    /// orientation tag and never allocates a tag table.
    pub fn read_metadata(&self, path: &Path) -> Result<Option<::exif::Exif>> {
        let file = File::open(path)?;
        let mut bufreader = BufReader::new(&file);

        match ::exif::Reader::new().read_from_container(&mut bufreader) {
            Ok(data) => {
                log::info!("Found EXIF data in {}", path.display());
                Ok(Some(data))
            }
            Err(::exif::Error::NotFound(_)) => {
                log::debug!("No EXIF data found in {}", path.display());
                Ok(None)
            }
            Err(e) => {
                log::warn!("Failed to read EXIF from {}: {}", path.display(), e);
                Err(ImageToolError::ProcessingError(format!("EXIF read error: {e}")))
            }
        }
    }

    pub fn print_metadata(&self, data: &::exif::Exif) -> String {
        use ::exif::Tag;
        let mut out = String::from("--- EXIF Metadata ---\n");

        for field in data.fields() {
            out.push_str(&format!("{} {}: {}\n", field.tag, field.ifd_num, field.display_value().with_unit(data)));

            match field.tag {
                Tag::ImageDescription => out.push_str(&format!("  Description: {}\n", field.display_value())),
                Tag::Make => out.push_str(&format!("  Camera Make: {}\n", field.display_value())),
                Tag::Model => out.push_str(&format!("  Camera Model: {}\n", field.display_value())),
                Tag::DateTime => out.push_str(&format!("  Date Time: {}\n", field.display_value())),
                Tag::ExposureTime => out.push_str(&format!("  Exposure: {}\n", field.display_value())),
                Tag::FNumber => out.push_str(&format!("  Aperture: f/{}\n", field.display_value())),
                Tag::FocalLength => out.push_str(&format!("  Focal Length: {}\n", field.display_value())),
                Tag::PhotographicSensitivity => out.push_str(&format!("  ISO: {}\n", field.display_value())),
                _ => {}
            }
        }

        out
    }

    pub fn has_metadata(&self, path: &Path) -> bool {
        self.read_metadata(path).map(|data| data.is_some()).unwrap_or(false)
    }

    /// Drops any APP1 (EXIF) segment from a JPEG byte stream. PNG/other
    /// formats are returned unchanged -- their metadata, if any, rides in
    /// ancillary chunks the encoder never writes in the first place.
    pub fn strip_metadata_from_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
            return Ok(data.to_vec());
        }

        let mut out = Vec::with_capacity(data.len());
        out.extend_from_slice(&data[0..2]);
        let mut pos = 2usize;

        while pos + 4 <= data.len() && data[pos] == 0xFF {
            let marker = data[pos + 1];
            if marker == 0xD9 || marker == 0xDA {
                // EOI or start-of-scan: copy the remainder verbatim.
                out.extend_from_slice(&data[pos..]);
                return Ok(out);
            }

            let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            if seg_len < 2 || pos + 2 + seg_len > data.len() {
                // Malformed length; bail out and return what we have so far
                // verbatim rather than guess.
                out.extend_from_slice(&data[pos..]);
                return Ok(out);
            }
            let segment_end = pos + 2 + seg_len;

            if marker == 0xE1 {
                log::debug!("strip_metadata: dropped APP1 segment ({seg_len} bytes)");
            } else {
                out.extend_from_slice(&data[pos..segment_end]);
            }
            pos = segment_end;
        }

        out.extend_from_slice(&data[pos..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_jpeg_passes_through_unchanged() {
        let processor = MetadataProcessor::new();
        let png_sig = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(processor.strip_metadata_from_bytes(&png_sig).unwrap(), png_sig);
    }

    #[test]
    fn drops_app1_segment_from_jpeg() {
        let processor = MetadataProcessor::new();
        let mut jpeg = vec![0xFF, 0xD8];
        // APP1 segment: marker + 2-byte length (6) + 4 bytes payload
        jpeg.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x06, b'E', b'x', b'i', b'f']);
        // APP0 segment kept as-is
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x06, b'J', b'F', b'I', b'F']);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let stripped = processor.strip_metadata_from_bytes(&jpeg).unwrap();
        assert!(!stripped.windows(4).any(|w| w == b"Exif"));
        assert!(stripped.windows(4).any(|w| w == b"JFIF"));
        assert_eq!(&stripped[0..2], &[0xFF, 0xD8]);
        assert_eq!(&stripped[stripped.len() - 2..], &[0xFF, 0xD9]);
    }
}
