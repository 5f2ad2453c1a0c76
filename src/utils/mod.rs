use crate::{ImageToolError, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub fn generate_output_path(input_path: &Path, output: Option<&Path>, suffix: &str) -> PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => {
            let stem = input_path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
            let extension = input_path.extension().and_then(|ext| ext.to_str()).unwrap_or("jpg");

            let timestamp = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);

            let mut new_filename = format!("{stem}_{suffix}_{timestamp}.{extension}");
            let mut counter = 1;

            while Path::new(&new_filename).exists() {
                new_filename = format!("{stem}_{suffix}_{timestamp}_{counter}.{extension}");
                counter += 1;
            }

            input_path.with_file_name(new_filename)
        }
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as usize).min(UNITS.len() - 1);
    let size = bytes_f64 / base.powi(exponent as i32);

    format!("{size:.2} {}", UNITS[exponent])
}

pub fn calculate_aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        0.0
    } else {
        width as f32 / height as f32
    }
}

pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width > 100_000 || height > 100_000 {
        return Err(ImageToolError::InvalidParameter("dimensions too large (max 100,000 per axis)".to_string()));
    }

    if width == 0 && height == 0 {
        return Err(ImageToolError::InvalidParameter("at least one dimension must be specified".to_string()));
    }

    Ok(())
}

pub fn get_image_info(path: &Path) -> Result<(u32, u32, String)> {
    let reader = image::ImageReader::open(path)?.with_guessed_format().map_err(|e| ImageToolError::InputUnreadable(e.to_string()))?;

    let format = reader.format().map(|f| format!("{f:?}")).unwrap_or_else(|| "Unknown".to_string());
    let dimensions = reader.into_dimensions().map_err(|e| ImageToolError::DecodeFailed(e.to_string()))?;

    Ok((dimensions.0, dimensions.1, format))
}

/// Extensions accepted on input, case-insensitively.
const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tga", "gif"];

pub fn is_supported_format(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Strips path separators and `..` so a name derived from user-controlled
/// input can't escape the output directory it's about to be joined with.
pub fn sanitize_filename(filename: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    let cleaned: String = filename.chars().map(|c| if invalid_chars.contains(&c) { '_' } else { c }).collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}

pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension().and_then(|ext| ext.to_str()).map(|s| s.to_lowercase())
}

/// Spec's memory admission estimate: decompressed size is assumed to be up
/// to 100x the compressed byte size (a deliberately conservative bound for
/// arbitrary photographic JPEG/PNG input).
pub fn estimate_decompressed_bytes(compressed_size: u64) -> u64 {
    compressed_size.saturating_mul(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes_across_units() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
    }

    #[test]
    fn rejects_oversized_and_unspecified_dimensions() {
        assert!(validate_dimensions(200_000, 10).is_err());
        assert!(validate_dimensions(0, 0).is_err());
        assert!(validate_dimensions(100, 0).is_ok());
    }

    #[test]
    fn sanitize_filename_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename(".."), "_");
        assert_eq!(sanitize_filename("photo.jpg"), "photo.jpg");
    }

    #[test]
    fn supported_formats_are_case_insensitive() {
        assert!(is_supported_format(Path::new("a.JPG")));
        assert!(is_supported_format(Path::new("a.png")));
        assert!(!is_supported_format(Path::new("a.psd")));
    }
}
