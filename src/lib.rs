pub mod batch;
pub mod cli;
pub mod exif;
pub mod jpeg_enc;
pub mod metadata;
pub mod mmap;
pub mod pipeline;
pub mod pool;
pub mod resize;
pub mod utils;

use std::path::Path;
use thiserror::Error;

pub use pipeline::{ProcessingOptions, ProcessingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    SameAsInput,
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub quality: u8,
    pub keep_aspect: bool,
    pub strip_metadata: bool,
    pub algorithm: ResizeAlgorithm,
    pub max_file_size: Option<u64>,
    pub format: Option<OutputFormat>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            scale: 0.0,
            quality: 85,
            keep_aspect: true,
            strip_metadata: false,
            algorithm: ResizeAlgorithm::Lanczos3,
            max_file_size: None,
            format: None,
        }
    }
}

impl ProcessConfig {
    /// Sanity checks run before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(ImageToolError::InvalidParameter(format!(
                "quality must be in 1..=100, got {}",
                self.quality
            )));
        }
        if self.width > 0 || self.height > 0 {
            utils::validate_dimensions(self.width.max(1), self.height.max(1))?;
        }
        Ok(())
    }

    /// Translate the CLI's width/height/scale trio into the pipeline's
    /// max-dimension options.
    pub fn to_processing_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            quality: self.quality,
            max_width: self.width,
            max_height: self.height,
            preserve_aspect: self.keep_aspect,
            format: self.format,
            use_gpu: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ImageToolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("Input unreadable: {0}")]
    InputUnreadable(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Image too large: {0}")]
    Oversized(String),

    #[error("Insufficient memory to process image: {0}")]
    InsufficientMemory(String),

    #[error("Resize failed: {0}")]
    ResizeFailed(String),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("Pool timed out waiting for {0} task(s) to finish")]
    PoolTimeout(usize),
}

pub type Result<T> = std::result::Result<T, ImageToolError>;

pub mod prelude {
    pub use crate::batch::{BatchProcessor, ProcessingStats};
    pub use crate::cli::{Algorithm, Cli, Commands, OutputFormat as CliOutputFormat};
    pub use crate::metadata::MetadataProcessor;
    pub use crate::pipeline::{ProcessingOptions, ProcessingResult};
    pub use crate::{ImageProcessor, ImageToolError, OutputFormat, ProcessConfig, ResizeAlgorithm, Result};
}

/// Facade tying exif/resize/jpeg_enc/pipeline together for a single-image
/// CLI invocation (`resize`, `optimize`, `convert`, `info`).
/// Batch runs go through `BatchProcessor` instead, which drives the same
/// `pipeline::process_one` entry point from many worker threads.
pub struct ImageProcessor {
    config: ProcessConfig,
}

impl ImageProcessor {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    pub fn process<P: AsRef<Path>>(&self, input_path: P, output_path: P) -> Result<ProcessingResult> {
        let options = self.config.to_processing_options();
        let output_dir = output_path
            .as_ref()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(output_dir)?;

        let desired_name = output_path
            .as_ref()
            .file_name()
            .ok_or_else(|| ImageToolError::InvalidParameter("output path has no file name".into()))?;

        let result = pipeline::process_one(input_path.as_ref(), output_dir, &options)?;

        // `pipeline::process_one` names the output after the input's own
        // basename (spec §4.7 step 6); rename to whatever the caller asked
        // for so single-image commands keep their own output-path naming.
        let actual_output = output_dir.join(desired_name);
        if result.output_path != actual_output && result.output_path.exists() {
            std::fs::rename(&result.output_path, &actual_output)?;
        }

        Ok(ProcessingResult {
            output_path: actual_output,
            ..result
        })
    }

    pub fn process_single<P: AsRef<Path>>(&self, input_path: P, output_path: P) -> Result<ProcessingResult> {
        self.process(input_path, output_path)
    }

    pub fn get_metadata<P: AsRef<Path>>(&self, path: P) -> Result<metadata::ImageMetadata> {
        metadata::MetadataProcessor::new().get_metadata(path.as_ref())
    }
}
