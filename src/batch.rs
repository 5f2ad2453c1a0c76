//! Directory-wide batch processing: walks a tree, fans every matching file
//! out across a bounded worker pool, and aggregates the per-file results.
//! Grounded on the teacher's rayon-based `BatchProcessor`, reworked onto
//! `crate::pool::Pool` and `crate::pipeline::process_one`.

use crate::{pipeline, pool::Pool, utils, ImageToolError, ProcessConfig, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub processed_count: usize,
    pub total_size_before: u64,
    pub total_size_after: u64,
    pub errors: Vec<(String, String)>,
}

pub struct BatchProcessor {
    config: ProcessConfig,
    threads: usize,
    max_files: usize,
    #[allow(dead_code)]
    use_gpu: bool,
}

impl BatchProcessor {
    /// `threads == 0` picks a default of roughly 75% of logical cores.
    /// `use_gpu` is a reserved toggle: no GPU batch-DCT collaborator ships
    /// with this build, so it has no effect beyond being threaded through.
    pub fn new(config: ProcessConfig, threads: usize, max_files: usize, use_gpu: bool) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, threads, max_files, use_gpu })
    }

    pub fn validate_paths(&self, input_dir: &Path, output_dir: &Path) -> Result<()> {
        if !input_dir.exists() {
            return Err(ImageToolError::InvalidParameter(format!("Input directory does not exist: {}", input_dir.display())));
        }
        if !input_dir.is_dir() {
            return Err(ImageToolError::InvalidParameter(format!("Input path is not a directory: {}", input_dir.display())));
        }
        if output_dir.exists() && !output_dir.is_dir() {
            return Err(ImageToolError::InvalidParameter(format!("Output path exists but is not a directory: {}", output_dir.display())));
        }
        Ok(())
    }

    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path, recursive: bool) -> Result<ProcessingStats> {
        let image_paths = self.collect_image_paths(input_dir, recursive)?;

        if image_paths.is_empty() {
            log::warn!("No image files found in {}", input_dir.display());
            return Ok(ProcessingStats::default());
        }

        log::info!("Processing {} images from {}", image_paths.len(), input_dir.display());
        std::fs::create_dir_all(output_dir)?;

        let threads = if self.threads > 0 { self.threads } else { (num_cpus::get() * 3 / 4).max(1) };
        let pool = Pool::new(threads);

        let pb = Arc::new(ProgressBar::new(image_paths.len() as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );

        let options = Arc::new(self.config.to_processing_options());
        let output_dir = output_dir.to_path_buf();
        let results: Arc<Mutex<Vec<JobOutcome>>> = Arc::new(Mutex::new(Vec::with_capacity(image_paths.len())));

        for input_path in image_paths {
            let options = Arc::clone(&options);
            let output_dir = output_dir.clone();
            let results = Arc::clone(&results);
            let pb = Arc::clone(&pb);

            pool.enqueue(move || {
                let outcome = pipeline::process_one(&input_path, &output_dir, &options);
                pb.inc(1);
                let mut results = results.lock().unwrap();
                match outcome {
                    Ok(result) => results.push(Ok(result)),
                    Err(e) => {
                        log::warn!("Failed to process {}: {e}", input_path.display());
                        results.push(Err((input_path, e)));
                    }
                }
            });
        }

        // One hour is generous even for a very large tree; the pool itself
        // has no per-task timeout, this just bounds how long `wait_all`
        // will block before reporting a stuck batch as an error.
        pool.wait_all(Duration::from_secs(3600))?;
        pb.finish_with_message(format!("Processed {} images", pb.position()));

        let mut stats = ProcessingStats::default();
        for entry in Arc::try_unwrap(results).unwrap().into_inner().unwrap() {
            match entry {
                Ok(result) => {
                    stats.total_size_before += result.original_size;
                    if result.success {
                        stats.processed_count += 1;
                        stats.total_size_after += result.compressed_size;
                    } else {
                        stats.errors.push((result.input_path.display().to_string(), result.error_message.unwrap_or_default()));
                    }
                }
                Err((path, e)) => stats.errors.push((path.display().to_string(), e.to_string())),
            }
        }

        Ok(stats)
    }

    /// Walks the tree to at most `max_files` entries (spec's recursion cap),
    /// filtering by `utils::is_supported_format` and tolerating unreadable
    /// entries rather than failing the whole walk.
    fn collect_image_paths(&self, input_dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        let walker = if recursive { WalkDir::new(input_dir) } else { WalkDir::new(input_dir).max_depth(1) };

        let mut paths = Vec::new();
        let mut truncated = false;
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || !utils::is_supported_format(entry.path()) {
                continue;
            }
            if paths.len() >= self.max_files {
                truncated = true;
                break;
            }
            paths.push(entry.into_path());
        }

        if truncated {
            log::warn!("{}: hit the {}-file recursion cap; remaining files were skipped", input_dir.display(), self.max_files);
        }

        Ok(paths)
    }
}

type JobOutcome = std::result::Result<pipeline::ProcessingResult, (PathBuf, ImageToolError)>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn solid_png(path: &Path, w: u32, h: u32) {
        image::RgbImage::from_fn(w, h, |x, y| image::Rgb([x as u8, y as u8, 128])).save(path).unwrap();
    }

    #[test]
    fn validate_paths_rejects_missing_input() {
        let dir = tempdir().unwrap();
        let processor = BatchProcessor::new(ProcessConfig::default(), 1, 500_000, false).unwrap();
        let missing = dir.path().join("nope");
        assert!(processor.validate_paths(&missing, dir.path()).is_err());
    }

    #[test]
    fn processes_every_supported_file_in_a_directory() {
        let dir = tempdir().unwrap();
        let input_dir = dir.path().join("in");
        std::fs::create_dir_all(&input_dir).unwrap();
        solid_png(&input_dir.join("a.png"), 20, 20);
        solid_png(&input_dir.join("b.png"), 20, 20);
        std::fs::write(input_dir.join("notes.txt"), b"not an image").unwrap();

        let output_dir = dir.path().join("out");
        let config = ProcessConfig { format: Some(crate::OutputFormat::Png), ..ProcessConfig::default() };
        let processor = BatchProcessor::new(config, 2, 500_000, false).unwrap();
        let stats = processor.process_directory(&input_dir, &output_dir, false).unwrap();

        assert_eq!(stats.processed_count, 2);
        assert!(stats.errors.is_empty());
    }

    #[test]
    fn empty_directory_yields_zero_stats() {
        let dir = tempdir().unwrap();
        let input_dir = dir.path().join("in");
        std::fs::create_dir_all(&input_dir).unwrap();
        let output_dir = dir.path().join("out");

        let processor = BatchProcessor::new(ProcessConfig::default(), 1, 500_000, false).unwrap();
        let stats = processor.process_directory(&input_dir, &output_dir, false).unwrap();
        assert_eq!(stats.processed_count, 0);
    }
}
