// pixie/src/main.rs
use clap::Parser;
use log::LevelFilter;
use pixie::prelude::*;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .init();

    let max_file_size = cli.max_file_size.map(|mb| mb * 1024 * 1024);

    let outcome = match cli.command {
        Commands::Resize {
            input,
            output,
            width,
            height,
            scale,
            quality,
            format,
            keep_aspect,
            strip_metadata,
            algorithm,
            progressive: _,
        } => process_resize(input, output, width, height, scale, quality, format, keep_aspect, strip_metadata, algorithm, max_file_size),

        Commands::Batch {
            input,
            output,
            width,
            height,
            format,
            quality,
            threads,
            recursive,
            strip_metadata,
            algorithm,
            no_png_optimize: _,
            max_files,
            use_gpu,
        } => return process_batch(input, output, width, height, format, quality, threads, recursive, strip_metadata, algorithm, max_files, use_gpu, max_file_size),

        Commands::Optimize { input, output, quality, strip_metadata, progressive: _, no_png_optimize: _ } => {
            process_optimize(input, output, quality, strip_metadata, max_file_size)
        }

        Commands::Info { input, exif } => process_info(input, exif),

        Commands::Convert { input, output, format, quality, strip_metadata } => process_convert(input, output, format, quality, strip_metadata, max_file_size),
    };

    match outcome {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn process_resize(
    input: std::path::PathBuf,
    output: Option<std::path::PathBuf>,
    width: u32,
    height: u32,
    scale: f32,
    quality: u8,
    format: Option<CliOutputFormat>,
    keep_aspect: bool,
    strip_metadata: bool,
    algorithm: Algorithm,
    max_file_size: Option<u64>,
) -> anyhow::Result<()> {
    use pixie::utils::generate_output_path;

    let output_path = generate_output_path(&input, output.as_deref(), "resized");

    let config = ProcessConfig {
        width,
        height,
        scale,
        quality,
        keep_aspect,
        strip_metadata,
        algorithm: algorithm.into(),
        max_file_size,
        format: format.map(Into::into),
    };
    config.validate()?;

    let processor = ImageProcessor::new(config);
    let result = processor.process(&input, &output_path)?;

    println!("Resized image saved to: {}", result.output_path.display());
    print_result(&result);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_batch(
    input: std::path::PathBuf,
    output: std::path::PathBuf,
    width: u32,
    height: u32,
    format: Option<CliOutputFormat>,
    quality: u8,
    threads: usize,
    recursive: bool,
    strip_metadata: bool,
    algorithm: Algorithm,
    max_files: usize,
    use_gpu: bool,
    max_file_size: Option<u64>,
) -> ExitCode {
    let run = || -> anyhow::Result<ProcessingStats> {
        let config = ProcessConfig {
            width,
            height,
            scale: 0.0,
            quality,
            keep_aspect: true,
            strip_metadata,
            algorithm: algorithm.into(),
            max_file_size,
            format: format.map(Into::into),
        };
        config.validate()?;

        let processor = BatchProcessor::new(config, threads, max_files, use_gpu)?;
        processor.validate_paths(&input, &output)?;
        Ok(processor.process_directory(&input, &output, recursive)?)
    };

    match run() {
        Ok(stats) => {
            println!("Batch processing complete.");
            print_stats(&stats);
            if !stats.errors.is_empty() {
                println!("\nErrors encountered:");
                for (context, error) in &stats.errors {
                    println!("  - {context}: {error}");
                }
            }
            // Spec's exit-code contract: 0 all succeeded, 1 partial failure,
            // 2 every file failed.
            if stats.errors.is_empty() {
                ExitCode::from(0)
            } else if stats.processed_count > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn process_optimize(
    input: std::path::PathBuf,
    output: Option<std::path::PathBuf>,
    quality: u8,
    strip_metadata: bool,
    max_file_size: Option<u64>,
) -> anyhow::Result<()> {
    use pixie::utils::generate_output_path;

    let output_path = generate_output_path(&input, output.as_deref(), "optimized");

    let config = ProcessConfig { quality, strip_metadata, max_file_size, ..ProcessConfig::default() };
    config.validate()?;

    let processor = ImageProcessor::new(config);
    let result = processor.process(&input, &output_path)?;

    println!("Optimized image saved to: {}", result.output_path.display());
    print_result(&result);
    Ok(())
}

fn process_info(input: std::path::PathBuf, show_exif: bool) -> anyhow::Result<()> {
    use pixie::utils::format_file_size;

    if !input.exists() {
        anyhow::bail!("File does not exist: {}", input.display());
    }

    let processor = ImageProcessor::new(ProcessConfig::default());
    let metadata = processor.get_metadata(&input)?;

    println!("=== Image Information ===");
    println!("File: {}", input.display());
    println!("Size: {}", format_file_size(metadata.file_size));
    println!("Dimensions: {} x {} pixels", metadata.width, metadata.height);
    println!("Aspect Ratio: {:.2}:1", metadata.width as f32 / metadata.height as f32);
    println!("Format: {}", metadata.format);
    println!("Has EXIF metadata: {}", metadata.has_exif);

    if show_exif && metadata.has_exif {
        let metadata_processor = MetadataProcessor::new();
        if let Ok(Some(exif_data)) = metadata_processor.read_metadata(&input) {
            println!("\n{}", metadata_processor.print_metadata(&exif_data));
        }
    }

    Ok(())
}

fn process_convert(
    input: std::path::PathBuf,
    output: Option<std::path::PathBuf>,
    format: CliOutputFormat,
    quality: u8,
    strip_metadata: bool,
    max_file_size: Option<u64>,
) -> anyhow::Result<()> {
    use pixie::utils::generate_output_path;

    let output_path = generate_output_path(&input, output.as_deref(), "converted");

    let config = ProcessConfig {
        quality,
        strip_metadata,
        max_file_size,
        format: Some(format.into()),
        ..ProcessConfig::default()
    };
    config.validate()?;

    let processor = ImageProcessor::new(config);
    let result = processor.process(&input, &output_path)?;

    println!("Converted image saved to: {}", result.output_path.display());
    print_result(&result);
    Ok(())
}

fn print_result(result: &ProcessingResult) {
    use pixie::utils::format_file_size;
    let ratio = result.compression_ratio();
    println!(
        "  {} -> {} ({:.1}% of original, {}ms)",
        format_file_size(result.original_size),
        format_file_size(result.compressed_size),
        ratio * 100.0,
        result.processing_time_ms,
    );
}

fn print_stats(stats: &ProcessingStats) {
    use pixie::utils::format_file_size;

    if stats.processed_count > 0 && stats.total_size_before > 0 {
        let reduction = if stats.total_size_after < stats.total_size_before {
            let percent = (stats.total_size_before - stats.total_size_after) as f64 / stats.total_size_before as f64 * 100.0;
            format!(" (reduced by {percent:.1}%)")
        } else {
            String::new()
        };

        println!("  Processed: {} file(s)", stats.processed_count);
        println!("  Original size: {}", format_file_size(stats.total_size_before));
        println!("  Final size: {}{}", format_file_size(stats.total_size_after), reduction);
    }
}
