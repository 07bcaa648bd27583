//! Run image files through the translation pipeline and write the results.
//! Run with: cargo run --release --bin translate_image -- [--output <dir>] <image>...

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use image_translator::utils::{encode_png_async, load_image_async};
use image_translator::{Config, PipelineOrchestrator};

struct Args {
    output_dir: PathBuf,
    inputs: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut output_dir = PathBuf::from("output");
    let mut inputs = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                output_dir = args.next().map(PathBuf::from).context("--output needs a directory")?;
            }
            _ => inputs.push(PathBuf::from(arg)),
        }
    }

    if inputs.is_empty() {
        bail!("usage: translate_image [--output <dir>] <image>...");
    }
    Ok(Args { output_dir, inputs })
}

fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    dir.join(format!("translated_{}.png", stem))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new()?;

    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "image_translator={},translate_image={}",
        config.log_level(),
        config.log_level()
    ));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let pipeline = PipelineOrchestrator::new(Arc::new(config)).await?;

    let mut images = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        images.push(load_image_async(path).await?);
    }
    info!("Loaded {} images", images.len());

    let result = pipeline.process_batch(images).await;

    for (path, outcome) in args.inputs.iter().zip(result.outcomes) {
        let target = output_path(&args.output_dir, path);
        let report = outcome.report;
        let png = encode_png_async(outcome.image).await?;
        tokio::fs::write(&target, png)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;

        println!(
            "{} -> {}: {} ({} regions, {:.0}ms)",
            path.display(),
            target.display(),
            report.status,
            report.region_count,
            report.total_time_ms
        );
        for warning in &report.warnings {
            println!("    {}", warning);
        }
    }

    println!("\n{}", serde_json::to_string_pretty(&result.analytics)?);

    pipeline.save_cache().await?;
    Ok(())
}
