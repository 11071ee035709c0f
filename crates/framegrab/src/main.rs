mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use framegrab_core::library::{LibraryConfig, MediaLibrary};
use framegrab_core::sampler::SamplerOptions;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let tools = cli.decoder_tools();
    let library = MediaLibrary::new(LibraryConfig {
        upload_dir: cli.upload_dir,
        output_dir: cli.output_dir,
    });

    match cli.command {
        cli::Command::Upload { files } => {
            let mut uploaded = 0;
            for file in &files {
                match library.import_video(file) {
                    Ok(stored) => {
                        uploaded += 1;
                        println!("uploaded {}", stored.display());
                    }
                    Err(e) => println!("rejected {}: {e}", file.display()),
                }
            }
            info!(
                uploaded,
                rejected = files.len() - uploaded,
                "upload finished"
            );
            Ok(())
        }

        cli::Command::List => {
            let videos = library
                .list_videos()
                .context("failed to list uploaded videos")?;
            let folders = library
                .list_output_folders()
                .context("failed to list output folders")?;

            println!("uploaded videos:");
            for video in &videos {
                println!("  {video}");
            }
            println!("output folders:");
            for folder in &folders {
                println!("  {folder}");
            }
            Ok(())
        }

        cli::Command::Extract {
            fps,
            quality,
            all,
            videos,
        } => {
            let videos = if all {
                library
                    .list_videos()
                    .context("failed to list uploaded videos")?
            } else {
                videos
            };
            if videos.is_empty() {
                warn!("no videos selected");
                return Ok(());
            }

            let cancel = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancel);
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .context("failed to install Ctrl-C handler")?;

            let options = SamplerOptions {
                jpeg_quality: quality,
                cancel: Some(cancel),
                tools,
            };
            let entries = library.process_batch(&videos, fps, &options);

            for entry in &entries {
                println!(
                    "{}: {} frames -> {} ({})",
                    entry.video,
                    entry.report.frames_saved,
                    entry.destination.display(),
                    entry.report.status,
                );
            }
            info!(
                processed = entries.len(),
                %fps,
                "processed {} videos at {} frames per second",
                entries.len(),
                fps
            );
            Ok(())
        }

        cli::Command::Gallery { folder } => {
            let images = library
                .gallery(&folder)
                .with_context(|| format!("failed to open gallery {folder}"))?;
            for image in &images {
                let path = library.image_path(&folder, image)?;
                println!("{}", path.display());
            }
            info!(%folder, image_count = images.len(), "gallery listed");
            Ok(())
        }
    }
}
