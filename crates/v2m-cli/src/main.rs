//! Command-line front end: one local-file conversion per invocation,
//! progress rendered inline, no upload path.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::builder::PossibleValuesParser;
use clap::Parser;

use v2m_media::{check_ffmpeg, start_encode, EncodeEvent, EncodeOutcome};
use v2m_models::ConvertOptions;

#[derive(Parser, Debug)]
#[command(name = "v2m", version, about = "Convert various video formats to MP4")]
struct Args {
    /// Path to input video file
    input_file: Option<PathBuf>,

    /// Path to output MP4 file (default: input_file.mp4)
    output_file: Option<PathBuf>,

    /// Video codec
    #[arg(long, default_value = "libx264")]
    codec: String,

    /// Encoding preset
    #[arg(
        long,
        default_value = "medium",
        value_parser = PossibleValuesParser::new([
            "ultrafast", "superfast", "veryfast", "faster", "fast",
            "medium", "slow", "slower", "veryslow", "placebo",
        ])
    )]
    preset: String,

    /// Constant Rate Factor
    #[arg(long, default_value_t = 23)]
    crf: u32,

    /// Audio codec
    #[arg(long, default_value = "aac")]
    audio_codec: String,

    /// Audio bitrate
    #[arg(long, default_value = "128k")]
    audio_bitrate: String,

    /// Video resolution (e.g. 1920x1080)
    #[arg(long)]
    resolution: Option<String>,

    /// Check if FFmpeg is installed
    #[arg(long)]
    check_ffmpeg: bool,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let args = Args::parse();

    if args.check_ffmpeg {
        return Ok(if check_ffmpeg().is_ok() {
            println!("FFmpeg is installed and accessible");
            0
        } else {
            println!("FFmpeg is not installed or not in PATH");
            1
        });
    }

    let input = match args.input_file {
        Some(input) => input,
        None => bail!("input_file is required"),
    };
    if !input.is_file() {
        bail!("input file '{}' does not exist", input.display());
    }

    let output = args
        .output_file
        .unwrap_or_else(|| input.with_extension("mp4"));

    let options = ConvertOptions {
        codec: Some(args.codec),
        preset: Some(args.preset),
        crf: Some(args.crf),
        audio_codec: Some(args.audio_codec),
        audio_bitrate: Some(args.audio_bitrate),
        resolution: args.resolution,
    };

    println!("Converting {} to {}...", input.display(), output.display());

    let mut handle = start_encode(&input, &output, &options).await?;
    let kill = handle.kill_switch();

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(EncodeEvent::Progress(sample)) => {
                    print!("\rProgress: {}% ", sample.percentage());
                    let _ = std::io::stdout().flush();
                }
                Some(EncodeEvent::Finished(outcome)) => {
                    return Ok(match outcome {
                        EncodeOutcome::Success { output } => {
                            println!("\nConversion completed successfully!");
                            println!("Output file: {}", output.display());
                            0
                        }
                        EncodeOutcome::Failure { message } => {
                            eprintln!("\nError: {}", message);
                            1
                        }
                        EncodeOutcome::Cancelled => {
                            eprintln!("\nConversion cancelled");
                            130
                        }
                    });
                }
                None => bail!("encoder stream ended unexpectedly"),
            },
            _ = tokio::signal::ctrl_c() => {
                kill.kill();
            }
        }
    }
}
