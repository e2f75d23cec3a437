use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use framereel::{ConversionReport, ConversionRequest, PipelineConfig, ReelResult};

#[derive(Parser, Debug)]
#[command(name = "framereel", version, about = "Encode still images into an H.264 MP4")]
struct Cli {
    /// Input images, in display order.
    frames: Vec<PathBuf>,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Frames per second (defaults to the config's `default_fps`).
    #[arg(long)]
    fps: Option<u32>,

    /// JSON pipeline config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the ffmpeg encoder (e.g. `h264_nvenc`).
    #[arg(long)]
    encoder: Option<String>,

    /// Override the target bitrate in bits per second.
    #[arg(long)]
    bitrate: Option<u32>,

    /// Fail instead of replacing an existing output file.
    #[arg(long, default_value_t = false)]
    no_overwrite: bool,

    /// Print a JSON result object on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum CliResult<'a> {
    Ok {
        ok: bool,
        path: String,
        report: &'a ConversionReport,
    },
    Err {
        ok: bool,
        code: &'static str,
        message: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let result = run(cli);

    let line = match &result {
        Ok(report) => {
            if !json {
                eprintln!("wrote {}", report.output.display());
            }
            CliResult::Ok {
                ok: true,
                path: report.output.display().to_string(),
                report,
            }
        }
        Err(err) => {
            if !json {
                eprintln!("error [{}]: {err}", err.kind().code());
            }
            CliResult::Err {
                ok: false,
                code: err.kind().code(),
                message: err.to_string(),
            }
        }
    };

    if json {
        match serde_json::to_string(&line) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to serialize result: {e}"),
        }
    }

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: Cli) -> ReelResult<ConversionReport> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(encoder) = cli.encoder {
        config.encoder.ffmpeg_encoder = encoder;
    }
    if let Some(bitrate) = cli.bitrate {
        config.encoder.bitrate = bitrate;
    }
    if cli.no_overwrite {
        config.overwrite = false;
    }
    config.validate()?;

    let request = ConversionRequest {
        frames: cli.frames,
        output: cli.out,
        fps: cli.fps,
    };
    framereel::convert_images_to_video(&request, &config)
}
