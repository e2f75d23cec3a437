use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::backend::{EncoderBackend, EncoderFormat};
use crate::codec::ffmpeg::FfmpegBackend;
use crate::config::PipelineConfig;
use crate::encoder::driver::{DrainMode, EncoderDriver, EncoderState};
use crate::foundation::core::{Dimensions, Fps, PresentationTime};
use crate::foundation::error::{ReelError, ReelResult};
use crate::mux::sink::MuxerSink;
use crate::source::frames::{FrameSource, SourceEvent};

/// One images-to-video job.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ConversionRequest {
    /// Input images, in display order.
    pub frames: Vec<PathBuf>,
    /// Destination MP4 path.
    pub output: PathBuf,
    /// Frames per second; `None` uses the configured default.
    pub fps: Option<u32>,
}

/// Summary of a finished conversion.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ConversionReport {
    /// File that was written.
    pub output: PathBuf,
    /// Resolution taken from the first decoded image.
    pub dimensions: Dimensions,
    /// Frame rate used for timestamps.
    pub fps: Fps,
    /// Frames handed to the encoder.
    pub frames_submitted: u64,
    /// Images that failed to decode.
    pub frames_skipped: u64,
    /// Samples the muxer wrote.
    pub samples_written: u64,
    /// Presentation timestamp of each submitted frame, in submission order.
    pub timestamps: Vec<PresentationTime>,
}

struct Plan<'a> {
    frames: &'a [PathBuf],
    output: &'a Path,
    fps: Fps,
}

fn validate<'a>(
    request: &'a ConversionRequest,
    config: &PipelineConfig,
) -> ReelResult<Plan<'a>> {
    if request.frames.is_empty() {
        return Err(ReelError::invalid_input("no input frames given"));
    }
    if request.output.as_os_str().is_empty() {
        return Err(ReelError::invalid_input("no output path given"));
    }
    config.validate()?;
    let fps = config.resolve_fps(request.fps)?;
    if !config.overwrite && request.output.exists() {
        return Err(ReelError::invalid_input(format!(
            "output file '{}' already exists",
            request.output.display()
        )));
    }
    Ok(Plan {
        frames: &request.frames,
        output: &request.output,
        fps,
    })
}

/// Encode `request.frames` into an H.264 MP4 with the `ffmpeg` backend.
#[tracing::instrument(skip_all, fields(frames = request.frames.len(), output = %request.output.display()))]
pub fn convert_images_to_video(
    request: &ConversionRequest,
    config: &PipelineConfig,
) -> ReelResult<ConversionReport> {
    let plan = validate(request, config)?;
    let backend = FfmpegBackend::new(config.encoder.clone())?;
    run(plan, config, backend)
}

/// Same as [`convert_images_to_video`] with a caller-supplied encoder backend.
#[tracing::instrument(skip_all, fields(frames = request.frames.len(), backend = backend.name()))]
pub fn convert_with_backend<B: EncoderBackend>(
    request: &ConversionRequest,
    config: &PipelineConfig,
    backend: B,
) -> ReelResult<ConversionReport> {
    let plan = validate(request, config)?;
    run(plan, config, backend)
}

fn run<B: EncoderBackend>(
    plan: Plan<'_>,
    config: &PipelineConfig,
    backend: B,
) -> ReelResult<ConversionReport> {
    tracing::info!(frames = plan.frames.len(), fps = %plan.fps, "starting conversion");
    ensure_parent_dir(plan.output)?;
    // Declared before the encoder so that, on unwind, the encoder is dropped first.
    let mut muxer = MuxerSink::create(plan.output, plan.fps)?;
    let mut encoder = EncoderDriver::new(backend);

    let result = encode_all(&plan, config, &mut encoder, &mut muxer);

    let encoder_closed = encoder.close();
    let muxer_closed = muxer.close();
    match result {
        Ok(report) => {
            encoder_closed?;
            muxer_closed?;
            tracing::info!(
                output = %report.output.display(),
                samples = report.samples_written,
                skipped = report.frames_skipped,
                "video written"
            );
            Ok(report)
        }
        Err(err) => {
            if let Err(e) = encoder_closed {
                tracing::warn!(error = %e, "encoder cleanup failed after error");
            }
            if let Err(e) = muxer_closed {
                tracing::warn!(error = %e, "muxer cleanup failed after error");
            }
            tracing::error!(code = err.kind().code(), error = %err, "conversion failed");
            Err(err)
        }
    }
}

fn encode_all<B: EncoderBackend, W: Write>(
    plan: &Plan<'_>,
    config: &PipelineConfig,
    encoder: &mut EncoderDriver<B>,
    muxer: &mut MuxerSink<W>,
) -> ReelResult<ConversionReport> {
    let mut source = FrameSource::new(plan.frames);
    let total = source.len();
    let mut dimensions = None;
    let mut report = ConversionReport {
        output: plan.output.to_path_buf(),
        dimensions: Dimensions::new(0, 0),
        fps: plan.fps,
        frames_submitted: 0,
        frames_skipped: 0,
        samples_written: 0,
        timestamps: Vec::with_capacity(total),
    };

    while let Some(event) = source.next_frame() {
        let frame = match event {
            SourceEvent::Decoded(frame) => frame,
            SourceEvent::Skipped { .. } => {
                report.frames_skipped += 1;
                continue;
            }
        };

        match dimensions {
            None => {
                frame.dimensions.validate_for_encoding()?;
                let format = EncoderFormat::new(&config.encoder, frame.dimensions, plan.fps);
                encoder.configure(format)?;
                encoder.start()?;
                dimensions = Some(frame.dimensions);
                report.dimensions = frame.dimensions;
            }
            Some(expected) if expected != frame.dimensions => {
                tracing::warn!(
                    index = frame.index.0,
                    expected = %expected,
                    got = %frame.dimensions,
                    "frame resolution differs from the first frame; output is undefined"
                );
            }
            Some(_) => {}
        }

        let index = frame.index;
        let pts = PresentationTime::for_index(index, plan.fps);
        let nv12 = frame.into_nv12();
        encoder.submit(&nv12, pts)?;
        drop(nv12);
        report.timestamps.push(pts);
        report.frames_submitted += 1;

        let stats = encoder.drain_into(muxer, DrainMode::Available)?;
        report.samples_written += stats.samples_written;
        tracing::info!("processed frame {}/{}", index.0 + 1, total);
    }

    if encoder.state() == EncoderState::Unconfigured {
        return Err(ReelError::decode(format!(
            "none of the {total} input images could be decoded"
        )));
    }

    encoder.signal_end_of_stream()?;
    let stats = encoder.drain_into(
        muxer,
        DrainMode::UntilEndOfStream {
            poll: Duration::from_millis(config.drain_poll_interval_ms),
            deadline: Duration::from_millis(config.drain_deadline_ms),
        },
    )?;
    report.samples_written += stats.samples_written;
    Ok(report)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/pipeline.rs"]
mod tests;
