use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context as _;
use muxide::api::{Muxer, MuxerBuilder, MuxerError, VideoCodec};
use muxide::codec::AnnexBNalIter;
use muxide::codec::h264::{extract_avc_config, is_h264_keyframe};

use crate::codec::backend::{AvcConfig, BufferInfo, CodecKind, OutputFormat};
use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Index of a track registered with a [`MuxerSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackIndex(pub usize);

enum SinkState<W: Write> {
    Idle(W),
    Started(Muxer<W>),
    Closed,
}

/// Container sink accepting exactly one video track.
///
/// Lifecycle: `add_track` once, `start`, then `write_sample` per encoded access unit, then
/// `close`. Samples arriving before `start` are dropped. `close` finalizes a started file,
/// releases the output in every state and can be called any number of times.
///
/// Samples are buffered by `muxide` and the file is laid out at `close`, with `moov` ahead of
/// `mdat`.
pub struct MuxerSink<W: Write> {
    label: String,
    fps: Fps,
    state: SinkState<W>,
    track: Option<(TrackIndex, OutputFormat)>,
    samples_written: u64,
}

impl MuxerSink<File> {
    /// Create (or truncate) `path` and wrap it in a sink.
    pub fn create(path: &Path, fps: Fps) -> ReelResult<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create output file '{}'", path.display()))?;
        Ok(Self::with_label(file, fps, path.display().to_string()))
    }
}

impl<W: Write> MuxerSink<W> {
    /// Wrap an arbitrary writer.
    pub fn new(writer: W, fps: Fps) -> Self {
        Self::with_label(writer, fps, "<memory>".to_owned())
    }

    fn with_label(writer: W, fps: Fps, label: String) -> Self {
        Self {
            label,
            fps,
            state: SinkState::Idle(writer),
            track: None,
            samples_written: 0,
        }
    }

    /// Register the video track described by the encoder's output format.
    pub fn add_track(&mut self, format: &OutputFormat) -> ReelResult<TrackIndex> {
        if self.track.is_some() {
            return Err(ReelError::protocol(
                "muxer already has a video track; a second output format cannot be added",
            ));
        }
        if !matches!(self.state, SinkState::Idle(_)) {
            return Err(ReelError::fault("muxer is no longer accepting tracks"));
        }

        let index = TrackIndex(0);
        self.track = Some((index, format.clone()));
        tracing::debug!(
            output = %self.label,
            mime = format.codec.mime(),
            dimensions = %format.dimensions,
            "added video track"
        );
        Ok(index)
    }

    /// Open the container for samples. Requires a track.
    pub fn start(&mut self) -> ReelResult<()> {
        let (codec, dimensions) = match &self.track {
            Some((_, format)) => (format.codec, format.dimensions),
            None => return Err(ReelError::fault("muxer started without a track")),
        };
        let writer = match std::mem::replace(&mut self.state, SinkState::Closed) {
            SinkState::Idle(writer) => writer,
            other => {
                self.state = other;
                return Err(ReelError::fault("muxer already started or closed"));
            }
        };

        let video_codec = match codec {
            CodecKind::H264 => VideoCodec::H264,
        };
        let muxer = MuxerBuilder::new(writer)
            .video(
                video_codec,
                dimensions.width,
                dimensions.height,
                f64::from(self.fps.get()),
            )
            .with_fast_start(true)
            .build()
            .map_err(|e| muxer_fault("start", &self.label, e))?;
        self.state = SinkState::Started(muxer);
        tracing::debug!(output = %self.label, "muxer started");
        Ok(())
    }

    /// Whether `start` succeeded and `close` has not run yet.
    pub fn is_started(&self) -> bool {
        matches!(self.state, SinkState::Started(_))
    }

    /// Track registered so far, if any.
    pub fn track(&self) -> Option<TrackIndex> {
        self.track.as_ref().map(|(index, _)| *index)
    }

    /// Samples successfully written.
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Write one Annex-B access unit. Returns `false` when the sample was dropped because the
    /// muxer has not started or the unit holds no picture data.
    ///
    /// The first sample must be a key frame; when it lacks SPS/PPS they are taken from the
    /// track's output format.
    pub fn write_sample(
        &mut self,
        track: TrackIndex,
        access_unit: &[u8],
        info: &BufferInfo,
    ) -> ReelResult<bool> {
        let avc = match &self.track {
            Some((index, format)) if *index == track => &format.avc,
            _ => {
                return Err(ReelError::fault(format!(
                    "unknown track index {}",
                    track.0
                )));
            }
        };
        let SinkState::Started(muxer) = &mut self.state else {
            tracing::debug!(pts = info.pts.as_micros(), "muxer not started, dropping sample");
            return Ok(false);
        };
        if !has_picture(access_unit) {
            return Ok(false);
        }

        let sample = if self.samples_written == 0 && extract_avc_config(access_unit).is_none() {
            Cow::Owned(with_parameter_sets(avc, access_unit))
        } else {
            Cow::Borrowed(access_unit)
        };
        let key_frame = info.flags.key_frame || is_h264_keyframe(access_unit);
        muxer
            .write_video(info.pts.as_secs_f64(), &sample, key_frame)
            .map_err(|e| muxer_fault("write sample to", &self.label, e))?;
        self.samples_written += 1;
        Ok(true)
    }

    /// Finalize (if started) and release the output. Idempotent.
    pub fn close(&mut self) -> ReelResult<()> {
        match std::mem::replace(&mut self.state, SinkState::Closed) {
            SinkState::Started(muxer) => {
                let stats = muxer
                    .finish_with_stats()
                    .map_err(|e| muxer_fault("finalize", &self.label, e))?;
                tracing::debug!(
                    output = %self.label,
                    samples = stats.video_frames,
                    duration_secs = stats.duration_secs,
                    bytes = stats.bytes_written,
                    "muxer finalized"
                );
                Ok(())
            }
            SinkState::Idle(mut writer) => {
                writer
                    .flush()
                    .with_context(|| format!("failed to flush '{}'", self.label))?;
                Ok(())
            }
            SinkState::Closed => Ok(()),
        }
    }
}

impl<W: Write> Drop for MuxerSink<W> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(output = %self.label, error = %err, "failed to close muxer");
        }
    }
}

fn muxer_fault(action: &str, label: &str, err: MuxerError) -> ReelError {
    ReelError::fault(format!("failed to {action} '{label}': {err}"))
}

fn has_picture(access_unit: &[u8]) -> bool {
    AnnexBNalIter::new(access_unit).any(|nal| matches!(nal.first().map(|b| b & 0x1f), Some(1 | 5)))
}

fn with_parameter_sets(avc: &AvcConfig, access_unit: &[u8]) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(2 * START_CODE.len() + avc.sps.len() + avc.pps.len() + access_unit.len());
    for nal in [&avc.sps, &avc.pps] {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(nal);
    }
    out.extend_from_slice(access_unit);
    out
}

#[cfg(test)]
#[path = "../../tests/unit/mux/sink.rs"]
mod tests;
