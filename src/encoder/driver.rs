use std::io::Write;
use std::time::{Duration, Instant};

use crate::codec::backend::{
    BufferFlags, EncoderBackend, EncoderFormat, OutputBuffer, OutputEvent, OutputFormat, Wait,
};
use crate::foundation::core::PresentationTime;
use crate::foundation::error::{ReelError, ReelResult};
use crate::mux::sink::MuxerSink;

/// Lifecycle of an [`EncoderDriver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderState {
    /// Created, no format yet.
    Unconfigured,
    /// Format applied, not started.
    Configured,
    /// Accepting frames.
    Running,
    /// End-of-stream queued; only output is left.
    Draining,
    /// Stopped and released.
    Stopped,
}

/// How a single output poll may wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollMode {
    /// Return at once when nothing is ready.
    NonBlocking,
    /// Wait up to the given time.
    Blocking(Duration),
}

impl PollMode {
    fn wait(self) -> Wait {
        match self {
            PollMode::NonBlocking => Wait::Immediate,
            PollMode::Blocking(timeout) => Wait::Bounded(timeout),
        }
    }
}

/// How far [`EncoderDriver::drain_into`] goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainMode {
    /// Take whatever is ready now and return at the first empty poll.
    Available,
    /// Keep polling every `poll` until end-of-stream, failing after `deadline`.
    UntilEndOfStream {
        /// Timeout of each poll.
        poll: Duration,
        /// Upper bound for the whole drain.
        deadline: Duration,
    },
}

/// One item produced by [`EncoderDriver::poll_output`].
#[derive(Debug)]
pub enum EncoderOutput {
    /// The encoder reported its output format.
    FormatChanged(OutputFormat),
    /// An encoded buffer; hand it back with [`EncoderDriver::release_output`].
    Buffer(OutputBuffer),
}

/// Counters from one [`EncoderDriver::drain_into`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Samples accepted by the muxer.
    pub samples_written: u64,
    /// Non-empty buffers the muxer did not take.
    pub samples_dropped: u64,
    /// End-of-stream was observed.
    pub end_of_stream: bool,
}

/// Drives an [`EncoderBackend`] through its buffer-exchange protocol.
///
/// The driver owns the backend and guarantees it is stopped and released exactly once,
/// either through [`EncoderDriver::close`] or on drop.
pub struct EncoderDriver<B: EncoderBackend> {
    backend: B,
    state: EncoderState,
    format: Option<EncoderFormat>,
    last_pts: Option<PresentationTime>,
    frames_submitted: u64,
    end_of_stream: bool,
    released: bool,
}

impl<B: EncoderBackend> EncoderDriver<B> {
    /// Wrap `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: EncoderState::Unconfigured,
            format: None,
            last_pts: None,
            frames_submitted: 0,
            end_of_stream: false,
            released: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Frames queued so far.
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Whether the end-of-stream buffer has come back.
    pub fn reached_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Access the wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn expect_state(&self, expected: EncoderState, op: &str) -> ReelResult<()> {
        if self.state != expected {
            return Err(ReelError::fault(format!(
                "encoder {op} called in state {:?} (expected {expected:?})",
                self.state
            )));
        }
        Ok(())
    }

    /// Apply the stream format.
    pub fn configure(&mut self, format: EncoderFormat) -> ReelResult<()> {
        self.expect_state(EncoderState::Unconfigured, "configure")?;
        format.dimensions.validate_for_encoding()?;
        self.backend.configure(&format)?;
        tracing::debug!(
            backend = self.backend.name(),
            mime = format.codec.mime(),
            dimensions = %format.dimensions,
            fps = %format.fps,
            bitrate = format.bitrate,
            "encoder configured"
        );
        self.format = Some(format);
        self.state = EncoderState::Configured;
        Ok(())
    }

    /// Start the backend.
    pub fn start(&mut self) -> ReelResult<()> {
        self.expect_state(EncoderState::Configured, "start")?;
        self.backend.start()?;
        self.state = EncoderState::Running;
        Ok(())
    }

    /// Queue one NV12 frame. Blocks until the encoder has a free input buffer.
    pub fn submit(&mut self, frame: &[u8], pts: PresentationTime) -> ReelResult<()> {
        self.expect_state(EncoderState::Running, "submit")?;
        if let Some(last) = self.last_pts
            && pts <= last
        {
            return Err(ReelError::invalid_input(format!(
                "presentation timestamps must strictly increase ({}us after {}us)",
                pts.as_micros(),
                last.as_micros()
            )));
        }
        if let Some(format) = &self.format {
            let expected = format.dimensions.nv12_len();
            if frame.len() != expected {
                tracing::warn!(
                    got = frame.len(),
                    expected,
                    "frame size differs from the configured resolution"
                );
            }
        }

        let mut buffer = self
            .backend
            .dequeue_input_buffer(Wait::Forever)?
            .ok_or_else(|| ReelError::fault("encoder returned no input buffer"))?;
        buffer.fill(frame);
        self.backend
            .queue_input_buffer(buffer, pts, BufferFlags::NONE)?;
        self.last_pts = Some(pts);
        self.frames_submitted += 1;
        Ok(())
    }

    /// Queue the zero-length end-of-stream buffer.
    pub fn signal_end_of_stream(&mut self) -> ReelResult<()> {
        self.expect_state(EncoderState::Running, "signal_end_of_stream")?;
        let mut buffer = self
            .backend
            .dequeue_input_buffer(Wait::Forever)?
            .ok_or_else(|| ReelError::fault("encoder returned no input buffer"))?;
        buffer.clear();
        let pts = self.last_pts.unwrap_or_default();
        self.backend
            .queue_input_buffer(buffer, pts, BufferFlags::END_OF_STREAM)?;
        self.state = EncoderState::Draining;
        tracing::debug!(frames = self.frames_submitted, "encoder end-of-stream queued");
        Ok(())
    }

    /// Poll the encoder once. `Ok(None)` means nothing was ready.
    pub fn poll_output(&mut self, mode: PollMode) -> ReelResult<Option<EncoderOutput>> {
        if !matches!(self.state, EncoderState::Running | EncoderState::Draining) {
            return Err(ReelError::fault(format!(
                "encoder output polled in state {:?}",
                self.state
            )));
        }
        if self.end_of_stream {
            return Ok(None);
        }
        match self.backend.dequeue_output_buffer(mode.wait())? {
            OutputEvent::FormatChanged(format) => Ok(Some(EncoderOutput::FormatChanged(format))),
            OutputEvent::Buffer(buffer) => {
                if buffer.info().flags.end_of_stream {
                    self.end_of_stream = true;
                }
                Ok(Some(EncoderOutput::Buffer(buffer)))
            }
            OutputEvent::TryAgainLater => Ok(None),
        }
    }

    /// Hand an output buffer back to the encoder.
    pub fn release_output(&mut self, buffer: OutputBuffer) -> ReelResult<()> {
        self.backend.release_output_buffer(buffer)
    }

    /// Move encoded output into `sink`.
    ///
    /// The first format change registers the track and starts the muxer; a second one is an
    /// [`ReelError::EncoderProtocolViolation`]. Every buffer is released whether or not it was
    /// written.
    pub fn drain_into<W: Write>(
        &mut self,
        sink: &mut MuxerSink<W>,
        mode: DrainMode,
    ) -> ReelResult<DrainStats> {
        let mut stats = DrainStats::default();
        let (poll, deadline) = match mode {
            DrainMode::Available => (PollMode::NonBlocking, None),
            DrainMode::UntilEndOfStream { poll, deadline } => {
                (PollMode::Blocking(poll), Some(Instant::now() + deadline))
            }
        };

        loop {
            if self.end_of_stream {
                stats.end_of_stream = true;
                return Ok(stats);
            }

            let Some(output) = self.poll_output(poll)? else {
                match deadline {
                    None => return Ok(stats),
                    Some(deadline) if Instant::now() >= deadline => {
                        return Err(ReelError::fault(
                            "encoder did not signal end-of-stream before the drain deadline",
                        ));
                    }
                    Some(_) => continue,
                }
            };

            match output {
                EncoderOutput::FormatChanged(format) => {
                    if sink.track().is_some() {
                        return Err(ReelError::protocol("encoder output format changed twice"));
                    }
                    tracing::debug!(dimensions = %format.dimensions, "encoder output format");
                    sink.add_track(&format)?;
                    sink.start()?;
                }
                EncoderOutput::Buffer(buffer) => {
                    let written = self.write_buffer(sink, &buffer);
                    self.release_output(buffer)?;
                    match written? {
                        Some(true) => stats.samples_written += 1,
                        Some(false) => stats.samples_dropped += 1,
                        None => {}
                    }
                }
            }
        }
    }

    fn write_buffer<W: Write>(
        &self,
        sink: &mut MuxerSink<W>,
        buffer: &OutputBuffer,
    ) -> ReelResult<Option<bool>> {
        let info = buffer.info();
        if info.size == 0 {
            return Ok(None);
        }
        let Some(track) = sink.track() else {
            tracing::warn!(
                pts = info.pts.as_micros(),
                "encoded buffer before output format, dropping"
            );
            return Ok(Some(false));
        };
        sink.write_sample(track, buffer.data(), info).map(Some)
    }

    /// Stop and release the encoder. Safe to call repeatedly; only the first call acts.
    pub fn close(&mut self) -> ReelResult<()> {
        if self.released {
            return Ok(());
        }
        let stopped = match self.state {
            EncoderState::Configured | EncoderState::Running | EncoderState::Draining => {
                self.backend.stop()
            }
            EncoderState::Unconfigured | EncoderState::Stopped => Ok(()),
        };
        self.backend.release();
        self.released = true;
        self.state = EncoderState::Stopped;
        tracing::debug!(backend = self.backend.name(), "encoder released");
        stopped
    }
}

impl<B: EncoderBackend> Drop for EncoderDriver<B> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to stop encoder");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encoder/driver.rs"]
mod tests;
