use std::collections::VecDeque;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;

use muxide::codec::h264::{extract_avc_config, is_h264_keyframe};

use crate::codec::annexb::AccessUnitSplitter;
use crate::codec::backend::{
    AvcConfig, BufferFlags, EncoderBackend, EncoderFormat, InputBuffer, OutputBuffer, OutputEvent,
    OutputFormat, Wait,
};
use crate::config::EncoderConfig;
use crate::foundation::core::PresentationTime;
use crate::foundation::error::{ReelError, ReelResult};

const READ_CHUNK: usize = 64 * 1024;

enum WriterMsg {
    Frame(InputBuffer),
    EndOfStream,
}

enum ReaderMsg {
    AccessUnit(Vec<u8>),
    EndOfStream,
    Failed(String),
}

/// Encoder backend running a system `ffmpeg` as an H.264 encoder.
///
/// Raw NV12 frames go to `ffmpeg`'s stdin and an Annex-B elementary stream comes back on
/// stdout. Three helper threads keep the pipes moving: a writer feeding stdin from the input
/// buffer pool, a reader splitting stdout into access units, and a stderr drain. `ffmpeg`
/// keeps frame order, so output timestamps are matched to inputs first-in first-out.
pub struct FfmpegBackend {
    cfg: EncoderConfig,
    format: Option<EncoderFormat>,

    child: Option<Child>,
    input_tx: Option<Sender<WriterMsg>>,
    free_rx: Option<Receiver<InputBuffer>>,
    output_rx: Option<Receiver<ReaderMsg>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    reader: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,

    pending_pts: VecDeque<PresentationTime>,
    last_pts: PresentationTime,
    current_avc: Option<AvcConfig>,
    held: Option<OutputBuffer>,
    next_output_slot: usize,
    eos_delivered: bool,
}

impl FfmpegBackend {
    /// Create a backend for `cfg`. Fails when the configured `ffmpeg` cannot be run.
    pub fn new(cfg: EncoderConfig) -> ReelResult<Self> {
        cfg.validate()?;
        if !is_ffmpeg_available(&cfg.ffmpeg_path) {
            return Err(ReelError::fault(format!(
                "ffmpeg is required for H.264 encoding, but '{}' could not be run",
                cfg.ffmpeg_path.display()
            )));
        }
        Ok(Self::unchecked(cfg))
    }

    fn unchecked(cfg: EncoderConfig) -> Self {
        Self {
            cfg,
            format: None,
            child: None,
            input_tx: None,
            free_rx: None,
            output_rx: None,
            writer: None,
            reader: None,
            stderr_drain: None,
            pending_pts: VecDeque::new(),
            last_pts: PresentationTime::default(),
            current_avc: None,
            held: None,
            next_output_slot: 0,
            eos_delivered: false,
        }
    }

    fn command(&self, format: &EncoderFormat) -> Command {
        let mut cmd = Command::new(&self.cfg.ffmpeg_path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "nv12",
            "-s",
            &format.dimensions.to_string(),
            "-r",
            &format.fps.to_string(),
            "-i",
            "pipe:0",
        ]);
        cmd.args([
            "-an",
            "-c:v",
            &self.cfg.ffmpeg_encoder,
            "-b:v",
            &format.bitrate.to_string(),
            "-g",
            &format.gop_frames.to_string(),
            "-bf",
            "0",
            "-pix_fmt",
            "yuv420p",
            "-f",
            "h264",
            "pipe:1",
        ]);
        cmd
    }

    fn output_rx(&self) -> ReelResult<&Receiver<ReaderMsg>> {
        self.output_rx
            .as_ref()
            .ok_or_else(|| ReelError::fault("ffmpeg encoder is not running"))
    }

    fn next_message(&self, wait: Wait) -> ReelResult<Option<ReaderMsg>> {
        let rx = self.output_rx()?;
        let closed = || ReelError::fault("ffmpeg output reader exited without end-of-stream");
        match wait {
            Wait::Immediate => match rx.try_recv() {
                Ok(msg) => Ok(Some(msg)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(closed()),
            },
            Wait::Bounded(timeout) => match rx.recv_timeout(timeout) {
                Ok(msg) => Ok(Some(msg)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(closed()),
            },
            Wait::Forever => rx.recv().map(Some).map_err(|_| closed()),
        }
    }

    fn output_buffer(
        &mut self,
        data: Vec<u8>,
        pts: PresentationTime,
        flags: BufferFlags,
    ) -> OutputBuffer {
        let slot = self.next_output_slot;
        self.next_output_slot = self.next_output_slot.wrapping_add(1);
        OutputBuffer::new(slot, data, pts, flags)
    }

    fn join_helpers(&mut self) -> ReelResult<Vec<u8>> {
        if let Some(writer) = self.writer.take() {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "ffmpeg stdin writer stopped early"),
                Err(_) => return Err(ReelError::fault("ffmpeg stdin writer thread panicked")),
            }
        }
        if let Some(reader) = self.reader.take() {
            reader
                .join()
                .map_err(|_| ReelError::fault("ffmpeg stdout reader thread panicked"))?;
        }
        match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::fault("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::fault(format!("ffmpeg stderr read failed: {e}"))),
            None => Ok(Vec::new()),
        }
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        &self.cfg.ffmpeg_encoder
    }

    fn configure(&mut self, format: &EncoderFormat) -> ReelResult<()> {
        if self.child.is_some() {
            return Err(ReelError::fault("ffmpeg encoder is already running"));
        }
        self.format = Some(format.clone());
        Ok(())
    }

    fn start(&mut self) -> ReelResult<()> {
        let format = self
            .format
            .clone()
            .ok_or_else(|| ReelError::fault("ffmpeg encoder started before configure"))?;
        if self.child.is_some() {
            return Err(ReelError::fault("ffmpeg encoder is already running"));
        }

        let mut child = self.command(&format).spawn().map_err(|e| {
            ReelError::fault(format!(
                "failed to spawn '{}' (is it installed and on PATH?): {e}",
                self.cfg.ffmpeg_path.display()
            ))
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stdout), Some(mut stderr)) = (stdin, stdout, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ReelError::fault("failed to open ffmpeg pipes (unexpected)"));
        };

        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        let (free_tx, free_rx) = mpsc::channel();
        let frame_len = format.dimensions.nv12_len();
        for slot in 0..self.cfg.input_buffer_count {
            // The receiver is alive on this thread, so the send cannot fail.
            let _ = free_tx.send(InputBuffer::new(slot, Vec::with_capacity(frame_len)));
        }
        let (input_tx, input_rx) = mpsc::channel();
        let writer = std::thread::spawn(move || write_frames(stdin, input_rx, free_tx));

        let (output_tx, output_rx) = mpsc::channel();
        let reader = std::thread::spawn(move || read_access_units(stdout, output_tx));

        tracing::debug!(
            encoder = %self.cfg.ffmpeg_encoder,
            dimensions = %format.dimensions,
            fps = %format.fps,
            bitrate = format.bitrate,
            gop = format.gop_frames,
            "started ffmpeg encoder"
        );

        self.child = Some(child);
        self.input_tx = Some(input_tx);
        self.free_rx = Some(free_rx);
        self.output_rx = Some(output_rx);
        self.writer = Some(writer);
        self.reader = Some(reader);
        self.stderr_drain = Some(stderr_drain);
        self.pending_pts.clear();
        self.current_avc = None;
        self.held = None;
        self.eos_delivered = false;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, wait: Wait) -> ReelResult<Option<InputBuffer>> {
        let rx = self
            .free_rx
            .as_ref()
            .ok_or_else(|| ReelError::fault("ffmpeg encoder is not running"))?;
        let closed = || ReelError::fault("ffmpeg stopped accepting frames");
        match wait {
            Wait::Immediate => match rx.try_recv() {
                Ok(buf) => Ok(Some(buf)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(closed()),
            },
            Wait::Bounded(timeout) => match rx.recv_timeout(timeout) {
                Ok(buf) => Ok(Some(buf)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(closed()),
            },
            Wait::Forever => rx.recv().map(Some).map_err(|_| closed()),
        }
    }

    fn queue_input_buffer(
        &mut self,
        buffer: InputBuffer,
        pts: PresentationTime,
        flags: BufferFlags,
    ) -> ReelResult<()> {
        let tx = self
            .input_tx
            .as_ref()
            .ok_or_else(|| ReelError::fault("ffmpeg encoder is not accepting input"))?;

        if flags.end_of_stream {
            if !buffer.data().is_empty() {
                self.pending_pts.push_back(pts);
                tx.send(WriterMsg::Frame(buffer))
                    .map_err(|_| ReelError::fault("ffmpeg stopped accepting frames"))?;
            }
            tx.send(WriterMsg::EndOfStream)
                .map_err(|_| ReelError::fault("ffmpeg stopped accepting frames"))?;
            self.input_tx = None;
            return Ok(());
        }

        self.pending_pts.push_back(pts);
        tx.send(WriterMsg::Frame(buffer))
            .map_err(|_| ReelError::fault("ffmpeg stopped accepting frames"))
    }

    fn dequeue_output_buffer(&mut self, wait: Wait) -> ReelResult<OutputEvent> {
        if let Some(buffer) = self.held.take() {
            return Ok(OutputEvent::Buffer(buffer));
        }
        if self.eos_delivered {
            return Ok(OutputEvent::TryAgainLater);
        }

        let Some(msg) = self.next_message(wait)? else {
            return Ok(OutputEvent::TryAgainLater);
        };

        match msg {
            ReaderMsg::AccessUnit(au) => {
                let pts = match self.pending_pts.pop_front() {
                    Some(pts) => pts,
                    None => {
                        tracing::warn!("ffmpeg produced more pictures than frames submitted");
                        self.last_pts
                    }
                };
                self.last_pts = pts;
                let flags = BufferFlags {
                    key_frame: is_h264_keyframe(&au),
                    end_of_stream: false,
                };
                let avc = extract_avc_config(&au);
                let buffer = self.output_buffer(au, pts, flags);

                if let Some(avc) = avc
                    && self.current_avc.as_ref() != Some(&avc)
                {
                    let format = self
                        .format
                        .as_ref()
                        .ok_or_else(|| ReelError::fault("ffmpeg encoder is not configured"))?;
                    let changed = OutputFormat {
                        codec: format.codec,
                        dimensions: format.dimensions,
                        avc: avc.clone(),
                    };
                    self.current_avc = Some(avc);
                    self.held = Some(buffer);
                    return Ok(OutputEvent::FormatChanged(changed));
                }
                Ok(OutputEvent::Buffer(buffer))
            }
            ReaderMsg::EndOfStream => {
                self.eos_delivered = true;
                let pts = self.last_pts;
                Ok(OutputEvent::Buffer(self.output_buffer(
                    Vec::new(),
                    pts,
                    BufferFlags::END_OF_STREAM,
                )))
            }
            ReaderMsg::Failed(msg) => Err(ReelError::fault(format!(
                "reading ffmpeg output failed: {msg}"
            ))),
        }
    }

    fn release_output_buffer(&mut self, _buffer: OutputBuffer) -> ReelResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> ReelResult<()> {
        // Closing the input channel ends the writer, which closes stdin.
        self.input_tx = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .map_err(|e| ReelError::fault(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = self.join_helpers()?;
        self.free_rx = None;
        self.output_rx = None;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::fault(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.input_tx = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        // Dropping the receivers first unblocks helpers stuck on a send.
        self.free_rx = None;
        self.output_rx = None;
        if let Err(err) = self.join_helpers() {
            tracing::warn!(error = %err, "ffmpeg helper threads did not shut down cleanly");
        }
        self.pending_pts.clear();
        self.held = None;
        self.format = None;
    }
}

impl Drop for FfmpegBackend {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_frames(
    mut stdin: ChildStdin,
    input_rx: Receiver<WriterMsg>,
    free_tx: Sender<InputBuffer>,
) -> std::io::Result<()> {
    while let Ok(msg) = input_rx.recv() {
        match msg {
            WriterMsg::Frame(buffer) => {
                stdin.write_all(buffer.data())?;
                // The driver may already be gone during shutdown.
                let _ = free_tx.send(buffer);
            }
            WriterMsg::EndOfStream => break,
        }
    }
    stdin.flush()
}

fn read_access_units(mut stdout: ChildStdout, output_tx: Sender<ReaderMsg>) {
    let mut splitter = AccessUnitSplitter::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match stdout.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                for au in splitter.push(&chunk[..n]) {
                    if output_tx.send(ReaderMsg::AccessUnit(au)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = output_tx.send(ReaderMsg::Failed(e.to_string()));
                return;
            }
        }
    }
    for au in splitter.finish() {
        if output_tx.send(ReaderMsg::AccessUnit(au)).is_err() {
            return;
        }
    }
    let _ = output_tx.send(ReaderMsg::EndOfStream);
}

/// Return `true` when `ffmpeg` can be invoked as `program`.
pub fn is_ffmpeg_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    is_ffmpeg_available(Path::new("ffmpeg"))
}

#[cfg(test)]
#[path = "../../tests/unit/codec/ffmpeg.rs"]
mod tests;
