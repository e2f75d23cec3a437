use super::*;
use crate::codec::backend::AvcConfig;
use crate::codec::backend::{CodecKind, InputBuffer};
use crate::config::EncoderConfig;
use crate::foundation::core::{Dimensions, Fps};
use crate::foundation::error::ErrorKind;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Cursor;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Calls {
    queued: Vec<(PresentationTime, usize, BufferFlags)>,
    released_outputs: usize,
    stops: usize,
    releases: usize,
}

/// Echoes each queued frame back as one IDR access unit, announcing the format first.
struct EchoBackend {
    calls: Rc<RefCell<Calls>>,
    outputs: VecDeque<OutputEvent>,
    format: Option<EncoderFormat>,
    announced: bool,
    extra_format_change_after: Option<usize>,
    emit_end_of_stream: bool,
}

impl EchoBackend {
    fn new(calls: Rc<RefCell<Calls>>) -> Self {
        Self {
            calls,
            outputs: VecDeque::new(),
            format: None,
            announced: false,
            extra_format_change_after: None,
            emit_end_of_stream: true,
        }
    }

    fn output_format(&self) -> OutputFormat {
        OutputFormat {
            codec: CodecKind::H264,
            dimensions: self.format.as_ref().unwrap().dimensions,
            avc: AvcConfig {
                sps: vec![0x67, 0x42, 0x00, 0x1e, 0xab],
                pps: vec![0x68, 0xce, 0x3c, 0x80],
            },
        }
    }
}

impl EncoderBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    fn configure(&mut self, format: &EncoderFormat) -> ReelResult<()> {
        self.format = Some(format.clone());
        Ok(())
    }

    fn start(&mut self) -> ReelResult<()> {
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _wait: Wait) -> ReelResult<Option<InputBuffer>> {
        Ok(Some(InputBuffer::new(0, Vec::new())))
    }

    fn queue_input_buffer(
        &mut self,
        buffer: InputBuffer,
        pts: PresentationTime,
        flags: BufferFlags,
    ) -> ReelResult<()> {
        let queued = {
            let mut calls = self.calls.borrow_mut();
            calls.queued.push((pts, buffer.data().len(), flags));
            calls.queued.len()
        };
        if flags.end_of_stream {
            if self.emit_end_of_stream {
                self.outputs.push_back(OutputEvent::Buffer(OutputBuffer::new(
                    0,
                    Vec::new(),
                    pts,
                    BufferFlags::END_OF_STREAM,
                )));
            }
            return Ok(());
        }
        if !self.announced || self.extra_format_change_after == Some(queued) {
            self.announced = true;
            let format = self.output_format();
            self.outputs.push_back(OutputEvent::FormatChanged(format));
        }
        self.outputs.push_back(OutputEvent::Buffer(OutputBuffer::new(
            queued,
            vec![0, 0, 0, 1, 0x65, 0x88, 0x84, queued as u8 | 0x10],
            pts,
            BufferFlags {
                key_frame: true,
                end_of_stream: false,
            },
        )));
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _wait: Wait) -> ReelResult<OutputEvent> {
        Ok(self
            .outputs
            .pop_front()
            .unwrap_or(OutputEvent::TryAgainLater))
    }

    fn release_output_buffer(&mut self, _buffer: OutputBuffer) -> ReelResult<()> {
        self.calls.borrow_mut().released_outputs += 1;
        Ok(())
    }

    fn stop(&mut self) -> ReelResult<()> {
        self.calls.borrow_mut().stops += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.calls.borrow_mut().releases += 1;
    }
}

fn format(width: u32, height: u32) -> EncoderFormat {
    EncoderFormat::new(
        &EncoderConfig::default(),
        Dimensions::new(width, height),
        Fps::new(2).unwrap(),
    )
}

fn sink() -> MuxerSink<Cursor<Vec<u8>>> {
    MuxerSink::new(Cursor::new(Vec::new()), Fps::new(2).unwrap())
}

fn running(backend: EchoBackend) -> EncoderDriver<EchoBackend> {
    let mut driver = EncoderDriver::new(backend);
    driver.configure(format(4, 4)).unwrap();
    driver.start().unwrap();
    driver
}

const UNTIL_EOS: DrainMode = DrainMode::UntilEndOfStream {
    poll: Duration::from_millis(1),
    deadline: Duration::from_millis(200),
};

#[test]
fn full_lifecycle_writes_every_frame() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut driver = running(EchoBackend::new(calls.clone()));
    let mut sink = sink();
    assert_eq!(driver.state(), EncoderState::Running);

    let frame = vec![0u8; 24];
    driver.submit(&frame, PresentationTime(0)).unwrap();
    let stats = driver.drain_into(&mut sink, DrainMode::Available).unwrap();
    assert_eq!(stats.samples_written, 1);
    assert!(sink.is_started());

    driver.submit(&frame, PresentationTime(500_000)).unwrap();
    driver.signal_end_of_stream().unwrap();
    assert_eq!(driver.state(), EncoderState::Draining);

    let stats = driver.drain_into(&mut sink, UNTIL_EOS).unwrap();
    assert_eq!(stats.samples_written, 1);
    assert!(stats.end_of_stream);
    assert!(driver.reached_end_of_stream());
    assert_eq!(sink.samples_written(), 2);

    driver.close().unwrap();
    assert_eq!(driver.state(), EncoderState::Stopped);
    let calls = calls.borrow();
    assert_eq!(calls.released_outputs, 3);
    assert_eq!(calls.queued.len(), 3);
    assert_eq!(calls.queued[0].1, 24);
    assert_eq!(calls.queued[2].1, 0);
    assert!(calls.queued[2].2.end_of_stream);
}

#[test]
fn second_format_change_is_a_protocol_violation() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut backend = EchoBackend::new(calls.clone());
    backend.extra_format_change_after = Some(2);
    let mut driver = running(backend);
    let mut sink = sink();

    driver.submit(&[0; 24], PresentationTime(0)).unwrap();
    driver.drain_into(&mut sink, DrainMode::Available).unwrap();
    driver.submit(&[0; 24], PresentationTime(500_000)).unwrap();
    let err = driver
        .drain_into(&mut sink, DrainMode::Available)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncoderProtocolViolation);

    driver.close().unwrap();
    sink.close().unwrap();
    assert_eq!(calls.borrow().stops, 1);
    assert_eq!(calls.borrow().releases, 1);
}

#[test]
fn timestamps_must_strictly_increase() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut driver = running(EchoBackend::new(calls));
    driver.submit(&[0; 24], PresentationTime(500_000)).unwrap();
    let err = driver
        .submit(&[0; 24], PresentationTime(500_000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn calls_out_of_order_are_rejected() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut driver = EncoderDriver::new(EchoBackend::new(calls));
    assert!(driver.submit(&[0; 24], PresentationTime(0)).is_err());
    assert!(driver.start().is_err());
    assert!(driver.poll_output(PollMode::NonBlocking).is_err());
    assert_eq!(
        driver.configure(format(3, 4)).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(driver.state(), EncoderState::Unconfigured);
}

#[test]
fn missing_end_of_stream_hits_the_deadline() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut backend = EchoBackend::new(calls);
    backend.emit_end_of_stream = false;
    let mut driver = running(backend);
    let mut sink = sink();

    driver.submit(&[0; 24], PresentationTime(0)).unwrap();
    driver.signal_end_of_stream().unwrap();
    let err = driver
        .drain_into(
            &mut sink,
            DrainMode::UntilEndOfStream {
                poll: Duration::from_millis(1),
                deadline: Duration::from_millis(20),
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncoderOrMuxerFault);
    assert_eq!(sink.samples_written(), 1);
}

#[test]
fn close_is_idempotent_and_drop_releases() {
    let calls = Rc::new(RefCell::new(Calls::default()));
    let mut driver = running(EchoBackend::new(calls.clone()));
    driver.close().unwrap();
    driver.close().unwrap();
    drop(driver);
    assert_eq!(calls.borrow().stops, 1);
    assert_eq!(calls.borrow().releases, 1);

    let calls = Rc::new(RefCell::new(Calls::default()));
    let unconfigured = EncoderDriver::new(EchoBackend::new(calls.clone()));
    drop(unconfigured);
    assert_eq!(calls.borrow().stops, 0);
    assert_eq!(calls.borrow().releases, 1);
}
