use super::*;
use crate::foundation::core::{Dimensions, Fps};
use crate::foundation::error::ErrorKind;
use std::time::{Duration, Instant};

fn format(width: u32, height: u32, fps: u32) -> EncoderFormat {
    EncoderFormat::new(
        &EncoderConfig::default(),
        Dimensions::new(width, height),
        Fps::new(fps).unwrap(),
    )
}

fn args(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn command_streams_nv12_in_and_annexb_out() {
    let backend = FfmpegBackend::unchecked(EncoderConfig::default());
    let args = args(&backend.command(&format(100, 60, 2)));
    let joined = args.join(" ");

    assert!(joined.contains("-f rawvideo -pix_fmt nv12 -s 100x60 -r 2 -i pipe:0"), "{joined}");
    assert!(joined.contains("-c:v libx264 -b:v 2000000 -g 1 -bf 0"), "{joined}");
    assert!(joined.ends_with("-f h264 pipe:1"), "{joined}");
}

#[test]
fn missing_binary_is_a_fault() {
    let cfg = EncoderConfig {
        ffmpeg_path: "/nonexistent/bin/ffmpeg".into(),
        ..EncoderConfig::default()
    };
    let err = FfmpegBackend::new(cfg).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::EncoderOrMuxerFault);
}

#[test]
fn io_before_start_is_rejected_and_release_is_idempotent() {
    let mut backend = FfmpegBackend::unchecked(EncoderConfig::default());
    assert!(backend.start().is_err());
    assert!(backend.dequeue_input_buffer(Wait::Immediate).is_err());
    assert!(backend.dequeue_output_buffer(Wait::Immediate).is_err());
    backend.stop().unwrap();
    backend.release();
    backend.release();
}

#[test]
fn encodes_frames_in_order_with_format_change_first() {
    if !is_ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }

    let mut backend = FfmpegBackend::new(EncoderConfig::default()).unwrap();
    let fmt = format(64, 48, 2);
    backend.configure(&fmt).unwrap();
    backend.start().unwrap();

    let frame = vec![128u8; fmt.dimensions.nv12_len()];
    let fps = fmt.fps;
    for i in 0..3u64 {
        let mut buf = backend.dequeue_input_buffer(Wait::Forever).unwrap().unwrap();
        buf.fill(&frame);
        let pts = PresentationTime::for_index(crate::foundation::core::FrameIndex(i), fps);
        backend.queue_input_buffer(buf, pts, BufferFlags::NONE).unwrap();
    }
    let mut eos = backend.dequeue_input_buffer(Wait::Forever).unwrap().unwrap();
    eos.clear();
    backend
        .queue_input_buffer(eos, PresentationTime(1_500_000), BufferFlags::END_OF_STREAM)
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut formats = 0;
    let mut samples = Vec::new();
    loop {
        assert!(Instant::now() < deadline, "ffmpeg never reached end-of-stream");
        match backend
            .dequeue_output_buffer(Wait::Bounded(Duration::from_millis(10)))
            .unwrap()
        {
            OutputEvent::FormatChanged(f) => {
                assert!(samples.is_empty());
                assert_eq!(f.dimensions, Dimensions::new(64, 48));
                formats += 1;
            }
            OutputEvent::Buffer(buf) => {
                let done = buf.info().flags.end_of_stream;
                if buf.info().size > 0 {
                    samples.push(buf.info().pts.as_micros());
                }
                backend.release_output_buffer(buf).unwrap();
                if done {
                    break;
                }
            }
            OutputEvent::TryAgainLater => {}
        }
    }

    backend.stop().unwrap();
    backend.release();
    assert_eq!(formats, 1);
    assert_eq!(samples, vec![0, 500_000, 1_000_000]);
}
