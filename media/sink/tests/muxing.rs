use media_encode::{CodecRegistry, EncoderOptions, EncoderState};
use media_sink::{ContainerReader, MemorySink, Muxer, MuxerConfig, StreamHandle};
use media_types::{
    AudioFrame, ChannelLayout, CodecId, Error, Frame, MediaDuration, Packet, PixelFormat, Pts,
    Rational, SampleFormat, StreamSpec, StreamType, VideoFrame,
};

fn video_spec(fps: i32) -> StreamSpec {
    StreamSpec::video(CodecId::RawVideo, Rational::integer(fps))
        .with_size(4, 2)
        .with_pixel_format(PixelFormat::Rgb24)
}

fn audio_spec() -> StreamSpec {
    StreamSpec::audio(CodecId::PcmS16le, 48000)
        .with_sample_format(SampleFormat::S16)
        .with_channel_layout(ChannelLayout::Stereo)
}

fn video_frame(shade: u8) -> Frame {
    let mut frame = VideoFrame::new(4, 2, PixelFormat::Rgb24);
    frame.planes[0].data.fill(shade);
    frame.into()
}

fn audio_frame(samples: usize) -> Frame {
    AudioFrame::new(SampleFormat::S16, ChannelLayout::Stereo, samples, 48000).into()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn encode_all(muxer: &mut Muxer<MemorySink>, stream: StreamHandle, frames: usize) {
    for i in 0..frames {
        muxer.write_frame(stream, Some(&video_frame(i as u8))).unwrap();
    }
}

#[test]
fn video_stream_duration_matches_frame_count() {
    let sink = MemorySink::new();
    let mut muxer = Muxer::new(sink.clone()).unwrap();
    let video = muxer.add_stream(video_spec(24)).unwrap();

    encode_all(&mut muxer, video, 48);
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
    let stream = reader.stream(0).unwrap();
    assert_eq!(stream.packet_count, 48);
    assert_eq!(stream.time_base, Rational::new(1, 24).unwrap());
    assert_eq!(stream.duration, MediaDuration(48));
    assert!(approx(stream.duration_seconds(), 2.0));
    assert!(approx(stream.average_rate().unwrap(), 24.0));
    assert_eq!(stream.frame_rate(), Some(Rational::integer(24)));
    assert_eq!(stream.keyframes.first().map(|k| k.pts), Some(0));

    let pts: Vec<i64> = reader.packets().filter_map(|p| p.pts.map(|p| p.0)).collect();
    assert_eq!(pts, (0..48).collect::<Vec<_>>());
}

#[test]
fn closed_muxer_rejects_writes() {
    let sink = MemorySink::new();
    let mut muxer = Muxer::new(sink.clone()).unwrap();
    let video = muxer.add_stream(video_spec(25)).unwrap();
    encode_all(&mut muxer, video, 3);
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let len = sink.len();
    let packet = Packet {
        data: vec![0; 24],
        pts: Some(Pts(10)),
        dts: Some(Pts(10)),
        duration: MediaDuration(1),
        time_base: Rational::new(1, 25).unwrap(),
        is_keyframe: true,
        stream_type: StreamType::Video,
        stream_index: 0,
    };
    assert!(matches!(muxer.mux(packet), Err(Error::MuxerClosed)));
    assert!(matches!(
        muxer.encode(video, Some(&video_frame(0))),
        Err(Error::MuxerClosed)
    ));
    assert!(matches!(muxer.close(), Err(Error::MuxerClosed)));
    assert_eq!(sink.len(), len);
    assert!(sink.is_finalized());
}

#[test]
fn metadata_survives_round_trip_in_order() {
    let sink = MemorySink::new();
    let mut muxer = Muxer::new(sink.clone()).unwrap();
    let audio = muxer.add_stream(audio_spec()).unwrap();

    let metadata = muxer.metadata_mut().unwrap();
    metadata.insert("title", "draft");
    metadata.insert("artist", "someone");
    metadata.insert("title", "final");
    muxer
        .stream_metadata_mut(audio)
        .unwrap()
        .insert("language", "eng");

    muxer.write_frame(audio, Some(&audio_frame(480))).unwrap();
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
    let keys: Vec<&str> = reader.metadata().keys().collect();
    assert_eq!(keys, vec!["title", "artist"]);
    assert_eq!(reader.metadata().get("title"), Some("final"));
    assert_eq!(reader.stream(0).unwrap().metadata.get("language"), Some("eng"));
}

#[test]
fn stream_indices_are_stable() {
    let sink = MemorySink::new();
    let mut muxer = Muxer::new(sink.clone()).unwrap();
    let video = muxer.add_stream(video_spec(24)).unwrap();
    let audio = muxer.add_stream(audio_spec()).unwrap();
    assert_eq!((video.index(), audio.index()), (0, 1));

    for i in 0..6 {
        muxer.write_frame(video, Some(&video_frame(i))).unwrap();
        muxer.write_frame(audio, Some(&audio_frame(2000))).unwrap();
    }
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
    assert_eq!(reader.streams().len(), 2);
    assert_eq!(reader.stream(0).unwrap().stream_type, StreamType::Video);
    assert_eq!(reader.stream(1).unwrap().stream_type, StreamType::Audio);
    for packet in reader.packets() {
        let expected = if packet.stream_index == 0 {
            StreamType::Video
        } else {
            StreamType::Audio
        };
        assert_eq!(packet.stream_type, expected);
    }
    assert_eq!(reader.stream_packets(0).count(), 6);
    assert_eq!(reader.stream_packets(1).count(), 6);
}

#[test]
fn packets_are_interleaved_by_decode_time() {
    let sink = MemorySink::new();
    let mut muxer = Muxer::new(sink.clone()).unwrap();
    let video = muxer.add_stream(video_spec(24)).unwrap();
    let audio = muxer
        .add_stream_with_options(audio_spec(), EncoderOptions::new().with_frame_size(1024))
        .unwrap();

    // Audio runs ahead of video in submission order.
    for _ in 0..10 {
        muxer.write_frame(audio, Some(&audio_frame(4000))).unwrap();
    }
    for i in 0..20 {
        muxer.write_frame(video, Some(&video_frame(i))).unwrap();
    }
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
    let times: Vec<f64> = reader
        .packets()
        .map(|p| p.decode_ts().unwrap().seconds(p.time_base))
        .collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]), "{times:?}");

    let audio_frames = reader.stream(1).unwrap();
    // 40000 samples in 1024-sample packets, the last one short.
    assert_eq!(audio_frames.packet_count, 40);
    assert_eq!(audio_frames.duration, MediaDuration(40000));
}

#[test]
fn flush_is_idempotent() {
    let mut muxer = Muxer::new(MemorySink::new()).unwrap();
    let video = muxer.add_stream(video_spec(30)).unwrap();
    encode_all_with(&mut muxer, video, 4);

    let first = muxer.drain(video).unwrap();
    for packet in first {
        muxer.mux(packet).unwrap();
    }
    assert_eq!(muxer.stream(video).unwrap().state(), EncoderState::Drained);
    assert!(muxer.encode(video, None).unwrap().is_empty());
    assert!(muxer.drain(video).unwrap().is_empty());
    assert!(matches!(
        muxer.encode(video, Some(&video_frame(9))),
        Err(Error::EndOfStream)
    ));
    muxer.close().unwrap();
}

fn encode_all_with(muxer: &mut Muxer<MemorySink>, stream: StreamHandle, frames: u8) {
    for i in 0..frames {
        for packet in muxer.encode(stream, Some(&video_frame(i))).unwrap() {
            muxer.mux(packet).unwrap();
        }
    }
}

#[test]
fn parameters_lock_on_first_frame() {
    let mut muxer = Muxer::new(MemorySink::new()).unwrap();
    let video = muxer.add_stream(video_spec(25)).unwrap();
    let audio = muxer.add_stream(audio_spec()).unwrap();

    // Negotiable before the first frame.
    muxer.stream_mut(video).unwrap().set_width(4).unwrap();
    muxer.stream_mut(audio).unwrap().set_sample_rate(48000).unwrap();

    muxer.write_frame(video, Some(&video_frame(0))).unwrap();
    muxer.write_frame(audio, Some(&audio_frame(100))).unwrap();

    let encoder = muxer.stream_mut(video).unwrap();
    assert!(matches!(encoder.set_width(8), Err(Error::StreamLocked(_))));
    assert!(matches!(encoder.set_height(8), Err(Error::StreamLocked(_))));
    assert!(matches!(
        encoder.set_pixel_format(PixelFormat::Yuv420p),
        Err(Error::StreamLocked(_))
    ));
    assert!(matches!(
        encoder.set_frame_rate(Rational::integer(30)),
        Err(Error::StreamLocked(_))
    ));
    assert!(matches!(
        encoder.set_time_base(Rational::new(1, 90000).unwrap()),
        Err(Error::StreamLocked(_))
    ));
    assert!(matches!(encoder.set_bitrate(1_000_000), Err(Error::StreamLocked(_))));
    assert!(matches!(
        encoder.set_options(EncoderOptions::new()),
        Err(Error::StreamLocked(_))
    ));

    let encoder = muxer.stream_mut(audio).unwrap();
    assert!(matches!(encoder.set_sample_rate(44100), Err(Error::StreamLocked(_))));
    assert!(matches!(
        encoder.set_sample_format(SampleFormat::F32),
        Err(Error::StreamLocked(_))
    ));
    assert!(matches!(
        encoder.set_channel_layout(ChannelLayout::Mono),
        Err(Error::StreamLocked(_))
    ));
    assert!(matches!(
        encoder.set_time_base(Rational::new(1, 90000).unwrap()),
        Err(Error::StreamLocked(_))
    ));
    assert!(matches!(encoder.set_bitrate(128_000), Err(Error::StreamLocked(_))));
    assert!(matches!(
        encoder.set_options(EncoderOptions::new()),
        Err(Error::StreamLocked(_))
    ));

    muxer.finish_streams().unwrap();
    muxer.close().unwrap();
}

#[test]
fn mismatched_frames_are_rejected() {
    let mut muxer = Muxer::new(MemorySink::new()).unwrap();
    let video = muxer.add_stream(video_spec(25)).unwrap();
    muxer.write_frame(video, Some(&video_frame(0))).unwrap();

    let wrong_size: Frame = VideoFrame::new(8, 2, PixelFormat::Rgb24).into();
    assert!(matches!(
        muxer.encode(video, Some(&wrong_size)),
        Err(Error::FormatMismatch(_))
    ));
    assert!(matches!(
        muxer.encode(video, Some(&audio_frame(10))),
        Err(Error::FormatMismatch(_))
    ));
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();
}

#[test]
fn unconfigured_stream_refuses_frames() {
    let mut muxer = Muxer::new(MemorySink::new()).unwrap();
    let video = muxer.add_stream_named("rawvideo").unwrap();
    assert_eq!(
        muxer.stream(video).unwrap().state(),
        EncoderState::Unconfigured
    );
    assert!(matches!(
        muxer.encode(video, Some(&video_frame(0))),
        Err(Error::MissingParameter(_))
    ));

    let encoder = muxer.stream_mut(video).unwrap();
    encoder.set_width(4).unwrap();
    encoder.set_height(2).unwrap();
    encoder.set_pixel_format(PixelFormat::Rgb24).unwrap();
    encoder.set_frame_rate(Rational::integer(25)).unwrap();
    assert_eq!(encoder.state(), EncoderState::Configured);

    muxer.write_frame(video, Some(&video_frame(0))).unwrap();
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();
}

#[test]
fn stream_flushed_before_first_frame_is_empty() {
    let sink = MemorySink::new();
    let mut muxer = Muxer::new(sink.clone()).unwrap();
    let video = muxer.add_stream(video_spec(25)).unwrap();
    let audio = muxer.add_stream(audio_spec()).unwrap();

    assert!(muxer.encode(video, None).unwrap().is_empty());
    assert_eq!(muxer.stream(video).unwrap().state(), EncoderState::Drained);

    muxer.write_frame(audio, Some(&audio_frame(960))).unwrap();
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
    let stream = reader.stream(0).unwrap();
    assert_eq!(stream.packet_count, 0);
    assert_eq!(stream.start, None);
    assert_eq!(reader.stream(1).unwrap().packet_count, 1);
}

#[test]
fn mux_checks_timestamps_and_types() {
    let mut muxer = Muxer::new(MemorySink::new()).unwrap();
    muxer.add_stream(video_spec(25)).unwrap();

    let packet = |dts: i64, stream_type| Packet {
        data: vec![1, 2, 3],
        pts: Some(Pts(dts)),
        dts: Some(Pts(dts)),
        duration: MediaDuration(1),
        time_base: Rational::new(1, 25).unwrap(),
        is_keyframe: true,
        stream_type,
        stream_index: 0,
    };

    muxer.mux(packet(5, StreamType::Video)).unwrap();
    muxer.mux(packet(5, StreamType::Video)).unwrap();
    assert!(matches!(
        muxer.mux(packet(4, StreamType::Video)),
        Err(Error::NonMonotonicTimestamp {
            stream: 0,
            previous: 5,
            current: 4
        })
    ));
    assert!(matches!(
        muxer.mux(packet(6, StreamType::Audio)),
        Err(Error::FormatMismatch(_))
    ));
    muxer.close().unwrap();
}

#[test]
fn missing_backend_is_an_unknown_codec() {
    let config = MuxerConfig::new().with_registry(CodecRegistry::empty());
    let mut muxer = Muxer::with_config(MemorySink::new(), config).unwrap();
    assert!(matches!(
        muxer.add_stream(video_spec(25)),
        Err(Error::UnknownCodec(_))
    ));
    assert!(matches!(
        muxer.add_stream_named("definitely-not-a-codec"),
        Err(Error::UnknownCodec(_))
    ));
    muxer.close().unwrap();
}

#[test]
fn threaded_encoder_end_to_end() {
    let sink = MemorySink::new();
    let mut muxer = Muxer::new(sink.clone()).unwrap();
    let options = EncoderOptions::new()
        .with_worker_thread(2)
        .with_max_b_frames(2)
        .with_keyframe_interval(10);
    let video = muxer.add_stream_with_options(video_spec(30), options).unwrap();

    encode_all(&mut muxer, video, 30);
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
    let mut pts: Vec<i64> = reader.packets().filter_map(|p| p.pts.map(|p| p.0)).collect();
    pts.sort_unstable();
    assert_eq!(pts, (0..30).collect::<Vec<_>>());

    let dts: Vec<i64> = reader.packets().filter_map(|p| p.dts.map(|d| d.0)).collect();
    assert!(dts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reader.stream(0).unwrap().keyframes.len(), 3);
}

#[test]
fn dropped_muxer_leaves_unreadable_container() {
    let sink = MemorySink::new();
    {
        let mut muxer = Muxer::new(sink.clone()).unwrap();
        let video = muxer.add_stream(video_spec(25)).unwrap();
        encode_all(&mut muxer, video, 5);
    }
    assert!(!sink.is_finalized());
    assert!(matches!(
        ContainerReader::from_bytes(&sink.bytes()),
        Err(Error::InvalidData(_))
    ));
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.mxc");

    let mut muxer = Muxer::create(&path).unwrap();
    let audio = muxer
        .add_stream_with_options(audio_spec(), EncoderOptions::new().with_frame_size(1152))
        .unwrap();
    muxer.metadata_mut().unwrap().insert("title", "silence");
    for _ in 0..4 {
        muxer.write_frame(audio, Some(&audio_frame(1000))).unwrap();
    }
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();

    let reader = ContainerReader::open(&path).unwrap();
    assert_eq!(reader.metadata().get("title"), Some("silence"));

    let stream = reader.stream(0).unwrap();
    assert_eq!(stream.codec, Some(CodecId::PcmS16le));
    assert_eq!(stream.packet_count, 4);
    assert_eq!(stream.duration, MediaDuration(4000));

    let durations: Vec<i64> = reader.packets().map(|p| p.duration.0).collect();
    assert_eq!(durations, vec![1152, 1152, 1152, 544]);
    let bytes: usize = reader.packets().map(|p| p.size()).sum();
    assert_eq!(bytes, 4000 * 4);
}

#[test]
fn zero_option_values_fail_when_adding_streams() {
    let mut muxer = Muxer::new(MemorySink::new()).unwrap();
    let zero_frame = EncoderOptions {
        frame_size: Some(0),
        ..EncoderOptions::default()
    };
    assert!(matches!(
        muxer.add_stream_with_options(audio_spec(), zero_frame),
        Err(Error::InvalidParameter { name: "frame_size", .. })
    ));
    let zero_gop = EncoderOptions {
        keyframe_interval: Some(0),
        ..EncoderOptions::default()
    };
    assert!(matches!(
        muxer.add_stream_with_options(video_spec(25), zero_gop),
        Err(Error::InvalidParameter { name: "keyframe_interval", .. })
    ));
    assert_eq!(muxer.stream_count(), 0);

    let audio = muxer.add_stream(audio_spec()).unwrap();
    assert_eq!(audio.index(), 0);
    muxer.write_frame(audio, Some(&audio_frame(10))).unwrap();
    muxer.finish_streams().unwrap();
    muxer.close().unwrap();
}
