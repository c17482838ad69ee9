use proptest::prelude::*;

use media_encode::EncoderOptions;
use media_sink::{ContainerReader, MemorySink, Muxer, MuxerConfig};
use media_types::{
    AudioFrame, ChannelLayout, CodecId, Frame, PixelFormat, Rational, SampleFormat, StreamSpec,
    VideoFrame,
};

fn video_frame() -> Frame {
    VideoFrame::new(2, 2, PixelFormat::Rgb24).into()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn decode_order_is_monotonic(
        frames in 1usize..60,
        max_b in 0u32..4,
        gop in 1u32..12,
        threaded in any::<bool>(),
    ) {
        let sink = MemorySink::new();
        let mut muxer = Muxer::new(sink.clone()).unwrap();
        let mut options = EncoderOptions::new()
            .with_max_b_frames(max_b)
            .with_keyframe_interval(gop);
        if threaded {
            options = options.with_worker_thread(3);
        }
        let video = muxer
            .add_stream_with_options(
                StreamSpec::video(CodecId::RawVideo, Rational::integer(25))
                    .with_size(2, 2)
                    .with_pixel_format(PixelFormat::Rgb24),
                options,
            )
            .unwrap();

        for _ in 0..frames {
            muxer.write_frame(video, Some(&video_frame())).unwrap();
        }
        muxer.finish_streams().unwrap();
        muxer.close().unwrap();

        let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
        let packets: Vec<_> = reader.packets().collect();
        prop_assert_eq!(packets.len(), frames);
        prop_assert!(packets[0].is_keyframe);

        let dts: Vec<i64> = packets.iter().map(|p| p.dts.unwrap().0).collect();
        prop_assert!(dts.windows(2).all(|w| w[0] < w[1]), "dts {:?}", dts);
        for packet in &packets {
            prop_assert!(packet.dts.unwrap() <= packet.pts.unwrap());
        }

        let mut pts: Vec<i64> = packets.iter().map(|p| p.pts.unwrap().0).collect();
        pts.sort_unstable();
        prop_assert_eq!(pts, (0..frames as i64).collect::<Vec<_>>());
    }

    #[test]
    fn audio_repacketization_preserves_samples(
        chunks in proptest::collection::vec(1usize..3000, 1..12),
        frame_size in proptest::option::of(64usize..2048),
    ) {
        let sink = MemorySink::new();
        let config = MuxerConfig::new().with_time_base(Rational::new(1, 90000).unwrap());
        let mut muxer = Muxer::with_config(sink.clone(), config).unwrap();
        let mut options = EncoderOptions::new();
        if let Some(frame_size) = frame_size {
            options = options.with_frame_size(frame_size);
        }
        let audio = muxer
            .add_stream_with_options(
                StreamSpec::audio(CodecId::PcmF32le, 48000)
                    .with_sample_format(SampleFormat::F32)
                    .with_channel_layout(ChannelLayout::Mono),
                options,
            )
            .unwrap();

        for &samples in &chunks {
            let frame = AudioFrame::new(SampleFormat::F32, ChannelLayout::Mono, samples, 48000);
            muxer.write_frame(audio, Some(&frame.into())).unwrap();
        }
        muxer.finish_streams().unwrap();
        muxer.close().unwrap();

        let total: usize = chunks.iter().sum();
        let reader = ContainerReader::from_bytes(&sink.bytes()).unwrap();
        let bytes: usize = reader.packets().map(|p| p.size()).sum();
        prop_assert_eq!(bytes, total * 4);

        let stream = reader.stream(0).unwrap();
        prop_assert_eq!(stream.time_base, Rational::new(1, 90000).unwrap());
        // Rounding into 1/90000 moves each boundary by at most one tick.
        let seconds = total as f64 / 48000.0;
        prop_assert!((stream.duration_seconds() - seconds).abs() < 1e-4);
    }
}
