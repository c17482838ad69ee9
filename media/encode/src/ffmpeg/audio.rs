use std::collections::VecDeque;

use ffmpeg_next::{
    ChannelLayout as FFmpegChannelLayout,
    codec::{self, encoder::Audio as AudioEncoderFFmpeg},
    util::frame::audio::Audio as AudioFrameFFmpeg,
};

use media_types::{
    AudioStreamInfo, ChannelLayout, CodecId, Error, Frame, Pts, Rational, Result, SampleFormat,
    StreamInfo,
};

use crate::backend::{BackendPacket, CodecBackend, CodecParameters, Received};

/**
    Audio backend on top of an FFmpeg encoder.

    Most compressed audio codecs only accept frames of exactly `frame_size`
    samples, so input is buffered per plane and re-cut before it reaches the
    encoder. The final partial frame is sent as is at end of stream.

    One input frame can turn into several encoder frames, so packets are
    collected after every encoder frame and queued until polled; libavcodec
    refuses further input while its output is unread.
*/
pub struct FfmpegAudioBackend {
    codec: CodecId,
    encoder: Option<AudioEncoderFFmpeg>,
    info: Option<AudioStreamInfo>,
    frame_size: Option<usize>,
    fifo: Vec<Vec<u8>>,
    buffered: usize,
    anchor_pts: Pts,
    samples_since_anchor: i64,
    ready: VecDeque<BackendPacket>,
    finished: bool,
}

impl FfmpegAudioBackend {
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            encoder: None,
            info: None,
            frame_size: None,
            fifo: Vec::new(),
            buffered: 0,
            anchor_pts: Pts(0),
            samples_since_anchor: 0,
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn encoder(&mut self) -> Result<&mut AudioEncoderFFmpeg> {
        self.encoder
            .as_mut()
            .ok_or_else(|| Error::codec(format!("{} encoder is not open", self.codec)))
    }

    fn info(&self) -> Result<&AudioStreamInfo> {
        self.info
            .as_ref()
            .ok_or_else(|| Error::codec(format!("{} encoder is not open", self.codec)))
    }

    /**
        Bytes one sample occupies in each FIFO plane.
    */
    fn bytes_per_plane_sample(info: &AudioStreamInfo) -> usize {
        let bytes = info.sample_format.bytes_per_sample();
        if info.sample_format.is_planar() {
            bytes
        } else {
            bytes * info.channel_count() as usize
        }
    }

    /**
        Move every packet the encoder has ready into the queue.
        Returns how many were collected.
    */
    fn collect_ready(&mut self) -> Result<usize> {
        let mut collected = 0;
        while !self.finished {
            let mut packet = ffmpeg_next::Packet::empty();
            let result = self.encoder()?.receive_packet(&mut packet);
            match super::received(result, &packet)? {
                Received::Packet(packet) => {
                    self.ready.push_back(packet);
                    collected += 1;
                }
                Received::Again => break,
                Received::Eof => self.finished = true,
            }
        }
        Ok(collected)
    }

    /**
        Hand one input to the encoder, reading its output first whenever it
        reports that it is full.
    */
    fn submit<F>(&mut self, mut send: F) -> Result<()>
    where
        F: FnMut(&mut AudioEncoderFFmpeg) -> std::result::Result<(), ffmpeg_next::Error>,
    {
        loop {
            match send(self.encoder()?) {
                Ok(()) => break,
                Err(e) if super::is_again(&e) => {
                    if self.collect_ready()? == 0 {
                        return Err(Error::codec(format!(
                            "{} encoder accepts no input and has no output",
                            self.codec
                        )));
                    }
                }
                Err(e) => return Err(Error::codec(e.to_string())),
            }
        }
        self.collect_ready()?;
        Ok(())
    }

    /**
        Send the first `samples` buffered samples as one encoder frame.
    */
    fn send_buffered(&mut self, samples: usize) -> Result<()> {
        let info = self.info()?.clone();
        let unit = Self::bytes_per_plane_sample(&info);
        let sample_tb = Rational::new(1, sample_rate(&info)?)?;

        let mut ffmpeg_frame = AudioFrameFFmpeg::new(
            sample_format_to_ffmpeg(info.sample_format),
            samples,
            channel_layout_to_ffmpeg(info.channels),
        );
        ffmpeg_frame.set_rate(info.sample_rate);
        for (index, plane) in self.fifo.iter_mut().enumerate() {
            let bytes: Vec<u8> = plane.drain(..samples * unit).collect();
            ffmpeg_frame.data_mut(index)[..bytes.len()].copy_from_slice(&bytes);
        }
        self.buffered -= samples;

        let offset = Rational::rescale(self.samples_since_anchor, sample_tb, info.time_base)?;
        ffmpeg_frame.set_pts(Some(self.anchor_pts.0 + offset));
        self.samples_since_anchor += samples as i64;

        self.submit(|encoder| encoder.send_frame(&ffmpeg_frame))
    }
}

impl CodecBackend for FfmpegAudioBackend {
    fn open(&mut self, params: &CodecParameters) -> Result<()> {
        super::init()?;
        params.options.validate()?;

        let StreamInfo::Audio(info) = &params.info else {
            return Err(Error::unsupported_format(format!(
                "{} needs an audio stream",
                self.codec
            )));
        };

        let codec = super::find_encoder(self.codec)?;
        let encoder_ctx = codec::context::Context::new_with_codec(codec);
        let mut encoder = encoder_ctx
            .encoder()
            .audio()
            .map_err(|e| Error::codec(e.to_string()))?;

        encoder.set_format(sample_format_to_ffmpeg(info.sample_format));
        encoder.set_rate(sample_rate(info)?);
        encoder.set_channel_layout(channel_layout_to_ffmpeg(info.channels));
        encoder.set_time_base(ffmpeg_next::Rational::new(
            info.time_base.num(),
            info.time_base.den(),
        ));
        if let Some(bitrate) = params.options.bitrate() {
            encoder.set_bit_rate(bitrate as usize);
        }

        let encoder = encoder
            .open()
            .map_err(|e| Error::codec(format!("failed to open encoder: {}", e)))?;

        // A codec frame size wins over the requested one.
        let size = encoder.frame_size() as usize;
        self.frame_size = if size == 0 {
            params.options.frame_size
        } else {
            Some(size)
        };

        let planes = if info.sample_format.is_planar() {
            info.channel_count() as usize
        } else {
            1
        };
        self.fifo = vec![Vec::new(); planes];

        tracing::debug!(codec = %self.codec, frame_size = ?self.frame_size, "ffmpeg audio encoder opened");
        self.encoder = Some(encoder);
        self.info = Some(info.clone());
        Ok(())
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn extradata(&self) -> Option<Vec<u8>> {
        let encoder = self.encoder.as_ref()?;
        // SAFETY: the context is owned by an opened encoder that outlives this call.
        unsafe { super::context_extradata(encoder.as_ptr()) }
    }

    fn send_frame(&mut self, frame: &Frame, pts: Pts) -> Result<()> {
        let Some(audio) = frame.as_audio() else {
            return Err(Error::format_mismatch("audio encoder received a video frame"));
        };
        let unit = Self::bytes_per_plane_sample(self.info()?);

        if self.buffered == 0 {
            self.anchor_pts = pts;
            self.samples_since_anchor = 0;
        }
        for (fifo, plane) in self.fifo.iter_mut().zip(&audio.planes) {
            fifo.extend_from_slice(&plane.data[..audio.samples * unit]);
        }
        self.buffered += audio.samples;

        match self.frame_size {
            None => {
                let samples = self.buffered;
                self.send_buffered(samples)
            }
            Some(frame_size) => {
                while self.buffered >= frame_size {
                    self.send_buffered(frame_size)?;
                }
                Ok(())
            }
        }
    }

    fn send_eof(&mut self) -> Result<()> {
        if self.buffered > 0 {
            let samples = self.buffered;
            self.send_buffered(samples)?;
        }
        self.submit(|encoder| encoder.send_eof())
    }

    fn poll_packet(&mut self) -> Result<Received> {
        if self.ready.is_empty() {
            self.collect_ready()?;
        }
        Ok(match self.ready.pop_front() {
            Some(packet) => Received::Packet(packet),
            None if self.finished => Received::Eof,
            None => Received::Again,
        })
    }
}

impl std::fmt::Debug for FfmpegAudioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegAudioBackend")
            .field("codec", &self.codec)
            .field("frame_size", &self.frame_size)
            .field("buffered", &self.buffered)
            .field("ready", &self.ready.len())
            .finish_non_exhaustive()
    }
}

fn sample_rate(info: &AudioStreamInfo) -> Result<i32> {
    i32::try_from(info.sample_rate)
        .map_err(|_| Error::invalid_parameter("sample_rate", "too large"))
}

/**
    Convert our SampleFormat to FFmpeg's Sample format.
*/
pub fn sample_format_to_ffmpeg(format: SampleFormat) -> ffmpeg_next::format::Sample {
    use ffmpeg_next::format::Sample;
    use ffmpeg_next::format::sample::Type;

    match format {
        SampleFormat::F32 => Sample::F32(Type::Packed),
        SampleFormat::F64 => Sample::F64(Type::Packed),
        SampleFormat::S16 => Sample::I16(Type::Packed),
        SampleFormat::S32 => Sample::I32(Type::Packed),
        SampleFormat::U8 => Sample::U8(Type::Packed),
        SampleFormat::F32p => Sample::F32(Type::Planar),
        SampleFormat::F64p => Sample::F64(Type::Planar),
        SampleFormat::S16p => Sample::I16(Type::Planar),
        SampleFormat::S32p => Sample::I32(Type::Planar),
        SampleFormat::U8p => Sample::U8(Type::Planar),
    }
}

/**
    Convert our ChannelLayout to FFmpeg's ChannelLayout.
*/
fn channel_layout_to_ffmpeg(layout: ChannelLayout) -> FFmpegChannelLayout {
    match layout {
        ChannelLayout::Mono => FFmpegChannelLayout::MONO,
        ChannelLayout::Stereo => FFmpegChannelLayout::STEREO,
        ChannelLayout::Surround5_1 => FFmpegChannelLayout::_5POINT1,
        ChannelLayout::Surround7_1 => FFmpegChannelLayout::_7POINT1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use media_types::{AudioFrame, StreamSpec};

    use crate::config::EncoderOptions;

    #[test]
    fn one_frame_feeds_several_codec_frames() {
        let info = StreamSpec::audio(CodecId::Mp2, 48000)
            .with_sample_format(SampleFormat::S16)
            .with_channel_layout(ChannelLayout::Stereo)
            .params
            .resolve(CodecId::Mp2)
            .unwrap();
        let mut backend = FfmpegAudioBackend::new(CodecId::Mp2);
        backend
            .open(&CodecParameters {
                info,
                options: EncoderOptions::default(),
            })
            .unwrap();
        assert_eq!(backend.frame_size(), Some(1152));

        // 4000 samples are three full mp2 frames and a remainder.
        let frame = Frame::from(AudioFrame::new(
            SampleFormat::S16,
            ChannelLayout::Stereo,
            4000,
            48000,
        ));
        backend.send_frame(&frame, Pts(0)).unwrap();
        backend.send_frame(&frame, Pts(4000)).unwrap();
        backend.send_eof().unwrap();

        let mut pts = Vec::new();
        loop {
            match backend.poll_packet().unwrap() {
                Received::Packet(packet) => pts.extend(packet.pts.map(|p| p.0)),
                Received::Eof => break,
                Received::Again => panic!("flushed encoder stalled"),
            }
        }
        assert!(pts.len() >= 6, "{pts:?}");
        assert!(pts.windows(2).all(|w| w[0] <= w[1]));
    }
}
