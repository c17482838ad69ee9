/*!
    Per-stream encoder state machine.
*/

use std::fmt;

use media_types::{
    AudioParams, ChannelLayout, CodecId, Error, Frame, Packet, PixelFormat, Pts, Rational, Result,
    SampleFormat, StreamInfo, StreamParams, StreamSpec, StreamType, VideoParams,
};

use crate::backend::{BackendPacket, CodecBackend, CodecParameters, Received};
use crate::config::EncoderOptions;

/**
    Lifecycle of a [`StreamEncoder`].

    States only move forward:
    `Unconfigured → Configured → Encoding → Flushing → Drained`.
    A stream flushed before its first frame goes straight to `Drained`.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncoderState {
    /// Some required parameter is still unset.
    Unconfigured,
    /// Every required parameter is set; nothing has been encoded yet.
    Configured,
    /// Parameters are locked and the backend is open.
    Encoding,
    /// End of input was signalled; buffered packets are being returned.
    Flushing,
    /// The backend has returned everything.
    Drained,
}

impl EncoderState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Encoding => "encoding",
            Self::Flushing => "flushing",
            Self::Drained => "drained",
        }
    }
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/**
    Drives one codec backend for one stream.

    Parameters stay negotiable until the first frame is encoded; that call
    resolves them, opens the backend and locks the stream. From then on every
    setter fails with [`Error::StreamLocked`] and every frame must match the
    locked format exactly.

    Packets come back with the stream index fixed at creation, in the codec
    time base, with non-decreasing decode timestamps.
*/
pub struct StreamEncoder {
    index: usize,
    codec: CodecId,
    params: StreamParams,
    options: EncoderOptions,
    state: EncoderState,
    backend: Box<dyn CodecBackend>,
    info: Option<StreamInfo>,
    // Frames (video) or samples (audio) since the last explicit timestamp.
    next_unit: i64,
    last_dts: Option<Pts>,
    frames_encoded: u64,
    packets_emitted: u64,
}

impl StreamEncoder {
    /**
        Create an encoder for stream `index`.

        The backend must be unopened. Fails with [`Error::InvalidParameter`]
        if `spec` mixes media types or carries out-of-range values.
    */
    pub fn new(
        index: usize,
        spec: StreamSpec,
        options: EncoderOptions,
        backend: Box<dyn CodecBackend>,
    ) -> Result<Self> {
        if spec.params.stream_type() != spec.codec.stream_type() {
            return Err(Error::invalid_parameter(
                "params",
                format!(
                    "{} parameters given for {} codec {}",
                    spec.params.stream_type(),
                    spec.codec.stream_type(),
                    spec.codec
                ),
            ));
        }
        check_params(&spec.params)?;
        options.validate()?;

        let mut encoder = Self {
            index,
            codec: spec.codec,
            params: spec.params,
            options,
            state: EncoderState::Unconfigured,
            backend,
            info: None,
            next_unit: 0,
            last_dts: None,
            frames_encoded: 0,
            packets_emitted: 0,
        };
        encoder.refresh_state();
        Ok(encoder)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn codec(&self) -> CodecId {
        self.codec
    }

    pub fn stream_type(&self) -> StreamType {
        self.codec.stream_type()
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /**
        True once the first frame has been accepted (or the stream was flushed).
    */
    pub fn is_locked(&self) -> bool {
        self.state >= EncoderState::Encoding
    }

    pub fn is_drained(&self) -> bool {
        self.state == EncoderState::Drained
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /**
        Fixed stream information, available once the stream is locked.
    */
    pub fn info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }

    /**
        Codec time base: the locked one, or what the current parameters would
        resolve to.
    */
    pub fn time_base(&self) -> Option<Rational> {
        if let Some(info) = &self.info {
            return Some(info.time_base());
        }
        match &self.params {
            StreamParams::Video(params) => params
                .time_base
                .or_else(|| params.frame_rate.and_then(|rate| rate.invert().ok())),
            StreamParams::Audio(params) => params.time_base.or_else(|| {
                let rate = i32::try_from(params.sample_rate?).ok()?;
                Rational::new(1, rate).ok()
            }),
        }
    }

    /**
        Samples per audio packet, when the codec uses a fixed frame size.
    */
    pub fn frame_size(&self) -> Option<usize> {
        match &self.info {
            Some(StreamInfo::Audio(info)) => info.frame_size,
            Some(StreamInfo::Video(_)) => None,
            None => self.options.frame_size,
        }
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn packets_emitted(&self) -> u64 {
        self.packets_emitted
    }

    /**
        Decode timestamp of the most recent packet, in the codec time base.
    */
    pub fn last_dts(&self) -> Option<Pts> {
        self.last_dts
    }

    // ── Parameters ─────────────────────────────────────────────────────

    pub fn set_width(&mut self, width: u32) -> Result<()> {
        let params = self.video_params_mut("width")?;
        positive("width", width)?;
        params.width = Some(width);
        self.refresh_state();
        Ok(())
    }

    pub fn set_height(&mut self, height: u32) -> Result<()> {
        let params = self.video_params_mut("height")?;
        positive("height", height)?;
        params.height = Some(height);
        self.refresh_state();
        Ok(())
    }

    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        self.video_params_mut("pixel_format")?.pixel_format = Some(format);
        self.refresh_state();
        Ok(())
    }

    pub fn set_frame_rate(&mut self, rate: Rational) -> Result<()> {
        let params = self.video_params_mut("frame_rate")?;
        positive_rational("frame_rate", rate)?;
        params.frame_rate = Some(rate);
        self.refresh_state();
        Ok(())
    }

    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        let params = self.audio_params_mut("sample_rate")?;
        positive("sample_rate", rate)?;
        params.sample_rate = Some(rate);
        self.refresh_state();
        Ok(())
    }

    pub fn set_sample_format(&mut self, format: SampleFormat) -> Result<()> {
        self.audio_params_mut("sample_format")?.sample_format = Some(format);
        self.refresh_state();
        Ok(())
    }

    pub fn set_channel_layout(&mut self, layout: ChannelLayout) -> Result<()> {
        self.audio_params_mut("channel_layout")?.channel_layout = Some(layout);
        self.refresh_state();
        Ok(())
    }

    /**
        Override the codec time base. Valid for both media types.
    */
    pub fn set_time_base(&mut self, time_base: Rational) -> Result<()> {
        self.ensure_unlocked("time_base")?;
        positive_rational("time_base", time_base)?;
        match &mut self.params {
            StreamParams::Video(params) => params.time_base = Some(time_base),
            StreamParams::Audio(params) => params.time_base = Some(time_base),
        }
        Ok(())
    }

    /**
        Target a constant bitrate in bits per second.
    */
    pub fn set_bitrate(&mut self, bitrate: u64) -> Result<()> {
        self.ensure_unlocked("bitrate")?;
        positive("bitrate", bitrate)?;
        self.options = std::mem::take(&mut self.options).with_bitrate(bitrate);
        Ok(())
    }

    /**
        Replace every codec option at once.
    */
    pub fn set_options(&mut self, options: EncoderOptions) -> Result<()> {
        self.ensure_unlocked("options")?;
        options.validate()?;
        self.options = options;
        Ok(())
    }

    fn ensure_unlocked(&self, name: &'static str) -> Result<()> {
        if self.is_locked() {
            return Err(Error::StreamLocked(name));
        }
        Ok(())
    }

    fn video_params_mut(&mut self, name: &'static str) -> Result<&mut VideoParams> {
        self.ensure_unlocked(name)?;
        match &mut self.params {
            StreamParams::Video(params) => Ok(params),
            StreamParams::Audio(_) => Err(Error::invalid_parameter(
                name,
                "not applicable to an audio stream",
            )),
        }
    }

    fn audio_params_mut(&mut self, name: &'static str) -> Result<&mut AudioParams> {
        self.ensure_unlocked(name)?;
        match &mut self.params {
            StreamParams::Audio(params) => Ok(params),
            StreamParams::Video(_) => Err(Error::invalid_parameter(
                name,
                "not applicable to a video stream",
            )),
        }
    }

    fn refresh_state(&mut self) {
        if self.state == EncoderState::Unconfigured && self.params.missing().is_none() {
            self.state = EncoderState::Configured;
        }
    }

    // ── Encoding ───────────────────────────────────────────────────────

    /**
        Encode one frame, or flush with `None`.

        Returns the packets that became ready, which may be none: encoders
        buffer frames, so frames in and packets out do not line up. After the
        flush sentinel each call returns the next ready packets until the
        stream is drained; later calls return an empty vector.
    */
    pub fn encode(&mut self, frame: Option<&Frame>) -> Result<Vec<Packet>> {
        match frame {
            Some(frame) => self.encode_frame(frame),
            None => self.flush(),
        }
    }

    fn encode_frame(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        match self.state {
            EncoderState::Unconfigured => {
                let name = self.params.missing().unwrap_or("parameters");
                return Err(Error::MissingParameter(name));
            }
            EncoderState::Configured => {
                // A rejected first frame leaves the stream negotiable.
                check_frame(&self.params.resolve(self.codec)?, frame)?;
                self.lock()?;
            }
            EncoderState::Encoding => {}
            EncoderState::Flushing | EncoderState::Drained => return Err(Error::EndOfStream),
        }

        let info = self.info.as_ref().ok_or_else(|| Error::codec("stream not opened"))?;
        check_frame(info, frame)?;
        let (unit_tb, units) = frame_units(info, frame)?;
        let time_base = info.time_base();

        let pts = match frame.pts() {
            Some(pts) => {
                self.next_unit = Rational::rescale(pts.0, time_base, unit_tb)?;
                pts
            }
            None => Pts(Rational::rescale(self.next_unit, unit_tb, time_base)?),
        };
        self.next_unit += units;

        self.backend.send_frame(frame, pts)?;
        self.frames_encoded += 1;
        tracing::trace!(stream = self.index, pts = pts.0, "frame sent");

        self.collect()
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        match self.state {
            EncoderState::Unconfigured | EncoderState::Configured => {
                tracing::debug!(stream = self.index, "flushed before first frame");
                self.state = EncoderState::Drained;
                Ok(Vec::new())
            }
            EncoderState::Encoding => {
                self.backend.send_eof()?;
                self.state = EncoderState::Flushing;
                tracing::debug!(stream = self.index, frames = self.frames_encoded, "flushing");
                self.collect()
            }
            EncoderState::Flushing => self.collect(),
            EncoderState::Drained => Ok(Vec::new()),
        }
    }

    /**
        Flush and block until the backend has returned every packet.
    */
    pub fn drain(&mut self) -> Result<Vec<Packet>> {
        let mut packets = self.flush()?;
        while self.state == EncoderState::Flushing {
            match self.backend.wait_packet()? {
                Received::Packet(packet) => packets.push(self.stamp(packet)?),
                Received::Eof => self.finish(),
                Received::Again => {
                    return Err(Error::codec(format!(
                        "{} backend stalled while draining stream {}",
                        self.codec, self.index
                    )));
                }
            }
        }
        Ok(packets)
    }

    fn lock(&mut self) -> Result<()> {
        let mut info = self.params.resolve(self.codec)?;
        let params = CodecParameters {
            info: info.clone(),
            options: self.options.clone(),
        };
        self.backend.open(&params)?;

        let bitrate = self.options.bitrate();
        let extradata = self.backend.extradata();
        match &mut info {
            StreamInfo::Video(video) => {
                video.bitrate = bitrate;
                video.extradata = extradata;
            }
            StreamInfo::Audio(audio) => {
                audio.bitrate = bitrate;
                audio.extradata = extradata;
                audio.frame_size = self.backend.frame_size();
            }
        }

        tracing::debug!(
            stream = self.index,
            codec = %self.codec,
            time_base = %info.time_base(),
            "stream locked"
        );
        self.info = Some(info);
        self.state = EncoderState::Encoding;
        Ok(())
    }

    fn collect(&mut self) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        loop {
            match self.backend.poll_packet()? {
                Received::Packet(packet) => packets.push(self.stamp(packet)?),
                Received::Again => break,
                Received::Eof => {
                    self.finish();
                    break;
                }
            }
        }
        Ok(packets)
    }

    fn finish(&mut self) {
        if self.state == EncoderState::Flushing {
            tracing::debug!(stream = self.index, packets = self.packets_emitted, "drained");
        }
        self.state = EncoderState::Drained;
    }

    fn stamp(&mut self, packet: BackendPacket) -> Result<Packet> {
        let time_base = self
            .info
            .as_ref()
            .map(StreamInfo::time_base)
            .ok_or_else(|| Error::codec("packet before stream opened"))?;

        let dts = packet.dts.or(packet.pts);
        if let (Some(current), Some(previous)) = (dts, self.last_dts) {
            if current < previous {
                return Err(Error::NonMonotonicTimestamp {
                    stream: self.index,
                    previous: previous.0,
                    current: current.0,
                });
            }
        }
        if dts.is_some() {
            self.last_dts = dts;
        }
        self.packets_emitted += 1;

        let packet = Packet {
            data: packet.data,
            pts: packet.pts,
            dts,
            duration: packet.duration,
            time_base,
            is_keyframe: packet.is_keyframe,
            stream_type: self.stream_type(),
            stream_index: self.index,
        };
        tracing::trace!(%packet, "packet ready");
        Ok(packet)
    }
}

impl fmt::Debug for StreamEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEncoder")
            .field("index", &self.index)
            .field("codec", &self.codec)
            .field("state", &self.state)
            .field("params", &self.params)
            .field("frames_encoded", &self.frames_encoded)
            .field("packets_emitted", &self.packets_emitted)
            .finish_non_exhaustive()
    }
}

fn positive<T: Default + PartialOrd>(name: &'static str, value: T) -> Result<()> {
    if value <= T::default() {
        return Err(Error::invalid_parameter(name, "must be positive"));
    }
    Ok(())
}

fn positive_rational(name: &'static str, value: Rational) -> Result<()> {
    if !value.is_positive() {
        return Err(Error::invalid_parameter(
            name,
            format!("{value} must be positive"),
        ));
    }
    Ok(())
}

fn check_params(params: &StreamParams) -> Result<()> {
    match params {
        StreamParams::Video(video) => {
            if let Some(width) = video.width {
                positive("width", width)?;
            }
            if let Some(height) = video.height {
                positive("height", height)?;
            }
            if let Some(rate) = video.frame_rate {
                positive_rational("frame_rate", rate)?;
            }
            if let Some(time_base) = video.time_base {
                positive_rational("time_base", time_base)?;
            }
        }
        StreamParams::Audio(audio) => {
            if let Some(rate) = audio.sample_rate {
                positive("sample_rate", rate)?;
            }
            if let Some(time_base) = audio.time_base {
                positive_rational("time_base", time_base)?;
            }
        }
    }
    Ok(())
}

/**
    Reject frames whose kind or layout differs from the locked stream.
*/
fn check_frame(info: &StreamInfo, frame: &Frame) -> Result<()> {
    match (info, frame) {
        (StreamInfo::Video(info), Frame::Video(video)) => {
            if video.width != info.width || video.height != info.height {
                return Err(Error::format_mismatch(format!(
                    "frame is {}x{}, stream is {}x{}",
                    video.width, video.height, info.width, info.height
                )));
            }
            if video.format != info.pixel_format {
                return Err(Error::format_mismatch(format!(
                    "frame is {}, stream is {}",
                    video.format, info.pixel_format
                )));
            }
        }
        (StreamInfo::Audio(info), Frame::Audio(audio)) => {
            if audio.format != info.sample_format {
                return Err(Error::format_mismatch(format!(
                    "frame is {}, stream is {}",
                    audio.format, info.sample_format
                )));
            }
            if audio.channels != info.channels {
                return Err(Error::format_mismatch(format!(
                    "frame is {}, stream is {}",
                    audio.channels, info.channels
                )));
            }
            if audio.sample_rate != info.sample_rate {
                return Err(Error::format_mismatch(format!(
                    "frame is {} Hz, stream is {} Hz",
                    audio.sample_rate, info.sample_rate
                )));
            }
        }
        (info, frame) => {
            return Err(Error::format_mismatch(format!(
                "{} frame sent to {} stream",
                frame.stream_type(),
                info.stream_type()
            )));
        }
    }
    frame.validate()
}

/**
    Time base of the automatic timestamp counter and how far one frame advances it.
*/
fn frame_units(info: &StreamInfo, frame: &Frame) -> Result<(Rational, i64)> {
    match (info, frame) {
        (StreamInfo::Video(info), _) => Ok((info.frame_rate.invert()?, 1)),
        (StreamInfo::Audio(info), Frame::Audio(audio)) => {
            let rate = i32::try_from(info.sample_rate)
                .map_err(|_| Error::invalid_parameter("sample_rate", "too large"))?;
            Ok((Rational::new(1, rate)?, audio.samples as i64))
        }
        (StreamInfo::Audio(_), Frame::Video(_)) => {
            Err(Error::format_mismatch("video frame sent to audio stream"))
        }
    }
}
