/*!
    Stream specification and stream information types.
*/

use crate::{ChannelLayout, CodecId, Error, PixelFormat, Rational, Result, SampleFormat, StreamType};

/**
    Negotiable video parameters.

    Every field starts unset; all but `time_base` must be set before the first
    frame is encoded. `time_base` defaults to the inverse of `frame_rate`.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VideoParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<PixelFormat>,
    pub frame_rate: Option<Rational>,
    pub time_base: Option<Rational>,
}

impl VideoParams {
    /**
        Name of the first required parameter that is still unset.
    */
    pub fn missing(&self) -> Option<&'static str> {
        if self.width.is_none() {
            Some("width")
        } else if self.height.is_none() {
            Some("height")
        } else if self.pixel_format.is_none() {
            Some("pixel_format")
        } else if self.frame_rate.is_none() {
            Some("frame_rate")
        } else {
            None
        }
    }

    /**
        Resolve into fixed stream information, applying defaults.
    */
    pub fn resolve(&self, codec_id: CodecId) -> Result<VideoStreamInfo> {
        if let Some(name) = self.missing() {
            return Err(Error::MissingParameter(name));
        }
        let (Some(width), Some(height), Some(pixel_format), Some(frame_rate)) =
            (self.width, self.height, self.pixel_format, self.frame_rate)
        else {
            return Err(Error::MissingParameter("video parameters"));
        };
        let time_base = match self.time_base {
            Some(time_base) => time_base,
            None => frame_rate.invert()?,
        };

        Ok(VideoStreamInfo {
            width,
            height,
            pixel_format,
            frame_rate,
            time_base,
            codec_id,
            bitrate: None,
            extradata: None,
        })
    }
}

/**
    Negotiable audio parameters.

    `time_base` defaults to the inverse of `sample_rate`.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AudioParams {
    pub sample_rate: Option<u32>,
    pub sample_format: Option<SampleFormat>,
    pub channel_layout: Option<ChannelLayout>,
    pub time_base: Option<Rational>,
}

impl AudioParams {
    pub fn missing(&self) -> Option<&'static str> {
        if self.sample_rate.is_none() {
            Some("sample_rate")
        } else if self.sample_format.is_none() {
            Some("sample_format")
        } else if self.channel_layout.is_none() {
            Some("channel_layout")
        } else {
            None
        }
    }

    pub fn resolve(&self, codec_id: CodecId) -> Result<AudioStreamInfo> {
        if let Some(name) = self.missing() {
            return Err(Error::MissingParameter(name));
        }
        let (Some(sample_rate), Some(sample_format), Some(channels)) =
            (self.sample_rate, self.sample_format, self.channel_layout)
        else {
            return Err(Error::MissingParameter("audio parameters"));
        };
        let time_base = match self.time_base {
            Some(time_base) => time_base,
            None => sample_rate_time_base(sample_rate)?,
        };

        Ok(AudioStreamInfo {
            sample_rate,
            channels,
            sample_format,
            time_base,
            codec_id,
            bitrate: None,
            frame_size: None,
            extradata: None,
        })
    }
}

/**
    Negotiable parameters for either media type.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamParams {
    Video(VideoParams),
    Audio(AudioParams),
}

impl StreamParams {
    /**
        Empty parameters for the given media type.
    */
    pub fn empty(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Video => Self::Video(VideoParams::default()),
            StreamType::Audio => Self::Audio(AudioParams::default()),
        }
    }

    pub fn stream_type(&self) -> StreamType {
        match self {
            Self::Video(_) => StreamType::Video,
            Self::Audio(_) => StreamType::Audio,
        }
    }

    pub fn missing(&self) -> Option<&'static str> {
        match self {
            Self::Video(params) => params.missing(),
            Self::Audio(params) => params.missing(),
        }
    }

    pub fn resolve(&self, codec_id: CodecId) -> Result<StreamInfo> {
        match self {
            Self::Video(params) => params.resolve(codec_id).map(StreamInfo::Video),
            Self::Audio(params) => params.resolve(codec_id).map(StreamInfo::Audio),
        }
    }
}

/**
    What a caller asks for when adding a stream: a codec and its parameters.

    # Example

    ```ignore
    let spec = StreamSpec::video(CodecId::Mpeg4, Rational::integer(24))
        .with_size(320, 240)
        .with_pixel_format(PixelFormat::Yuv420p);
    ```
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub codec: CodecId,
    pub params: StreamParams,
}

impl StreamSpec {
    /**
        Create a specification with every parameter unset.
    */
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            params: StreamParams::empty(codec.stream_type()),
        }
    }

    /**
        Create a video specification at the given frame rate.
    */
    pub fn video(codec: CodecId, frame_rate: Rational) -> Self {
        Self {
            codec,
            params: StreamParams::Video(VideoParams {
                frame_rate: Some(frame_rate),
                ..VideoParams::default()
            }),
        }
    }

    /**
        Create an audio specification at the given sample rate.
    */
    pub fn audio(codec: CodecId, sample_rate: u32) -> Self {
        Self {
            codec,
            params: StreamParams::Audio(AudioParams {
                sample_rate: Some(sample_rate),
                ..AudioParams::default()
            }),
        }
    }

    /**
        Set frame dimensions. Ignored for audio specifications.
    */
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        if let StreamParams::Video(params) = &mut self.params {
            params.width = Some(width);
            params.height = Some(height);
        }
        self
    }

    /**
        Set the pixel format. Ignored for audio specifications.
    */
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        if let StreamParams::Video(params) = &mut self.params {
            params.pixel_format = Some(format);
        }
        self
    }

    /**
        Set the sample format. Ignored for video specifications.
    */
    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        if let StreamParams::Audio(params) = &mut self.params {
            params.sample_format = Some(format);
        }
        self
    }

    /**
        Set the channel layout. Ignored for video specifications.
    */
    pub fn with_channel_layout(mut self, layout: ChannelLayout) -> Self {
        if let StreamParams::Audio(params) = &mut self.params {
            params.channel_layout = Some(layout);
        }
        self
    }

    /**
        Override the codec time base.
    */
    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        match &mut self.params {
            StreamParams::Video(params) => params.time_base = Some(time_base),
            StreamParams::Audio(params) => params.time_base = Some(time_base),
        }
        self
    }

    pub fn stream_type(&self) -> StreamType {
        self.codec.stream_type()
    }
}

/**
    Information about a video stream once its parameters are fixed.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoStreamInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub pixel_format: PixelFormat,
    /// Frame rate.
    pub frame_rate: Rational,
    /// Time base for timestamps.
    pub time_base: Rational,
    /// Codec used.
    pub codec_id: CodecId,
    /// Bitrate in bits per second (if known).
    pub bitrate: Option<u64>,
    /// Codec extradata (SPS/PPS for H.264, VPS/SPS/PPS for H.265, etc.).
    pub extradata: Option<Vec<u8>>,
}

impl VideoStreamInfo {
    /**
        Returns the aspect ratio as a float.
    */
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /**
        Returns the frame rate as fps.
    */
    pub fn fps(&self) -> f64 {
        self.frame_rate.to_f64()
    }
}

/**
    Information about an audio stream once its parameters are fixed.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioStreamInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout.
    pub channels: ChannelLayout,
    /// Sample format.
    pub sample_format: SampleFormat,
    /// Time base for timestamps.
    pub time_base: Rational,
    /// Codec used.
    pub codec_id: CodecId,
    /// Bitrate in bits per second (if known).
    pub bitrate: Option<u64>,
    /// Samples per packet for codecs with a fixed frame size.
    pub frame_size: Option<usize>,
    /// Codec extradata (AudioSpecificConfig for AAC, etc.).
    pub extradata: Option<Vec<u8>>,
}

impl AudioStreamInfo {
    /**
        Returns the number of channels.
    */
    pub fn channel_count(&self) -> u16 {
        self.channels.channels()
    }

    /**
        Returns the number of bytes per sample per channel.
    */
    pub fn bytes_per_sample(&self) -> usize {
        self.sample_format.bytes_per_sample()
    }
}

/**
    Fixed stream information for either media type.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamInfo {
    Video(VideoStreamInfo),
    Audio(AudioStreamInfo),
}

impl StreamInfo {
    pub fn stream_type(&self) -> StreamType {
        match self {
            Self::Video(_) => StreamType::Video,
            Self::Audio(_) => StreamType::Audio,
        }
    }

    pub fn codec_id(&self) -> CodecId {
        match self {
            Self::Video(info) => info.codec_id,
            Self::Audio(info) => info.codec_id,
        }
    }

    pub fn time_base(&self) -> Rational {
        match self {
            Self::Video(info) => info.time_base,
            Self::Audio(info) => info.time_base,
        }
    }

    pub fn bitrate(&self) -> Option<u64> {
        match self {
            Self::Video(info) => info.bitrate,
            Self::Audio(info) => info.bitrate,
        }
    }

    pub fn as_video(&self) -> Option<&VideoStreamInfo> {
        match self {
            Self::Video(info) => Some(info),
            Self::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioStreamInfo> {
        match self {
            Self::Audio(info) => Some(info),
            Self::Video(_) => None,
        }
    }
}

fn sample_rate_time_base(sample_rate: u32) -> Result<Rational> {
    let den = i32::try_from(sample_rate)
        .map_err(|_| Error::invalid_parameter("sample_rate", format!("{sample_rate} is too large")))?;
    Rational::new(1, den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_params_default_time_base_is_inverse_rate() {
        let spec = StreamSpec::video(CodecId::Mpeg4, Rational::integer(24))
            .with_size(320, 240)
            .with_pixel_format(PixelFormat::Yuv420p);
        let info = spec.params.resolve(spec.codec).unwrap();
        assert_eq!(info.time_base(), Rational::new(1, 24).unwrap());
        assert_eq!(info.stream_type(), StreamType::Video);
    }

    #[test]
    fn video_params_report_first_missing() {
        let spec = StreamSpec::video(CodecId::Mpeg4, Rational::integer(24));
        assert_eq!(spec.params.missing(), Some("width"));
        assert!(matches!(
            spec.params.resolve(spec.codec),
            Err(Error::MissingParameter("width"))
        ));
    }

    #[test]
    fn audio_params_resolve() {
        let spec = StreamSpec::audio(CodecId::PcmS16le, 48000)
            .with_sample_format(SampleFormat::S16)
            .with_channel_layout(ChannelLayout::Stereo);
        let info = spec.params.resolve(spec.codec).unwrap();
        let audio = info.as_audio().unwrap();
        assert_eq!(audio.time_base, Rational::new(1, 48000).unwrap());
        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.bytes_per_sample(), 2);
    }

    #[test]
    fn explicit_time_base_wins() {
        let tb = Rational::new(1, 90000).unwrap();
        let spec = StreamSpec::video(CodecId::RawVideo, Rational::integer(30))
            .with_size(16, 16)
            .with_pixel_format(PixelFormat::Rgb24)
            .with_time_base(tb);
        assert_eq!(spec.params.resolve(spec.codec).unwrap().time_base(), tb);
    }

    #[test]
    fn builders_ignore_other_media_type() {
        let spec = StreamSpec::audio(CodecId::Mp2, 44100).with_size(1, 1);
        assert_eq!(spec.params, StreamParams::Audio(AudioParams {
            sample_rate: Some(44100),
            ..AudioParams::default()
        }));
        assert_eq!(StreamSpec::new(CodecId::H264).params.missing(), Some("width"));
    }

    #[test]
    fn video_stream_info_aspect_ratio() {
        let spec = StreamSpec::video(CodecId::H264, Rational::new(24000, 1001).unwrap())
            .with_size(1920, 1080)
            .with_pixel_format(PixelFormat::Yuv420p);
        let info = spec.params.resolve(spec.codec).unwrap();
        let video = info.as_video().unwrap();
        assert!((video.aspect_ratio() - 16.0 / 9.0).abs() < 0.01);
        assert!((video.fps() - 23.976).abs() < 0.001);
    }
}
