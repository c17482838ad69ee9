/*!
    Codec identifiers.
*/

use std::fmt;
use std::str::FromStr;

use crate::Error;

/**
    Kind of media carried by a stream, frame or packet.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamType {
    Video,
    Audio,
}

impl StreamType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/**
    Codec identifiers known to the workspace.

    Knowing an identifier does not mean an encoder for it is available; that is
    decided by the codec registry at stream creation time.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    // Video
    RawVideo,
    H264,
    H265,
    Mpeg4,
    Vp9,
    Av1,
    // Audio
    PcmS16le,
    PcmS32le,
    PcmF32le,
    PcmF64le,
    PcmU8,
    Aac,
    Mp2,
    Mp3,
    Opus,
}

impl CodecId {
    pub const ALL: [Self; 15] = [
        Self::RawVideo,
        Self::H264,
        Self::H265,
        Self::Mpeg4,
        Self::Vp9,
        Self::Av1,
        Self::PcmS16le,
        Self::PcmS32le,
        Self::PcmF32le,
        Self::PcmF64le,
        Self::PcmU8,
        Self::Aac,
        Self::Mp2,
        Self::Mp3,
        Self::Opus,
    ];

    pub const fn stream_type(self) -> StreamType {
        match self {
            Self::RawVideo | Self::H264 | Self::H265 | Self::Mpeg4 | Self::Vp9 | Self::Av1 => {
                StreamType::Video
            }
            Self::PcmS16le
            | Self::PcmS32le
            | Self::PcmF32le
            | Self::PcmF64le
            | Self::PcmU8
            | Self::Aac
            | Self::Mp2
            | Self::Mp3
            | Self::Opus => StreamType::Audio,
        }
    }

    /**
        Canonical codec name, e.g. `"mpeg4"` or `"pcm_s16le"`.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::RawVideo => "rawvideo",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Mpeg4 => "mpeg4",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmS32le => "pcm_s32le",
            Self::PcmF32le => "pcm_f32le",
            Self::PcmF64le => "pcm_f64le",
            Self::PcmU8 => "pcm_u8",
            Self::Aac => "aac",
            Self::Mp2 => "mp2",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecId {
    type Err = Error;

    /**
        Parse a codec name. Fails with [`Error::UnknownCodec`].
    */
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "h265" | "h.265" => return Ok(Self::H265),
            "h.264" | "avc" => return Ok(Self::H264),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|codec| codec.name() == name)
            .ok_or_else(|| Error::UnknownCodec(s.to_owned()))
    }
}
