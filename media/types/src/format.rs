/*!
    Pixel and sample format types.
*/

use std::fmt;
use std::str::FromStr;

use crate::Error;

/**
    Video pixel formats.

    This is a subset of formats commonly encountered in media pipelines.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (most common video format)
    Yuv420p,
    /// Semi-planar YUV 4:2:0, 12bpp (common hardware decoder output)
    Nv12,
    /// Packed BGRA, 32bpp (common for display on macOS/Windows)
    Bgra,
    /// Packed RGBA, 32bpp (common for display)
    Rgba,
    /// Packed RGB, 24bpp
    Rgb24,
    /// Packed BGR, 24bpp
    Bgr24,
    /// Planar YUV 4:2:2, 16bpp
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp
    Yuv444p,
    /// Planar YUV 4:2:0, 10-bit little-endian in 16-bit words
    Yuv420p10,
    /// Semi-planar YUV 4:2:0, 10-bit little-endian in 16-bit words
    P010le,
}

impl PixelFormat {
    pub const ALL: [Self; 10] = [
        Self::Yuv420p,
        Self::Nv12,
        Self::Bgra,
        Self::Rgba,
        Self::Rgb24,
        Self::Bgr24,
        Self::Yuv422p,
        Self::Yuv444p,
        Self::Yuv420p10,
        Self::P010le,
    ];

    /**
        Returns the number of bits per pixel for this format.

        For planar formats, this is the average bits per pixel.
    */
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Yuv420p | Self::Nv12 => 12,
            Self::Yuv420p10 | Self::P010le => 24, // 16-bit storage, 1.5 samples per pixel
            Self::Yuv422p => 16,
            Self::Rgb24 | Self::Bgr24 | Self::Yuv444p => 24,
            Self::Bgra | Self::Rgba => 32,
        }
    }

    /**
        Returns true if this is a planar format.
    */
    pub const fn is_planar(self) -> bool {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Yuv420p10 => true,
            Self::Nv12 | Self::P010le => true, // semi-planar counts as planar
            Self::Bgra | Self::Rgba | Self::Rgb24 | Self::Bgr24 => false,
        }
    }

    /**
        Returns the number of image planes a frame of this format carries.
    */
    pub const fn plane_count(self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Yuv420p10 => 3,
            Self::Nv12 | Self::P010le => 2,
            Self::Bgra | Self::Rgba | Self::Rgb24 | Self::Bgr24 => 1,
        }
    }

    /**
        Returns `(row_bytes, rows)` for each plane of a `width` x `height` image.

        `row_bytes` is the minimum stride; callers may pad rows beyond it.
    */
    pub fn plane_layout(self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        let half_w = w.div_ceil(2);
        let half_h = h.div_ceil(2);

        match self {
            Self::Yuv420p => vec![(w, h), (half_w, half_h), (half_w, half_h)],
            Self::Yuv422p => vec![(w, h), (half_w, h), (half_w, h)],
            Self::Yuv444p => vec![(w, h), (w, h), (w, h)],
            Self::Yuv420p10 => vec![(w * 2, h), (half_w * 2, half_h), (half_w * 2, half_h)],
            Self::Nv12 => vec![(w, h), (half_w * 2, half_h)],
            Self::P010le => vec![(w * 2, h), (half_w * 4, half_h)],
            Self::Bgra | Self::Rgba => vec![(w * 4, h)],
            Self::Rgb24 | Self::Bgr24 => vec![(w * 3, h)],
        }
    }

    /**
        Returns the conventional lowercase name, e.g. `"yuv420p"`.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Nv12 => "nv12",
            Self::Bgra => "bgra",
            Self::Rgba => "rgba",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv420p10 => "yuv420p10le",
            Self::P010le => "p010le",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.name() == name)
            .ok_or_else(|| Error::unsupported_format(format!("pixel format '{s}'")))
    }
}

/**
    Audio sample formats.

    Packed formats interleave all channels in a single plane. Planar formats
    carry one plane per channel.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 32-bit floating point, range [-1.0, 1.0]
    F32,
    /// 64-bit floating point
    F64,
    /// Signed 16-bit integer
    S16,
    /// Signed 32-bit integer
    S32,
    /// Unsigned 8-bit integer
    U8,
    /// Planar 32-bit floating point
    F32p,
    /// Planar 64-bit floating point
    F64p,
    /// Planar signed 16-bit integer
    S16p,
    /// Planar signed 32-bit integer
    S32p,
    /// Planar unsigned 8-bit integer
    U8p,
}

impl SampleFormat {
    pub const ALL: [Self; 10] = [
        Self::F32,
        Self::F64,
        Self::S16,
        Self::S32,
        Self::U8,
        Self::F32p,
        Self::F64p,
        Self::S16p,
        Self::S32p,
        Self::U8p,
    ];

    /**
        Returns the number of bytes per sample.
    */
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 | Self::U8p => 1,
            Self::S16 | Self::S16p => 2,
            Self::S32 | Self::F32 | Self::S32p | Self::F32p => 4,
            Self::F64 | Self::F64p => 8,
        }
    }

    /**
        Returns true if this is a floating-point format.
    */
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64 | Self::F32p | Self::F64p)
    }

    pub const fn is_planar(self) -> bool {
        matches!(
            self,
            Self::F32p | Self::F64p | Self::S16p | Self::S32p | Self::U8p
        )
    }

    /**
        Returns the packed counterpart of a planar format (identity for packed ones).
    */
    pub const fn packed(self) -> Self {
        match self {
            Self::F32p => Self::F32,
            Self::F64p => Self::F64,
            Self::S16p => Self::S16,
            Self::S32p => Self::S32,
            Self::U8p => Self::U8,
            other => other,
        }
    }

    /**
        Returns `(plane_bytes, plane_count)` for `samples` samples over `channels`.
    */
    pub const fn plane_layout(self, samples: usize, channels: u16) -> (usize, usize) {
        let channels = channels as usize;
        if self.is_planar() {
            (samples * self.bytes_per_sample(), channels)
        } else {
            (samples * self.bytes_per_sample() * channels, 1)
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "flt",
            Self::F64 => "dbl",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::U8 => "u8",
            Self::F32p => "fltp",
            Self::F64p => "dblp",
            Self::S16p => "s16p",
            Self::S32p => "s32p",
            Self::U8p => "u8p",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.name() == name)
            .ok_or_else(|| Error::unsupported_format(format!("sample format '{s}'")))
    }
}

/**
    Audio channel layout.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// Single channel
    Mono,
    /// Left and right channels
    Stereo,
    /// 5.1 surround (FL, FR, FC, LFE, BL, BR)
    Surround5_1,
    /// 7.1 surround (FL, FR, FC, LFE, BL, BR, SL, SR)
    Surround7_1,
}

impl ChannelLayout {
    /**
        Returns the number of channels.
    */
    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround5_1 => 6,
            Self::Surround7_1 => 8,
        }
    }

    /**
        Create a channel layout from an exact channel count.
    */
    pub const fn from_count(count: u16) -> Option<Self> {
        match count {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            6 => Some(Self::Surround5_1),
            8 => Some(Self::Surround7_1),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Stereo => "stereo",
            Self::Surround5_1 => "5.1",
            Self::Surround7_1 => "7.1",
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mono" => Ok(Self::Mono),
            "stereo" => Ok(Self::Stereo),
            "5.1" => Ok(Self::Surround5_1),
            "7.1" => Ok(Self::Surround7_1),
            _ => Err(Error::unsupported_format(format!("channel layout '{s}'"))),
        }
    }
}
