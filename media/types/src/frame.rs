/*!
    Decoded media frames.
*/

use crate::{ChannelLayout, Error, PixelFormat, Pts, Result, SampleFormat, StreamType};

/**
    One contiguous buffer of image rows or audio samples.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    /// Raw bytes of the plane.
    pub data: Vec<u8>,
    /// Distance in bytes between the starts of consecutive rows.
    pub stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, stride: usize) -> Self {
        Self { data, stride }
    }

    /**
        Allocate a zeroed plane with `rows` rows of `stride` bytes.
    */
    pub fn zeroed(stride: usize, rows: usize) -> Self {
        Self {
            data: vec![0; stride * rows],
            stride,
        }
    }

    /**
        Returns row `y`, trimmed to `row_bytes`.
    */
    pub fn row(&self, y: usize, row_bytes: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + row_bytes]
    }

    pub fn row_mut(&mut self, y: usize, row_bytes: usize) -> &mut [u8] {
        let start = y * self.stride;
        &mut self.data[start..start + row_bytes]
    }

    fn check(&self, index: usize, row_bytes: usize, rows: usize) -> Result<()> {
        if self.stride < row_bytes {
            return Err(Error::format_mismatch(format!(
                "plane {index} stride {} is below the minimum {row_bytes}",
                self.stride
            )));
        }
        let needed = match rows {
            0 => 0,
            rows => self.stride * (rows - 1) + row_bytes,
        };
        if self.data.len() < needed {
            return Err(Error::format_mismatch(format!(
                "plane {index} holds {} bytes, expected at least {needed}",
                self.data.len()
            )));
        }
        Ok(())
    }
}

/**
    A decoded video frame.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
    /// Presentation timestamp in the stream time base. `None` lets the encoder assign one.
    pub pts: Option<Pts>,
}

impl VideoFrame {
    /**
        Allocate a black-initialized (all-zero) frame with tightly packed planes.
    */
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let planes = format
            .plane_layout(width, height)
            .into_iter()
            .map(|(row_bytes, rows)| Plane::zeroed(row_bytes, rows))
            .collect();

        Self {
            width,
            height,
            format,
            planes,
            pts: None,
        }
    }

    /**
        Build a frame from caller-provided planes, checking their layout.
    */
    pub fn from_planes(
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: Vec<Plane>,
    ) -> Result<Self> {
        let frame = Self {
            width,
            height,
            format,
            planes,
            pts: None,
        };
        frame.validate()?;
        Ok(frame)
    }

    pub fn with_pts(mut self, pts: Pts) -> Self {
        self.pts = Some(pts);
        self
    }

    /**
        Check that plane count and strides match the format and dimensions.
    */
    pub fn validate(&self) -> Result<()> {
        let layout = self.format.plane_layout(self.width, self.height);
        if self.planes.len() != layout.len() {
            return Err(Error::format_mismatch(format!(
                "{} frame has {} planes, expected {}",
                self.format,
                self.planes.len(),
                layout.len()
            )));
        }
        for (index, (plane, (row_bytes, rows))) in self.planes.iter().zip(layout).enumerate() {
            plane.check(index, row_bytes, rows)?;
        }
        Ok(())
    }

    /**
        Copy the visible image into one tightly packed buffer, plane after plane.
    */
    pub fn packed_data(&self) -> Vec<u8> {
        let layout = self.format.plane_layout(self.width, self.height);
        let total = layout.iter().map(|(row_bytes, rows)| row_bytes * rows).sum();
        let mut data = Vec::with_capacity(total);
        for (plane, (row_bytes, rows)) in self.planes.iter().zip(layout) {
            for y in 0..rows {
                data.extend_from_slice(plane.row(y, row_bytes));
            }
        }
        data
    }
}

/**
    A decoded audio frame.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    pub format: SampleFormat,
    pub channels: ChannelLayout,
    /// Number of samples per channel.
    pub samples: usize,
    pub sample_rate: u32,
    pub planes: Vec<Plane>,
    /// Presentation timestamp in the stream time base. `None` lets the encoder assign one.
    pub pts: Option<Pts>,
}

impl AudioFrame {
    /**
        Allocate a silent frame.

        Unsigned 8-bit formats are filled with their midpoint (`0x80`) rather
        than zero so the frame really is silent.
    */
    pub fn new(
        format: SampleFormat,
        channels: ChannelLayout,
        samples: usize,
        sample_rate: u32,
    ) -> Self {
        let (plane_bytes, plane_count) = format.plane_layout(samples, channels.channels());
        let fill = if format.packed() == SampleFormat::U8 { 0x80 } else { 0 };
        let planes = (0..plane_count)
            .map(|_| Plane::new(vec![fill; plane_bytes], plane_bytes))
            .collect();

        Self {
            format,
            channels,
            samples,
            sample_rate,
            planes,
            pts: None,
        }
    }

    pub fn from_planes(
        format: SampleFormat,
        channels: ChannelLayout,
        samples: usize,
        sample_rate: u32,
        planes: Vec<Plane>,
    ) -> Result<Self> {
        let frame = Self {
            format,
            channels,
            samples,
            sample_rate,
            planes,
            pts: None,
        };
        frame.validate()?;
        Ok(frame)
    }

    pub fn with_pts(mut self, pts: Pts) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (plane_bytes, plane_count) =
            self.format.plane_layout(self.samples, self.channels.channels());
        if self.planes.len() != plane_count {
            return Err(Error::format_mismatch(format!(
                "{} {} frame has {} planes, expected {plane_count}",
                self.format,
                self.channels,
                self.planes.len()
            )));
        }
        for (index, plane) in self.planes.iter().enumerate() {
            plane.check(index, plane_bytes, 1)?;
        }
        Ok(())
    }

    /**
        Interleave all channels into one packed buffer.
    */
    pub fn interleaved_data(&self) -> Vec<u8> {
        let bytes = self.format.bytes_per_sample();
        let channels = self.channels.channels() as usize;

        if !self.format.is_planar() {
            let len = self.samples * bytes * channels;
            return self.planes[0].data[..len].to_vec();
        }

        let mut data = Vec::with_capacity(self.samples * bytes * channels);
        for sample in 0..self.samples {
            let offset = sample * bytes;
            for plane in &self.planes {
                data.extend_from_slice(&plane.data[offset..offset + bytes]);
            }
        }
        data
    }
}

/**
    A decoded unit of media: either a video image or a block of audio samples.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl Frame {
    pub fn stream_type(&self) -> StreamType {
        match self {
            Self::Video(_) => StreamType::Video,
            Self::Audio(_) => StreamType::Audio,
        }
    }

    pub fn pts(&self) -> Option<Pts> {
        match self {
            Self::Video(frame) => frame.pts,
            Self::Audio(frame) => frame.pts,
        }
    }

    pub fn set_pts(&mut self, pts: Option<Pts>) {
        match self {
            Self::Video(frame) => frame.pts = pts,
            Self::Audio(frame) => frame.pts = pts,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Video(frame) => frame.validate(),
            Self::Audio(frame) => frame.validate(),
        }
    }

    pub fn as_video(&self) -> Option<&VideoFrame> {
        match self {
            Self::Video(frame) => Some(frame),
            Self::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioFrame> {
        match self {
            Self::Audio(frame) => Some(frame),
            Self::Video(_) => None,
        }
    }
}

impl From<VideoFrame> for Frame {
    fn from(frame: VideoFrame) -> Self {
        Self::Video(frame)
    }
}

impl From<AudioFrame> for Frame {
    fn from(frame: AudioFrame) -> Self {
        Self::Audio(frame)
    }
}
