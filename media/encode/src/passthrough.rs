/*!
    Lossless pass-through backends.

    These do no compression: a video packet carries the tightly packed image
    and an audio packet carries interleaved samples. They still behave like
    real encoders where it matters to the pipeline: video can reorder frames
    into B-frame decode order, and audio can repacketize into a fixed frame
    size, so frames in and packets out do not line up one to one.
*/

use std::collections::VecDeque;

use media_types::{
    AudioStreamInfo, CodecId, Error, Frame, MediaDuration, Pts, Rational, Result, SampleFormat,
    StreamInfo, VideoStreamInfo,
};

use crate::backend::{BackendPacket, CodecBackend, CodecParameters, Received};

struct PendingPicture {
    data: Vec<u8>,
    pts: Pts,
    is_keyframe: bool,
}

/**
    `rawvideo` backend with optional B-frame style reordering.

    With `max_b_frames = n`, up to `n` non-reference pictures are held back
    until the next reference picture arrives; the reference is emitted first,
    then the held pictures in display order. Decode timestamps trail the
    presentation timestamps by one picture so they never exceed them.
*/
pub struct RawVideoBackend {
    info: Option<VideoStreamInfo>,
    frame_duration: i64,
    keyframe_interval: u64,
    max_b_frames: usize,
    frames_in: u64,
    held: Vec<PendingPicture>,
    ready: VecDeque<BackendPacket>,
    display_pts: VecDeque<Pts>,
    first_pts: Option<Pts>,
    emitted: u64,
    eof: bool,
}

impl RawVideoBackend {
    pub fn new() -> Self {
        Self {
            info: None,
            frame_duration: 1,
            keyframe_interval: 12,
            max_b_frames: 0,
            frames_in: 0,
            held: Vec::new(),
            ready: VecDeque::new(),
            display_pts: VecDeque::new(),
            first_pts: None,
            emitted: 0,
            eof: false,
        }
    }

    fn reorder_delay(&self) -> u64 {
        if self.max_b_frames > 0 { 1 } else { 0 }
    }

    fn emit(&mut self, picture: PendingPicture) {
        let delay = self.reorder_delay();
        let dts = if self.emitted < delay {
            let first = self.first_pts.unwrap_or(picture.pts);
            Pts(first.0 - (delay - self.emitted) as i64 * self.frame_duration)
        } else {
            // Always present: emission n happens after at least n + 1 sends.
            self.display_pts.pop_front().unwrap_or(picture.pts)
        };
        self.emitted += 1;

        self.ready.push_back(BackendPacket {
            data: picture.data,
            pts: Some(picture.pts),
            dts: Some(dts),
            duration: MediaDuration(self.frame_duration),
            is_keyframe: picture.is_keyframe,
        });
    }

    fn emit_reference(&mut self, reference: PendingPicture) {
        self.emit(reference);
        let held = std::mem::take(&mut self.held);
        for picture in held {
            self.emit(picture);
        }
    }
}

impl Default for RawVideoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecBackend for RawVideoBackend {
    fn open(&mut self, params: &CodecParameters) -> Result<()> {
        let StreamInfo::Video(info) = &params.info else {
            return Err(Error::unsupported_format("rawvideo needs a video stream"));
        };
        params.options.validate()?;

        let frame_tb = info.frame_rate.invert()?;
        self.frame_duration = Rational::rescale(1, frame_tb, info.time_base)?.max(1);
        self.keyframe_interval = match params.options.keyframe_interval {
            Some(interval) => u64::from(interval),
            // Default: keyframe every 2 seconds
            None => (info.fps() * 2.0).round().max(1.0) as u64,
        };
        self.max_b_frames = params.options.max_b_frames as usize;
        self.info = Some(info.clone());
        Ok(())
    }

    fn send_frame(&mut self, frame: &Frame, pts: Pts) -> Result<()> {
        if self.eof {
            return Err(Error::EndOfStream);
        }
        let Some(video) = frame.as_video() else {
            return Err(Error::format_mismatch("rawvideo received an audio frame"));
        };

        let is_keyframe = self.frames_in % self.keyframe_interval == 0;
        self.frames_in += 1;
        self.first_pts.get_or_insert(pts);
        self.display_pts.push_back(pts);

        let picture = PendingPicture {
            data: video.packed_data(),
            pts,
            is_keyframe,
        };

        if is_keyframe || self.held.len() >= self.max_b_frames {
            self.emit_reference(picture);
        } else {
            self.held.push(picture);
        }
        Ok(())
    }

    fn send_eof(&mut self) -> Result<()> {
        if !self.eof {
            self.eof = true;
            // The last held picture loses its future reference and becomes one.
            if let Some(last) = self.held.pop() {
                self.emit_reference(last);
            }
        }
        Ok(())
    }

    fn poll_packet(&mut self) -> Result<Received> {
        Ok(match self.ready.pop_front() {
            Some(packet) => Received::Packet(packet),
            None if self.eof => Received::Eof,
            None => Received::Again,
        })
    }
}

/**
    PCM backend: interleaves samples and optionally repacketizes them.
*/
pub struct PcmBackend {
    codec: CodecId,
    info: Option<AudioStreamInfo>,
    frame_size: Option<usize>,
    bytes_per_frame: usize,
    fifo: Vec<u8>,
    anchor_pts: Pts,
    samples_since_anchor: i64,
    ready: VecDeque<BackendPacket>,
    eof: bool,
}

impl PcmBackend {
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            info: None,
            frame_size: None,
            bytes_per_frame: 0,
            fifo: Vec::new(),
            anchor_pts: Pts(0),
            samples_since_anchor: 0,
            ready: VecDeque::new(),
            eof: false,
        }
    }

    /**
        Sample format a PCM codec stores, or `None` for non-PCM codecs.
    */
    pub fn stored_format(codec: CodecId) -> Option<SampleFormat> {
        match codec {
            CodecId::PcmS16le => Some(SampleFormat::S16),
            CodecId::PcmS32le => Some(SampleFormat::S32),
            CodecId::PcmF32le => Some(SampleFormat::F32),
            CodecId::PcmF64le => Some(SampleFormat::F64),
            CodecId::PcmU8 => Some(SampleFormat::U8),
            _ => None,
        }
    }

    fn sample_tb(info: &AudioStreamInfo) -> Result<Rational> {
        let rate = i32::try_from(info.sample_rate)
            .map_err(|_| Error::invalid_parameter("sample_rate", "too large"))?;
        Rational::new(1, rate)
    }

    fn samples_to_ticks(&self, samples: i64) -> Result<i64> {
        let info = self
            .info
            .as_ref()
            .ok_or_else(|| Error::codec("pcm backend is not open"))?;
        Rational::rescale(samples, Self::sample_tb(info)?, info.time_base)
    }

    /**
        Move `samples` samples from the front of the FIFO into a packet.
    */
    fn emit_from_fifo(&mut self, samples: usize) -> Result<()> {
        let bytes = samples * self.bytes_per_frame;
        let data: Vec<u8> = self.fifo.drain(..bytes).collect();

        let start = self.anchor_pts.0 + self.samples_to_ticks(self.samples_since_anchor)?;
        self.samples_since_anchor += samples as i64;
        let end = self.anchor_pts.0 + self.samples_to_ticks(self.samples_since_anchor)?;

        self.ready.push_back(BackendPacket {
            data,
            pts: Some(Pts(start)),
            dts: Some(Pts(start)),
            duration: MediaDuration(end - start),
            is_keyframe: true,
        });
        Ok(())
    }
}

impl CodecBackend for PcmBackend {
    fn open(&mut self, params: &CodecParameters) -> Result<()> {
        let StreamInfo::Audio(info) = &params.info else {
            return Err(Error::unsupported_format("pcm needs an audio stream"));
        };
        params.options.validate()?;

        let stored = Self::stored_format(self.codec).ok_or_else(|| {
            Error::unsupported_format(format!("{} is not a pcm codec", self.codec))
        })?;
        if info.sample_format.packed() != stored {
            return Err(Error::unsupported_format(format!(
                "{} stores {stored} samples, stream is {}",
                self.codec, info.sample_format
            )));
        }

        self.bytes_per_frame = stored.bytes_per_sample() * info.channel_count() as usize;
        self.frame_size = params.options.frame_size;
        self.info = Some(info.clone());
        Ok(())
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn send_frame(&mut self, frame: &Frame, pts: Pts) -> Result<()> {
        if self.eof {
            return Err(Error::EndOfStream);
        }
        let Some(audio) = frame.as_audio() else {
            return Err(Error::format_mismatch("pcm received a video frame"));
        };

        if self.fifo.is_empty() {
            self.anchor_pts = pts;
            self.samples_since_anchor = 0;
        }
        self.fifo.extend_from_slice(&audio.interleaved_data());

        match self.frame_size {
            None => {
                let samples = self.fifo.len() / self.bytes_per_frame;
                if samples > 0 {
                    self.emit_from_fifo(samples)?;
                }
            }
            Some(frame_size) => {
                while self.fifo.len() >= frame_size * self.bytes_per_frame {
                    self.emit_from_fifo(frame_size)?;
                }
            }
        }
        Ok(())
    }

    fn send_eof(&mut self) -> Result<()> {
        if !self.eof {
            self.eof = true;
            let remaining = self.fifo.len() / self.bytes_per_frame.max(1);
            if remaining > 0 {
                self.emit_from_fifo(remaining)?;
            }
        }
        Ok(())
    }

    fn poll_packet(&mut self) -> Result<Received> {
        Ok(match self.ready.pop_front() {
            Some(packet) => Received::Packet(packet),
            None if self.eof => Received::Eof,
            None => Received::Again,
        })
    }
}
