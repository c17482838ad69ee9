use ffmpeg_next::{
    Dictionary, Rational as FFmpegRational,
    codec::{self, encoder::Video as VideoEncoderFFmpeg},
    util::frame::video::Video as VideoFrameFFmpeg,
};

use media_types::{CodecId, Error, Frame, PixelFormat, Pts, Result, StreamInfo, VideoFrame};

use crate::backend::{CodecBackend, CodecParameters, Received};
use crate::config::RateControl;

/**
    Video backend on top of an FFmpeg encoder.
*/
pub struct FfmpegVideoBackend {
    codec: CodecId,
    encoder: Option<VideoEncoderFFmpeg>,
}

impl FfmpegVideoBackend {
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            encoder: None,
        }
    }

    fn encoder(&mut self) -> Result<&mut VideoEncoderFFmpeg> {
        self.encoder
            .as_mut()
            .ok_or_else(|| Error::codec(format!("{} encoder is not open", self.codec)))
    }
}

impl CodecBackend for FfmpegVideoBackend {
    fn open(&mut self, params: &CodecParameters) -> Result<()> {
        super::init()?;
        params.options.validate()?;

        let StreamInfo::Video(info) = &params.info else {
            return Err(Error::unsupported_format(format!(
                "{} needs a video stream",
                self.codec
            )));
        };
        let options = &params.options;

        let codec = super::find_encoder(self.codec)?;
        let encoder_ctx = codec::context::Context::new_with_codec(codec);
        let mut encoder = encoder_ctx
            .encoder()
            .video()
            .map_err(|e| Error::codec(e.to_string()))?;

        encoder.set_width(info.width);
        encoder.set_height(info.height);
        encoder.set_format(pixel_format_to_ffmpeg(info.pixel_format)?);

        let frame_rate = info.frame_rate;
        encoder.set_frame_rate(Some(FFmpegRational::new(frame_rate.num(), frame_rate.den())));
        encoder.set_time_base(FFmpegRational::new(
            info.time_base.num(),
            info.time_base.den(),
        ));

        match options.keyframe_interval {
            Some(gop) => encoder.set_gop(gop),
            // Default: keyframe every 2 seconds
            None => encoder.set_gop((info.fps() * 2.0) as u32),
        }
        encoder.set_max_b_frames(options.max_b_frames as usize);

        let mut opts = Dictionary::new();
        if matches!(self.codec, CodecId::H264 | CodecId::H265) {
            opts.set("preset", options.preset.as_str());
        }
        match options.rate_control {
            RateControl::Crf(crf) => {
                opts.set("crf", &crf.to_string());
            }
            RateControl::Cbr(bitrate) => {
                encoder.set_bit_rate(bitrate as usize);
                encoder.set_max_bit_rate(bitrate as usize);
                opts.set("rc", "cbr");
            }
            RateControl::Vbr(bitrate) => {
                encoder.set_bit_rate(bitrate as usize);
            }
        }

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| Error::codec(format!("failed to open encoder: {}", e)))?;

        tracing::debug!(codec = %self.codec, width = info.width, height = info.height, "ffmpeg video encoder opened");
        self.encoder = Some(encoder);
        Ok(())
    }

    fn extradata(&self) -> Option<Vec<u8>> {
        let encoder = self.encoder.as_ref()?;
        // SAFETY: the context is owned by an opened encoder that outlives this call.
        unsafe { super::context_extradata(encoder.as_ptr()) }
    }

    fn send_frame(&mut self, frame: &Frame, pts: Pts) -> Result<()> {
        let Some(video) = frame.as_video() else {
            return Err(Error::format_mismatch("video encoder received an audio frame"));
        };

        let mut ffmpeg_frame = VideoFrameFFmpeg::new(
            pixel_format_to_ffmpeg(video.format)?,
            video.width,
            video.height,
        );
        copy_planes(&mut ffmpeg_frame, video);
        ffmpeg_frame.set_pts(Some(pts.0));

        self.encoder()?
            .send_frame(&ffmpeg_frame)
            .map_err(|e| Error::codec(e.to_string()))
    }

    fn send_eof(&mut self) -> Result<()> {
        self.encoder()?
            .send_eof()
            .map_err(|e| Error::codec(e.to_string()))
    }

    fn poll_packet(&mut self) -> Result<Received> {
        let mut packet = ffmpeg_next::Packet::empty();
        let result = self.encoder()?.receive_packet(&mut packet);
        super::received(result, &packet)
    }
}

impl std::fmt::Debug for FfmpegVideoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegVideoBackend")
            .field("codec", &self.codec)
            .field("open", &self.encoder.is_some())
            .finish_non_exhaustive()
    }
}

/**
    Convert our PixelFormat to FFmpeg's Pixel format.
*/
pub fn pixel_format_to_ffmpeg(format: PixelFormat) -> Result<ffmpeg_next::format::Pixel> {
    use ffmpeg_next::format::Pixel;

    Ok(match format {
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::Bgra => Pixel::BGRA,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Bgr24 => Pixel::BGR24,
        PixelFormat::Yuv422p => Pixel::YUV422P,
        PixelFormat::Yuv444p => Pixel::YUV444P,
        PixelFormat::Yuv420p10 => Pixel::YUV420P10LE,
        PixelFormat::P010le => Pixel::P010LE,
    })
}

/**
    Copy every plane row by row, honoring both strides.
*/
fn copy_planes(dst: &mut VideoFrameFFmpeg, src: &VideoFrame) {
    let layout = src.format.plane_layout(src.width, src.height);
    for (index, (plane, (row_bytes, rows))) in src.planes.iter().zip(layout).enumerate() {
        let dst_stride = dst.stride(index);
        let dst_data = dst.data_mut(index);
        for y in 0..rows {
            let dst_start = y * dst_stride;
            dst_data[dst_start..dst_start + row_bytes].copy_from_slice(plane.row(y, row_bytes));
        }
    }
}
