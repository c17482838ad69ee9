/*!
    FFmpeg encoder backends.

    Compiled with the `ffmpeg` feature. Each backend owns one opened
    `ffmpeg_next` encoder context and maps the send/receive calls directly
    onto `send_frame`/`receive_packet`.
*/

use ffmpeg_next::{codec::Id as CodecIdFFmpeg, ffi};

use media_types::{CodecId, Error, MediaDuration, Pts, Result};

use crate::backend::{BackendPacket, Received};
use crate::registry::CodecRegistry;

mod audio;
mod video;

pub use audio::{FfmpegAudioBackend, sample_format_to_ffmpeg};
pub use video::{FfmpegVideoBackend, pixel_format_to_ffmpeg};

/**
    Add every FFmpeg-backed codec to `registry`.
*/
pub(crate) fn register(registry: &mut CodecRegistry) {
    for codec in [
        CodecId::H264,
        CodecId::H265,
        CodecId::Mpeg4,
        CodecId::Vp9,
        CodecId::Av1,
    ] {
        registry.register(codec, |codec| Box::new(FfmpegVideoBackend::new(codec)));
    }
    for codec in [CodecId::Aac, CodecId::Mp2, CodecId::Mp3, CodecId::Opus] {
        registry.register(codec, |codec| Box::new(FfmpegAudioBackend::new(codec)));
    }
}

fn init() -> Result<()> {
    ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))
}

/**
    Convert our CodecId to FFmpeg's codec ID.
*/
pub fn codec_id_to_ffmpeg(codec: CodecId) -> Result<CodecIdFFmpeg> {
    match codec {
        CodecId::H264 => Ok(CodecIdFFmpeg::H264),
        CodecId::H265 => Ok(CodecIdFFmpeg::HEVC),
        CodecId::Mpeg4 => Ok(CodecIdFFmpeg::MPEG4),
        CodecId::Vp9 => Ok(CodecIdFFmpeg::VP9),
        CodecId::Av1 => Ok(CodecIdFFmpeg::AV1),
        CodecId::Aac => Ok(CodecIdFFmpeg::AAC),
        CodecId::Mp2 => Ok(CodecIdFFmpeg::MP2),
        CodecId::Mp3 => Ok(CodecIdFFmpeg::MP3),
        CodecId::Opus => Ok(CodecIdFFmpeg::OPUS),
        _ => Err(Error::unsupported_format(format!(
            "{codec} has no FFmpeg encoder"
        ))),
    }
}

fn find_encoder(codec: CodecId) -> Result<ffmpeg_next::Codec> {
    let id = codec_id_to_ffmpeg(codec)?;
    ffmpeg_next::encoder::find(id)
        .ok_or_else(|| Error::unsupported_format(format!("encoder for {codec} not found")))
}

fn is_again(err: &ffmpeg_next::Error) -> bool {
    matches!(err, ffmpeg_next::Error::Other { errno }
        if *errno == ffi::EAGAIN || *errno == ffi::AVERROR(ffi::EAGAIN))
}

/**
    Map the outcome of `receive_packet` onto the backend protocol.
*/
fn received(
    result: std::result::Result<(), ffmpeg_next::Error>,
    packet: &ffmpeg_next::Packet,
) -> Result<Received> {
    match result {
        Ok(()) => Ok(Received::Packet(BackendPacket {
            data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
            pts: packet.pts().map(Pts),
            dts: packet.dts().map(Pts),
            duration: MediaDuration(packet.duration()),
            is_keyframe: packet.is_key(),
        })),
        Err(ffmpeg_next::Error::Eof) => Ok(Received::Eof),
        Err(e) if is_again(&e) => Ok(Received::Again),
        Err(e) => Err(Error::codec(e.to_string())),
    }
}

/**
    Read codec extradata out of an opened encoder context.

    # Safety

    `ctx` must point to a live, opened codec context.
*/
unsafe fn context_extradata(ctx: *const ffi::AVCodecContext) -> Option<Vec<u8>> {
    unsafe {
        if (*ctx).extradata_size > 0 && !(*ctx).extradata.is_null() {
            let slice =
                std::slice::from_raw_parts((*ctx).extradata, (*ctx).extradata_size as usize);
            Some(slice.to_vec())
        } else {
            None
        }
    }
}
