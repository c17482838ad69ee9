/*!
    FFmpeg container output.

    Compiled with the `ffmpeg` feature. [`FfmpegOutput`] hands the muxer's
    interleaved packets to libavformat, so the muxer can write MP4, MKV, MOV
    and every other container FFmpeg knows. The container is picked from the
    file extension.
*/

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Dictionary, Rational as FFmpegRational, codec::Id as CodecIdFFmpeg, codec::Parameters, ffi,
    format::context::Output as OutputContext,
};

use media_encode::ffmpeg::{codec_id_to_ffmpeg, pixel_format_to_ffmpeg, sample_format_to_ffmpeg};
use media_types::{
    AudioStreamInfo, CodecId, Error, Metadata, Packet, Rational, Result, StreamInfo,
    VideoStreamInfo,
};

use crate::format::Trailer;
use crate::writer::{ContainerWriter, OutputStream};

/**
    Writes a container file through libavformat.

    The stream table is fixed when the muxer writes its first packet, since
    that is when FFmpeg writes the header. Container and stream metadata set
    after that are still applied before the trailer.
*/
pub struct FfmpegOutput {
    output: OutputContext,
    path: PathBuf,
    options: Vec<(String, String)>,
    // Output time base per stream, as chosen by the format on header write.
    time_bases: Vec<Rational>,
    header_written: bool,
    bytes: u64,
}

impl FfmpegOutput {
    /**
        Create the file at `path`.
    */
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let path = path.as_ref();
        let output = ffmpeg_next::format::output(path)
            .map_err(|e| Error::codec(format!("failed to create output: {}", e)))?;

        Ok(Self {
            output,
            path: path.to_path_buf(),
            options: Vec::new(),
            time_bases: Vec::new(),
            header_written: false,
            bytes: 0,
        })
    }

    /**
        Pass a format option to the header write, e.g. `("movflags", "+faststart")`.
    */
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn add_stream(&mut self, stream: &OutputStream) -> Result<()> {
        let info = stream.info.as_ref().ok_or_else(|| {
            Error::invalid_data(format!(
                "stream {} has no parameters when the header is written",
                stream.index
            ))
        })?;
        let id = output_codec_id(stream.codec)?;
        let codec = ffmpeg_next::encoder::find(id).ok_or_else(|| {
            Error::unsupported_format(format!("{} is not available to FFmpeg", stream.codec))
        })?;

        let mut params = Parameters::new();
        match info {
            StreamInfo::Video(info) => set_video_parameters(&mut params, id, info)?,
            StreamInfo::Audio(info) => set_audio_parameters(&mut params, id, info)?,
        }

        let mut out = self
            .output
            .add_stream(codec)
            .map_err(|e| Error::codec(format!("failed to add stream {}: {}", stream.index, e)))?;
        out.set_parameters(params);
        out.set_time_base(FFmpegRational::new(
            stream.time_base.num(),
            stream.time_base.den(),
        ));
        if let StreamInfo::Video(info) = info {
            let rate = info.frame_rate;
            out.set_avg_frame_rate(FFmpegRational::new(rate.num(), rate.den()));
        }
        out.set_metadata(dictionary(stream.metadata.iter()));
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Result<Rational> {
        let stream = self
            .output
            .stream(index)
            .ok_or(Error::UnknownStream(index))?;
        let tb = stream.time_base();
        Rational::new(tb.numerator(), tb.denominator())
    }
}

impl ContainerWriter for FfmpegOutput {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin(&mut self, streams: &[OutputStream], metadata: &Metadata) -> Result<()> {
        for stream in streams {
            self.add_stream(stream)?;
        }
        self.output.set_metadata(dictionary(metadata.iter()));

        let mut opts = Dictionary::new();
        for (key, value) in &self.options {
            opts.set(key, value);
        }
        self.output
            .write_header_with(opts)
            .map_err(|e| Error::codec(format!("failed to write header: {}", e)))?;
        self.header_written = true;

        self.time_bases = (0..streams.len())
            .map(|index| self.stream_time_base(index))
            .collect::<Result<_>>()?;

        tracing::debug!(path = %self.path.display(), streams = streams.len(), "ffmpeg header written");
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let index = packet.stream_index;
        let time_base = *self.time_bases.get(index).ok_or_else(|| {
            Error::invalid_data(format!("stream {index} was added after the header"))
        })?;
        let rescale = |value: i64| Rational::rescale(value, packet.time_base, time_base);

        let mut out = if packet.data.is_empty() {
            ffmpeg_next::Packet::empty()
        } else {
            ffmpeg_next::Packet::copy(&packet.data)
        };
        out.set_stream(index);
        out.set_pts(packet.pts.map(|pts| rescale(pts.0)).transpose()?);
        out.set_dts(packet.dts.map(|dts| rescale(dts.0)).transpose()?);
        out.set_duration(rescale(packet.duration.0)?);
        if packet.is_keyframe {
            out.set_flags(ffmpeg_next::packet::Flags::KEY);
        }

        out.write_interleaved(&mut self.output)
            .map_err(|e| Error::codec(format!("failed to write packet: {}", e)))?;
        self.bytes += packet.size() as u64;
        Ok(())
    }

    fn finish(&mut self, trailer: &Trailer) -> Result<()> {
        if !self.header_written {
            return Err(Error::invalid_data("header not written"));
        }

        // Metadata may have changed since the header; formats that write it
        // with the trailer pick this up.
        self.output.set_metadata(dictionary(
            trailer.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ));
        for record in &trailer.streams {
            if let Some(mut stream) = self.output.stream_mut(record.index) {
                stream.set_metadata(dictionary(
                    record.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                ));
            }
        }

        self.output
            .write_trailer()
            .map_err(|e| Error::codec(format!("failed to write trailer: {}", e)))?;
        tracing::debug!(path = %self.path.display(), bytes = self.bytes, "ffmpeg trailer written");
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl std::fmt::Debug for FfmpegOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegOutput")
            .field("path", &self.path)
            .field("streams", &self.time_bases.len())
            .field("header_written", &self.header_written)
            .finish_non_exhaustive()
    }
}

fn dictionary<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> Dictionary<'static> {
    let mut dict = Dictionary::new();
    for (key, value) in entries {
        dict.set(key, value);
    }
    dict
}

/**
    FFmpeg codec ID for a stream, including the uncompressed codecs that have
    no FFmpeg encoder backend.
*/
fn output_codec_id(codec: CodecId) -> Result<CodecIdFFmpeg> {
    Ok(match codec {
        CodecId::RawVideo => CodecIdFFmpeg::RAWVIDEO,
        CodecId::PcmS16le => CodecIdFFmpeg::PCM_S16LE,
        CodecId::PcmS32le => CodecIdFFmpeg::PCM_S32LE,
        CodecId::PcmF32le => CodecIdFFmpeg::PCM_F32LE,
        CodecId::PcmF64le => CodecIdFFmpeg::PCM_F64LE,
        CodecId::PcmU8 => CodecIdFFmpeg::PCM_U8,
        other => codec_id_to_ffmpeg(other)?,
    })
}

fn to_i32(name: &'static str, value: impl TryInto<i32>) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| Error::invalid_parameter(name, "too large for FFmpeg"))
}

fn to_bit_rate(bitrate: u64) -> Result<i64> {
    i64::try_from(bitrate).map_err(|_| Error::invalid_parameter("bitrate", "too large for FFmpeg"))
}

/**
    Copy extradata into a padded buffer owned by `ptr`.

    # Safety

    `ptr` must point to live codec parameters without extradata.
*/
unsafe fn set_extradata(ptr: *mut ffi::AVCodecParameters, extradata: &[u8]) -> Result<()> {
    if extradata.is_empty() {
        return Ok(());
    }
    let size = to_i32("extradata", extradata.len())?;
    unsafe {
        // FFmpeg requires AV_INPUT_BUFFER_PADDING_SIZE zeroed bytes past the end.
        let alloc_size = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
        let buf = ffi::av_mallocz(alloc_size) as *mut u8;
        if buf.is_null() {
            return Err(Error::codec("failed to allocate extradata"));
        }
        std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
        (*ptr).extradata = buf;
        (*ptr).extradata_size = size;
    }
    Ok(())
}

fn set_video_parameters(
    params: &mut Parameters,
    id: CodecIdFFmpeg,
    info: &VideoStreamInfo,
) -> Result<()> {
    let width = to_i32("width", info.width)?;
    let height = to_i32("height", info.height)?;
    let format = ffi::AVPixelFormat::from(pixel_format_to_ffmpeg(info.pixel_format)?);
    let bit_rate = info.bitrate.map(to_bit_rate).transpose()?;

    unsafe {
        let ptr = params.as_mut_ptr();
        (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
        (*ptr).codec_id = id.into();
        (*ptr).width = width;
        (*ptr).height = height;
        (*ptr).format = format as i32;
        if let Some(bit_rate) = bit_rate {
            (*ptr).bit_rate = bit_rate;
        }
        if let Some(extradata) = &info.extradata {
            set_extradata(ptr, extradata)?;
        }
    }
    Ok(())
}

fn set_audio_parameters(
    params: &mut Parameters,
    id: CodecIdFFmpeg,
    info: &AudioStreamInfo,
) -> Result<()> {
    let sample_rate = to_i32("sample_rate", info.sample_rate)?;
    let channels = i32::from(info.channels.channels());
    let format = ffi::AVSampleFormat::from(sample_format_to_ffmpeg(info.sample_format));
    let frame_size = info.frame_size.map(|n| to_i32("frame_size", n)).transpose()?;
    let bit_rate = info.bitrate.map(to_bit_rate).transpose()?;

    unsafe {
        let ptr = params.as_mut_ptr();
        (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*ptr).codec_id = id.into();
        (*ptr).sample_rate = sample_rate;
        (*ptr).format = format as i32;
        ffi::av_channel_layout_default(&mut (*ptr).ch_layout, channels);
        if let Some(frame_size) = frame_size {
            (*ptr).frame_size = frame_size;
        }
        if let Some(bit_rate) = bit_rate {
            (*ptr).bit_rate = bit_rate;
        }
        if let Some(extradata) = &info.extradata {
            set_extradata(ptr, extradata)?;
        }
    }
    Ok(())
}
