/*!
    Container output for the media muxing crates.

    A [`Muxer`] owns a set of streams, each driven by a
    [`StreamEncoder`](media_encode::StreamEncoder), and writes their packets
    into a single MXC container on a [`ContainerSink`]. Packets from
    different streams are interleaved by decode time, timestamps are stored
    in each stream's storage time base, and closing the muxer writes a
    trailer with the stream table, per-stream statistics, a keyframe index
    and the container metadata.

    # Writing a container

    ```ignore
    use media_sink::{Muxer, MemorySink};
    use media_types::{ChannelLayout, CodecId, Rational, SampleFormat, StreamSpec};

    let mut muxer = Muxer::new(MemorySink::new())?;
    let audio = muxer.add_stream(
        StreamSpec::audio(CodecId::PcmS16le, 48000)
            .with_sample_format(SampleFormat::S16)
            .with_channel_layout(ChannelLayout::Stereo),
    )?;
    muxer.metadata_mut()?.insert("title", "tone");

    for frame in frames {
        muxer.write_frame(audio, Some(&frame))?;
    }
    muxer.finish_streams()?;
    muxer.close()?;
    ```

    [`ContainerReader`] parses a finalized container back into stream
    descriptions and packets.

    # Other containers

    The muxer writes to any [`ContainerWriter`]. With the `ffmpeg` feature,
    [`FfmpegOutput`] hands the interleaved packets to libavformat, which
    picks the container from the file extension:

    ```ignore
    let mut muxer = Muxer::new(FfmpegOutput::file("out.mkv")?)?;
    ```
*/

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod format;
mod interleave;
mod muxer;
mod reader;
mod sink;
mod writer;

pub use format::{
    AudioRecord, KeyframeEntry, PacketRecord, StreamRecord, Trailer, VideoRecord, decode,
};
pub use muxer::{Muxer, MuxerConfig, StreamHandle};
pub use reader::{ContainerReader, StreamDescription};
pub use sink::{ContainerSink, FileSink, MemorySink, WriterSink};
pub use writer::{ContainerWriter, OutputStream};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegOutput;
