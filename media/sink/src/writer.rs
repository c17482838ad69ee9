/*!
    Output targets for the muxer.
*/

use media_types::{CodecId, Metadata, Packet, Rational, Result, StreamInfo};

use crate::format::{self, Trailer};
use crate::sink::ContainerSink;

/**
    A stream as the output target sees it when the header is written.
*/
#[derive(Clone, Debug)]
pub struct OutputStream {
    pub index: usize,
    pub codec: CodecId,
    /// Locked parameters, or `None` when the stream never got far enough to resolve them.
    pub info: Option<StreamInfo>,
    /// Time base of the timestamps the muxer hands over for this stream.
    pub time_base: Rational,
    pub metadata: Metadata,
}

/**
    Where the muxer writes its interleaved packets.

    Every [`ContainerSink`] is a writer of the MXC format. With the `ffmpeg`
    feature, [`FfmpegOutput`](crate::FfmpegOutput) writes any container
    libavformat supports instead.

    The muxer calls `open` once when it is created, `begin` once before the
    first packet (or before `finish` when no packet was ever written),
    `write_packet` in interleaved order and `finish` exactly once.
*/
pub trait ContainerWriter {
    fn open(&mut self) -> Result<()>;

    /**
        Fix the stream table. Streams added to the muxer later are unknown to the target.
    */
    fn begin(&mut self, streams: &[OutputStream], metadata: &Metadata) -> Result<()>;

    /**
        Write one packet. Timestamps are in `packet.time_base`.
    */
    fn write_packet(&mut self, packet: &Packet) -> Result<()>;

    /**
        Write the trailer and release the destination.
    */
    fn finish(&mut self, trailer: &Trailer) -> Result<()>;

    /**
        Bytes written so far. Keyframe offsets in the trailer are taken from here.
    */
    fn bytes_written(&self) -> u64;
}

impl<S: ContainerSink> ContainerWriter for S {
    fn open(&mut self) -> Result<()> {
        self.write(&format::encode_header())
    }

    fn begin(&mut self, _streams: &[OutputStream], _metadata: &Metadata) -> Result<()> {
        // MXC keeps its stream table in the trailer.
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.write(&format::encode_packet(packet)?)
    }

    fn finish(&mut self, trailer: &Trailer) -> Result<()> {
        let offset = self.position();
        self.write(&format::encode_trailer(trailer, offset)?)?;
        self.finalize()
    }

    fn bytes_written(&self) -> u64 {
        self.position()
    }
}
