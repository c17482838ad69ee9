/*!
    The container multiplexer.
*/

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use media_encode::{CodecRegistry, EncoderOptions, StreamEncoder};
use media_types::{
    CodecId, Error, Frame, Metadata, Packet, Pts, Rational, Result, StreamInfo, StreamSpec,
};

use crate::format::{self, AudioRecord, KeyframeEntry, StreamRecord, Trailer, VideoRecord};
use crate::interleave::Interleaver;
use crate::sink::FileSink;
use crate::writer::{ContainerWriter, OutputStream};

/**
    Muxer configuration.
*/
#[derive(Clone, Debug)]
pub struct MuxerConfig {
    /// Longest span of queued packets before the interleaver stops waiting
    /// for streams that have nothing queued.
    pub max_interleave_delta: Duration,
    /// Time base for stored timestamps. `None` keeps each stream's codec time base.
    pub time_base: Option<Rational>,
    /// Codecs available to `add_stream`.
    pub registry: CodecRegistry,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            max_interleave_delta: Duration::from_secs(10),
            time_base: None,
            registry: CodecRegistry::builtin(),
        }
    }
}

impl MuxerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_interleave_delta(mut self, delta: Duration) -> Self {
        self.max_interleave_delta = delta;
        self
    }

    /**
        Store every stream's timestamps in `time_base`, e.g. 1/90000.
    */
    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = Some(time_base);
        self
    }

    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }
}

/**
    Identifies a stream of one muxer. The index is its position in creation order.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamHandle {
    index: usize,
}

impl StreamHandle {
    pub fn index(self) -> usize {
        self.index
    }
}

struct MuxStream {
    encoder: StreamEncoder,
    metadata: Metadata,
    storage_tb: Option<Rational>,
    last_dts: Option<Pts>,
    start: Option<i64>,
    end: Option<i64>,
    packet_count: u64,
    byte_count: u64,
    keyframes: Vec<KeyframeEntry>,
}

impl MuxStream {
    fn new(encoder: StreamEncoder) -> Self {
        Self {
            encoder,
            metadata: Metadata::new(),
            storage_tb: None,
            last_dts: None,
            start: None,
            end: None,
            packet_count: 0,
            byte_count: 0,
            keyframes: Vec::new(),
        }
    }

    fn record(&mut self, packet: &Packet, offset: u64) {
        self.packet_count += 1;
        self.byte_count += packet.size() as u64;
        if let Some(pts) = packet.pts.or(packet.dts) {
            self.start = Some(self.start.map_or(pts.0, |start| start.min(pts.0)));
            let end = pts.0 + packet.duration.0;
            self.end = Some(self.end.map_or(end, |current| current.max(end)));
            if packet.is_keyframe {
                self.keyframes.push(KeyframeEntry {
                    pts: pts.0,
                    offset,
                });
            }
        }
    }

    fn time_base(&self, default_tb: Option<Rational>) -> Rational {
        self.storage_tb
            .or(default_tb)
            .or(self.encoder.time_base())
            .unwrap_or(Rational::ONE)
    }

    fn info(&self) -> Option<StreamInfo> {
        let encoder = &self.encoder;
        encoder
            .info()
            .cloned()
            .or_else(|| encoder.params().resolve(encoder.codec()).ok())
    }

    fn to_output(&self, index: usize, default_tb: Option<Rational>) -> OutputStream {
        OutputStream {
            index,
            codec: self.encoder.codec(),
            info: self.info(),
            time_base: self.time_base(default_tb),
            metadata: self.metadata.clone(),
        }
    }

    fn to_record(&self, index: usize, default_tb: Option<Rational>) -> StreamRecord {
        let encoder = &self.encoder;
        let codec_tb = encoder.time_base();
        let time_base = self.time_base(default_tb);
        let info = self.info();

        let (video, audio) = match &info {
            Some(StreamInfo::Video(info)) => (
                Some(VideoRecord {
                    width: info.width,
                    height: info.height,
                    pixel_format: info.pixel_format.to_string(),
                    frame_rate: info.frame_rate.to_string(),
                }),
                None,
            ),
            Some(StreamInfo::Audio(info)) => (
                None,
                Some(AudioRecord {
                    sample_rate: info.sample_rate,
                    sample_format: info.sample_format.to_string(),
                    channel_layout: info.channels.to_string(),
                    frame_size: info.frame_size,
                }),
            ),
            None => (None, None),
        };
        let (bitrate, extradata) = match &info {
            Some(StreamInfo::Video(info)) => (info.bitrate, info.extradata.clone()),
            Some(StreamInfo::Audio(info)) => (info.bitrate, info.extradata.clone()),
            None => (None, None),
        };

        StreamRecord {
            index,
            codec: encoder.codec().name().to_owned(),
            kind: encoder.stream_type().name().to_owned(),
            video,
            audio,
            codec_time_base: codec_tb.map(|tb| tb.to_string()),
            time_base: time_base.to_string(),
            start: self.start,
            duration: match (self.start, self.end) {
                (Some(start), Some(end)) => end - start,
                _ => 0,
            },
            packet_count: self.packet_count,
            byte_count: self.byte_count,
            bitrate,
            extradata,
            keyframes: self.keyframes.clone(),
            metadata: self
                .metadata
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        }
    }
}

/**
    Owns the streams of one output container and writes their packets into it.

    Streams are added with [`Muxer::add_stream`]; their encoders live inside
    the muxer and are reached through the returned [`StreamHandle`]. Packets
    handed to [`Muxer::mux`] are interleaved by decode time across streams and
    written to the output. [`Muxer::close`] writes the trailer and finalizes the
    output; it can happen only once, and after it every operation fails with
    [`Error::MuxerClosed`].

    The output is any [`ContainerWriter`]: a [`ContainerSink`](crate::ContainerSink)
    receives an MXC container, and with the `ffmpeg` feature an
    [`FfmpegOutput`](crate::FfmpegOutput) writes MP4, MKV and the other
    formats libavformat knows.

    # Example

    ```ignore
    let mut muxer = Muxer::create("out.mxc")?;
    let video = muxer.add_stream(
        StreamSpec::video(CodecId::RawVideo, Rational::integer(24))
            .with_size(320, 240)
            .with_pixel_format(PixelFormat::Yuv420p),
    )?;

    for frame in frames {
        for packet in muxer.encode(video, Some(&frame))? {
            muxer.mux(packet)?;
        }
    }
    for packet in muxer.drain(video)? {
        muxer.mux(packet)?;
    }
    muxer.close()?;
    ```
*/
pub struct Muxer<W: ContainerWriter> {
    writer: Option<W>,
    config: MuxerConfig,
    streams: Vec<MuxStream>,
    metadata: Metadata,
    interleaver: Interleaver,
    begun: bool,
    closed: bool,
}

impl Muxer<FileSink> {
    /**
        Create a container file at `path` with the default configuration.
    */
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(FileSink::create(path)?)
    }
}

impl<W: ContainerWriter> Muxer<W> {
    pub fn new(writer: W) -> Result<Self> {
        Self::with_config(writer, MuxerConfig::default())
    }

    /**
        Start a container on `writer`. For MXC sinks the header is written immediately.
    */
    pub fn with_config(mut writer: W, config: MuxerConfig) -> Result<Self> {
        writer.open()?;
        tracing::debug!("container opened");
        Ok(Self {
            writer: Some(writer),
            interleaver: Interleaver::new(config.max_interleave_delta),
            config,
            streams: Vec::new(),
            metadata: Metadata::new(),
            begun: false,
            closed: false,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /**
        Bytes written to the output so far.
    */
    pub fn position(&self) -> u64 {
        self.writer.as_ref().map_or(0, ContainerWriter::bytes_written)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /**
        Handles of every stream, in index order.
    */
    pub fn handles(&self) -> impl Iterator<Item = StreamHandle> + '_ {
        (0..self.streams.len()).map(|index| StreamHandle { index })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::MuxerClosed);
        }
        Ok(())
    }

    // ── Streams ────────────────────────────────────────────────────────

    /**
        Add a stream with default codec options.
    */
    pub fn add_stream(&mut self, spec: StreamSpec) -> Result<StreamHandle> {
        self.add_stream_with_options(spec, EncoderOptions::default())
    }

    /**
        Add a stream for a codec given by name, with every parameter unset.
    */
    pub fn add_stream_named(&mut self, codec: &str) -> Result<StreamHandle> {
        self.ensure_open()?;
        let codec = CodecId::from_str(codec)?;
        self.add_stream(StreamSpec::new(codec))
    }

    /**
        Add a stream. Fails with [`Error::UnknownCodec`] when no backend is
        registered for the codec.
    */
    pub fn add_stream_with_options(
        &mut self,
        spec: StreamSpec,
        options: EncoderOptions,
    ) -> Result<StreamHandle> {
        self.ensure_open()?;
        let codec = spec.codec;
        let backend = self.config.registry.create(codec, &options)?;
        let index = self.streams.len();
        let encoder = StreamEncoder::new(index, spec, options, backend)?;

        tracing::debug!(stream = index, codec = %codec, state = %encoder.state(), "stream added");
        self.streams.push(MuxStream::new(encoder));
        self.interleaver.add_stream();
        Ok(StreamHandle { index })
    }

    fn entry(&self, index: usize) -> Result<&MuxStream> {
        self.streams.get(index).ok_or(Error::UnknownStream(index))
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut MuxStream> {
        self.streams.get_mut(index).ok_or(Error::UnknownStream(index))
    }

    pub fn stream(&self, handle: StreamHandle) -> Result<&StreamEncoder> {
        self.entry(handle.index).map(|stream| &stream.encoder)
    }

    /**
        Mutable access to a stream's encoder, e.g. to set parameters.
    */
    pub fn stream_mut(&mut self, handle: StreamHandle) -> Result<&mut StreamEncoder> {
        self.ensure_open()?;
        self.entry_mut(handle.index).map(|stream| &mut stream.encoder)
    }

    /**
        Encode a frame (or flush with `None`) on one stream.

        The returned packets are not muxed; pass them to [`Muxer::mux`].
    */
    pub fn encode(&mut self, handle: StreamHandle, frame: Option<&Frame>) -> Result<Vec<Packet>> {
        self.stream_mut(handle)?.encode(frame)
    }

    /**
        Flush a stream and block until it has returned every packet.
    */
    pub fn drain(&mut self, handle: StreamHandle) -> Result<Vec<Packet>> {
        self.stream_mut(handle)?.drain()
    }

    /**
        Encode and mux in one step. Returns the number of packets muxed.
    */
    pub fn write_frame(&mut self, handle: StreamHandle, frame: Option<&Frame>) -> Result<usize> {
        let packets = self.encode(handle, frame)?;
        let count = packets.len();
        for packet in packets {
            self.mux(packet)?;
        }
        if frame.is_none() {
            // The stream may have stopped blocking the interleaver.
            self.write_ready()?;
        }
        Ok(count)
    }

    /**
        Drain every stream and mux what comes out.
    */
    pub fn finish_streams(&mut self) -> Result<()> {
        for index in 0..self.streams.len() {
            for packet in self.drain(StreamHandle { index })? {
                self.mux(packet)?;
            }
        }
        self.write_ready()
    }

    // ── Packets ────────────────────────────────────────────────────────

    /**
        Queue a packet for writing.

        Its timestamps are converted from the packet time base into the
        stream's storage time base. Decode timestamps of one stream must not
        go backwards.
    */
    pub fn mux(&mut self, mut packet: Packet) -> Result<()> {
        self.ensure_open()?;
        let index = packet.stream_index;
        let default_tb = self.config.time_base;
        let stream = self.entry_mut(index)?;

        if packet.stream_type != stream.encoder.stream_type() {
            return Err(Error::format_mismatch(format!(
                "{} packet for {} stream {index}",
                packet.stream_type,
                stream.encoder.stream_type()
            )));
        }

        let storage_tb = *stream
            .storage_tb
            .get_or_insert(default_tb.unwrap_or(packet.time_base));
        packet.rescale_to(storage_tb)?;

        if let Some(current) = packet.decode_ts() {
            if let Some(previous) = stream.last_dts {
                if current < previous {
                    return Err(Error::NonMonotonicTimestamp {
                        stream: index,
                        previous: previous.0,
                        current: current.0,
                    });
                }
            }
            stream.last_dts = Some(current);
        }

        self.interleaver.push(packet);
        self.write_ready()
    }

    fn write_ready(&mut self) -> Result<()> {
        let live: Vec<bool> = self
            .streams
            .iter()
            .map(|stream| !stream.encoder.is_drained())
            .collect();
        while let Some(packet) = self.interleaver.pop_ready(&live) {
            self.write_packet(packet)?;
        }
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut W> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::invalid_data("output already taken"))
    }

    /**
        Hand the stream table to the writer, once.
    */
    fn begin(&mut self) -> Result<()> {
        if self.begun {
            return Ok(());
        }
        self.begun = true;
        let default_tb = self.config.time_base;
        let streams: Vec<OutputStream> = self
            .streams
            .iter()
            .enumerate()
            .map(|(index, stream)| stream.to_output(index, default_tb))
            .collect();
        let metadata = self.metadata.clone();
        self.writer()?.begin(&streams, &metadata)?;
        tracing::debug!(streams = streams.len(), "stream table written");
        Ok(())
    }

    fn write_packet(&mut self, packet: Packet) -> Result<()> {
        self.begin()?;
        let writer = self.writer()?;
        let offset = writer.bytes_written();
        writer.write_packet(&packet)?;

        tracing::trace!(%packet, offset, "packet written");
        if let Some(stream) = self.streams.get_mut(packet.stream_index) {
            stream.record(&packet, offset);
        }
        Ok(())
    }

    // ── Metadata ───────────────────────────────────────────────────────

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /**
        Container metadata. Fails once the muxer is closed.
    */
    pub fn metadata_mut(&mut self) -> Result<&mut Metadata> {
        self.ensure_open()?;
        Ok(&mut self.metadata)
    }

    pub fn stream_metadata(&self, handle: StreamHandle) -> Result<&Metadata> {
        self.entry(handle.index).map(|stream| &stream.metadata)
    }

    pub fn stream_metadata_mut(&mut self, handle: StreamHandle) -> Result<&mut Metadata> {
        self.ensure_open()?;
        self.entry_mut(handle.index).map(|stream| &mut stream.metadata)
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /**
        Write every queued packet and the trailer, then finalize the output.

        The muxer counts as closed even if this fails; the container should
        then be considered corrupt. Packets still buffered inside encoders
        that were never drained are discarded.
    */
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        for stream in &self.streams {
            if stream.encoder.is_locked() && !stream.encoder.is_drained() {
                tracing::warn!(
                    stream = stream.encoder.index(),
                    state = %stream.encoder.state(),
                    "closing with undrained encoder, buffered packets are discarded"
                );
            }
        }

        while let Some(packet) = self.interleaver.pop_any() {
            self.write_packet(packet)?;
        }

        let trailer = Trailer {
            version: format::VERSION,
            streams: self
                .streams
                .iter()
                .enumerate()
                .map(|(index, stream)| stream.to_record(index, self.config.time_base))
                .collect(),
            metadata: self
                .metadata
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        };

        self.begin()?;
        let writer = self.writer()?;
        writer.finish(&trailer)?;

        tracing::debug!(
            streams = trailer.streams.len(),
            bytes = writer.bytes_written(),
            "container finalized"
        );
        Ok(())
    }

    /**
        Give back the output. Call after [`Muxer::close`] unless an unfinished
        container is wanted.
    */
    pub fn into_sink(mut self) -> Result<W> {
        // Closed or not, the caller has taken responsibility for the bytes.
        self.closed = true;
        self.writer
            .take()
            .ok_or_else(|| Error::invalid_data("output already taken"))
    }
}

impl<W: ContainerWriter> Drop for Muxer<W> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                streams = self.streams.len(),
                "muxer dropped without close, container is not finalized"
            );
        }
    }
}

impl<W: ContainerWriter> std::fmt::Debug for Muxer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer")
            .field("streams", &self.streams.len())
            .field("queued", &self.interleaver.len())
            .field("position", &self.position())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use media_types::{MediaDuration, PixelFormat, StreamType, VideoFrame};

    use crate::sink::{MemorySink, WriterSink};

    fn video_spec() -> StreamSpec {
        StreamSpec::video(CodecId::RawVideo, Rational::integer(24))
            .with_size(2, 2)
            .with_pixel_format(PixelFormat::Rgb24)
    }

    #[test]
    fn handles_follow_creation_order() {
        let mut muxer = Muxer::new(MemorySink::new()).unwrap();
        let a = muxer.add_stream(video_spec()).unwrap();
        let b = muxer.add_stream_named("pcm_s16le").unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(muxer.stream(b).unwrap().stream_type(), StreamType::Audio);
        assert_eq!(muxer.handles().count(), 2);
        muxer.close().unwrap();
    }

    #[test]
    fn unknown_codec_names_are_rejected() {
        let mut muxer = Muxer::new(MemorySink::new()).unwrap();
        assert!(matches!(
            muxer.add_stream_named("not-a-codec"),
            Err(Error::UnknownCodec(_))
        ));
        assert_eq!(muxer.stream_count(), 0);
        muxer.close().unwrap();
    }

    #[test]
    fn packets_for_missing_streams_are_rejected() {
        let mut muxer = Muxer::new(MemorySink::new()).unwrap();
        let packet = Packet {
            data: vec![1],
            pts: Some(Pts(0)),
            dts: Some(Pts(0)),
            duration: MediaDuration(1),
            time_base: Rational::new(1, 24).unwrap(),
            is_keyframe: true,
            stream_type: StreamType::Video,
            stream_index: 3,
        };
        assert!(matches!(muxer.mux(packet), Err(Error::UnknownStream(3))));
        muxer.close().unwrap();
    }

    #[test]
    fn storage_time_base_override() {
        let sink = MemorySink::new();
        let config = MuxerConfig::new().with_time_base(Rational::new(1, 90000).unwrap());
        let mut muxer = Muxer::with_config(sink.clone(), config).unwrap();
        let video = muxer.add_stream(video_spec()).unwrap();

        let frame = Frame::from(VideoFrame::new(2, 2, PixelFormat::Rgb24));
        for _ in 0..3 {
            muxer.write_frame(video, Some(&frame)).unwrap();
        }
        muxer.write_frame(video, None).unwrap();
        muxer.close().unwrap();

        let (trailer, records) = format::decode(&sink.bytes()).unwrap();
        assert_eq!(trailer.streams[0].time_base, "1/90000");
        assert_eq!(trailer.streams[0].codec_time_base.as_deref(), Some("1/24"));
        assert_eq!(trailer.streams[0].duration, 11250);
        let pts: Vec<i64> = records.iter().filter_map(|r| r.pts).collect();
        assert_eq!(pts, vec![0, 3750, 7500]);
    }

    #[test]
    fn close_happens_once() {
        let mut muxer = Muxer::new(MemorySink::new()).unwrap();
        muxer.close().unwrap();
        assert!(matches!(muxer.close(), Err(Error::MuxerClosed)));
        assert!(matches!(muxer.add_stream(video_spec()), Err(Error::MuxerClosed)));
        assert!(matches!(muxer.metadata_mut(), Err(Error::MuxerClosed)));
    }

    #[derive(Default)]
    struct RecordingWriter {
        events: Vec<String>,
    }

    impl ContainerWriter for RecordingWriter {
        fn open(&mut self) -> Result<()> {
            self.events.push("open".into());
            Ok(())
        }

        fn begin(&mut self, streams: &[OutputStream], metadata: &Metadata) -> Result<()> {
            let resolved = streams.iter().all(|stream| stream.info.is_some());
            self.events
                .push(format!("begin {} {} {resolved}", streams.len(), metadata.len()));
            Ok(())
        }

        fn write_packet(&mut self, packet: &Packet) -> Result<()> {
            self.events.push(format!("packet {}", packet.stream_index));
            Ok(())
        }

        fn finish(&mut self, trailer: &Trailer) -> Result<()> {
            self.events.push(format!("finish {}", trailer.streams.len()));
            Ok(())
        }

        fn bytes_written(&self) -> u64 {
            self.events.len() as u64
        }
    }

    #[test]
    fn writer_gets_stream_table_before_first_packet() {
        let mut muxer = Muxer::new(RecordingWriter::default()).unwrap();
        let video = muxer.add_stream(video_spec()).unwrap();
        muxer.metadata_mut().unwrap().insert("title", "clip");

        let frame = Frame::from(VideoFrame::new(2, 2, PixelFormat::Rgb24));
        for _ in 0..3 {
            muxer.write_frame(video, Some(&frame)).unwrap();
        }
        muxer.finish_streams().unwrap();
        muxer.close().unwrap();

        let events = muxer.into_sink().unwrap().events;
        assert_eq!(
            events,
            vec!["open", "begin 1 1 true", "packet 0", "packet 0", "packet 0", "finish 1"]
        );
    }

    #[test]
    fn writer_is_begun_even_without_packets() {
        let mut muxer = Muxer::new(RecordingWriter::default()).unwrap();
        muxer.close().unwrap();
        let events = muxer.into_sink().unwrap().events;
        assert_eq!(events, vec!["open", "begin 0 0 true", "finish 0"]);
    }

    #[test]
    fn into_sink_returns_finished_bytes() {
        let mut muxer = Muxer::new(WriterSink::new(Vec::new())).unwrap();
        muxer.close().unwrap();
        let bytes = muxer.into_sink().unwrap().into_inner();
        assert!(format::decode(&bytes).is_ok());
    }
}
