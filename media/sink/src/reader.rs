/*!
    Reading finished containers back.
*/

use std::path::Path;
use std::str::FromStr;

use media_types::{
    AudioStreamInfo, ChannelLayout, CodecId, Error, MediaDuration, Metadata, Packet, PixelFormat,
    Pts, Rational, Result, SampleFormat, StreamInfo, StreamType, VideoStreamInfo,
};

use crate::format::{self, KeyframeEntry, PacketRecord, StreamRecord, Trailer};

/**
    A stream as described by a container's trailer.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescription {
    pub index: usize,
    /// `None` when the codec name is not known to this build.
    pub codec: Option<CodecId>,
    pub codec_name: String,
    pub stream_type: StreamType,
    /// Locked parameters; `None` if the stream never received a frame.
    pub info: Option<StreamInfo>,
    /// Time base of the stored timestamps.
    pub time_base: Rational,
    pub codec_time_base: Option<Rational>,
    pub start: Option<Pts>,
    pub duration: MediaDuration,
    pub packet_count: u64,
    pub byte_count: u64,
    pub keyframes: Vec<KeyframeEntry>,
    pub metadata: Metadata,
}

impl StreamDescription {
    pub fn duration_seconds(&self) -> f64 {
        self.duration.seconds(self.time_base)
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        self.info
            .as_ref()
            .and_then(StreamInfo::as_video)
            .map(|video| video.frame_rate)
    }

    /**
        Packets per second over the stream's duration.
    */
    pub fn average_rate(&self) -> Option<f64> {
        let seconds = self.duration_seconds();
        (seconds > 0.0).then(|| self.packet_count as f64 / seconds)
    }

    /**
        Average bits per second over the stream's duration.
    */
    pub fn average_bitrate(&self) -> Option<f64> {
        let seconds = self.duration_seconds();
        (seconds > 0.0).then(|| self.byte_count as f64 * 8.0 / seconds)
    }

    fn from_record(record: &StreamRecord) -> Result<Self> {
        let stream_type = match record.kind.as_str() {
            "video" => StreamType::Video,
            "audio" => StreamType::Audio,
            other => return Err(Error::invalid_data(format!("unknown stream kind '{other}'"))),
        };
        let codec = CodecId::from_str(&record.codec).ok();
        let time_base = Rational::from_str(&record.time_base)?;
        let codec_time_base = record
            .codec_time_base
            .as_deref()
            .map(Rational::from_str)
            .transpose()?;

        let info = match (codec, codec_time_base) {
            (Some(codec_id), Some(codec_tb)) => stream_info(record, codec_id, codec_tb)?,
            _ => None,
        };

        Ok(Self {
            index: record.index,
            codec,
            codec_name: record.codec.clone(),
            stream_type,
            info,
            time_base,
            codec_time_base,
            start: record.start.map(Pts),
            duration: MediaDuration(record.duration),
            packet_count: record.packet_count,
            byte_count: record.byte_count,
            keyframes: record.keyframes.clone(),
            metadata: record.metadata.iter().cloned().collect(),
        })
    }
}

fn stream_info(
    record: &StreamRecord,
    codec_id: CodecId,
    time_base: Rational,
) -> Result<Option<StreamInfo>> {
    if let Some(video) = &record.video {
        return Ok(Some(StreamInfo::Video(VideoStreamInfo {
            width: video.width,
            height: video.height,
            pixel_format: PixelFormat::from_str(&video.pixel_format)?,
            frame_rate: Rational::from_str(&video.frame_rate)?,
            time_base,
            codec_id,
            bitrate: record.bitrate,
            extradata: record.extradata.clone(),
        })));
    }
    if let Some(audio) = &record.audio {
        return Ok(Some(StreamInfo::Audio(AudioStreamInfo {
            sample_rate: audio.sample_rate,
            channels: ChannelLayout::from_str(&audio.channel_layout)?,
            sample_format: SampleFormat::from_str(&audio.sample_format)?,
            time_base,
            codec_id,
            bitrate: record.bitrate,
            frame_size: audio.frame_size,
            extradata: record.extradata.clone(),
        })));
    }
    Ok(None)
}

/**
    A parsed MXC container.

    Only finalized containers can be read; a muxer that was dropped without
    `close` leaves no footer and is rejected.
*/
#[derive(Debug)]
pub struct ContainerReader {
    streams: Vec<StreamDescription>,
    metadata: Metadata,
    records: Vec<PacketRecord>,
}

impl ContainerReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (trailer, records) = format::decode(bytes)?;
        Self::from_parts(trailer, records)
    }

    fn from_parts(trailer: Trailer, records: Vec<PacketRecord>) -> Result<Self> {
        let streams = trailer
            .streams
            .iter()
            .map(StreamDescription::from_record)
            .collect::<Result<Vec<_>>>()?;

        for (position, stream) in streams.iter().enumerate() {
            if stream.index != position {
                return Err(Error::invalid_data(format!(
                    "stream table entry {position} has index {}",
                    stream.index
                )));
            }
        }
        if let Some(record) = records.iter().find(|r| r.stream_index >= streams.len()) {
            return Err(Error::invalid_data(format!(
                "packet at {} references missing stream {}",
                record.offset, record.stream_index
            )));
        }

        Ok(Self {
            streams,
            metadata: trailer.metadata.into_iter().collect(),
            records,
        })
    }

    pub fn streams(&self) -> &[StreamDescription] {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Result<&StreamDescription> {
        self.streams.get(index).ok_or(Error::UnknownStream(index))
    }

    /**
        Container metadata, in the order it was first set.
    */
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn packet_count(&self) -> usize {
        self.records.len()
    }

    /**
        Every packet in file order, stamped with its stream's storage time base.
    */
    pub fn packets(&self) -> impl Iterator<Item = Packet> + '_ {
        self.records.iter().map(|record| self.to_packet(record))
    }

    /**
        Packets of one stream, in file order.
    */
    pub fn stream_packets(&self, index: usize) -> impl Iterator<Item = Packet> + '_ {
        self.records
            .iter()
            .filter(move |record| record.stream_index == index)
            .map(|record| self.to_packet(record))
    }

    /**
        Byte offsets of every packet, in file order.
    */
    pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.records.iter().map(|record| record.offset)
    }

    fn to_packet(&self, record: &PacketRecord) -> Packet {
        // Indices were checked against the stream table in from_parts.
        let stream = &self.streams[record.stream_index];
        Packet {
            data: record.data.clone(),
            pts: record.pts.map(Pts),
            dts: record.dts.map(Pts),
            duration: MediaDuration(record.duration),
            time_base: stream.time_base,
            is_keyframe: record.is_keyframe,
            stream_type: stream.stream_type,
            stream_index: record.stream_index,
        }
    }
}
