/*!
    The MXC container layout.

    ```text
    header   "MXC1" | version u16 | reserved u16
    packet*  'P' | stream u32 | flags u8 | pts i64 | dts i64 | duration i64 | size u32 | data
    trailer  JSON document (stream table, metadata, keyframe index)
    footer   trailer offset u64 | trailer length u64 | "MXCI"
    ```

    Integers are little-endian. Timestamps are in the stream's storage time
    base, which the trailer records. A file without a footer was never
    closed and is rejected.
*/

use serde::{Deserialize, Serialize};

use media_types::{Error, Packet, Result};

pub const MAGIC: &[u8; 4] = b"MXC1";
pub const FOOTER_MAGIC: &[u8; 4] = b"MXCI";
pub const VERSION: u16 = 1;

pub const HEADER_LEN: usize = 8;
pub const FOOTER_LEN: usize = 20;
const RECORD_HEADER_LEN: usize = 1 + 4 + 1 + 8 + 8 + 8 + 4;
const PACKET_TAG: u8 = b'P';

const FLAG_KEY: u8 = 0x01;
const FLAG_PTS: u8 = 0x02;
const FLAG_DTS: u8 = 0x04;

/**
    Serialized form of the container trailer.
*/
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trailer {
    pub version: u16,
    pub streams: Vec<StreamRecord>,
    /// Container metadata in insertion order.
    pub metadata: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub index: usize,
    /// Canonical codec name, e.g. `"mpeg4"`.
    pub codec: String,
    /// `"video"` or `"audio"`.
    pub kind: String,
    /// Parameters, absent for streams that never received a frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioRecord>,
    /// Codec time base as `"num/den"`.
    pub codec_time_base: Option<String>,
    /// Time base of every timestamp stored for this stream.
    pub time_base: String,
    pub start: Option<i64>,
    pub duration: i64,
    pub packet_count: u64,
    pub byte_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extradata: Option<Vec<u8>>,
    pub keyframes: Vec<KeyframeEntry>,
    pub metadata: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub frame_rate: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRecord {
    pub sample_rate: u32,
    pub sample_format: String,
    pub channel_layout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<usize>,
}

/**
    Where a keyframe starts: its timestamp and the byte offset of its record.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyframeEntry {
    pub pts: i64,
    pub offset: u64,
}

/**
    One packet as stored in the file.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketRecord {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub is_keyframe: bool,
    /// Byte offset of the record within the file.
    pub offset: u64,
    pub data: Vec<u8>,
}

pub fn encode_header() -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header
}

/**
    Serialize a packet record. Timestamps must already be in the storage time base.
*/
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>> {
    let stream = u32::try_from(packet.stream_index)
        .map_err(|_| Error::invalid_data("stream index does not fit the record"))?;
    let size = u32::try_from(packet.data.len())
        .map_err(|_| Error::invalid_data("packet larger than 4 GiB"))?;

    let mut flags = 0;
    if packet.is_keyframe {
        flags |= FLAG_KEY;
    }
    if packet.pts.is_some() {
        flags |= FLAG_PTS;
    }
    if packet.dts.is_some() {
        flags |= FLAG_DTS;
    }

    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + packet.data.len());
    record.push(PACKET_TAG);
    record.extend_from_slice(&stream.to_le_bytes());
    record.push(flags);
    record.extend_from_slice(&packet.pts.map_or(0, |p| p.0).to_le_bytes());
    record.extend_from_slice(&packet.dts.map_or(0, |d| d.0).to_le_bytes());
    record.extend_from_slice(&packet.duration.0.to_le_bytes());
    record.extend_from_slice(&size.to_le_bytes());
    record.extend_from_slice(&packet.data);
    Ok(record)
}

/**
    Serialize the trailer document followed by the footer that locates it.
*/
pub fn encode_trailer(trailer: &Trailer, offset: u64) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(trailer)
        .map_err(|e| Error::invalid_data(format!("failed to encode trailer: {e}")))?;
    let len = bytes.len() as u64;
    bytes.extend_from_slice(&offset.to_le_bytes());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(FOOTER_MAGIC);
    Ok(bytes)
}

/**
    Parse a complete container into its trailer and packet records.
*/
pub fn decode(bytes: &[u8]) -> Result<(Trailer, Vec<PacketRecord>)> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN || &bytes[..4] != MAGIC {
        return Err(Error::invalid_data("not an MXC container"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(Error::unsupported_format(format!("MXC version {version}")));
    }

    let footer = &bytes[bytes.len() - FOOTER_LEN..];
    if &footer[16..] != FOOTER_MAGIC {
        return Err(Error::invalid_data("container was not finalized"));
    }
    let trailer_offset = read_u64(footer, 0)? as usize;
    let trailer_len = read_u64(footer, 8)? as usize;
    let trailer_end = trailer_offset
        .checked_add(trailer_len)
        .filter(|end| *end == bytes.len() - FOOTER_LEN)
        .ok_or_else(|| Error::invalid_data("trailer location is corrupt"))?;
    if trailer_offset < HEADER_LEN {
        return Err(Error::invalid_data("trailer location is corrupt"));
    }

    let trailer: Trailer = serde_json::from_slice(&bytes[trailer_offset..trailer_end])
        .map_err(|e| Error::invalid_data(format!("failed to decode trailer: {e}")))?;
    let packets = decode_packets(&bytes[..trailer_offset])?;
    Ok((trailer, packets))
}

fn decode_packets(bytes: &[u8]) -> Result<Vec<PacketRecord>> {
    let mut packets = Vec::new();
    let mut pos = HEADER_LEN;
    while pos < bytes.len() {
        if bytes.len() - pos < RECORD_HEADER_LEN {
            return Err(Error::invalid_data(format!("truncated record at {pos}")));
        }
        if bytes[pos] != PACKET_TAG {
            return Err(Error::invalid_data(format!(
                "unexpected record tag {:#04x} at {pos}",
                bytes[pos]
            )));
        }
        let stream_index = read_u32(bytes, pos + 1)? as usize;
        let flags = bytes[pos + 5];
        let pts = read_i64(bytes, pos + 6)?;
        let dts = read_i64(bytes, pos + 14)?;
        let duration = read_i64(bytes, pos + 22)?;
        let size = read_u32(bytes, pos + 30)? as usize;

        let start = pos + RECORD_HEADER_LEN;
        let end = start
            .checked_add(size)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| Error::invalid_data(format!("truncated payload at {pos}")))?;

        packets.push(PacketRecord {
            stream_index,
            pts: (flags & FLAG_PTS != 0).then_some(pts),
            dts: (flags & FLAG_DTS != 0).then_some(dts),
            duration,
            is_keyframe: flags & FLAG_KEY != 0,
            offset: pos as u64,
            data: bytes[start..end].to_vec(),
        });
        pos = end;
    }
    Ok(packets)
}

fn field<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N]> {
    bytes
        .get(at..at + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::invalid_data(format!("truncated field at {at}")))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    field(bytes, at).map(u32::from_le_bytes)
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64> {
    field(bytes, at).map(u64::from_le_bytes)
}

fn read_i64(bytes: &[u8], at: usize) -> Result<i64> {
    field(bytes, at).map(i64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    use media_types::{MediaDuration, Pts, Rational, StreamType};

    fn packet(stream_index: usize, pts: i64, key: bool) -> Packet {
        Packet {
            data: vec![pts as u8; 3],
            pts: Some(Pts(pts)),
            dts: None,
            duration: MediaDuration(1),
            time_base: Rational::new(1, 24).unwrap(),
            is_keyframe: key,
            stream_type: StreamType::Video,
            stream_index,
        }
    }

    fn container(packets: &[Packet], trailer: &Trailer) -> Vec<u8> {
        let mut bytes = encode_header().to_vec();
        for packet in packets {
            bytes.extend(encode_packet(packet).unwrap());
        }
        let offset = bytes.len() as u64;
        bytes.extend(encode_trailer(trailer, offset).unwrap());
        bytes
    }

    #[test]
    fn decodes_records_and_trailer() {
        let trailer = Trailer {
            version: VERSION,
            streams: Vec::new(),
            metadata: vec![("title".into(), "container".into())],
        };
        let bytes = container(&[packet(0, 0, true), packet(1, 5, false)], &trailer);

        let (decoded, records) = decode(&bytes).unwrap();
        assert_eq!(decoded, trailer);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, HEADER_LEN as u64);
        assert!(records[0].is_keyframe);
        assert_eq!(records[1].stream_index, 1);
        assert_eq!(records[1].pts, Some(5));
        assert_eq!(records[1].dts, None);
        assert_eq!(records[1].data, vec![5, 5, 5]);
    }

    #[test]
    fn rejects_unfinalized_container() {
        let mut bytes = encode_header().to_vec();
        bytes.extend(encode_packet(&packet(0, 0, true)).unwrap());
        assert!(matches!(decode(&bytes), Err(Error::InvalidData(_))));
    }

    #[test]
    fn rejects_foreign_bytes() {
        assert!(decode(&[0u8; 64]).is_err());
        assert!(decode(b"MXC1").is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let trailer = Trailer::default();
        let mut bytes = encode_header().to_vec();
        let mut record = encode_packet(&packet(0, 0, true)).unwrap();
        record.truncate(record.len() - 1);
        bytes.extend(record);
        let offset = bytes.len() as u64;
        bytes.extend(encode_trailer(&trailer, offset).unwrap());
        assert!(decode(&bytes).is_err());
    }
}
