/*!
    Encoded packets.
*/

use std::fmt;

use crate::{MediaDuration, Pts, Rational, Result, StreamType};

/**
    A compressed packet produced by a stream encoder.

    The payload is opaque to everything except the codec. Timestamps are
    expressed in `time_base`, which is the owning stream's codec time base at
    the moment the packet was created.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: Option<Pts>,
    pub dts: Option<Pts>,
    pub duration: MediaDuration,
    pub time_base: Rational,
    pub is_keyframe: bool,
    pub stream_type: StreamType,
    /// Index of the owning stream within its muxer.
    pub stream_index: usize,
}

impl Packet {
    /**
        Decode timestamp, falling back to the presentation timestamp.
    */
    pub fn decode_ts(&self) -> Option<Pts> {
        self.dts.or(self.pts)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /**
        Convert all timestamps of this packet into another time base.
    */
    pub fn rescale_to(&mut self, time_base: Rational) -> Result<()> {
        if self.time_base == time_base {
            return Ok(());
        }
        let from = self.time_base;
        self.pts = self.pts.map(|p| p.rescale(from, time_base)).transpose()?;
        self.dts = self.dts.map(|d| d.rescale(from, time_base)).transpose()?;
        self.duration = self.duration.rescale(from, time_base)?;
        self.time_base = time_base;
        Ok(())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = |t: Option<Pts>| t.map_or_else(|| "none".to_owned(), |t| t.to_string());
        write!(
            f,
            "Packet(stream={}, size={}, pts={}, dts={}, key={})",
            self.stream_index,
            self.size(),
            ts(self.pts),
            ts(self.dts),
            self.is_keyframe
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> Packet {
        Packet {
            data: vec![0; 16],
            pts: Some(Pts(3)),
            dts: Some(Pts(2)),
            duration: MediaDuration(1),
            time_base: Rational::new(1, 25).unwrap(),
            is_keyframe: false,
            stream_type: StreamType::Video,
            stream_index: 1,
        }
    }

    #[test]
    fn rescale_to_converts_every_timestamp() {
        let mut p = packet();
        let ms = Rational::new(1, 1000).unwrap();
        p.rescale_to(ms).unwrap();
        assert_eq!(p.pts, Some(Pts(120)));
        assert_eq!(p.dts, Some(Pts(80)));
        assert_eq!(p.duration, MediaDuration(40));
        assert_eq!(p.time_base, ms);
    }

    #[test]
    fn decode_ts_falls_back_to_pts() {
        let mut p = packet();
        assert_eq!(p.decode_ts(), Some(Pts(2)));
        p.dts = None;
        assert_eq!(p.decode_ts(), Some(Pts(3)));
    }

    #[test]
    fn display_is_compact() {
        let mut p = packet();
        p.dts = None;
        assert_eq!(
            p.to_string(),
            "Packet(stream=1, size=16, pts=3, dts=none, key=false)"
        );
    }
}
