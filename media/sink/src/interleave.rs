/*!
    Cross-stream packet ordering.

    Packets leave in order of decode time, compared exactly across time
    bases; equal times go to the lower stream index. A packet is only
    released once every live stream has something queued, so a later packet
    from a slow stream can still overtake it, unless the queue already spans
    more than the configured delta. Per-stream order is never changed.
*/

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::Duration;

use media_types::{Packet, Rational};

struct Queued {
    packet: Packet,
    ts: i64,
}

pub(crate) struct Interleaver {
    queues: Vec<VecDeque<Queued>>,
    last_ts: Vec<i64>,
    max_delta: f64,
    queued: usize,
}

impl Interleaver {
    pub fn new(max_delta: Duration) -> Self {
        Self {
            queues: Vec::new(),
            last_ts: Vec::new(),
            max_delta: max_delta.as_secs_f64(),
            queued: 0,
        }
    }

    pub fn add_stream(&mut self) {
        self.queues.push(VecDeque::new());
        self.last_ts.push(i64::MIN);
    }

    pub fn len(&self) -> usize {
        self.queued
    }

    /**
        Queue a packet whose timestamps are already in its storage time base.
    */
    pub fn push(&mut self, packet: Packet) {
        let index = packet.stream_index;
        // Untimed packets sort with their predecessor.
        let ts = match packet.decode_ts() {
            Some(ts) => ts.0,
            None if self.last_ts[index] == i64::MIN => 0,
            None => self.last_ts[index],
        };
        self.last_ts[index] = ts;
        self.queues[index].push_back(Queued { packet, ts });
        self.queued += 1;
    }

    /**
        Next packet that may be written, given which streams can still
        produce packets.
    */
    pub fn pop_ready(&mut self, live: &[bool]) -> Option<Packet> {
        let head = self.earliest()?;
        let waiting = self
            .queues
            .iter()
            .zip(live)
            .any(|(queue, live)| *live && queue.is_empty());

        if waiting && !self.span_exceeded(head) {
            return None;
        }
        self.pop_from(head)
    }

    /**
        Next packet regardless of liveness, used when closing.
    */
    pub fn pop_any(&mut self) -> Option<Packet> {
        let head = self.earliest()?;
        self.pop_from(head)
    }

    fn pop_from(&mut self, index: usize) -> Option<Packet> {
        let queued = self.queues[index].pop_front()?;
        self.queued -= 1;
        Some(queued.packet)
    }

    fn earliest(&self) -> Option<usize> {
        let mut best: Option<(usize, &Queued)> = None;
        for (index, queue) in self.queues.iter().enumerate() {
            let Some(head) = queue.front() else {
                continue;
            };
            let better = match best {
                None => true,
                // Strictly earlier only; ties keep the lower index found first.
                Some((_, current)) => compare_ts(head, current) == Ordering::Less,
            };
            if better {
                best = Some((index, head));
            }
        }
        best.map(|(index, _)| index)
    }

    fn span_exceeded(&self, head: usize) -> bool {
        let Some(first) = self.queues[head].front() else {
            return false;
        };
        let start = seconds(first);
        self.queues
            .iter()
            .filter_map(|queue| queue.back())
            .any(|last| seconds(last) - start > self.max_delta)
    }
}

fn seconds(queued: &Queued) -> f64 {
    queued.packet.time_base.multiply_by_integer(queued.ts)
}

/**
    Compare `a.ts * a.time_base` with `b.ts * b.time_base` without rounding.
*/
fn compare_ts(a: &Queued, b: &Queued) -> Ordering {
    compare_scaled(a.ts, a.packet.time_base, b.ts, b.packet.time_base)
}

pub(crate) fn compare_scaled(a: i64, a_tb: Rational, b: i64, b_tb: Rational) -> Ordering {
    let lhs = a as i128 * a_tb.num() as i128 * b_tb.den() as i128;
    let rhs = b as i128 * b_tb.num() as i128 * a_tb.den() as i128;
    lhs.cmp(&rhs)
}

#[cfg(test)]
mod tests {
    use super::*;

    use media_types::{MediaDuration, Pts, StreamType};

    fn packet(stream_index: usize, dts: i64, time_base: Rational) -> Packet {
        Packet {
            data: Vec::new(),
            pts: Some(Pts(dts)),
            dts: Some(Pts(dts)),
            duration: MediaDuration(1),
            time_base,
            is_keyframe: true,
            stream_type: StreamType::Video,
            stream_index,
        }
    }

    fn interleaver(streams: usize) -> Interleaver {
        let mut interleaver = Interleaver::new(Duration::from_secs(10));
        for _ in 0..streams {
            interleaver.add_stream();
        }
        interleaver
    }

    #[test]
    fn orders_across_time_bases() {
        let video = Rational::new(1, 24).unwrap();
        let audio = Rational::new(1, 48000).unwrap();
        let mut interleaver = interleaver(2);
        // 1/24 s == 2000/48000 s
        interleaver.push(packet(0, 0, video));
        interleaver.push(packet(0, 1, video));
        interleaver.push(packet(1, 0, audio));
        interleaver.push(packet(1, 2000, audio));
        interleaver.push(packet(1, 2001, audio));

        let live = [false, false];
        let order: Vec<(usize, i64)> = std::iter::from_fn(|| interleaver.pop_ready(&live))
            .map(|p| (p.stream_index, p.dts.unwrap().0))
            .collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (0, 1), (1, 2000), (1, 2001)]);
    }

    #[test]
    fn waits_for_live_streams() {
        let tb = Rational::new(1, 1000).unwrap();
        let mut interleaver = interleaver(2);
        interleaver.push(packet(0, 0, tb));
        assert!(interleaver.pop_ready(&[true, true]).is_none());

        interleaver.push(packet(1, 5, tb));
        assert_eq!(interleaver.pop_ready(&[true, true]).unwrap().stream_index, 0);
        // Stream 0 is empty again, stream 1 must wait for it.
        assert!(interleaver.pop_ready(&[true, true]).is_none());
        // Once stream 0 is finished nothing blocks stream 1.
        assert_eq!(interleaver.pop_ready(&[false, true]).unwrap().stream_index, 1);
        assert_eq!(interleaver.len(), 0);
    }

    #[test]
    fn releases_when_span_exceeds_delta() {
        let tb = Rational::new(1, 1).unwrap();
        let mut interleaver = interleaver(2);
        interleaver.push(packet(0, 0, tb));
        interleaver.push(packet(0, 5, tb));
        assert!(interleaver.pop_ready(&[true, true]).is_none());
        interleaver.push(packet(0, 11, tb));
        assert_eq!(interleaver.pop_ready(&[true, true]).unwrap().dts, Some(Pts(0)));
        assert!(interleaver.pop_ready(&[true, true]).is_none());
    }

    #[test]
    fn ties_go_to_lower_index() {
        let tb = Rational::new(1, 10).unwrap();
        let mut interleaver = interleaver(3);
        interleaver.push(packet(2, 3, tb));
        interleaver.push(packet(1, 3, tb));
        interleaver.push(packet(0, 3, tb));
        let order: Vec<usize> = std::iter::from_fn(|| interleaver.pop_any())
            .map(|p| p.stream_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn untimed_packets_follow_their_stream() {
        let tb = Rational::new(1, 10).unwrap();
        let mut interleaver = interleaver(2);
        interleaver.push(packet(0, 4, tb));
        let mut untimed = packet(0, 0, tb);
        untimed.pts = None;
        untimed.dts = None;
        interleaver.push(untimed);
        interleaver.push(packet(1, 5, tb));

        let order: Vec<usize> = std::iter::from_fn(|| interleaver.pop_any())
            .map(|p| p.stream_index)
            .collect();
        assert_eq!(order, vec![0, 0, 1]);
    }
}
