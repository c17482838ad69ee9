/*!
    The seam between stream encoders and codec implementations.
*/

use media_types::{Frame, MediaDuration, Pts, Result, StreamInfo};

use crate::config::EncoderOptions;

/**
    Everything a backend needs to open: fixed stream parameters plus codec options.
*/
#[derive(Clone, Debug)]
pub struct CodecParameters {
    pub info: StreamInfo,
    pub options: EncoderOptions,
}

/**
    A compressed payload as produced by a backend, in the stream time base.

    The stream encoder adds the time base and stream identity to turn this
    into a [`media_types::Packet`].
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendPacket {
    pub data: Vec<u8>,
    pub pts: Option<Pts>,
    pub dts: Option<Pts>,
    pub duration: MediaDuration,
    pub is_keyframe: bool,
}

/**
    Outcome of asking a backend for its next packet.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Received {
    /// A packet is ready.
    Packet(BackendPacket),
    /// Nothing is ready yet; send more input or ask again later.
    Again,
    /// End of stream was signalled and every buffered packet has been returned.
    Eof,
}

/**
    A codec implementation driven through a send/receive protocol.

    Backends are opaque: an in-process pass-through, an FFmpeg encoder or a
    worker thread wrapping either of those. The protocol is:

    1. `open` exactly once with the locked parameters,
    2. any number of `send_frame` calls, each followed by `poll_packet` until
       it returns [`Received::Again`],
    3. `send_eof` once, then `poll_packet`/`wait_packet` until
       [`Received::Eof`].

    Backends must reject configuration changes after `open` simply by never
    being asked for them; the stream encoder enforces that.
*/
pub trait CodecBackend: Send {
    /**
        Configure and open the codec.
    */
    fn open(&mut self, params: &CodecParameters) -> Result<()>;

    /**
        Samples per packet for audio codecs with a fixed frame size.
    */
    fn frame_size(&self) -> Option<usize> {
        None
    }

    /**
        Codec-level header data the container should store, if any.
    */
    fn extradata(&self) -> Option<Vec<u8>> {
        None
    }

    /**
        Push one frame. `pts` is the frame's presentation timestamp in the
        stream time base, already assigned by the stream encoder.
    */
    fn send_frame(&mut self, frame: &Frame, pts: Pts) -> Result<()>;

    /**
        Signal end of input.
    */
    fn send_eof(&mut self) -> Result<()>;

    /**
        Return the next ready packet without blocking.
    */
    fn poll_packet(&mut self) -> Result<Received>;

    /**
        Return the next packet, blocking until one is ready or the stream ends.

        Only meaningful after `send_eof`. Synchronous backends never block, so
        the default simply polls.
    */
    fn wait_packet(&mut self) -> Result<Received> {
        self.poll_packet()
    }
}
