/*!
    Shared types for the media muxing crates.

    This crate defines the vocabulary that crosses crate boundaries: exact
    rational time, decoded frames, encoded packets, stream specifications,
    metadata and the error taxonomy. It has no dependency on any codec
    implementation, so consumers can depend on it without pulling in
    encoder backends.
*/

mod codec;
mod error;
mod format;
mod frame;
mod metadata;
mod packet;
mod rational;
mod stream;
mod time;

pub use self::codec::{CodecId, StreamType};
pub use self::error::{Error, Result};
pub use self::format::{ChannelLayout, PixelFormat, SampleFormat};
pub use self::frame::{AudioFrame, Frame, Plane, VideoFrame};
pub use self::metadata::Metadata;
pub use self::packet::Packet;
pub use self::rational::Rational;
pub use self::stream::{
    AudioParams, AudioStreamInfo, StreamInfo, StreamParams, StreamSpec, VideoParams,
    VideoStreamInfo,
};
pub use self::time::{MediaDuration, Pts};
