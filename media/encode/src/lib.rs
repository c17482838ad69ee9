/*!
    Per-stream encoding for the media muxing crates.

    A [`StreamEncoder`] turns decoded frames into encoded packets for one
    stream. It owns the stream's negotiable parameters, locks them on the
    first frame, and drives a [`CodecBackend`] through a send/receive
    protocol in which frames in and packets out need not line up: backends
    may buffer, reorder or repacketize.

    # Encoding a stream

    ```ignore
    use media_encode::{CodecRegistry, EncoderOptions, StreamEncoder};
    use media_types::{CodecId, PixelFormat, Rational, StreamSpec};

    let spec = StreamSpec::video(CodecId::RawVideo, Rational::integer(24))
        .with_size(320, 240)
        .with_pixel_format(PixelFormat::Yuv420p);
    let options = EncoderOptions::new().with_max_b_frames(2);
    let backend = CodecRegistry::builtin().create(spec.codec, &options)?;
    let mut encoder = StreamEncoder::new(0, spec, options, backend)?;

    for frame in frames {
        for packet in encoder.encode(Some(&frame))? {
            // Hand to a muxer
        }
    }

    // Flush remaining packets
    let final_packets = encoder.drain()?;
    ```

    # Backends

    - `rawvideo` and the `pcm_*` codecs are always available. They do not
      compress, but they reorder (B-frames) and repacketize (fixed audio
      frame size) like real codecs do.
    - With the `ffmpeg` feature, H.264, H.265, MPEG-4, VP9, AV1, AAC, MP2,
      MP3 and Opus are encoded through `ffmpeg-next`.
    - [`EncoderOptions::with_worker_thread`] runs any backend on its own
      thread behind a bounded frame queue.

    # Rate Control

    - **CRF (Constant Rate Factor)**: Target constant quality, variable bitrate.
    - **CBR (Constant Bitrate)**: Fixed bitrate throughout.
    - **VBR (Variable Bitrate)**: Target average bitrate with quality variation.
*/

mod backend;
mod config;
mod encoder;
mod passthrough;
mod queue;
mod registry;
mod worker;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use backend::{BackendPacket, CodecBackend, CodecParameters, Received};
pub use config::{EncoderOptions, EncoderPreset, RateControl};
pub use encoder::{EncoderState, StreamEncoder};
pub use passthrough::{PcmBackend, RawVideoBackend};
pub use registry::CodecRegistry;
pub use worker::ThreadedBackend;
