/*!
    Encoder configuration types.
*/

use media_types::{Error, Result};

/**
    Encoder speed preset.

    Slower presets produce better compression (smaller files at same quality)
    but take longer to encode. Pass-through backends ignore it.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncoderPreset {
    /// Fastest encoding, largest files.
    Ultrafast,
    /// Very fast encoding.
    Superfast,
    /// Very fast encoding.
    Veryfast,
    /// Faster than default.
    Faster,
    /// Fast encoding, good for real-time.
    Fast,
    /// Default balance of speed and compression.
    #[default]
    Medium,
    /// Better compression, slower.
    Slow,
    /// Even better compression.
    Slower,
    /// Best compression, slowest.
    Veryslow,
}

impl EncoderPreset {
    /**
        Get the conventional preset string.
    */
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

/**
    Rate control mode for video encoding.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateControl {
    /**
        Constant Rate Factor - target constant quality.
        Lower values = higher quality. Range 0-51, typical 18-28.
    */
    Crf(u8),
    /**
        Constant Bitrate in bits per second.
    */
    Cbr(u64),
    /**
        Variable Bitrate - target average bitrate in bits per second.
    */
    Vbr(u64),
}

impl Default for RateControl {
    fn default() -> Self {
        // CRF 23 is a reasonable default for H.264
        Self::Crf(23)
    }
}

/**
    Codec options that are not part of format negotiation.

    These are handed to the backend when the stream locks, together with the
    resolved stream parameters.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderOptions {
    /// Rate control mode.
    pub rate_control: RateControl,
    /// Encoder speed preset.
    pub preset: EncoderPreset,
    /// Keyframe interval in frames (None = two seconds worth of frames).
    pub keyframe_interval: Option<u32>,
    /// Maximum number of consecutive B-frames (reordered frames).
    pub max_b_frames: u32,
    /// Samples per audio packet (None = codec default).
    pub frame_size: Option<usize>,
    /// Run the backend on a dedicated worker thread.
    pub threaded: bool,
    /// Frames that may be queued for a threaded backend before `encode` blocks.
    pub queue_capacity: usize,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            rate_control: RateControl::default(),
            preset: EncoderPreset::default(),
            keyframe_interval: None,
            max_b_frames: 0,
            frame_size: None,
            threaded: false,
            queue_capacity: 8,
        }
    }
}

impl EncoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Set the rate control mode.
    */
    pub fn with_rate_control(mut self, rate_control: RateControl) -> Self {
        self.rate_control = rate_control;
        self
    }

    /**
        Set constant bitrate in bits per second.
    */
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.rate_control = RateControl::Cbr(bitrate);
        self
    }

    /**
        Set CRF quality (0-51, lower is better, typical 18-28).
    */
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.rate_control = RateControl::Crf(crf.min(51));
        self
    }

    /**
        Set the encoder preset.
    */
    pub fn with_preset(mut self, preset: EncoderPreset) -> Self {
        self.preset = preset;
        self
    }

    /**
        Set the keyframe interval in frames.
    */
    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval = Some(frames.max(1));
        self
    }

    /**
        Allow up to `frames` consecutive B-frames, which delays packet output.
    */
    pub fn with_max_b_frames(mut self, frames: u32) -> Self {
        self.max_b_frames = frames;
        self
    }

    /**
        Emit audio packets of exactly `samples` samples (the last one may be shorter).
    */
    pub fn with_frame_size(mut self, samples: usize) -> Self {
        self.frame_size = Some(samples.max(1));
        self
    }

    /**
        Run compression on a worker thread with a queue of `capacity` frames.
    */
    pub fn with_worker_thread(mut self, capacity: usize) -> Self {
        self.threaded = true;
        self.queue_capacity = capacity.max(1);
        self
    }

    /**
        Check values set directly on the fields, which the builders would
        have clamped. Fails with [`Error::InvalidParameter`].
    */
    pub fn validate(&self) -> Result<()> {
        if self.keyframe_interval == Some(0) {
            return Err(Error::invalid_parameter(
                "keyframe_interval",
                "must be at least one frame",
            ));
        }
        if self.frame_size == Some(0) {
            return Err(Error::invalid_parameter(
                "frame_size",
                "must be at least one sample",
            ));
        }
        if self.threaded && self.queue_capacity == 0 {
            return Err(Error::invalid_parameter(
                "queue_capacity",
                "a worker thread needs room for one frame",
            ));
        }
        match self.rate_control {
            RateControl::Cbr(0) | RateControl::Vbr(0) => {
                Err(Error::invalid_parameter("bitrate", "must be positive"))
            }
            _ => Ok(()),
        }
    }

    /**
        Target bitrate in bits per second, if the rate control mode has one.
    */
    pub fn bitrate(&self) -> Option<u64> {
        match self.rate_control {
            RateControl::Cbr(bitrate) | RateControl::Vbr(bitrate) => Some(bitrate),
            RateControl::Crf(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_clamp() {
        let options = EncoderOptions::new()
            .with_crf(80)
            .with_keyframe_interval(0)
            .with_frame_size(0)
            .with_worker_thread(0);
        assert_eq!(options.rate_control, RateControl::Crf(51));
        assert_eq!(options.keyframe_interval, Some(1));
        assert_eq!(options.frame_size, Some(1));
        assert!(options.threaded);
        assert_eq!(options.queue_capacity, 1);
    }

    #[test]
    fn validate_rejects_zero_fields() {
        assert!(EncoderOptions::new().validate().is_ok());
        assert!(EncoderOptions::new().with_frame_size(0).validate().is_ok());

        let zero_gop = EncoderOptions {
            keyframe_interval: Some(0),
            ..EncoderOptions::default()
        };
        assert!(matches!(
            zero_gop.validate(),
            Err(Error::InvalidParameter {
                name: "keyframe_interval",
                ..
            })
        ));

        let zero_frame = EncoderOptions {
            frame_size: Some(0),
            ..EncoderOptions::default()
        };
        assert!(matches!(
            zero_frame.validate(),
            Err(Error::InvalidParameter {
                name: "frame_size",
                ..
            })
        ));

        let zero_queue = EncoderOptions {
            threaded: true,
            queue_capacity: 0,
            ..EncoderOptions::default()
        };
        assert!(zero_queue.validate().is_err());
        assert!(
            EncoderOptions::new()
                .with_rate_control(RateControl::Cbr(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn bitrate_follows_rate_control() {
        assert_eq!(EncoderOptions::new().bitrate(), None);
        assert_eq!(EncoderOptions::new().with_bitrate(192_000).bitrate(), Some(192_000));
        assert_eq!(
            EncoderOptions::new()
                .with_rate_control(RateControl::Vbr(5_000_000))
                .bitrate(),
            Some(5_000_000)
        );
    }

    #[test]
    fn preset_strings() {
        assert_eq!(EncoderPreset::default().as_str(), "medium");
        assert_eq!(EncoderPreset::Veryslow.as_str(), "veryslow");
    }
}
