/*!
    Codec lookup.
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use media_types::{CodecId, Error, Result};

use crate::backend::CodecBackend;
use crate::config::EncoderOptions;
use crate::passthrough::{PcmBackend, RawVideoBackend};
use crate::worker::ThreadedBackend;

type Factory = Arc<dyn Fn(CodecId) -> Box<dyn CodecBackend> + Send + Sync>;

/**
    Maps codec identifiers to backend constructors.

    [`CodecRegistry::builtin`] knows the pass-through codecs (and the FFmpeg
    codecs when built with the `ffmpeg` feature). Asking for a codec that has
    no registered backend fails with [`Error::UnknownCodec`].
*/
#[derive(Clone, Default)]
pub struct CodecRegistry {
    factories: HashMap<CodecId, Factory>,
}

impl CodecRegistry {
    /**
        A registry with no codecs.
    */
    pub fn empty() -> Self {
        Self::default()
    }

    /**
        A registry with every backend compiled into this crate.
    */
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(CodecId::RawVideo, |_| Box::new(RawVideoBackend::new()));
        for codec in [
            CodecId::PcmS16le,
            CodecId::PcmS32le,
            CodecId::PcmF32le,
            CodecId::PcmF64le,
            CodecId::PcmU8,
        ] {
            registry.register(codec, |codec| Box::new(PcmBackend::new(codec)));
        }

        #[cfg(feature = "ffmpeg")]
        crate::ffmpeg::register(&mut registry);

        registry
    }

    /**
        Register (or replace) the backend constructor for `codec`.
    */
    pub fn register<F>(&mut self, codec: CodecId, factory: F)
    where
        F: Fn(CodecId) -> Box<dyn CodecBackend> + Send + Sync + 'static,
    {
        self.factories.insert(codec, Arc::new(factory));
    }

    pub fn contains(&self, codec: CodecId) -> bool {
        self.factories.contains_key(&codec)
    }

    /**
        Registered codecs, in canonical order.
    */
    pub fn codecs(&self) -> Vec<CodecId> {
        CodecId::ALL
            .into_iter()
            .filter(|codec| self.contains(*codec))
            .collect()
    }

    /**
        Construct an unopened backend for `codec`.

        Honors [`EncoderOptions::threaded`] by wrapping the backend in a
        [`ThreadedBackend`].
    */
    pub fn create(&self, codec: CodecId, options: &EncoderOptions) -> Result<Box<dyn CodecBackend>> {
        let factory = self
            .factories
            .get(&codec)
            .ok_or_else(|| Error::UnknownCodec(codec.name().to_owned()))?;
        let backend = factory(codec);

        if options.threaded {
            Ok(Box::new(ThreadedBackend::new(backend, options.queue_capacity)))
        } else {
            Ok(backend)
        }
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_passthrough_codecs() {
        let registry = CodecRegistry::builtin();
        assert!(registry.contains(CodecId::RawVideo));
        assert!(registry.contains(CodecId::PcmS16le));
        assert!(registry.create(CodecId::PcmU8, &EncoderOptions::new()).is_ok());
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn compressed_codecs_need_ffmpeg() {
        let registry = CodecRegistry::builtin();
        assert!(matches!(
            registry.create(CodecId::H264, &EncoderOptions::new()),
            Err(Error::UnknownCodec(name)) if name == "h264"
        ));
    }

    #[test]
    fn custom_registration() {
        let mut registry = CodecRegistry::empty();
        assert!(registry.codecs().is_empty());
        registry.register(CodecId::Mpeg4, |_| Box::new(RawVideoBackend::new()));
        assert_eq!(registry.codecs(), vec![CodecId::Mpeg4]);
        assert!(registry.create(CodecId::Mpeg4, &EncoderOptions::new()).is_ok());
    }
}
