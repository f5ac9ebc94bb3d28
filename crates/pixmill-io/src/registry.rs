//! Coder registry for format lookup and detection.
//!
//! The registry provides a centralized way to:
//! - Register coders (decoder, encoder and magic callbacks per tag)
//! - Look coders up by tag, case-insensitively
//! - Detect a coder from leading bytes
//! - Serialize calls into coders that are not thread safe
//!
//! # Architecture
//!
//! A process-wide instance lives behind [`Registry::global()`], initialized
//! once with the built-in coders. Registration and removal take a write
//! lock; lookups take a shared read lock and hand out `Arc<CoderInfo>`
//! snapshots, so a coder being unregistered never invalidates a call in
//! flight.
//!
//! # Example
//!
//! ```rust
//! use pixmill_io::registry::Registry;
//!
//! let registry = Registry::global();
//! let tiff = registry.get("tiff").unwrap();
//! assert!(tiff.adjoin);
//! assert!(tiff.seekable_stream);
//!
//! let header = b"P6\n2 2\n255\n";
//! assert_eq!(registry.detect(header).unwrap().tag, "PNM");
//!
//! let mpeg = registry.get("MPEG").unwrap();
//! assert!(!mpeg.blob_support);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

use bitflags::bitflags;
use pixmill_core::{ImageInfo, ImageList};
use tracing::debug;

use crate::blob::Blob;
use crate::coders;
use crate::context::Context;
use crate::error::IoResult;

/// Leading bytes read for magic detection.
pub const MAGIC_LENGTH: usize = 64;

/// Decoder entry point.
pub type DecodeFn = fn(&ImageInfo, &mut Blob, &mut Context) -> IoResult<ImageList>;

/// Encoder entry point.
pub type EncodeFn = fn(&ImageInfo, &mut ImageList, &mut Blob, &mut Context) -> IoResult<()>;

/// Magic test over leading bytes.
pub type MagicFn = fn(&[u8]) -> bool;

bitflags! {
    /// Directions a coder may run concurrently. An empty set serializes
    /// both decode and encode process-wide.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ThreadSupport: u8 {
        /// Decoding needs no global lock.
        const DECODER = 0b01;
        /// Encoding needs no global lock.
        const ENCODER = 0b10;
    }
}

/// One registered coder.
#[derive(Clone)]
pub struct CoderInfo {
    /// Upper-case format tag, e.g. `TIFF`.
    pub tag: String,
    /// Human-readable description.
    pub description: String,
    /// Module name used in diagnostics.
    pub module: String,
    /// Decoder, if reading is supported.
    pub decoder: Option<DecodeFn>,
    /// Encoder, if writing is supported.
    pub encoder: Option<EncodeFn>,
    /// Magic test, if the format has a signature.
    pub magic: Option<MagicFn>,
    /// Multiple frames encode into one stream.
    pub adjoin: bool,
    /// Dimensions must come from the caller.
    pub raw: bool,
    /// The format has a byte-order choice.
    pub endian_support: bool,
    /// The coder needs a seekable stream.
    pub seekable_stream: bool,
    /// Concurrency class.
    pub thread_support: ThreadSupport,
    /// The coder works on memory blobs; otherwise it needs a real file.
    pub blob_support: bool,
    lock: Arc<Mutex<()>>,
}

impl fmt::Debug for CoderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoderInfo")
            .field("tag", &self.tag)
            .field("description", &self.description)
            .field("decoder", &self.decoder.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("magic", &self.magic.is_some())
            .field("adjoin", &self.adjoin)
            .field("raw", &self.raw)
            .field("thread_support", &self.thread_support)
            .finish()
    }
}

impl CoderInfo {
    /// Creates an entry with no callbacks, adjoin on and full thread support.
    pub fn new(tag: &str, description: &str) -> Self {
        Self {
            tag: tag.to_ascii_uppercase(),
            description: description.to_string(),
            module: tag.to_ascii_lowercase(),
            decoder: None,
            encoder: None,
            magic: None,
            adjoin: true,
            raw: false,
            endian_support: false,
            seekable_stream: false,
            thread_support: ThreadSupport::all(),
            blob_support: true,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Sets the diagnostic module name.
    pub fn with_module(mut self, module: &str) -> Self {
        self.module = module.to_string();
        self
    }

    /// Sets the decoder.
    pub fn with_decoder(mut self, decoder: DecodeFn) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Sets the encoder.
    pub fn with_encoder(mut self, encoder: EncodeFn) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Sets the magic test.
    pub fn with_magic(mut self, magic: MagicFn) -> Self {
        self.magic = Some(magic);
        self
    }

    /// Sets multi-frame support.
    pub fn with_adjoin(mut self, adjoin: bool) -> Self {
        self.adjoin = adjoin;
        self
    }

    /// Marks the format headerless.
    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Marks byte-order support.
    pub fn with_endian_support(mut self, endian_support: bool) -> Self {
        self.endian_support = endian_support;
        self
    }

    /// Marks the stream as needing seeks.
    pub fn with_seekable_stream(mut self, seekable_stream: bool) -> Self {
        self.seekable_stream = seekable_stream;
        self
    }

    /// Sets the concurrency class.
    pub fn with_thread_support(mut self, thread_support: ThreadSupport) -> Self {
        self.thread_support = thread_support;
        self
    }

    /// Sets memory blob support.
    pub fn with_blob_support(mut self, blob_support: bool) -> Self {
        self.blob_support = blob_support;
        self
    }

    /// Takes the coder's lock unless `direction` may run concurrently. The
    /// guard releases on drop.
    pub fn acquire(&self, direction: ThreadSupport) -> Option<MutexGuard<'_, ()>> {
        if self.thread_support.contains(direction) {
            return None;
        }
        Some(self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Returns `true` if the magic test accepts `header`.
    pub fn matches(&self, header: &[u8]) -> bool {
        self.magic.is_some_and(|magic| magic(header))
    }
}

/// Table of coders keyed by upper-case tag.
pub struct Registry {
    coders: RwLock<BTreeMap<String, Arc<CoderInfo>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            coders: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a registry holding every built-in coder.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        for info in coders::builtin() {
            registry.register(info);
        }
        registry
    }

    /// Returns the process-wide registry, initializing it on first use.
    pub fn global() -> &'static Registry {
        static INSTANCE: OnceLock<Registry> = OnceLock::new();
        INSTANCE.get_or_init(Registry::with_builtin)
    }

    /// Adds or replaces the coder for `info.tag`.
    pub fn register(&self, info: CoderInfo) -> Arc<CoderInfo> {
        let key = info.tag.to_ascii_uppercase();
        let info = Arc::new(info);
        debug!(tag = %key, "register coder");
        self.coders
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, info.clone());
        info
    }

    /// Removes a coder. Returns `true` if it was present.
    pub fn unregister(&self, tag: &str) -> bool {
        debug!(tag, "unregister coder");
        self.coders
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&tag.to_ascii_uppercase())
            .is_some()
    }

    /// Looks up a coder by tag, ignoring case.
    pub fn get(&self, tag: &str) -> Option<Arc<CoderInfo>> {
        self.coders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&tag.to_ascii_uppercase())
            .cloned()
    }

    /// Returns `true` if `tag` is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> Vec<String> {
        self.coders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Finds the first coder whose magic test accepts `header`.
    pub fn detect(&self, header: &[u8]) -> Option<Arc<CoderInfo>> {
        self.coders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .find(|info| info.matches(header))
            .cloned()
    }
}
