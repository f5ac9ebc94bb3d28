//! Error types for codec operations.
//!
//! Fatal failures are grouped by origin, each carrying a kind with a stable
//! template name used in diagnostics:
//!
//! | Variant | Kinds |
//! |---------|-------|
//! | [`IoError::Io`] | `OpenFailed`, `Read`, `Write`, `Seek`, `UnexpectedEof`, `Closed` |
//! | [`IoError::Codec`] | `ImproperImageHeader`, `ImageTypeNotSupported`, `InsufficientImageDataInFile`, ... |
//! | [`IoError::Resource`] | `AllocationFailed`, `ColormapAllocationFailed`, `TemporaryFile` |
//! | [`IoError::Option`] | `MustSpecifyImageSize`, `NegativeOrZeroImageSize`, `SubimageSpecifierMatchedNoImages` |
//!
//! Non-fatal problems are [`Warning`](pixmill_core::Warning)s and never
//! appear here.

use std::fmt;
use std::io;

use thiserror::Error;

macro_rules! error_kinds {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Stable template name.
            pub fn template(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.template())
            }
        }
    };
}

error_kinds! {
    /// Stream failure kinds.
    IoErrorKind {
        /// The file or stream could not be opened.
        OpenFailed,
        /// A read failed.
        Read,
        /// A write failed.
        Write,
        /// A seek failed or the stream cannot seek.
        Seek,
        /// The stream ended inside a required structure.
        UnexpectedEof,
        /// The blob was used after close.
        Closed,
    }
}

error_kinds! {
    /// Format failure kinds.
    CodecErrorKind {
        /// Header is malformed or has an unknown signature.
        ImproperImageHeader,
        /// Header is valid but describes an unsupported layout.
        ImageTypeNotSupported,
        /// Pixel payload is shorter than the header promises.
        InsufficientImageDataInFile,
        /// A colormap index exceeds the colormap.
        InvalidColormapIndex,
        /// No decoder for the format.
        NoDecoder,
        /// No encoder for the format.
        NoEncoder,
        /// Tile layout requested on a strip-organized directory.
        ImageIsNotTiled,
        /// The compression scheme is not available.
        CompressionNotSupported,
        /// Compressed payload could not be decoded.
        CorruptImage,
        /// MPEG parameters could not be expressed.
        UnableToWriteMPEGParameters,
    }
}

error_kinds! {
    /// Resource failure kinds.
    ResourceErrorKind {
        /// Memory could not be reserved.
        AllocationFailed,
        /// Colormap could not be created.
        ColormapAllocationFailed,
        /// A temporary file could not be created or removed.
        TemporaryFile,
    }
}

error_kinds! {
    /// Caller option failure kinds.
    OptionErrorKind {
        /// Raw format read without `size`.
        MustSpecifyImageSize,
        /// Width or height is zero.
        NegativeOrZeroImageSize,
        /// Scene specifier selected no frames.
        SubimageSpecifierMatchedNoImages,
        /// Option value could not be parsed.
        InvalidOption,
    }
}

/// Codec operation error.
#[derive(Debug, Error)]
pub enum IoError {
    /// Stream failure.
    #[error("{kind}: {context}")]
    Io {
        /// Failure kind.
        kind: IoErrorKind,
        /// Filename or description.
        context: String,
        /// Underlying OS error.
        #[source]
        source: Option<io::Error>,
    },

    /// Format failure.
    #[error("{kind}: {context}")]
    Codec {
        /// Failure kind.
        kind: CodecErrorKind,
        /// Filename or description.
        context: String,
    },

    /// Resource failure.
    #[error("{kind}: {context}")]
    Resource {
        /// Failure kind.
        kind: ResourceErrorKind,
        /// Filename or description.
        context: String,
    },

    /// Invalid caller options.
    #[error("{kind}: {context}")]
    Option {
        /// Failure kind.
        kind: OptionErrorKind,
        /// Filename or description.
        context: String,
    },

    /// Progress monitor asked to stop.
    #[error("operation cancelled")]
    Cancelled,

    /// External delegate program failed.
    #[error("delegate '{name}' failed (exit code {exit_code:?}): {command}")]
    Delegate {
        /// Delegate name such as `mpeg-encode`.
        name: String,
        /// Process exit code, `None` when killed by a signal or not spawned.
        exit_code: Option<i32>,
        /// Expanded command line.
        command: String,
    },

    /// Data model failure.
    #[error(transparent)]
    Core(#[from] pixmill_core::Error),
}

impl From<io::Error> for IoError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof => IoErrorKind::UnexpectedEof,
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => IoErrorKind::OpenFailed,
            _ => IoErrorKind::Read,
        };
        IoError::Io {
            kind,
            context: err.to_string(),
            source: Some(err),
        }
    }
}

impl IoError {
    /// Creates a stream error.
    pub fn io(kind: IoErrorKind, context: impl Into<String>) -> Self {
        Self::Io {
            kind,
            context: context.into(),
            source: None,
        }
    }

    /// Creates a stream error wrapping an OS error.
    pub fn io_source(kind: IoErrorKind, context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            kind,
            context: context.into(),
            source: Some(source),
        }
    }

    /// Creates a format error.
    pub fn codec(kind: CodecErrorKind, context: impl Into<String>) -> Self {
        Self::Codec {
            kind,
            context: context.into(),
        }
    }

    /// Creates a resource error.
    pub fn resource(kind: ResourceErrorKind, context: impl Into<String>) -> Self {
        Self::Resource {
            kind,
            context: context.into(),
        }
    }

    /// Creates an option error.
    pub fn option(kind: OptionErrorKind, context: impl Into<String>) -> Self {
        Self::Option {
            kind,
            context: context.into(),
        }
    }

    /// Shorthand for [`CodecErrorKind::ImproperImageHeader`].
    pub fn improper_header(context: impl Into<String>) -> Self {
        Self::codec(CodecErrorKind::ImproperImageHeader, context)
    }

    /// Shorthand for [`IoErrorKind::UnexpectedEof`].
    pub fn unexpected_eof(context: impl Into<String>) -> Self {
        Self::io(IoErrorKind::UnexpectedEof, context)
    }

    /// Stable template of the error, e.g. `ImproperImageHeader`.
    pub fn template(&self) -> &'static str {
        match self {
            Self::Io { kind, .. } => kind.template(),
            Self::Codec { kind, .. } => kind.template(),
            Self::Resource { kind, .. } => kind.template(),
            Self::Option { kind, .. } => kind.template(),
            Self::Cancelled => "Cancelled",
            Self::Delegate { .. } => "DelegateFailed",
            Self::Core(err) if err.is_allocation_error() => "AllocationFailed",
            Self::Core(_) => "CoreError",
        }
    }

    /// Severity class used in rendered diagnostics.
    pub fn severity(&self) -> &'static str {
        match self {
            Self::Io { .. } => "BlobError",
            Self::Codec { .. } => "CoderError",
            Self::Resource { .. } => "ResourceLimitError",
            Self::Option { .. } => "OptionError",
            Self::Cancelled => "Cancelled",
            Self::Delegate { .. } => "DelegateError",
            Self::Core(_) => "ImageError",
        }
    }

    /// Renders `"<module> <severity> <template> <arg>"`.
    pub fn diagnostic(&self, module: &str) -> String {
        let arg = match self {
            Self::Io { context, .. }
            | Self::Codec { context, .. }
            | Self::Resource { context, .. }
            | Self::Option { context, .. } => context.clone(),
            Self::Delegate { command, .. } => command.clone(),
            Self::Cancelled => String::new(),
            Self::Core(err) => err.to_string(),
        };
        format!("{module} {} {} {arg}", self.severity(), self.template())
    }

    /// Returns `true` for [`IoError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the codec kind, if any.
    pub fn codec_kind(&self) -> Option<CodecErrorKind> {
        match self {
            Self::Codec { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns the stream kind, if any.
    pub fn io_kind(&self) -> Option<IoErrorKind> {
        match self {
            Self::Io { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns the option kind, if any.
    pub fn option_kind(&self) -> Option<OptionErrorKind> {
        match self {
            Self::Option { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for codec operations.
pub type IoResult<T> = Result<T, IoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates() {
        let err = IoError::improper_header("x.pnm");
        assert_eq!(err.template(), "ImproperImageHeader");
        assert_eq!(err.codec_kind(), Some(CodecErrorKind::ImproperImageHeader));
        assert_eq!(
            err.diagnostic("pnm"),
            "pnm CoderError ImproperImageHeader x.pnm"
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: IoError = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert_eq!(err.io_kind(), Some(IoErrorKind::UnexpectedEof));
        let err: IoError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.io_kind(), Some(IoErrorKind::OpenFailed));
    }

    #[test]
    fn test_core_allocation_template() {
        let err: IoError = pixmill_core::Error::allocation_failed(10, "no").into();
        assert_eq!(err.template(), "AllocationFailed");
    }

    #[test]
    fn test_cancelled() {
        assert!(IoError::Cancelled.is_cancelled());
        assert_eq!(IoError::Cancelled.template(), "Cancelled");
    }
}
