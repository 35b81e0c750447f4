//! Readable file handles returned by the open dispatcher.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use crate::error::ResolveError;
use crate::remote::CachedReader;

/// Supported open modes. Read-only by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Binary read (`"rb"`).
    Binary,
    /// Text read (`"r"` / `"rt"`), decoded per [`EncodingOptions`].
    Text,
}

impl OpenMode {
    /// Parse a mode string.
    ///
    /// # Arguments
    /// * `mode` - `"r"`, `"rb"`, or `"rt"`
    ///
    /// # Errors
    /// `UnsupportedMode` for write or otherwise unsupported modes.
    pub fn parse(mode: &str) -> Result<Self, ResolveError> {
        match mode {
            "rb" => Ok(OpenMode::Binary),
            "r" | "rt" => Ok(OpenMode::Text),
            other => Err(ResolveError::UnsupportedMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Behavior on undecodable bytes in text mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrors {
    /// Fail the read.
    #[default]
    Strict,
    /// Substitute the replacement character.
    Replace,
}

/// Text decoding options for text-mode opens.
#[derive(Debug, Clone)]
pub struct EncodingOptions {
    /// Encoding name. Only UTF-8 (and its ASCII subset) is supported.
    pub encoding: String,
    /// Undecodable-byte policy.
    pub errors: DecodeErrors,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            errors: DecodeErrors::Strict,
        }
    }
}

impl EncodingOptions {
    /// Whether this encoding can be decoded by this build.
    pub fn is_supported(&self) -> bool {
        matches!(
            self.encoding.to_ascii_lowercase().as_str(),
            "utf-8" | "utf8" | "ascii" | "us-ascii"
        )
    }
}

enum HandleSource {
    /// Local file; the mutex serializes seek+read pairs.
    Local(Mutex<std::fs::File>),
    /// Remote content through the block cache.
    Remote(CachedReader),
}

/// A readable handle with random access and independent close.
///
/// Returned by the dispatcher for both local and cached-remote content;
/// the caller cannot tell which. Dropping the handle closes it.
pub struct FileHandle {
    source: HandleSource,
    mode: OpenMode,
    encoding: EncodingOptions,
    length: u64,
    path: String,
}

impl FileHandle {
    /// Open a local file directly.
    ///
    /// # Arguments
    /// * `path` - Absolute path on local disk
    /// * `mode` - Open mode
    /// * `encoding` - Text decoding options
    pub(crate) fn local(
        path: &Path,
        mode: OpenMode,
        encoding: EncodingOptions,
    ) -> Result<Self, ResolveError> {
        let display: String = path.display().to_string();
        let file: std::fs::File =
            std::fs::File::open(path).map_err(|e| ResolveError::io(display.clone(), e))?;
        let length: u64 = file
            .metadata()
            .map_err(|e| ResolveError::io(display.clone(), e))?
            .len();

        Ok(Self {
            source: HandleSource::Local(Mutex::new(file)),
            mode,
            encoding,
            length,
            path: display,
        })
    }

    /// Wrap a cached remote reader.
    ///
    /// # Arguments
    /// * `reader` - Cache-backed reader
    /// * `mode` - Open mode
    /// * `encoding` - Text decoding options
    /// * `path` - Original dataset path, for diagnostics
    pub(crate) fn remote(
        reader: CachedReader,
        mode: OpenMode,
        encoding: EncodingOptions,
        path: String,
    ) -> Self {
        let length: u64 = reader.len();
        Self {
            source: HandleSource::Remote(reader),
            mode,
            encoding,
            length,
            path,
        }
    }

    /// Total content length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The open mode of this handle.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// The path this handle was opened for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// Reads past the end are clamped; a read entirely past the end
    /// returns an empty buffer.
    ///
    /// # Arguments
    /// * `offset` - Start offset in bytes
    /// * `len` - Number of bytes requested
    pub async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, ResolveError> {
        match &self.source {
            HandleSource::Local(file) => {
                let mut guard = file.lock().unwrap();
                guard
                    .seek(SeekFrom::Start(offset))
                    .map_err(|e| ResolveError::io(self.path.clone(), e))?;
                let mut buf: Vec<u8> = Vec::with_capacity(len.min(self.length) as usize);
                (&mut *guard)
                    .take(len)
                    .read_to_end(&mut buf)
                    .map_err(|e| ResolveError::io(self.path.clone(), e))?;
                Ok(buf)
            }
            HandleSource::Remote(reader) => Ok(reader.read_at(offset, len).await?),
        }
    }

    /// Read the entire content.
    pub async fn read_all(&self) -> Result<Vec<u8>, ResolveError> {
        self.read_at(0, self.length).await
    }

    /// Read the entire content as text, per the handle's encoding options.
    ///
    /// # Errors
    /// `UnsupportedMode` on a binary handle; `Decode` on invalid bytes in
    /// strict mode.
    pub async fn read_text(&self) -> Result<String, ResolveError> {
        if self.mode != OpenMode::Text {
            return Err(ResolveError::UnsupportedMode {
                mode: "rb".to_string(),
            });
        }

        let bytes: Vec<u8> = self.read_all().await?;
        match self.encoding.errors {
            DecodeErrors::Strict => {
                String::from_utf8(bytes).map_err(|_| ResolveError::Decode {
                    path: self.path.clone(),
                })
            }
            DecodeErrors::Replace => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Close the handle. Dropping it has the same effect.
    pub fn close(self) {}
}
