//! 🗜️ Decompression detection: sniff the first few bytes, pick a decoder, never trust a file extension.
//!
//! 🧠 Knowledge graph:
//! - gzip starts with `1F 8B`. zstd frames start with `28 B5 2F FD`. That is the whole list.
//! - `.gz` / `.zst` suffixes are a polite suggestion. The magic bytes are the law.
//! - Plain uncompressed JSON-lines is NOT supported. It gets `UnsupportedFormat`, like everyone else.
//! - Decoders are streaming (`Read` adapters). The decompressed file never lives in memory all at once,
//!   because somebody, somewhere, has a 40GB log file and a 2GB container.

use std::io::{BufRead, BufReader, Cursor};

use flate2::read::MultiGzDecoder;

use crate::error::ShovelError;

const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];

// 🔍 how many bytes of the prefix to show in the error when nothing matched
const PREFIX_PREVIEW_LEN: usize = 8;

/// 🗜️ The compression schemes we know how to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    Gzip,
    Zstd,
}

impl CompressionKind {
    /// 🔍 Look at the magic bytes and name the format.
    ///
    /// 💀 Anything that is not gzip or zstd is `UnsupportedFormat`. Empty input included.
    pub fn detect(prefix: &[u8]) -> Result<Self, ShovelError> {
        if prefix.starts_with(ZSTD_MAGIC) {
            Ok(Self::Zstd)
        } else if prefix.starts_with(GZIP_MAGIC) {
            Ok(Self::Gzip)
        } else {
            Err(ShovelError::UnsupportedFormat {
                prefix: hex_preview(prefix),
            })
        }
    }

    /// 🚰 Wrap the raw file bytes in a streaming decoder.
    ///
    /// Takes ownership of the bytes so the reader is `'static` and can ride along
    /// across `.await` points. The raw buffer is freed when the reader is dropped.
    pub fn open(self, raw: Vec<u8>) -> Result<Box<dyn BufRead + Send>, ShovelError> {
        let compressed = Cursor::new(raw);
        let reader: Box<dyn BufRead + Send> = match self {
            // -- 🫁 MultiGz, not Gz: `cat a.gz b.gz > c.gz` is a valid gzip file and we honor it
            Self::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(compressed))),
            Self::Zstd => Box::new(BufReader::new(
                zstd::stream::read::Decoder::new(compressed)
                    .map_err(|source| ShovelError::Decompression { source })?,
            )),
        };
        Ok(reader)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 🔎 Detect and open in one go. The supervisor's favorite shortcut.
pub fn open_stream(raw: Vec<u8>) -> Result<(CompressionKind, Box<dyn BufRead + Send>), ShovelError> {
    let kind = CompressionKind::detect(&raw)?;
    let reader = kind.open(raw)?;
    Ok((kind, reader))
}

fn hex_preview(prefix: &[u8]) -> String {
    if prefix.is_empty() {
        return "<empty>".to_string();
    }
    prefix
        .iter()
        .take(PREFIX_PREVIEW_LEN)
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 🧹 Read everything left in a decoder. Tests only; the real pipeline never does this.
#[cfg(test)]
pub(crate) fn read_all(mut reader: impl BufRead) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut out)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! 🧪 Compressors for tests. The inverse of everything above.
    use std::io::Write;

    use flate2::{Compression, write::GzEncoder};

    pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).expect("💀 gzip encoder refused to write into a Vec");
        encoder.finish().expect("💀 gzip encoder refused to finish")
    }

    pub(crate) fn zstd(bytes: &[u8]) -> Vec<u8> {
        zstd::encode_all(bytes, 3).expect("💀 zstd encoder had a bad day")
    }
}
