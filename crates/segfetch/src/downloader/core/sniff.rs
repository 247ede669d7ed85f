//! Content sniffing
//!
//! Classifies a file by its leading bytes and maps the result to a canonical
//! extension. Server-supplied content types are never consulted.

use std::path::Path;

use tokio::io::AsyncReadExt;

use super::{DownloadError, FileOperation, Result};

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 512;

/// Formats recognised by [`detect_kind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Html,
    Xml,
    Pdf,
    PostScript,
    Text,
    Gif,
    Png,
    Jpeg,
    Bmp,
    Ico,
    Webp,
    Wav,
    Avi,
    Ogg,
    Mp3,
    Flac,
    Midi,
    Mp4,
    M4a,
    QuickTime,
    Webm,
    Woff,
    Woff2,
    Ttf,
    Otf,
    Gzip,
    Zip,
    Rar,
    SevenZip,
    Xz,
    Zstd,
    Bzip2,
    Tar,
    Wasm,
}

impl FileKind {
    /// Canonical extension, without the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Html => "html",
            FileKind::Xml => "xml",
            FileKind::Pdf => "pdf",
            FileKind::PostScript => "ps",
            FileKind::Text => "txt",
            FileKind::Gif => "gif",
            FileKind::Png => "png",
            FileKind::Jpeg => "jpg",
            FileKind::Bmp => "bmp",
            FileKind::Ico => "ico",
            FileKind::Webp => "webp",
            FileKind::Wav => "wav",
            FileKind::Avi => "avi",
            FileKind::Ogg => "ogg",
            FileKind::Mp3 => "mp3",
            FileKind::Flac => "flac",
            FileKind::Midi => "mid",
            FileKind::Mp4 => "mp4",
            FileKind::M4a => "m4a",
            FileKind::QuickTime => "mov",
            FileKind::Webm => "webm",
            FileKind::Woff => "woff",
            FileKind::Woff2 => "woff2",
            FileKind::Ttf => "ttf",
            FileKind::Otf => "otf",
            FileKind::Gzip => "gz",
            FileKind::Zip => "zip",
            FileKind::Rar => "rar",
            FileKind::SevenZip => "7z",
            FileKind::Xz => "xz",
            FileKind::Zstd => "zst",
            FileKind::Bzip2 => "bz2",
            FileKind::Tar => "tar",
            FileKind::Wasm => "wasm",
        }
    }
}

const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Classify `data` (the leading bytes of a file)
pub fn detect_kind(data: &[u8]) -> Option<FileKind> {
    if data.is_empty() {
        return None;
    }

    let kind = match data {
        [0x25, 0x50, 0x44, 0x46, 0x2D, ..] => Some(FileKind::Pdf),
        [b'%', b'!', b'P', b'S', b'-', b'A', b'd', b'o', b'b', b'e', b'-', ..] => {
            Some(FileKind::PostScript)
        }
        [0xFE, 0xFF, ..] | [0xFF, 0xFE, ..] | [0xEF, 0xBB, 0xBF, ..] => Some(FileKind::Text),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(FileKind::Gif),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(FileKind::Png),
        [0xFF, 0xD8, 0xFF, ..] => Some(FileKind::Jpeg),
        [b'B', b'M', ..] => Some(FileKind::Bmp),
        [0x00, 0x00, 0x01, 0x00, ..] => Some(FileKind::Ico),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', b'V', b'P', ..] => {
            Some(FileKind::Webp)
        }
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(FileKind::Wav),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'A', b'V', b'I', b' ', ..] => Some(FileKind::Avi),
        [b'O', b'g', b'g', b'S', 0x00, ..] => Some(FileKind::Ogg),
        [b'I', b'D', b'3', ..] => Some(FileKind::Mp3),
        [b'f', b'L', b'a', b'C', ..] => Some(FileKind::Flac),
        [b'M', b'T', b'h', b'd', 0x00, 0x00, 0x00, 0x06, ..] => Some(FileKind::Midi),
        [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..] => Some(iso_media_kind(brand)),
        [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(FileKind::Webm),
        [b'w', b'O', b'F', b'F', ..] => Some(FileKind::Woff),
        [b'w', b'O', b'F', b'2', ..] => Some(FileKind::Woff2),
        [0x00, 0x01, 0x00, 0x00, 0x00, ..] => Some(FileKind::Ttf),
        [b'O', b'T', b'T', b'O', ..] => Some(FileKind::Otf),
        [0x1F, 0x8B, 0x08, ..] => Some(FileKind::Gzip),
        [b'P', b'K', 0x03, 0x04, ..] => Some(FileKind::Zip),
        [b'R', b'a', b'r', b'!', 0x1A, 0x07, ..] => Some(FileKind::Rar),
        [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C, ..] => Some(FileKind::SevenZip),
        [0xFD, b'7', b'z', b'X', b'Z', 0x00, ..] => Some(FileKind::Xz),
        [0x28, 0xB5, 0x2F, 0xFD, ..] => Some(FileKind::Zstd),
        [b'B', b'Z', b'h', ..] => Some(FileKind::Bzip2),
        [0x00, b'a', b's', b'm', ..] => Some(FileKind::Wasm),
        _ => None,
    };
    if kind.is_some() {
        return kind;
    }

    if data.len() >= 263 && &data[257..263] == b"ustar\0" {
        return Some(FileKind::Tar);
    }

    let markup = skip_whitespace(data);
    if HTML_TAGS.iter().any(|tag| is_html_tag(markup, tag)) {
        return Some(FileKind::Html);
    }
    if markup.starts_with(b"<?xml") {
        return Some(FileKind::Xml);
    }

    if data.iter().all(|&b| !is_binary_byte(b)) {
        return Some(FileKind::Text);
    }

    None
}

fn iso_media_kind(brand: &[u8]) -> FileKind {
    match brand {
        [b'q', b't', b' ', b' ', ..] => FileKind::QuickTime,
        [b'M', b'4', b'A', b' ', ..] => FileKind::M4a,
        _ => FileKind::Mp4,
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

// Tag must be followed by a space or '>' so "<Bar" is not "<B"
fn is_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() || !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

// Control bytes that never appear in plain text
fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Read up to [`SNIFF_LEN`] leading bytes of `path` and return its extension
///
/// Files shorter than the sniff window are fine; only what exists is read.
pub async fn detect_extension(path: &Path) -> Result<&'static str> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::fs(path, FileOperation::Read, e))?;

    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = file
            .read(&mut buf[filled..])
            .await
            .map_err(|e| DownloadError::fs(path, FileOperation::Read, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    detect_kind(&buf[..filled])
        .map(FileKind::extension)
        .ok_or_else(|| DownloadError::UnknownFileType {
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detect_binary_signatures() {
        assert_eq!(detect_kind(b"%PDF-1.7\n"), Some(FileKind::Pdf));
        assert_eq!(
            detect_kind(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00]),
            Some(FileKind::Png)
        );
        assert_eq!(detect_kind(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(FileKind::Jpeg));
        assert_eq!(detect_kind(&[b'P', b'K', 0x03, 0x04, 0x14]), Some(FileKind::Zip));
        assert_eq!(detect_kind(&[0x1F, 0x8B, 0x08, 0x00]), Some(FileKind::Gzip));
        assert_eq!(detect_kind(b"GIF89a\x01\x00"), Some(FileKind::Gif));
    }

    #[test]
    fn detect_iso_media_brands() {
        assert_eq!(detect_kind(b"\x00\x00\x00\x18ftypisom"), Some(FileKind::Mp4));
        assert_eq!(detect_kind(b"\x00\x00\x00\x14ftypqt  "), Some(FileKind::QuickTime));
        assert_eq!(detect_kind(b"\x00\x00\x00\x20ftypM4A "), Some(FileKind::M4a));
    }

    #[test]
    fn detect_riff_containers() {
        assert_eq!(detect_kind(b"RIFF\x24\x00\x00\x00WAVEfmt "), Some(FileKind::Wav));
        assert_eq!(detect_kind(b"RIFF\x24\x00\x00\x00WEBPVP8 "), Some(FileKind::Webp));
    }

    #[test]
    fn detect_markup_ignores_case_and_leading_whitespace() {
        assert_eq!(detect_kind(b"  \n<!doctype html><html>"), Some(FileKind::Html));
        assert_eq!(detect_kind(b"<html>"), Some(FileKind::Html));
        assert_eq!(detect_kind(b"<?xml version=\"1.0\"?>"), Some(FileKind::Xml));
        // not a tag boundary, falls through to text
        assert_eq!(detect_kind(b"<Bar>"), Some(FileKind::Text));
    }

    #[test]
    fn detect_plain_text_and_unknown_binary() {
        assert_eq!(detect_kind(b"hello world\n"), Some(FileKind::Text));
        assert_eq!(detect_kind(&[0xDE, 0xAD, 0x00, 0xEF]), None);
        assert_eq!(detect_kind(&[]), None);
    }

    #[test]
    fn detect_tar_header() {
        let mut header = [0u8; 512];
        header[0] = b'a';
        header[257..263].copy_from_slice(b"ustar\0");
        assert_eq!(detect_kind(&header), Some(FileKind::Tar));
    }

    #[tokio::test]
    async fn detect_extension_tolerates_short_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short");
        tokio::fs::write(&path, b"%PDF-").await.unwrap();
        assert_eq!(detect_extension(&path).await.unwrap(), "pdf");
    }

    #[tokio::test]
    async fn detect_extension_reads_only_the_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long");
        let mut content = vec![b'a'; SNIFF_LEN];
        // binary byte past the window must not matter
        content.extend_from_slice(&[0x00, 0x01]);
        tokio::fs::write(&path, &content).await.unwrap();
        assert_eq!(detect_extension(&path).await.unwrap(), "txt");
    }

    #[tokio::test]
    async fn detect_extension_unknown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, [0x00, 0x02, 0x03, 0x04]).await.unwrap();
        match detect_extension(&path).await.unwrap_err() {
            DownloadError::UnknownFileType { path: reported } => assert_eq!(reported, path),
            other => panic!("Expected UnknownFileType, got {other:?}"),
        }
    }
}
