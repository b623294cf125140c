//! Container detection from file extension or leading bytes.

use std::io::Read;
use std::path::Path;

use fp_common::{ContainerFormat, ProbeError};

/// Magic bytes for Matroska/WebM files (EBML header element ID).
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Top-level ISO BMFF box types a file may legitimately start with.
const BMFF_LEADING_BOXES: [&[u8; 4]; 6] = [b"ftyp", b"moov", b"mdat", b"wide", b"free", b"skip"];

/// Bytes read when sniffing; enough to reach the EBML DocType element.
const SNIFF_LEN: usize = 64;

/// Detect container format from file extension.
pub fn detect_format(path: &Path) -> Result<ContainerFormat, ProbeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    [ContainerFormat::Mp4, ContainerFormat::Mkv, ContainerFormat::WebM]
        .into_iter()
        .find(|format| format.file_extensions().contains(&ext.as_str()))
        .ok_or(ProbeError::UnsupportedContainer)
}

/// Detect container format from the first bytes of the file.
///
/// More reliable than the extension for files that were renamed or
/// downloaded without one. WebM is told apart from Matroska by the
/// `webm` DocType inside the EBML header.
pub fn detect_format_from_magic<R: Read>(reader: &mut R) -> Result<ContainerFormat, ProbeError> {
    let mut header = [0u8; SNIFF_LEN];
    let mut filled = 0;
    // Readers may return short reads before EOF.
    while filled < SNIFF_LEN {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let header = &header[..filled];

    if header.len() < 4 {
        return Err(ProbeError::UnsupportedContainer);
    }

    if header[..4] == EBML_MAGIC {
        let is_webm = header.windows(4).any(|w| w == b"webm");
        return Ok(if is_webm {
            ContainerFormat::WebM
        } else {
            ContainerFormat::Mkv
        });
    }

    if let Some(box_type) = header.get(4..8) {
        if BMFF_LEADING_BOXES.iter().any(|b| b.as_slice() == box_type) {
            return Ok(ContainerFormat::Mp4);
        }
    }

    Err(ProbeError::UnsupportedContainer)
}
