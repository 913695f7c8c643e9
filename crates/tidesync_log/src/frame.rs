//! Journal framing.
//!
//! Every journal entry is written as one frame:
//!
//! ```text
//! magic "TSJL" (4) | version u16 (2) | kind u8 (1) | len u32 (4) | body (len) | crc32 (4)
//! ```
//!
//! The CRC covers everything before it. Integers are little-endian.

use crate::backend::JournalBackend;
use crate::error::{LogError, LogResult, StorageResult};
use tidesync_protocol::JournalEntry;

/// Magic bytes identifying a journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"TSJL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Size of the frame header: magic + version + kind + length.
pub const FRAME_HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Encodes an entry into a complete frame.
pub(crate) fn encode_frame(entry: &JournalEntry) -> LogResult<Vec<u8>> {
    let body = entry.encode_body()?;
    let len = u32::try_from(body.len()).map_err(|_| {
        LogError::Codec(tidesync_protocol::CodecError::Encode(format!(
            "entry body too large: {} bytes",
            body.len()
        )))
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.push(entry.kind().to_code());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);

    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Streams entries out of a journal backend.
///
/// Iteration stops at the end of the journal or at the first frame that is
/// incomplete or fails validation. In the latter case [`Self::torn_tail`]
/// reports where the valid prefix ends and why.
pub struct FrameReader<'a> {
    backend: &'a dyn JournalBackend,
    offset: u64,
    size: u64,
    torn: Option<(u64, String)>,
}

impl<'a> FrameReader<'a> {
    /// Starts reading at the beginning of the journal.
    pub fn new(backend: &'a dyn JournalBackend) -> StorageResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            backend,
            offset: 0,
            size,
            torn: None,
        })
    }

    /// Returns the offset and reason of an invalid tail, if one was found.
    #[must_use]
    pub fn torn_tail(&self) -> Option<(u64, &str)> {
        self.torn
            .as_ref()
            .map(|(offset, reason)| (*offset, reason.as_str()))
    }

    /// Returns the offset just past the last valid frame read so far.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    fn tear(&mut self, reason: impl Into<String>) -> Option<StorageResult<(u64, JournalEntry)>> {
        self.torn = Some((self.offset, reason.into()));
        None
    }

    fn read_frame(&mut self) -> Option<StorageResult<(u64, JournalEntry)>> {
        let remaining = self.size - self.offset;
        if remaining < FRAME_HEADER_SIZE as u64 {
            return self.tear(format!("incomplete header ({remaining} bytes)"));
        }

        let header = match self.backend.read_at(self.offset, FRAME_HEADER_SIZE) {
            Ok(header) => header,
            Err(e) => return Some(Err(e)),
        };
        if header[0..4] != JOURNAL_MAGIC {
            return self.tear("bad magic");
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != JOURNAL_VERSION {
            return self.tear(format!("unsupported version {version}"));
        }
        let code = header[6];
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let frame_len = (FRAME_HEADER_SIZE + len + CRC_SIZE) as u64;
        if remaining < frame_len {
            return self.tear(format!("incomplete frame ({remaining} of {frame_len} bytes)"));
        }

        let rest = match self
            .backend
            .read_at(self.offset + FRAME_HEADER_SIZE as u64, len + CRC_SIZE)
        {
            Ok(rest) => rest,
            Err(e) => return Some(Err(e)),
        };
        let (body, crc_bytes) = rest.split_at(len);

        let mut checked = header;
        checked.extend_from_slice(body);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if compute_crc32(&checked) != expected {
            return self.tear("checksum mismatch");
        }

        let entry = match JournalEntry::decode(code, body) {
            Ok(entry) => entry,
            Err(e) => return self.tear(e.to_string()),
        };

        let offset = self.offset;
        self.offset += frame_len;
        Some(Ok((offset, entry)))
    }
}

impl Iterator for FrameReader<'_> {
    type Item = StorageResult<(u64, JournalEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.torn.is_some() || self.offset >= self.size {
            return None;
        }
        self.read_frame()
    }
}

/// Computes a CRC32 (IEEE polynomial) checksum.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryJournal;
    use tidesync_protocol::RecordId;

    fn synced(id: u64) -> JournalEntry {
        JournalEntry::Synced {
            id: RecordId::new(id),
        }
    }

    fn journal_with(entries: &[JournalEntry]) -> MemoryJournal {
        let mut journal = MemoryJournal::new();
        for entry in entries {
            journal.append(&encode_frame(entry).unwrap()).unwrap();
        }
        journal
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn frame_layout() {
        let frame = encode_frame(&synced(1)).unwrap();
        assert_eq!(&frame[0..4], b"TSJL");
        assert_eq!(u16::from_le_bytes([frame[4], frame[5]]), JOURNAL_VERSION);
        assert_eq!(frame[6], 2);
        let len = u32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]) as usize;
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + len + 4);
    }

    #[test]
    fn reads_entries_in_order() {
        let journal = journal_with(&[synced(1), synced(2), synced(3)]);
        let mut reader = FrameReader::new(&journal).unwrap();
        let ids: Vec<_> = reader
            .by_ref()
            .map(|r| r.unwrap().1.record_id().unwrap().as_u64())
            .collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert!(reader.torn_tail().is_none());
        assert_eq!(reader.valid_end(), journal.size().unwrap());
    }

    #[test]
    fn stops_at_truncated_frame() {
        let journal = journal_with(&[synced(1), synced(2)]);
        let full = journal.data();
        let journal = MemoryJournal::with_data(full[..full.len() - 3].to_vec());

        let mut reader = FrameReader::new(&journal).unwrap();
        assert_eq!(reader.by_ref().count(), 1);
        let (offset, reason) = reader.torn_tail().unwrap();
        assert_eq!(offset, reader.valid_end());
        assert!(reason.contains("incomplete"));
    }

    #[test]
    fn stops_at_checksum_mismatch() {
        let journal = journal_with(&[synced(1), synced(2)]);
        let mut bytes = journal.data();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let journal = MemoryJournal::with_data(bytes);

        let mut reader = FrameReader::new(&journal).unwrap();
        assert_eq!(reader.by_ref().count(), 1);
        assert_eq!(reader.torn_tail().unwrap().1, "checksum mismatch");
    }

    #[test]
    fn stops_at_garbage() {
        let journal = MemoryJournal::with_data(b"definitely not a journal frame".to_vec());
        let mut reader = FrameReader::new(&journal).unwrap();
        assert_eq!(reader.by_ref().count(), 0);
        assert_eq!(reader.torn_tail(), Some((0, "bad magic")));
    }
}
