//! GDeflate container format.
//!
//! Block-based layout designed for parallel GPU decompression: a fixed
//! [`FileHeader`] followed by a table of [`BlockInfo`] records, then the
//! per-block compressed payloads. Blocks decompress independently.
//!
//! This module only parses and validates the container. No decompressor is
//! wired up yet; requests marked
//! [`Compression::Stubbed`](crate::request::Compression::Stubbed) fail with
//! `ENOTSUP` at the codec hook.
//!
//! All multi-byte fields are little-endian on disk.

use thiserror::Error;

/// `"GDFL"`.
pub const MAGIC: u32 = 0x4744_464C;
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
/// Largest uncompressed block the format allows (16 MiB).
pub const MAX_BLOCK_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
  #[error("stream is truncated: need {need} bytes, have {have}")]
  Truncated { need: usize, have: usize },
  #[error("bad magic number {0:#010x}")]
  BadMagic(u32),
  #[error("unsupported format version {0}")]
  UnsupportedVersion(u16),
  #[error("header declares an empty stream")]
  EmptyStream,
  #[error("invalid block table entry at index {0}")]
  InvalidBlock(usize),
}

/// Header at the start of every GDeflate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
  pub magic: u32,
  pub version_major: u16,
  pub version_minor: u16,
  pub flags: u32,
  /// Total uncompressed size in bytes.
  pub uncompressed_size: u32,
  /// Total compressed size in bytes.
  pub compressed_size: u32,
  pub block_count: u32,
  pub reserved: [u32; 2],
}

impl FileHeader {
  /// On-disk size in bytes.
  pub const SIZE: usize = 32;

  pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
    if data.len() < Self::SIZE {
      return Err(FormatError::Truncated {
        need: Self::SIZE,
        have: data.len(),
      });
    }
    let header = Self {
      magic: read_u32(data, 0),
      version_major: read_u16(data, 4),
      version_minor: read_u16(data, 6),
      flags: read_u32(data, 8),
      uncompressed_size: read_u32(data, 12),
      compressed_size: read_u32(data, 16),
      block_count: read_u32(data, 20),
      reserved: [read_u32(data, 24), read_u32(data, 28)],
    };
    header.validate()?;
    Ok(header)
  }

  fn validate(&self) -> Result<(), FormatError> {
    if self.magic != MAGIC {
      return Err(FormatError::BadMagic(self.magic));
    }
    // Minor revisions are compatible; a major bump is not.
    if self.version_major != VERSION_MAJOR {
      return Err(FormatError::UnsupportedVersion(self.version_major));
    }
    if self.uncompressed_size == 0
      || self.compressed_size == 0
      || self.block_count == 0
    {
      return Err(FormatError::EmptyStream);
    }
    Ok(())
  }
}

/// Table entry describing one compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the block in the compressed payload area.
  pub offset: u64,
  pub compressed_size: u32,
  pub uncompressed_size: u32,
  pub checksum: u32,
}

impl BlockInfo {
  /// On-disk size in bytes (four bytes of trailing padding included).
  pub const SIZE: usize = 24;

  pub fn is_valid(&self) -> bool {
    self.compressed_size > 0
      && self.uncompressed_size > 0
      && self.uncompressed_size <= MAX_BLOCK_SIZE
  }

  fn parse_at(data: &[u8], base: usize) -> Self {
    Self {
      offset: read_u64(data, base),
      compressed_size: read_u32(data, base + 8),
      uncompressed_size: read_u32(data, base + 12),
      checksum: read_u32(data, base + 16),
    }
  }
}

/// Parses `block_count` table entries from the start of `data`.
pub fn parse_block_table(
  data: &[u8],
  block_count: usize,
) -> Result<Vec<BlockInfo>, FormatError> {
  let need = block_count
    .checked_mul(BlockInfo::SIZE)
    .ok_or(FormatError::Truncated { need: usize::MAX, have: data.len() })?;
  if data.len() < need {
    return Err(FormatError::Truncated { need, have: data.len() });
  }

  let mut blocks = Vec::with_capacity(block_count);
  for index in 0..block_count {
    let block = BlockInfo::parse_at(data, index * BlockInfo::SIZE);
    if !block.is_valid() {
      return Err(FormatError::InvalidBlock(index));
    }
    blocks.push(block);
  }
  Ok(blocks)
}

/// Fully parsed stream metadata: header plus block table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
  pub header: FileHeader,
  pub blocks: Vec<BlockInfo>,
}

impl StreamInfo {
  /// Parses the header and the block table that follows it.
  pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
    let header = FileHeader::parse(data)?;
    let blocks = parse_block_table(
      &data[FileHeader::SIZE..],
      header.block_count as usize,
    )?;
    Ok(Self { header, blocks })
  }

  /// Sum of the per-block uncompressed sizes.
  pub fn total_uncompressed(&self) -> u64 {
    self.blocks.iter().map(|b| u64::from(b.uncompressed_size)).sum()
  }

  /// Sum of the per-block compressed sizes.
  pub fn total_compressed(&self) -> u64 {
    self.blocks.iter().map(|b| u64::from(b.compressed_size)).sum()
  }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
  u16::from_le_bytes(data[at..at + 2].try_into().unwrap())
}

fn read_u32(data: &[u8], at: usize) -> u32 {
  u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
}

fn read_u64(data: &[u8], at: usize) -> u64 {
  u64::from_le_bytes(data[at..at + 8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
  }

  fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
  }

  fn push_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
  }

  fn encode_header(header: &FileHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FileHeader::SIZE);
    push_u32(&mut buf, header.magic);
    push_u16(&mut buf, header.version_major);
    push_u16(&mut buf, header.version_minor);
    push_u32(&mut buf, header.flags);
    push_u32(&mut buf, header.uncompressed_size);
    push_u32(&mut buf, header.compressed_size);
    push_u32(&mut buf, header.block_count);
    push_u32(&mut buf, header.reserved[0]);
    push_u32(&mut buf, header.reserved[1]);
    buf
  }

  fn encode_block(block: &BlockInfo) -> Vec<u8> {
    let mut buf = Vec::with_capacity(BlockInfo::SIZE);
    push_u64(&mut buf, block.offset);
    push_u32(&mut buf, block.compressed_size);
    push_u32(&mut buf, block.uncompressed_size);
    push_u32(&mut buf, block.checksum);
    push_u32(&mut buf, 0); // padding
    buf
  }

  fn sample_header(block_count: u32) -> FileHeader {
    FileHeader {
      magic: MAGIC,
      version_major: VERSION_MAJOR,
      version_minor: VERSION_MINOR,
      flags: 0,
      uncompressed_size: 2048,
      compressed_size: 1024,
      block_count,
      reserved: [0; 2],
    }
  }

  #[test]
  fn test_valid_header_roundtrip() {
    let header = sample_header(1);
    let parsed = FileHeader::parse(&encode_header(&header)).unwrap();
    assert_eq!(parsed, header);
  }

  #[test]
  fn test_bad_magic_is_rejected() {
    let mut header = sample_header(1);
    header.magic = 0xDEAD_BEEF;
    assert_eq!(
      FileHeader::parse(&encode_header(&header)),
      Err(FormatError::BadMagic(0xDEAD_BEEF)),
    );
  }

  #[test]
  fn test_major_version_mismatch_is_rejected() {
    let mut header = sample_header(1);
    header.version_major = 2;
    assert_eq!(
      FileHeader::parse(&encode_header(&header)),
      Err(FormatError::UnsupportedVersion(2)),
    );
  }

  #[test]
  fn test_minor_version_drift_is_accepted() {
    let mut header = sample_header(1);
    header.version_minor = 7;
    assert!(FileHeader::parse(&encode_header(&header)).is_ok());
  }

  #[test]
  fn test_truncated_header() {
    let header = sample_header(1);
    let bytes = encode_header(&header);
    assert_eq!(
      FileHeader::parse(&bytes[..FileHeader::SIZE - 1]),
      Err(FormatError::Truncated {
        need: FileHeader::SIZE,
        have: FileHeader::SIZE - 1,
      }),
    );
  }

  #[test]
  fn test_empty_stream_is_rejected() {
    let mut header = sample_header(0);
    header.block_count = 0;
    assert_eq!(
      FileHeader::parse(&encode_header(&header)),
      Err(FormatError::EmptyStream),
    );
  }

  #[test]
  fn test_block_table_parsing() {
    let block = BlockInfo {
      offset: 0,
      compressed_size: 256,
      uncompressed_size: 512,
      checksum: 0x1234_5678,
    };
    let mut bytes = Vec::new();
    for index in 0..3u64 {
      let mut entry = block;
      entry.offset = index * 256;
      bytes.extend_from_slice(&encode_block(&entry));
    }

    let blocks = parse_block_table(&bytes, 3).unwrap();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[2].offset, 512);
    assert_eq!(blocks[0].checksum, 0x1234_5678);
  }

  #[test]
  fn test_oversized_block_is_rejected() {
    let block = BlockInfo {
      offset: 0,
      compressed_size: 16,
      uncompressed_size: MAX_BLOCK_SIZE + 1,
      checksum: 0,
    };
    assert_eq!(
      parse_block_table(&encode_block(&block), 1),
      Err(FormatError::InvalidBlock(0)),
    );
  }

  #[test]
  fn test_stream_info_parse_and_totals() {
    let mut bytes = encode_header(&sample_header(2));
    for index in 0..2u64 {
      bytes.extend_from_slice(&encode_block(&BlockInfo {
        offset: index * 512,
        compressed_size: 512,
        uncompressed_size: 1024,
        checksum: 0x1111_1111 * (index as u32 + 1),
      }));
    }

    let info = StreamInfo::parse(&bytes).unwrap();
    assert_eq!(info.blocks.len(), 2);
    assert_eq!(info.total_uncompressed(), 2048);
    assert_eq!(info.total_compressed(), 1024);
  }

  #[test]
  fn test_stream_info_truncated_block_table() {
    let mut bytes = encode_header(&sample_header(2));
    bytes.extend_from_slice(&encode_block(&BlockInfo {
      offset: 0,
      compressed_size: 512,
      uncompressed_size: 1024,
      checksum: 0,
    }));

    assert_eq!(
      StreamInfo::parse(&bytes),
      Err(FormatError::Truncated {
        need: 2 * BlockInfo::SIZE,
        have: BlockInfo::SIZE,
      }),
    );
  }
}
