//! Table footer: the fixed-layout trailer that makes a table file
//! self-describing.
//!
//! Current format (49 bytes):
//! ```text
//! [checksum_type: 1 byte]
//! [metaindex_handle: varint offset + varint size]
//! [index_handle: varint offset + varint size]
//! [zero padding up to 40 bytes of handle area]
//! [magic: 8 bytes, little-endian]
//! ```
//!
//! Legacy format (48 bytes) lacks the checksum byte and implies CRC32C;
//! decoding upgrades it in memory to the current magic and checksum.

use crate::config::ChecksumType;
use crate::error::{Error, Result};
use crate::table::{LEGACY_TABLE_MAGIC_NUMBER, TABLE_MAGIC_NUMBER};
use crate::util::coding::{decode_varint64, get_fixed64, put_varint64};
use bytes::BufMut;

/// A reference to a contiguous byte range in the table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    /// Offset of the block in the file.
    pub offset: u64,
    /// Size of the block payload in bytes, excluding the trailer.
    pub size: u64,
}

impl BlockHandle {
    /// Maximum encoded length of a handle (two 10-byte varints).
    pub const MAX_ENCODED_LENGTH: usize = 20;

    /// Create a new BlockHandle.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Append the varint encoding to `dst`.
    pub fn encode_to(&self, dst: &mut impl BufMut) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::MAX_ENCODED_LENGTH);
        self.encode_to(&mut buf);
        buf
    }

    /// Decode a handle from the front of `data`, returning it together
    /// with the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (offset, n1) =
            decode_varint64(data).ok_or_else(|| Error::corruption("bad block handle"))?;
        let (size, n2) = decode_varint64(&data[n1..])
            .ok_or_else(|| Error::corruption("bad block handle"))?;
        Ok((Self { offset, size }, n1 + n2))
    }

    /// Get the end offset of the block payload.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }
}

/// Space reserved for the two varint handles in the footer.
const HANDLE_AREA: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH;

/// Fixed trailer at the end of every table file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Checksum algorithm used by the file's block trailers.
    pub checksum: ChecksumType,
    /// Handle to the metaindex block.
    pub metaindex_handle: BlockHandle,
    /// Handle to the index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Encoded length of a current-format footer.
    pub const ENCODED_LENGTH: usize = 1 + HANDLE_AREA + 8;

    /// Encoded length of a legacy-format footer.
    pub const LEGACY_ENCODED_LENGTH: usize = HANDLE_AREA + 8;

    /// Create a new footer in the current format.
    pub fn new(
        checksum: ChecksumType,
        metaindex_handle: BlockHandle,
        index_handle: BlockHandle,
    ) -> Self {
        Self { checksum, metaindex_handle, index_handle }
    }

    /// Encode in the current format (exactly
    /// [`ENCODED_LENGTH`](Self::ENCODED_LENGTH) bytes).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LENGTH);
        buf.push(self.checksum as u8);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(1 + HANDLE_AREA, 0);
        buf.extend_from_slice(&TABLE_MAGIC_NUMBER.to_le_bytes());

        debug_assert_eq!(buf.len(), Self::ENCODED_LENGTH);
        buf
    }

    /// Encode in the legacy format. Only meaningful for files written
    /// with CRC32C checksums.
    pub fn encode_legacy(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEGACY_ENCODED_LENGTH);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(HANDLE_AREA, 0);
        buf.extend_from_slice(&LEGACY_TABLE_MAGIC_NUMBER.to_le_bytes());

        debug_assert_eq!(buf.len(), Self::LEGACY_ENCODED_LENGTH);
        buf
    }

    /// Decode a footer from `input`, the final bytes of the file
    /// (at least [`LEGACY_ENCODED_LENGTH`](Self::LEGACY_ENCODED_LENGTH),
    /// up to [`ENCODED_LENGTH`](Self::ENCODED_LENGTH)).
    ///
    /// Legacy footers are upgraded in memory: the result always carries
    /// the canonical magic and an explicit checksum type.
    pub fn decode(input: &[u8]) -> Result<Self> {
        if input.len() < Self::LEGACY_ENCODED_LENGTH {
            return Err(Error::corruption("file too short to hold a footer"));
        }

        let magic = get_fixed64(input, input.len() - 8).unwrap();
        match magic {
            TABLE_MAGIC_NUMBER => {
                if input.len() < Self::ENCODED_LENGTH {
                    return Err(Error::corruption("truncated footer"));
                }
                let footer = &input[input.len() - Self::ENCODED_LENGTH..];
                let checksum = ChecksumType::from_u8(footer[0]).ok_or_else(|| {
                    Error::invalid_argument(format!("unknown checksum type: {}", footer[0]))
                })?;
                let handles = &footer[1..1 + HANDLE_AREA];
                let (metaindex_handle, n) = BlockHandle::decode(handles)?;
                let (index_handle, _) = BlockHandle::decode(&handles[n..])?;
                Ok(Self { checksum, metaindex_handle, index_handle })
            }
            LEGACY_TABLE_MAGIC_NUMBER => {
                let footer = &input[input.len() - Self::LEGACY_ENCODED_LENGTH..];
                let handles = &footer[..HANDLE_AREA];
                let (metaindex_handle, n) = BlockHandle::decode(handles)?;
                let (index_handle, _) = BlockHandle::decode(&handles[n..])?;
                Ok(Self {
                    checksum: ChecksumType::Crc32c,
                    metaindex_handle,
                    index_handle,
                })
            }
            _ => Err(Error::corruption(format!(
                "not a table file (bad magic number: {:#x})",
                magic
            ))),
        }
    }

    /// The canonical magic number; legacy magics are never surfaced.
    pub fn magic(&self) -> u64 {
        TABLE_MAGIC_NUMBER
    }
}
