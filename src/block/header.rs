use adler32::RollingAdler32;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use super::{BlockName, BlockState};
use crate::{ErrorKind, Result};

const CHECKSUM_SIZE: usize = 4;
const STATE_SIZE: usize = 1;
const RESERVED_SIZE: usize = 3;
const SIZE_FIELD_SIZE: usize = 8;
const NEXT_FIELD_SIZE: usize = 8;

const TAG_FREE: u8 = 0;
const TAG_ALLOCATED: u8 = 1;

/// 後続ブロックが存在しないことを示す`next`フィールドの値.
const NO_NEXT: u64 = u64::MAX;

/// チャンクのバッファ内に書き込まれるブロックヘッダのサイズ(バイト単位).
///
/// 内訳は以下の通り(数値は全てビッグエンディアン):
///
/// - チェックサム(adler32): 4バイト
/// - 状態: 1バイト
/// - 予約領域: 3バイト
/// - 名前: `BlockName::CAPACITY`バイト
/// - ペイロードのサイズ: 8バイト
/// - 次のブロックのオフセット: 8バイト
pub const BLOCK_HEADER_SIZE: usize = CHECKSUM_SIZE
    + STATE_SIZE
    + RESERVED_SIZE
    + BlockName::CAPACITY
    + SIZE_FIELD_SIZE
    + NEXT_FIELD_SIZE;

/// バッファ内に埋め込まれたブロックのメタ情報.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    pub state: BlockState,
    pub name: BlockName,
    pub size: u64,

    /// 次のブロックのヘッダのオフセット.
    pub next: Option<u64>,
}
impl BlockHeader {
    /// `buf`にヘッダを書き込む.
    ///
    /// `buf`の長さは`BLOCK_HEADER_SIZE`と等しい必要がある.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        track_assert_eq!(buf.len(), BLOCK_HEADER_SIZE, ErrorKind::InconsistentState);
        let (checksum, body) = buf.split_at_mut(CHECKSUM_SIZE);
        {
            let mut writer = &mut body[..];
            track_io!(writer.write_u8(self.state_tag()))?;
            track_io!(writer.write_all(&[0; RESERVED_SIZE]))?;
            track_io!(writer.write_all(self.name.as_padded_bytes()))?;
            track_io!(writer.write_u64::<BigEndian>(self.size))?;
            track_io!(writer.write_u64::<BigEndian>(self.next.unwrap_or(NO_NEXT)))?;
        }
        BigEndian::write_u32(checksum, checksum_of(body));
        Ok(())
    }

    /// `buf`からヘッダを読み込む.
    ///
    /// チェックサムが一致しない場合には`ErrorKind::ChunkCorrupted`エラーが返される.
    pub fn read_from(buf: &[u8]) -> Result<Self> {
        track_assert_eq!(buf.len(), BLOCK_HEADER_SIZE, ErrorKind::InvalidInput);
        let mut reader = buf;
        let checksum = track_io!(reader.read_u32::<BigEndian>())?;
        track_assert_eq!(checksum_of(reader), checksum, ErrorKind::ChunkCorrupted);

        let tag = track_io!(reader.read_u8())?;
        let state = match tag {
            TAG_FREE => BlockState::Free,
            TAG_ALLOCATED => BlockState::Allocated,
            _ => track_panic!(ErrorKind::ChunkCorrupted, "Unknown block state tag: {}", tag),
        };

        let mut reserved = [0; RESERVED_SIZE];
        track_io!(reader.read_exact(&mut reserved))?;

        let mut name = [0; BlockName::CAPACITY];
        track_io!(reader.read_exact(&mut name))?;
        let name = track!(BlockName::from_padded_bytes(&name))?;

        let size = track_io!(reader.read_u64::<BigEndian>())?;
        let next = match track_io!(reader.read_u64::<BigEndian>())? {
            NO_NEXT => None,
            offset => Some(offset),
        };
        Ok(BlockHeader {
            state,
            name,
            size,
            next,
        })
    }

    fn state_tag(&self) -> u8 {
        match self.state {
            BlockState::Free => TAG_FREE,
            BlockState::Allocated => TAG_ALLOCATED,
        }
    }
}

fn checksum_of(body: &[u8]) -> u32 {
    let mut adler32 = RollingAdler32::new();
    adler32.update_buffer(body);
    adler32.hash()
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn header_size_is_word_aligned() {
        assert_eq!(BLOCK_HEADER_SIZE, 56);
        assert_eq!(BLOCK_HEADER_SIZE % 8, 0);
    }

    #[test]
    fn read_write_works() -> TestResult {
        let headers = vec![
            BlockHeader {
                state: BlockState::Free,
                name: BlockName::default(),
                size: 1024 * 1024,
                next: None,
            },
            BlockHeader {
                state: BlockState::Allocated,
                name: BlockName::new("SJOY_1"),
                size: 10,
                next: Some(66),
            },
        ];
        for h0 in headers {
            let mut buf = [0; BLOCK_HEADER_SIZE];
            track!(h0.write_to(&mut buf))?;
            let h1 = track!(BlockHeader::read_from(&buf))?;
            assert_eq!(h1, h0);
        }
        Ok(())
    }

    #[test]
    fn checksum_works() -> TestResult {
        let header = BlockHeader {
            state: BlockState::Allocated,
            name: BlockName::new("foo"),
            size: 10,
            next: None,
        };
        let mut buf = [0; BLOCK_HEADER_SIZE];
        track!(header.write_to(&mut buf))?;
        buf[BLOCK_HEADER_SIZE - 12] += 1; // Tampers the size field

        let e = BlockHeader::read_from(&buf).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::ChunkCorrupted));
        Ok(())
    }

    #[test]
    fn wrong_buffer_size_is_rejected() {
        let header = BlockHeader {
            state: BlockState::Free,
            name: BlockName::default(),
            size: 0,
            next: None,
        };
        let mut buf = [0; BLOCK_HEADER_SIZE - 1];
        assert!(header.write_to(&mut buf).is_err());
        assert!(BlockHeader::read_from(&buf).is_err());
    }
}
