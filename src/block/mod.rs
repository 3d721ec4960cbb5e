//! チャンク内のブロック(割当の単位)関連の構成要素.
//!
//! 各ブロックは、チャンクのバッファ内で「固定長のヘッダ」と「可変長のペイロード」の並びとして表現される:
//!
//! ```text
//! offset                     offset + BLOCK_HEADER_SIZE             + size
//!   |-- BlockHeader (56 bytes) --|----------- payload (size bytes) -----|-- next header ...
//! ```
//!
//! ブロックは常にアドレス順に隙間なく並んでおり、
//! あるブロックの次のブロックのオフセットは `offset + BLOCK_HEADER_SIZE + size` に一致する.
use std::fmt;
use uuid::Uuid;

pub use self::header::BLOCK_HEADER_SIZE;
pub use self::name::BlockName;

pub(crate) use self::header::BlockHeader;

mod header;
mod name;

/// ブロックの状態.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// 空き(割当可能).
    Free,

    /// 割当済み.
    Allocated,
}
impl BlockState {
    /// 空き状態かどうかを判定する.
    pub fn is_free(self) -> bool {
        self == BlockState::Free
    }
}

/// 割当済みブロックを識別するためのハンドル.
///
/// `Chunk::allocate`の結果として返され、ペイロードの読み書きや解放時のキーとして使用される.
///
/// ハンドルは発行元のチャンク内でのみ有効であり、対象ブロックが解放されると無効(stale)になる.
/// 無効なハンドルを使用した操作は`ErrorKind::BlockNotFound`エラーとなるため、
/// 二重解放はエラーとして検出可能.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    chunk_id: Uuid,
    instance: Uuid,
    slot: usize,
    generation: u32,
}
impl BlockHandle {
    pub(crate) fn new(chunk_id: Uuid, instance: Uuid, slot: usize, generation: u32) -> Self {
        BlockHandle {
            chunk_id,
            instance,
            slot,
            generation,
        }
    }

    /// ハンドルを発行したチャンクのIDを返す.
    pub fn chunk_id(&self) -> Uuid {
        self.chunk_id
    }

    /// 発行元のチャンクインスタンスに固有の値.
    ///
    /// `chunk_id`は利用者が指定可能なため、ハンドルの所有者の判定にはこちらを用いる.
    pub(crate) fn instance(&self) -> Uuid {
        self.instance
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

/// ブロックの情報(スナップショット).
///
/// `Chunk::blocks`や`Chunk::block`経由で取得する.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// ブロック名.
    pub name: BlockName,

    /// チャンクのバッファ内でのヘッダの開始位置(バイト単位).
    pub offset: usize,

    /// ペイロードの容量(バイト単位).
    ///
    /// ヘッダのサイズは含まない.
    pub size: usize,

    /// ブロックの状態.
    pub state: BlockState,

    /// 割当済みの場合には、そのブロックのハンドル.
    pub handle: Option<BlockHandle>,
}
impl BlockInfo {
    /// 空きブロックかどうかを判定する.
    pub fn is_free(&self) -> bool {
        self.state.is_free()
    }

    /// ペイロードの開始位置を返す.
    pub fn payload_offset(&self) -> usize {
        self.offset + BLOCK_HEADER_SIZE
    }

    /// ブロックの終端位置(i.e., 次のブロックのヘッダの開始位置)を返す.
    pub fn end(&self) -> usize {
        self.payload_offset() + self.size
    }
}
impl fmt::Display for BlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Memory Block: {}, Offset: {}, Size: {}, Is Free: {}",
            self.name,
            self.offset,
            self.size,
            self.is_free() as u8
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn handle_keeps_large_slot_numbers() {
        let slot = u32::MAX as usize + 1;
        let handle = BlockHandle::new(Uuid::new_v4(), Uuid::new_v4(), slot, 3);
        assert_eq!(handle.slot(), slot);
        assert_eq!(handle.generation(), 3);
    }

    #[test]
    fn block_info_works() {
        let info = BlockInfo {
            name: BlockName::new("foo"),
            offset: 100,
            size: 10,
            state: BlockState::Allocated,
            handle: None,
        };
        assert!(!info.is_free());
        assert_eq!(info.payload_offset(), 100 + BLOCK_HEADER_SIZE);
        assert_eq!(info.end(), 110 + BLOCK_HEADER_SIZE);
        assert_eq!(
            info.to_string(),
            "Memory Block: foo, Offset: 100, Size: 10, Is Free: 0"
        );
    }
}
