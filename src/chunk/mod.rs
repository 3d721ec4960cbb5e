//! ブロック群を切り出すためのメモリ領域(チャンク).
//!
//! チャンクは、生成時に確保した一つの連続したバッファを保持し、
//! その内部をブロック群に分割して利用者に割り当てる.
//!
//! 個々のブロックの割当・解放によって上流のアロケータが呼び出されることはなく、
//! チャンクが破棄される際に、バッファがまとめて解放される.
use slog::Logger;
use std::fmt;
use std::ops::Range;
use uuid::Uuid;

pub use self::builder::ChunkBuilder;

use self::allocator::BlockChain;
use self::buffer::ChunkBuffer;
use crate::block::{
    BlockHandle, BlockHeader, BlockInfo, BlockName, BlockState, BLOCK_HEADER_SIZE,
};
use crate::metrics::ChunkMetrics;
use crate::{ErrorKind, Result};

mod allocator;
mod buffer;
mod builder;

/// 名前付きブロック群を切り出すためのメモリ領域.
///
/// # 不変条件
///
/// 各操作の完了後には、常に以下が成立する:
///
/// - `used_memory() + free_memory() == total_size()`
/// - ブロック群はバッファ内でアドレス順に隙間なく並んでいる
///
/// # スレッドセーフティ
///
/// 状態を変更する操作は全て`&mut self`を要求するため、
/// 同一チャンクへの並行アクセスは利用者側で直列化する必要がある.
#[derive(Debug)]
pub struct Chunk {
    id: Uuid,
    instance: Uuid,
    name: BlockName,
    total_size: usize,
    used_memory: usize,
    free_memory: usize,
    buffer: ChunkBuffer,
    blocks: BlockChain,
    logger: Logger,
    metrics: ChunkMetrics,
}
impl Chunk {
    pub(crate) fn new(
        id: Uuid,
        name: BlockName,
        total_size: usize,
        buffer: ChunkBuffer,
        logger: Logger,
        metrics: ChunkMetrics,
    ) -> Result<Self> {
        let mut chunk = Chunk {
            id,
            instance: Uuid::new_v4(),
            name,
            total_size,
            used_memory: 0,
            free_memory: total_size,
            buffer,
            blocks: BlockChain::new(total_size),
            logger,
            metrics,
        };
        track!(chunk.sync_header(0))?;
        Ok(chunk)
    }

    /// デフォルト設定で、新規にチャンクを生成する.
    ///
    /// 詳細は[`ChunkBuilder::create`]を参照のこと.
    ///
    /// [`ChunkBuilder::create`]: ./struct.ChunkBuilder.html#method.create
    pub fn create(name: &str, total_size: usize) -> Result<Self> {
        track!(ChunkBuilder::new().create(name, total_size))
    }

    /// チャンクのIDを返す.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// チャンクの名前を返す.
    pub fn name(&self) -> &BlockName {
        &self.name
    }

    /// チャンクが管理するペイロード領域の容量を返す.
    ///
    /// この値は生成時に決定され、以後変化することはない.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// 割当中のブロックの容量の合計を返す.
    pub fn used_memory(&self) -> usize {
        self.used_memory
    }

    /// `total_size() - used_memory()`を返す.
    ///
    /// ブロックヘッダ分の領域も含まれるため、
    /// 一度に割当可能なサイズの最大値とは必ずしも一致しない.
    pub fn free_memory(&self) -> usize {
        self.free_memory
    }

    /// チャンクのメトリクスを返す.
    pub fn metrics(&self) -> &ChunkMetrics {
        &self.metrics
    }

    /// チャンク内のブロックの数を返す.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// チャンク内の空きブロックの数を返す.
    pub fn free_block_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|(_, node)| node.state.is_free())
            .count()
    }

    /// ブロック群の情報を、アドレス順に走査するイテレータを返す.
    pub fn blocks(&self) -> Blocks {
        Blocks {
            chunk: self,
            inner: self.blocks.iter(),
        }
    }

    /// 指定されたハンドルのブロックの情報を返す.
    pub fn block(&self, handle: BlockHandle) -> Result<BlockInfo> {
        let slot = track!(self.resolve(handle))?;
        Ok(self.block_info(slot))
    }

    /// チャンクの状態の要約を返す.
    pub fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            id: self.id,
            name: self.name,
            total_size: self.total_size,
            used_memory: self.used_memory,
            free_memory: self.free_memory,
            block_count: self.block_count(),
            free_block_count: self.free_block_count(),
        }
    }

    /// `size`バイトのブロックを割り当てる.
    ///
    /// 要求サイズを満たす空きブロックの中で、容量が最小のものが選択される("BestFit").
    ///
    /// 選択されたブロックの余剰分がブロックヘッダ一つ分よりも大きい場合には、
    /// 余剰分は新しい空きブロックとして分割される.
    /// そうではない場合には、要求よりも僅かに大きなブロックがそのまま割り当てられる.
    ///
    /// `name`は`BlockName::CAPACITY`に収まるように切り詰められる.
    ///
    /// # Errors
    ///
    /// - `size`が`0`の場合には`ErrorKind::InvalidInput`
    /// - 要求を満たす空きブロックが存在しない場合には`ErrorKind::ChunkFull`
    ///
    /// # Examples
    ///
    /// ```
    /// use ceit::{Chunk, ErrorKind};
    ///
    /// let mut chunk = Chunk::create("foo", 1024).unwrap();
    /// let block = chunk.allocate(100, "bar").unwrap();
    /// assert_eq!(chunk.block(block).unwrap().size, 100);
    /// assert_eq!(chunk.used_memory(), 100);
    ///
    /// let e = chunk.allocate(1024, "baz").err().map(|e| *e.kind());
    /// assert_eq!(e, Some(ErrorKind::ChunkFull));
    /// ```
    pub fn allocate(&mut self, size: usize, name: &str) -> Result<BlockHandle> {
        track_assert_ne!(size, 0, ErrorKind::InvalidInput);

        let slot = match self.blocks.find_best_fit(size) {
            Some(slot) => slot,
            None => {
                self.metrics.nospace_failures.increment();
                warn!(self.logger, "No free block is large enough";
                      "size" => size, "free_memory" => self.free_memory);
                track_panic!(ErrorKind::ChunkFull, "size={}", size);
            }
        };

        if let Some(remainder) = self.blocks.split(slot, size) {
            self.metrics.split_blocks.increment();
            track!(self.sync_header(remainder))?;
        }
        let name = BlockName::new(name);
        let generation = self.blocks.mark_allocated(slot, name);
        track!(self.sync_header(slot))?;

        let capacity = self.blocks.node(slot).size;
        self.used_memory += capacity;
        self.free_memory -= capacity;
        self.metrics.count_allocation(capacity);
        debug!(self.logger, "Block allocated";
               "block" => name.as_str(), "size" => size, "capacity" => capacity,
               "offset" => self.blocks.node(slot).offset);

        Ok(BlockHandle::new(self.id, self.instance, slot, generation))
    }

    /// 指定されたハンドルのブロックを解放し、隣接する空きブロック群を結合する.
    ///
    /// 解放されたブロックの容量が返される.
    /// 以後、`handle`は無効となる.
    ///
    /// # Errors
    ///
    /// - 解放済みのブロックのハンドルが指定された場合には`ErrorKind::BlockNotFound`
    /// - 別のチャンクのハンドルが指定された場合には`ErrorKind::InvalidInput`
    pub fn release(&mut self, handle: BlockHandle) -> Result<usize> {
        let slot = match self.resolve(handle) {
            Ok(slot) => slot,
            Err(e) => {
                if *e.kind() == ErrorKind::BlockNotFound {
                    self.metrics.not_found_failures.increment();
                }
                return Err(track!(e));
            }
        };
        let size = track!(self.release_slot(slot))?;
        track!(self.coalesce())?;
        Ok(size)
    }

    /// 指定された名前を持つ割当済みブロックの中で、先頭に一番近いものを解放する.
    ///
    /// 名前の比較は、`name`を`BlockName::CAPACITY`に収まるように切り詰めた上で行われる.
    ///
    /// 対象ブロックが見つかったかどうかに関わらず、最後にチャンク全体の空きブロックの結合処理が行われる.
    ///
    /// 解放されたブロックの容量が返される.
    ///
    /// # Errors
    ///
    /// 該当するブロックが存在しない場合には`ErrorKind::BlockNotFound`エラーが返される.
    /// この場合、`used_memory()`と`free_memory()`は変化しない.
    pub fn release_by_name(&mut self, name: &str) -> Result<usize> {
        let name = BlockName::new(name);
        let released = match self.blocks.find_allocated_by_name(&name) {
            Some(slot) => Some(track!(self.release_slot(slot))?),
            None => None,
        };
        track!(self.coalesce())?;

        if let Some(size) = released {
            Ok(size)
        } else {
            self.metrics.not_found_failures.increment();
            debug!(self.logger, "No allocated block has the name"; "block" => name.as_str());
            track_panic!(ErrorKind::BlockNotFound, "name={:?}", name.as_str());
        }
    }

    /// `data`をブロックのペイロードの先頭に書き込む.
    ///
    /// `data`が空の場合には何も行われない.
    ///
    /// # Errors
    ///
    /// `data`の長さがブロックの容量を超えている場合には`ErrorKind::OutOfBounds`エラーが返される.
    /// この場合、書き込みは一切行われない.
    pub fn write(&mut self, handle: BlockHandle, data: &[u8]) -> Result<()> {
        track!(self.write_at(handle, 0, data))
    }

    /// `data`をブロックのペイロードの`offset`位置に書き込む.
    pub fn write_at(&mut self, handle: BlockHandle, offset: usize, data: &[u8]) -> Result<()> {
        let slot = track!(self.resolve(handle))?;
        let range = track!(self.payload_range(slot, offset, data.len()))?;
        self.buffer[range].copy_from_slice(data);
        Ok(())
    }

    /// NUL終端された文字列としてテキストを書き込む.
    ///
    /// 書き込まれるのは`text`の最初のNUL文字の手前までと、終端のNUL文字一つである.
    /// 書き込んだバイト数(終端文字込み)が返される.
    ///
    /// # Errors
    ///
    /// 終端文字込みの長さがブロックの容量を超えている場合には`ErrorKind::OutOfBounds`エラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use ceit::Chunk;
    ///
    /// let mut chunk = Chunk::create("foo", 1024).unwrap();
    /// let block = chunk.allocate(10, "bar").unwrap();
    /// assert_eq!(chunk.write_text(block, "HI0099").unwrap(), 7);
    /// assert_eq!(&chunk.payload(block).unwrap()[..7], b"HI0099\0");
    /// ```
    pub fn write_text(&mut self, handle: BlockHandle, text: &str) -> Result<usize> {
        let text = text.split('\0').next().unwrap_or("").as_bytes();
        let slot = track!(self.resolve(handle))?;
        let range = track!(self.payload_range(slot, 0, text.len() + 1))?;
        let (body, terminator) = self.buffer[range].split_at_mut(text.len());
        body.copy_from_slice(text);
        terminator[0] = 0;
        Ok(text.len() + 1)
    }

    /// ブロックのペイロードの先頭から`buf.len()`バイトを読み込む.
    ///
    /// # Errors
    ///
    /// `buf`の長さがブロックの容量を超えている場合には`ErrorKind::OutOfBounds`エラーが返される.
    pub fn read(&self, handle: BlockHandle, buf: &mut [u8]) -> Result<()> {
        track!(self.read_at(handle, 0, buf))
    }

    /// ブロックのペイロードの`offset`位置から`buf.len()`バイトを読み込む.
    pub fn read_at(&self, handle: BlockHandle, offset: usize, buf: &mut [u8]) -> Result<()> {
        let slot = track!(self.resolve(handle))?;
        let range = track!(self.payload_range(slot, offset, buf.len()))?;
        buf.copy_from_slice(&self.buffer[range]);
        Ok(())
    }

    /// ブロックのペイロード全体を返す.
    ///
    /// 一度も書き込まれていない部分の内容は未規定.
    pub fn payload(&self, handle: BlockHandle) -> Result<&[u8]> {
        let slot = track!(self.resolve(handle))?;
        let range = track!(self.payload_range(slot, 0, self.blocks.node(slot).size))?;
        Ok(&self.buffer[range])
    }

    /// ブロックのペイロード全体を、変更可能な形で返す.
    pub fn payload_mut(&mut self, handle: BlockHandle) -> Result<&mut [u8]> {
        let slot = track!(self.resolve(handle))?;
        let range = track!(self.payload_range(slot, 0, self.blocks.node(slot).size))?;
        Ok(&mut self.buffer[range])
    }

    /// バッファに書き込まれているブロックヘッダ群と、チャンクの状態の整合性を検証する.
    ///
    /// 以下の項目が検査される:
    ///
    /// - 各ヘッダのチェックサム
    /// - 各ヘッダの内容と、チャンクが管理しているブロックの情報の一致
    /// - ブロック群がバッファの先頭から終端までを隙間なく覆っていること
    /// - `used_memory() + free_memory() == total_size()`、および`used_memory()`が割当中のブロックの容量の合計に等しいこと
    ///
    /// # Errors
    ///
    /// - ヘッダが壊れている場合には`ErrorKind::ChunkCorrupted`
    /// - それ以外の不整合が検出された場合には`ErrorKind::InconsistentState`
    pub fn check_integrity(&self) -> Result<()> {
        let mut expected_offset = 0;
        let mut used = 0;
        for (slot, node) in self.blocks.iter() {
            track_assert_eq!(node.offset, expected_offset, ErrorKind::InconsistentState);
            track_assert!(
                node.end() <= self.buffer.len(),
                ErrorKind::InconsistentState,
                "offset={}, size={}",
                node.offset,
                node.size
            );

            let range = node.offset..node.payload_offset();
            let header = track!(BlockHeader::read_from(&self.buffer[range]))?;
            track_assert_eq!(
                header,
                self.blocks.header(slot),
                ErrorKind::ChunkCorrupted,
                "offset={}",
                node.offset
            );
            let expected_next = if node.end() == self.buffer.len() {
                None
            } else {
                Some(node.end() as u64)
            };
            track_assert_eq!(header.next, expected_next, ErrorKind::ChunkCorrupted);

            if node.state == BlockState::Allocated {
                used += node.size;
            }
            expected_offset = node.end();
        }
        track_assert_eq!(expected_offset, self.buffer.len(), ErrorKind::InconsistentState);
        track_assert_eq!(used, self.used_memory, ErrorKind::InconsistentState);
        track_assert_eq!(
            self.used_memory + self.free_memory,
            self.total_size,
            ErrorKind::InconsistentState
        );
        Ok(())
    }

    /// チャンクを破棄する.
    ///
    /// バッファはブロックの状態に関わらずまとめて解放されるため、事前に各ブロックを解放しておく必要はない.
    ///
    /// 破棄時点で割当中だったブロックの数が返される.
    pub fn destroy(self) -> usize {
        let live_blocks = self
            .blocks
            .iter()
            .filter(|(_, node)| !node.state.is_free())
            .count();
        if live_blocks > 0 {
            warn!(self.logger, "Chunk destroyed with live allocations";
                  "live_blocks" => live_blocks, "used_memory" => self.used_memory);
        } else {
            info!(self.logger, "Chunk destroyed");
        }
        live_blocks
    }

    fn resolve(&self, handle: BlockHandle) -> Result<usize> {
        track_assert_eq!(
            handle.instance(),
            self.instance,
            ErrorKind::InvalidInput,
            "The handle was issued by another chunk"
        );
        let slot = track_assert_some!(
            self.blocks.allocated_slot(handle.slot(), handle.generation()),
            ErrorKind::BlockNotFound,
            "Stale block handle: {:?}",
            handle
        );
        Ok(slot)
    }

    fn payload_range(&self, slot: usize, offset: usize, len: usize) -> Result<Range<usize>> {
        let node = self.blocks.node(slot);
        let end = track_assert_some!(offset.checked_add(len), ErrorKind::OutOfBounds);
        track_assert!(
            end <= node.size,
            ErrorKind::OutOfBounds,
            "offset={}, len={}, capacity={}",
            offset,
            len,
            node.size
        );
        let start = node.payload_offset() + offset;
        Ok(start..start + len)
    }

    fn release_slot(&mut self, slot: usize) -> Result<usize> {
        let name = self.blocks.node(slot).name;
        let size = self.blocks.mark_free(slot);
        track!(self.sync_header(slot))?;

        self.used_memory -= size;
        self.free_memory += size;
        self.metrics.count_releasion(size);
        debug!(self.logger, "Block released"; "block" => name.as_str(), "capacity" => size);
        Ok(size)
    }

    fn coalesce(&mut self) -> Result<()> {
        let before = self.blocks.len();
        for slot in self.blocks.coalesce() {
            track!(self.sync_header(slot))?;
        }
        let absorbed = before - self.blocks.len();
        if absorbed > 0 {
            self.metrics.coalesced_blocks.add_u64(absorbed as u64);
            debug!(self.logger, "Free blocks coalesced"; "absorbed" => absorbed);
        }
        Ok(())
    }

    fn sync_header(&mut self, slot: usize) -> Result<()> {
        let header = self.blocks.header(slot);
        let offset = self.blocks.node(slot).offset;
        track!(header.write_to(&mut self.buffer[offset..offset + BLOCK_HEADER_SIZE]))
    }

    fn block_info(&self, slot: usize) -> BlockInfo {
        let node = self.blocks.node(slot);
        let handle = if node.state.is_free() {
            None
        } else {
            Some(BlockHandle::new(
                self.id,
                self.instance,
                slot,
                self.blocks.generation(slot),
            ))
        };
        BlockInfo {
            name: node.name,
            offset: node.offset,
            size: node.size,
            state: node.state,
            handle,
        }
    }
}

/// チャンク内のブロック群の情報を、アドレス順に走査するイテレータ.
#[derive(Debug)]
pub struct Blocks<'a> {
    chunk: &'a Chunk,
    inner: allocator::Iter<'a>,
}
impl<'a> Iterator for Blocks<'a> {
    type Item = BlockInfo;
    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunk;
        self.inner.next().map(|(slot, _)| chunk.block_info(slot))
    }
}

/// チャンクの状態の要約.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    /// チャンクのID.
    pub id: Uuid,

    /// チャンクの名前.
    pub name: BlockName,

    /// ペイロード領域の容量.
    pub total_size: usize,

    /// 割当中のブロックの容量の合計.
    pub used_memory: usize,

    /// `total_size - used_memory`.
    pub free_memory: usize,

    /// ブロックの数.
    pub block_count: usize,

    /// 空きブロックの数.
    pub free_block_count: usize,
}
impl fmt::Display for ChunkSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Memchunk: {}, Id: {}, Total Size: {}, Used Memory: {}, Free Memory: {}, Blocks: {} ({} free)",
            self.name,
            self.id,
            self.total_size,
            self.used_memory,
            self.free_memory,
            self.block_count,
            self.free_block_count
        )
    }
}
