//! 複数のチャンクを束ねて、一括破棄するためのレジストリ.
//!
//! チャンクは生成されただけではレジストリに登録されない.
//! 一括破棄の対象としたいチャンクは、[`Registry::register`]で明示的に登録するか、
//! [`Registry::create_chunk`]を用いて生成と登録を同時に行う必要がある.
//!
//! [`Registry::register`]: ./struct.Registry.html#method.register
//! [`Registry::create_chunk`]: ./struct.Registry.html#method.create_chunk
use slog::Logger;
use std::slice;
use uuid::Uuid;

use crate::chunk::{Chunk, ChunkBuilder};
use crate::{ErrorKind, Result};

/// レジストリ内でチャンクを識別するためのID.
///
/// [`Chunk::id`](../chunk/struct.Chunk.html#method.id)と同じ値.
pub type ChunkId = Uuid;

/// チャンク群のレジストリ.
///
/// レジストリがドロップされた場合には、登録されている全てのチャンクが破棄される.
///
/// # Examples
///
/// ```
/// use ceit::Registry;
///
/// let mut registry = Registry::new();
/// let id = registry.create_chunk("foo", 1024).unwrap();
/// let chunk = registry.get_mut(id).unwrap();
/// chunk.allocate(10, "bar").unwrap();
///
/// assert_eq!(registry.clear_all(), 1);
/// assert!(registry.is_empty());
/// ```
#[derive(Debug)]
pub struct Registry {
    builder: ChunkBuilder,
    chunks: Vec<Chunk>,
    logger: Logger,
}
impl Registry {
    /// デフォルト設定で、空のレジストリを生成する.
    pub fn new() -> Self {
        Self::with_builder(ChunkBuilder::new())
    }

    /// `create_chunk`で使用するビルダを指定して、空のレジストリを生成する.
    ///
    /// レジストリ自身のログも、ビルダに設定されたloggerに出力される.
    pub fn with_builder(builder: ChunkBuilder) -> Self {
        let logger = builder.logger.clone();
        Registry {
            builder,
            chunks: Vec::new(),
            logger,
        }
    }

    /// レジストリのビルダを使ってチャンクを生成し、そのまま登録する.
    pub fn create_chunk(&mut self, name: &str, total_size: usize) -> Result<ChunkId> {
        let chunk = track!(self.builder.create(name, total_size))?;
        track!(self.register(chunk))
    }

    /// チャンクを登録する.
    ///
    /// # Errors
    ///
    /// 同じIDのチャンクが既に登録されている場合には`ErrorKind::InvalidInput`エラーが返される.
    pub fn register(&mut self, chunk: Chunk) -> Result<ChunkId> {
        let id = chunk.id();
        track_assert!(
            self.get(id).is_none(),
            ErrorKind::InvalidInput,
            "Duplicate chunk: {}",
            id
        );
        debug!(self.logger, "Chunk registered";
               "id" => id.to_string(), "chunk" => chunk.name().as_str());
        self.chunks.push(chunk);
        Ok(id)
    }

    /// チャンクの登録を解除して、その所有権を返す.
    ///
    /// 該当するチャンクが存在しない場合には`None`が返される.
    pub fn unregister(&mut self, id: ChunkId) -> Option<Chunk> {
        let i = self.chunks.iter().position(|c| c.id() == id)?;
        Some(self.chunks.remove(i))
    }

    /// 指定IDのチャンクへの参照を返す.
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id() == id)
    }

    /// 指定IDのチャンクへの可変参照を返す.
    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.chunks.iter_mut().find(|c| c.id() == id)
    }

    /// 登録されているチャンク群を、登録順に走査するイテレータを返す.
    pub fn iter(&self) -> slice::Iter<Chunk> {
        self.chunks.iter()
    }

    /// 登録されているチャンクの数を返す.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// レジストリが空かどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 登録されている全てのチャンクを、登録順に破棄する.
    ///
    /// 破棄したチャンクの数が返される.
    /// 呼び出し後のレジストリは空になる.
    pub fn clear_all(&mut self) -> usize {
        let count = self.chunks.len();
        let mut live_blocks = 0;
        for chunk in self.chunks.drain(..) {
            live_blocks += chunk.destroy();
        }
        if count > 0 {
            info!(self.logger, "All chunks destroyed";
                  "chunks" => count, "live_blocks" => live_blocks);
        }
        count
    }
}
impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
impl Drop for Registry {
    fn drop(&mut self) {
        self.clear_all();
    }
}
impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Chunk;
    type IntoIter = slice::Iter<'a, Chunk>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
