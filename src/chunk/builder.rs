use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use uuid::Uuid;

use super::buffer::ChunkBuffer;
use super::Chunk;
use crate::block::{BlockName, BLOCK_HEADER_SIZE};
use crate::metrics::ChunkMetrics;
use crate::{ErrorKind, Result};

/// `Chunk`のビルダ.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    pub(crate) logger: Logger,
    pub(crate) metrics: MetricBuilder,
    pub(crate) instance_uuid: Option<Uuid>,
}
impl ChunkBuilder {
    /// デフォルト設定で`ChunkBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        ChunkBuilder {
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
            instance_uuid: None,
        }
    }

    /// チャンク用の logger を登録する.
    ///
    /// 生成されたチャンクは、このloggerにチャンク名とIDを付与した子loggerを使用する.
    ///
    /// デフォルト値は`Logger::root(Discard, o!())`.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// チャンクインスタンスを識別するためのUUIDを設定する.
    ///
    /// 本メソッドが呼ばれていない場合は、チャンクの生成毎にランダムなUUIDが割り当てられる.
    pub fn instance_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.instance_uuid = Some(uuid);
        self
    }

    /// 新規にチャンクを生成する.
    ///
    /// 上流のアロケータから`total_size + BLOCK_HEADER_SIZE`バイトのバッファを確保し、
    /// ペイロード領域全体を覆う一つの空きブロックを配置する.
    ///
    /// # Errors
    ///
    /// - バッファのサイズが`usize`で表現できない場合には`ErrorKind::InvalidInput`
    /// - バッファの確保に失敗した場合には`ErrorKind::OutOfMemory`
    pub fn create(&self, name: &str, total_size: usize) -> Result<Chunk> {
        let buffer_size = track_assert_some!(
            total_size.checked_add(BLOCK_HEADER_SIZE),
            ErrorKind::InvalidInput,
            "Too large chunk: {}",
            total_size
        );
        let buffer = track!(ChunkBuffer::reserve(buffer_size))?;

        let id = self.instance_uuid.unwrap_or_else(Uuid::new_v4);
        let name = BlockName::new(name);
        let logger = self.logger.new(o!(
            "chunk" => name.to_string(),
            "id" => id.to_string()
        ));
        let metrics = ChunkMetrics::new(&self.metrics, total_size);
        let chunk = track!(Chunk::new(id, name, total_size, buffer, logger, metrics))?;
        info!(chunk.logger, "Chunk created"; "total_size" => total_size);
        Ok(chunk)
    }
}
impl Default for ChunkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn create_works() -> TestResult {
        let uuid = Uuid::new_v4();
        let chunk = track!(ChunkBuilder::new().instance_uuid(uuid).create("joyc", 1024))?;
        assert_eq!(chunk.id(), uuid);
        assert_eq!(chunk.name(), "joyc");
        assert_eq!(chunk.total_size(), 1024);
        assert_eq!(chunk.used_memory(), 0);
        assert_eq!(chunk.free_memory(), 1024);
        assert_eq!(chunk.block_count(), 1);
        assert_eq!(chunk.metrics().capacity_bytes(), 1024);
        Ok(())
    }

    #[test]
    fn random_ids_are_assigned() -> TestResult {
        let builder = ChunkBuilder::new();
        let a = track!(builder.create("a", 10))?;
        let b = track!(builder.create("b", 10))?;
        assert_ne!(a.id(), b.id());
        Ok(())
    }

    #[test]
    fn too_large_chunk_is_rejected() {
        let builder = ChunkBuilder::new();

        let e = builder.create("huge", usize::MAX).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let e = builder
            .create("huge", usize::MAX - BLOCK_HEADER_SIZE)
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::OutOfMemory));
    }
}
