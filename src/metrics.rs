//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// [`Chunk`]のメトリクス.
///
/// [`Chunk`]: ../chunk/struct.Chunk.html
#[derive(Debug, Clone)]
pub struct ChunkMetrics {
    pub(crate) capacity_bytes: Gauge,
    pub(crate) allocated_blocks: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) released_blocks: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) split_blocks: Counter,
    pub(crate) coalesced_blocks: Counter,
    pub(crate) nospace_failures: Counter,
    pub(crate) not_found_failures: Counter,
}
impl ChunkMetrics {
    /// チャンクが管理するペイロード領域の容量.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_capacity_bytes <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// ブロックの割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_allocated_blocks_total <COUNTER>
    /// ```
    pub fn allocated_blocks(&self) -> u64 {
        self.allocated_blocks.value() as u64
    }

    /// これまでに割り当てたブロックの容量の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// ブロックの解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_released_blocks_total <COUNTER>
    /// ```
    pub fn released_blocks(&self) -> u64 {
        self.released_blocks.value() as u64
    }

    /// これまでに解放されたブロックの容量の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// 割当時にブロックの分割が行われた回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_split_blocks_total <COUNTER>
    /// ```
    pub fn split_blocks(&self) -> u64 {
        self.split_blocks.value() as u64
    }

    /// 隣接する空きブロックに吸収されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_coalesced_blocks_total <COUNTER>
    /// ```
    pub fn coalesced_blocks(&self) -> u64 {
        self.coalesced_blocks.value() as u64
    }

    /// 空き容量不足による割当の失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// 解放対象のブロックが見つからなかった回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_not_found_failures_total <COUNTER>
    /// ```
    pub fn not_found_failures(&self) -> u64 {
        self.not_found_failures.value() as u64
    }

    /// 現在割当中のブロックの容量の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// ceit_chunk_allocated_bytes_total - ceit_chunk_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    pub(crate) fn new(builder: &MetricBuilder, capacity_bytes: usize) -> Self {
        let mut builder = builder.clone();
        builder.namespace("ceit").subsystem("chunk");
        let metrics = ChunkMetrics {
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Payload capacity of the chunk")
                .finish()
                .expect("Never fails"),
            allocated_blocks: builder
                .counter("allocated_blocks_total")
                .help("Number of allocated blocks")
                .finish()
                .expect("Never fails"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated bytes")
                .finish()
                .expect("Never fails"),
            released_blocks: builder
                .counter("released_blocks_total")
                .help("Number of released blocks")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released bytes")
                .finish()
                .expect("Never fails"),
            split_blocks: builder
                .counter("split_blocks_total")
                .help("Number of free blocks split by allocations")
                .finish()
                .expect("Never fails"),
            coalesced_blocks: builder
                .counter("coalesced_blocks_total")
                .help("Number of blocks absorbed into an adjacent free block")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of allocation failures caused by no available space")
                .finish()
                .expect("Never fails"),
            not_found_failures: builder
                .counter("not_found_failures_total")
                .help("Number of releases which did not find the target block")
                .finish()
                .expect("Never fails"),
        };
        metrics.capacity_bytes.set(capacity_bytes as f64);
        metrics
    }

    pub(crate) fn count_allocation(&self, size: usize) {
        self.allocated_blocks.increment();
        self.allocated_bytes.add_u64(size as u64);
    }

    pub(crate) fn count_releasion(&self, size: usize) {
        self.released_blocks.increment();
        self.released_bytes.add_u64(size as u64);
    }
}
