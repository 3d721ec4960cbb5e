//! Block Chain.
use crate::block::{BlockHeader, BlockName, BlockState, BLOCK_HEADER_SIZE};

/// チェイン内の一つのブロックを表現するノード.
#[derive(Debug, Clone)]
pub(crate) struct BlockNode {
    /// バッファ内でのヘッダの開始位置.
    pub offset: usize,

    /// ペイロードの容量.
    pub size: usize,

    pub state: BlockState,
    pub name: BlockName,

    /// 次のブロックのスロット番号.
    pub next: Option<usize>,
}
impl BlockNode {
    pub fn payload_offset(&self) -> usize {
        self.offset + BLOCK_HEADER_SIZE
    }

    pub fn end(&self) -> usize {
        self.payload_offset() + self.size
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<BlockNode>,
}

/// チャンク内のブロック群を、アドレス順の単方向リストとして管理するための構造体.
///
/// ノードはポインタではなくスロット番号で互いを参照しており、
/// 全てのノードはこの構造体が所有するアリーナ(`Vec`)上に置かれている.
/// 結合によって不要になったスロットは、以後の分割時に再利用される.
///
/// 各スロットは世代番号を保持しており、ブロックの解放や結合の度に世代が進む.
/// これによって、解放済みのブロックを指す古いハンドルを検出可能となっている.
///
/// この構造体が担当するのは、ブロック群の配置の計算のみで、
/// 実際のバッファの読み書き等を、この中で行うことは無い.
///
/// # 割当戦略
///
/// "BestFit"戦略を採用している.
///
/// 新規割当要求が発行された際には、チェイン全体を先頭から一度だけ走査し、
/// 要求サイズを満たす空きブロックの中で、一番容量が小さいものが選択される.
/// 容量が等しいものが複数ある場合には、先頭に近い(i.e., アドレスが小さい)ものが優先される.
///
/// 選択されたブロックの余剰分が、ヘッダ一つ分よりも大きい場合には、
/// 余剰分は新しい空きブロックとして切り出される.
#[derive(Debug)]
pub(crate) struct BlockChain {
    slots: Vec<Slot>,
    vacant_slots: Vec<usize>,
    head: usize,
    len: usize,
}
impl BlockChain {
    /// `capacity`分の容量を持つ空きブロックを一つだけ含むチェインを生成する.
    pub fn new(capacity: usize) -> Self {
        let node = BlockNode {
            offset: 0,
            size: capacity,
            state: BlockState::Free,
            name: BlockName::default(),
            next: None,
        };
        BlockChain {
            slots: vec![Slot {
                generation: 0,
                node: Some(node),
            }],
            vacant_slots: Vec::new(),
            head: 0,
            len: 1,
        }
    }

    /// チェイン内のブロックの数を返す.
    pub fn len(&self) -> usize {
        self.len
    }

    /// 指定スロットのノードを返す.
    ///
    /// # Panics
    ///
    /// スロットが空の場合には、現在のスレッドがパニックする.
    pub fn node(&self, slot: usize) -> &BlockNode {
        self.slots[slot].node.as_ref().expect("Never fails")
    }

    /// 指定スロットの現在の世代番号を返す.
    pub fn generation(&self, slot: usize) -> u32 {
        self.slots[slot].generation
    }

    /// 先頭からブロックを順に走査するイテレータを返す.
    pub fn iter(&self) -> Iter {
        Iter {
            chain: self,
            next: Some(self.head),
        }
    }

    /// `slot`と`generation`の組が、割当済みのブロックを指しているかを確認する.
    pub fn allocated_slot(&self, slot: usize, generation: u32) -> Option<usize> {
        let s = self.slots.get(slot)?;
        match s.node {
            Some(ref node) if s.generation == generation && !node.state.is_free() => Some(slot),
            _ => None,
        }
    }

    /// `size`以上の容量を持つ空きブロックの中で最小のものを探す.
    pub fn find_best_fit(&self, size: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (slot, node) in self.iter() {
            if !node.state.is_free() || node.size < size {
                continue;
            }
            if best.map_or(true, |(_, best_size)| node.size < best_size) {
                best = Some((slot, node.size));
            }
        }
        best.map(|(slot, _)| slot)
    }

    /// 指定された名前を持つ割当済みブロックの中で、先頭に一番近いものを探す.
    pub fn find_allocated_by_name(&self, name: &BlockName) -> Option<usize> {
        self.iter()
            .find(|(_, node)| !node.state.is_free() && node.name == *name)
            .map(|(slot, _)| slot)
    }

    /// 空きブロックを、先頭`size`バイトとその残りに分割する.
    ///
    /// 残りの容量がヘッダ一つ分を超えない場合には分割は行われず、`None`が返される.
    /// 分割が行われた場合には、残りの部分を表す新しい空きブロックのスロット番号が返される.
    pub fn split(&mut self, slot: usize, size: usize) -> Option<usize> {
        let (offset, capacity, next) = {
            let node = self.node(slot);
            debug_assert!(node.state.is_free());
            debug_assert!(size <= node.size);
            (node.offset, node.size, node.next)
        };
        if capacity <= size + BLOCK_HEADER_SIZE {
            return None;
        }

        let remainder = BlockNode {
            offset: offset + BLOCK_HEADER_SIZE + size,
            size: capacity - size - BLOCK_HEADER_SIZE,
            state: BlockState::Free,
            name: BlockName::default(),
            next,
        };
        let remainder_slot = self.insert_node(remainder);

        let node = self.node_mut(slot);
        node.size = size;
        node.next = Some(remainder_slot);
        Some(remainder_slot)
    }

    /// ブロックを割当済みにして、その時点の世代番号を返す.
    pub fn mark_allocated(&mut self, slot: usize, name: BlockName) -> u32 {
        let node = self.node_mut(slot);
        debug_assert!(node.state.is_free());
        node.state = BlockState::Allocated;
        node.name = name;
        self.slots[slot].generation
    }

    /// ブロックを空きにして、その容量を返す.
    ///
    /// スロットの世代が進むため、以前に発行されたハンドルは無効となる.
    pub fn mark_free(&mut self, slot: usize) -> usize {
        let size = {
            let node = self.node_mut(slot);
            debug_assert!(!node.state.is_free());
            node.state = BlockState::Free;
            node.size
        };
        self.bump_generation(slot);
        size
    }

    /// 隣接する空きブロック同士を全て結合する.
    ///
    /// 結果として、連続する空きブロックの並びは、それぞれ一つのブロックにまとめられる.
    /// 容量が増加したブロックのスロット番号群が返される.
    pub fn coalesce(&mut self) -> Vec<usize> {
        let mut grown = Vec::new();
        let mut current = Some(self.head);
        while let Some(slot) = current {
            let mut is_grown = false;
            while let Some(next) = self.mergeable_next(slot) {
                let absorbed = self.remove_node(next);
                let node = self.node_mut(slot);
                node.size += BLOCK_HEADER_SIZE + absorbed.size;
                node.next = absorbed.next;
                is_grown = true;
            }
            if is_grown {
                grown.push(slot);
            }
            current = self.node(slot).next;
        }
        grown
    }

    /// バッファに書き込むためのヘッダを生成する.
    pub fn header(&self, slot: usize) -> BlockHeader {
        let node = self.node(slot);
        BlockHeader {
            state: node.state,
            name: node.name,
            size: node.size as u64,
            next: node.next.map(|next| self.node(next).offset as u64),
        }
    }

    fn node_mut(&mut self, slot: usize) -> &mut BlockNode {
        self.slots[slot].node.as_mut().expect("Never fails")
    }

    fn mergeable_next(&self, slot: usize) -> Option<usize> {
        let node = self.node(slot);
        if !node.state.is_free() {
            return None;
        }
        node.next.filter(|&next| self.node(next).state.is_free())
    }

    fn insert_node(&mut self, node: BlockNode) -> usize {
        self.len += 1;
        if let Some(slot) = self.vacant_slots.pop() {
            self.slots[slot].node = Some(node);
            slot
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            self.slots.len() - 1
        }
    }

    fn remove_node(&mut self, slot: usize) -> BlockNode {
        let node = self.slots[slot].node.take().expect("Never fails");
        self.bump_generation(slot);
        self.vacant_slots.push(slot);
        self.len -= 1;
        node
    }

    fn bump_generation(&mut self, slot: usize) {
        let s = &mut self.slots[slot];
        s.generation = s.generation.wrapping_add(1);
    }
}

/// `BlockChain`のブロック群を先頭から走査するためのイテレータ.
#[derive(Debug)]
pub(crate) struct Iter<'a> {
    chain: &'a BlockChain,
    next: Option<usize>,
}
impl<'a> Iterator for Iter<'a> {
    type Item = (usize, &'a BlockNode);
    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        let node = self.chain.node(slot);
        self.next = node.next;
        Some((slot, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: usize = BLOCK_HEADER_SIZE;

    #[test]
    fn it_works() {
        let mut chain = BlockChain::new(1000);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.find_best_fit(1001), None);

        let a = chain.find_best_fit(100).unwrap();
        let rest = chain.split(a, 100).unwrap();
        chain.mark_allocated(a, BlockName::new("a"));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.node(a).size, 100);
        assert_eq!(chain.node(rest).offset, 100 + H);
        assert_eq!(chain.node(rest).size, 1000 - 100 - H);
        assert_eq!(chain.node(a).next, Some(rest));

        assert_eq!(chain.find_allocated_by_name(&BlockName::new("a")), Some(a));
        assert_eq!(chain.find_allocated_by_name(&BlockName::new("b")), None);

        assert_eq!(chain.mark_free(a), 100);
        assert_eq!(chain.find_allocated_by_name(&BlockName::new("a")), None);
        assert_eq!(chain.coalesce(), vec![a]);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.node(a).size, 1000);
        assert_eq!(chain.node(a).next, None);
    }

    #[test]
    fn best_fit_prefers_smallest_and_then_lowest_address() {
        let mut chain = BlockChain::new(10_000);
        let mut slots = Vec::new();
        for &size in &[100, 8, 10, 8, 50, 8, 10, 8] {
            let slot = chain.find_best_fit(size).unwrap();
            chain.split(slot, size);
            chain.mark_allocated(slot, BlockName::new("x"));
            slots.push(slot);
        }
        for &i in &[0, 2, 4, 6] {
            chain.mark_free(slots[i]);
        }

        // 容量が10の空きブロックは二つあるが、アドレスが小さい方が選ばれる
        assert_eq!(chain.find_best_fit(8), Some(slots[2]));
        assert_eq!(chain.find_best_fit(11), Some(slots[4]));
        assert_eq!(chain.find_best_fit(51), Some(slots[0]));
    }

    #[test]
    fn split_threshold() {
        let size = 10;

        let mut chain = BlockChain::new(size + H + 1);
        let rest = chain.split(0, size).unwrap();
        assert_eq!(chain.node(0).size, size);
        assert_eq!(chain.node(rest).size, 1);

        let mut chain = BlockChain::new(size + H);
        assert_eq!(chain.split(0, size), None);
        assert_eq!(chain.node(0).size, size + H);

        let mut chain = BlockChain::new(size + H - 1);
        assert_eq!(chain.split(0, size), None);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn coalesce_merges_whole_runs() {
        let mut chain = BlockChain::new(1000);
        let mut slots = Vec::new();
        for _ in 0..4 {
            let slot = chain.find_best_fit(10).unwrap();
            chain.split(slot, 10);
            chain.mark_allocated(slot, BlockName::new("x"));
            slots.push(slot);
        }
        assert_eq!(chain.len(), 5);

        chain.mark_free(slots[0]);
        chain.mark_free(slots[1]);
        chain.mark_free(slots[2]);
        assert_eq!(chain.coalesce(), vec![slots[0]]);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.node(slots[0]).size, 10 * 3 + H * 2);
        assert_eq!(chain.node(slots[0]).next, Some(slots[3]));

        // 結合されたスロットは再利用される
        let slot = chain.find_best_fit(5).unwrap();
        assert_eq!(slot, slots[0]);
        let rest = chain.split(slot, 5);
        assert!(rest == Some(slots[1]) || rest == Some(slots[2]));
    }

    #[test]
    fn generation_changes_on_release() {
        let mut chain = BlockChain::new(1000);
        let slot = chain.find_best_fit(10).unwrap();
        chain.split(slot, 10);
        let generation = chain.mark_allocated(slot, BlockName::new("x"));
        assert_eq!(chain.allocated_slot(slot, generation), Some(slot));

        chain.mark_free(slot);
        assert_eq!(chain.allocated_slot(slot, generation), None);

        let regeneration = chain.mark_allocated(slot, BlockName::new("x"));
        assert_ne!(regeneration, generation);
        assert_eq!(chain.allocated_slot(slot, regeneration), Some(slot));
        assert_eq!(chain.allocated_slot(slot, generation), None);
        assert_eq!(chain.allocated_slot(100, generation), None);
    }

    #[test]
    fn chain_is_contiguous() {
        let mut chain = BlockChain::new(1000);
        for &size in &[1, 30, 200, 7] {
            let slot = chain.find_best_fit(size).unwrap();
            chain.split(slot, size);
            chain.mark_allocated(slot, BlockName::new("x"));
        }
        let nodes = chain.iter().map(|(_, n)| n.clone()).collect::<Vec<_>>();
        assert_eq!(nodes[0].offset, 0);
        for pair in nodes.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset);
        }
        assert_eq!(nodes.last().unwrap().end(), 1000 + H);
    }
}
