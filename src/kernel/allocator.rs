/// A contiguous range of RAM, `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemBlock {
    pub start: usize,
    pub size: usize,
}

impl MemBlock {
    pub fn new(start: usize, size: usize) -> MemBlock {
        MemBlock { start, size }
    }

    pub fn end(&self) -> usize {
        self.start + self.size
    }
}

/// Free-list allocator over the usable part of RAM. It only tracks free
/// ranges; moving live processes during compaction is the kernel's job since
/// it owns their registers.
#[derive(Debug)]
pub(crate) struct Allocator {
    free: Vec<MemBlock>,
}

impl Allocator {
    /// All of `[start, end)` starts out free.
    pub fn new(start: usize, end: usize) -> Allocator {
        let mut allocator = Allocator { free: Vec::new() };
        allocator.reset(start, end);
        allocator
    }

    pub fn free_blocks(&self) -> &[MemBlock] {
        &self.free
    }

    pub fn total_free(&self) -> usize {
        self.free.iter().map(|block| block.size).sum()
    }

    /// Exact fit first, otherwise the first block that is large enough is
    /// shrunk from the front. Returns the start of the allocation.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        if let Some(idx) = self.free.iter().position(|block| block.size == size) {
            return Some(self.free.remove(idx).start);
        }

        let block = self.free.iter_mut().find(|block| block.size >= size)?;
        let start = block.start;
        block.start += size;
        block.size -= size;
        Some(start)
    }

    /// Returns a block to the free list without merging. Callers compact and
    /// merge afterwards.
    pub fn free(&mut self, block: MemBlock) {
        if block.size > 0 {
            self.free.push(block);
        }
    }

    /// Coalesces touching or overlapping blocks until none are left.
    pub fn merge(&mut self) {
        loop {
            self.free.sort_by_key(|block| block.start);

            let mut merged = false;
            let mut idx = 1;
            while idx < self.free.len() {
                let prev = self.free[idx - 1];
                let next = self.free[idx];

                if prev.end() >= next.start {
                    self.free[idx - 1].size = prev.end().max(next.end()) - prev.start;
                    self.free.remove(idx);
                    merged = true;
                } else {
                    idx += 1;
                }
            }

            if !merged {
                break;
            }
        }
    }

    /// Replaces the free list by the single range `[start, end)`.
    pub fn reset(&mut self, start: usize, end: usize) {
        self.free.clear();
        if end > start {
            self.free.push(MemBlock::new(start, end - start));
        }
    }
}
