/// One `(offset, length)` piece of a scatter-gather read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub offset: i64,
    pub length: i32,
}

impl BlockRange {
    pub fn new(offset: i64, length: i32) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> i64 {
        self.offset + i64::from(self.length)
    }
}

impl From<(i64, i32)> for BlockRange {
    fn from((offset, length): (i64, i32)) -> Self {
        Self { offset, length }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Pending,
    Resolved,
    Failed,
}

/// A batched read request and, once resolved, its result.
///
/// Holds an ordered list of byte ranges of the source file and a single
/// backing buffer with all ranges' bytes concatenated in range order. Ranges
/// are expected to be sorted by offset and non-overlapping, which is what
/// `locate` relies on.
#[derive(Debug)]
pub struct Block {
    ranges: Vec<BlockRange>,
    buffer: Vec<u8>,
    state: BlockState,
}

impl Block {
    pub fn new(ranges: &[BlockRange]) -> Self {
        debug_assert!(ranges.iter().all(|r| r.length >= 0));
        let total = total_length(ranges);
        Self {
            ranges: ranges.to_vec(),
            buffer: vec![0; total],
            state: BlockState::Pending,
        }
    }

    /// Reinitialize a recycled block in place. The backing buffer is resized
    /// without reallocating unless it has to grow.
    pub fn reinit(&mut self, ranges: &[BlockRange]) {
        debug_assert!(ranges.iter().all(|r| r.length >= 0));
        self.ranges.clear();
        self.ranges.extend_from_slice(ranges);
        self.buffer.clear();
        self.buffer.resize(total_length(ranges), 0);
        self.state = BlockState::Pending;
    }

    pub fn ranges(&self) -> &[BlockRange] {
        &self.ranges
    }

    /// Total number of data bytes the block covers.
    pub fn data_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.ranges.iter().map(|r| r.offset).collect()
    }

    pub fn lengths(&self) -> Vec<i32> {
        self.ranges.iter().map(|r| r.length).collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.state == BlockState::Resolved
    }

    pub fn is_failed(&self) -> bool {
        self.state == BlockState::Failed
    }

    /// Install the fetched bytes. The buffer must contain exactly the
    /// concatenation of all ranges' bytes.
    pub fn resolve(&mut self, buffer: Vec<u8>) {
        debug_assert_eq!(buffer.len(), total_length(&self.ranges));
        self.buffer = buffer;
        self.state = BlockState::Resolved;
    }

    pub fn mark_failed(&mut self) {
        self.state = BlockState::Failed;
    }

    /// Shift all range offsets by `delta`. Used to translate physical
    /// (archive-corrected) offsets back into logical ones after a read.
    pub fn shift_offsets(&mut self, delta: i64) {
        for range in &mut self.ranges {
            range.offset += delta;
        }
    }

    /// Find the range fully containing `[offset, offset + length)`.
    ///
    /// Binary search on the sorted range list. A query overlapping a range
    /// boundary is not found, even when its start falls inside a range.
    pub fn locate(&self, offset: i64, length: i32) -> Option<usize> {
        let mut first = 0_isize;
        let mut last = self.ranges.len() as isize - 1;
        while first <= last {
            let mid = (first + (last - first) / 2) as usize;
            let range = self.ranges[mid];
            if offset >= range.offset
                && offset <= range.end()
                && offset + i64::from(length) <= range.end()
            {
                return Some(mid);
            } else if range.offset < offset {
                first = mid as isize + 1;
            } else {
                last = mid as isize - 1;
            }
        }
        None
    }

    /// View of the bytes backing range `index`.
    pub fn slice(&self, index: usize) -> &[u8] {
        let start: usize = self.ranges[..index]
            .iter()
            .map(|r| r.length as usize)
            .sum();
        &self.buffer[start..start + self.ranges[index].length as usize]
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

fn total_length(ranges: &[BlockRange]) -> usize {
    ranges.iter().map(|r| r.length as usize).sum()
}
