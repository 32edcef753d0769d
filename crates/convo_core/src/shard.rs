use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardError {
    #[error("shard count must be at least 1")]
    ZeroCount,
    #[error("shard index {index} out of range for {count} shards")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Positional partition of an already-filtered prompt list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    shard_index: usize,
    shard_count: usize,
}

impl ShardPlan {
    pub fn new(shard_index: usize, shard_count: usize) -> Result<Self, ShardError> {
        if shard_count == 0 {
            return Err(ShardError::ZeroCount);
        }
        if shard_index >= shard_count {
            return Err(ShardError::IndexOutOfRange {
                index: shard_index,
                count: shard_count,
            });
        }
        Ok(Self {
            shard_index,
            shard_count,
        })
    }

    pub fn single() -> Self {
        Self {
            shard_index: 0,
            shard_count: 1,
        }
    }

    pub fn shard_index(&self) -> usize {
        self.shard_index
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn is_sharded(&self) -> bool {
        self.shard_count > 1
    }

    pub fn owns(&self, position: usize) -> bool {
        position % self.shard_count == self.shard_index
    }

    /// Keeps the items whose position maps to this shard, preserving order.
    pub fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .enumerate()
            .filter(|(pos, _)| self.owns(*pos))
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// Every plan of a `shard_count`-way split.
    pub fn all(shard_count: usize) -> Result<Vec<ShardPlan>, ShardError> {
        (0..shard_count.max(1))
            .map(|index| ShardPlan::new(index, shard_count))
            .collect()
    }
}

impl Default for ShardPlan {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Display for ShardPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard {}/{}", self.shard_index, self.shard_count)
    }
}

/// Convenience wrapper over [`ShardPlan::select`].
pub fn plan<T: Clone>(items: &[T], plan: ShardPlan) -> Vec<T> {
    plan.select(items)
}
