/// Reusable character buffers for loading tokenizer chunks.
#[derive(Debug)]
pub struct ScratchPool {
    buffers: Vec<Vec<char>>,
    max_retained: usize,
}

impl ScratchPool {
    pub fn new(max_retained: usize) -> Self {
        Self {
            buffers: Vec::with_capacity(max_retained),
            max_retained,
        }
    }

    /// An empty buffer, reused when one is available.
    pub fn acquire(&mut self) -> Vec<char> {
        self.buffers.pop().unwrap_or_default()
    }

    /// Hand a buffer back. Buffers beyond the retention limit are dropped.
    pub fn release(&mut self, mut buffer: Vec<char>) {
        if self.buffers.len() < self.max_retained {
            buffer.clear();
            self.buffers.push(buffer);
        }
    }

    pub fn retained(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_are_reused_empty() {
        let mut pool = ScratchPool::new(2);
        let mut buffer = pool.acquire();
        buffer.extend("abc".chars());
        let capacity = buffer.capacity();
        pool.release(buffer);

        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert_eq!(reused.capacity(), capacity);
    }

    #[test]
    fn retention_is_bounded() {
        let mut pool = ScratchPool::new(1);
        pool.release(Vec::new());
        pool.release(Vec::new());
        assert_eq!(pool.retained(), 1);
    }
}
