/// Ordered audio chunks of the utterance in progress.
///
/// Chunks are kept as received; they are only joined when drained.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    /// Concatenates every buffered chunk and leaves the accumulator empty.
    pub fn drain_all(&mut self) -> Vec<u8> {
        let mut audio = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks.drain(..) {
            audio.extend(chunk);
        }
        self.total_bytes = 0;
        audio
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    pub fn len_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_concatenates_in_order() {
        let mut buf = ChunkAccumulator::new();
        buf.push(vec![1, 2]);
        buf.push(vec![3]);
        buf.push(vec![4, 5, 6]);
        assert_eq!(buf.len_bytes(), 6);
        assert_eq!(buf.chunk_count(), 3);
        assert_eq!(buf.drain_all(), vec![1, 2, 3, 4, 5, 6]);
        assert!(buf.is_empty());
        assert_eq!(buf.chunk_count(), 0);
    }

    #[test]
    fn drain_empty() {
        let mut buf = ChunkAccumulator::new();
        assert!(buf.drain_all().is_empty());
    }

    #[test]
    fn clear_resets_count() {
        let mut buf = ChunkAccumulator::new();
        buf.push(vec![0; 10]);
        buf.clear();
        assert_eq!(buf.len_bytes(), 0);
        assert!(buf.is_empty());
    }
}
