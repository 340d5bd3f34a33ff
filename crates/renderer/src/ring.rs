// PCM sample ring shared between the decode thread and the output callback

use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-capacity FIFO of interleaved f32 samples
pub struct SampleRing {
    buffer: Box<[f32]>,
    head: usize,
    len: usize,
}

impl SampleRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as many samples as fit; returns how many were taken.
    pub fn push(&mut self, data: &[f32]) -> usize {
        let count = data.len().min(self.free());
        if count == 0 {
            return 0;
        }

        let cap = self.capacity();
        let tail = (self.head + self.len) % cap;
        let first = count.min(cap - tail);
        self.buffer[tail..tail + first].copy_from_slice(&data[..first]);
        if first < count {
            self.buffer[..count - first].copy_from_slice(&data[first..count]);
        }
        self.len += count;
        count
    }

    /// Move up to `output.len()` samples out; returns how many were filled.
    pub fn pop(&mut self, output: &mut [f32]) -> usize {
        let count = output.len().min(self.len);
        if count == 0 {
            return 0;
        }

        let cap = self.capacity();
        let first = count.min(cap - self.head);
        output[..first].copy_from_slice(&self.buffer[self.head..self.head + first]);
        if first < count {
            output[first..count].copy_from_slice(&self.buffer[..count - first]);
        }
        self.head = (self.head + count) % cap;
        self.len -= count;
        count
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

/// Cloneable handle to a `SampleRing`
#[derive(Clone)]
pub struct SharedSampleRing {
    inner: Arc<Mutex<SampleRing>>,
}

impl SharedSampleRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SampleRing::with_capacity(capacity))),
        }
    }

    pub fn push(&self, data: &[f32]) -> usize {
        self.inner.lock().push(data)
    }

    pub fn pop(&self, output: &mut [f32]) -> usize {
        self.inner.lock().pop(output)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn free(&self) -> usize {
        self.inner.lock().free()
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_stops_at_capacity() {
        let mut ring = SampleRing::with_capacity(4);
        assert_eq!(ring.push(&[1.0, 2.0, 3.0, 4.0, 5.0]), 4);
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_wraps_around_in_order() {
        let mut ring = SampleRing::with_capacity(5);
        ring.push(&[1.0, 2.0, 3.0, 4.0]);

        let mut out = [0.0; 3];
        assert_eq!(ring.pop(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);

        assert_eq!(ring.push(&[5.0, 6.0, 7.0, 8.0]), 4);
        let mut out = [0.0; 8];
        assert_eq!(ring.pop(&mut out), 5);
        assert_eq!(&out[..5], &[4.0, 5.0, 6.0, 7.0, 8.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_clear_discards_pending() {
        let ring = SharedSampleRing::with_capacity(8);
        ring.push(&[0.5; 6]);
        ring.clear();
        let mut out = [9.0; 2];
        assert_eq!(ring.pop(&mut out), 0);
        assert_eq!(ring.free(), 8);
    }
}
