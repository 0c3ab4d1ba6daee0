//! Fixed-capacity ring buffer of 2D samples with a running average.

use nalgebra::Vector2;

/// Ring buffer used as a low-pass filter for camera-space gyro input.
///
/// Capacity is fixed when the buffer is built. Every slot takes part in the
/// average, including slots that were never written (they hold zero), so a
/// fresh buffer ramps in instead of jumping to the first sample.
#[derive(Debug, Clone)]
pub struct SmoothingBuffer {
    samples: Box<[Vector2<f32>]>,
    cursor: usize,
}

impl SmoothingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![Vector2::zeros(); capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Advance the cursor, store `sample` and return the mean of all slots.
    pub fn push(&mut self, sample: Vector2<f32>) -> Vector2<f32> {
        self.cursor = (self.cursor + 1) % self.samples.len();
        self.samples[self.cursor] = sample;
        self.average()
    }

    pub fn average(&self) -> Vector2<f32> {
        let sum = self
            .samples
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f32>, s| acc + s);
        sum / self.samples.len() as f32
    }

    /// Zero every slot without touching the capacity.
    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = Vector2::zeros());
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_includes_unwritten_slots() {
        let mut buffer = SmoothingBuffer::new(4);
        let avg = buffer.push(Vector2::new(4.0, -8.0));
        assert!((avg.x - 1.0).abs() < 1e-6);
        assert!((avg.y + 2.0).abs() < 1e-6);
    }

    #[test]
    fn oldest_sample_is_overwritten() {
        let mut buffer = SmoothingBuffer::new(2);
        buffer.push(Vector2::new(10.0, 0.0));
        buffer.push(Vector2::new(2.0, 0.0));
        let avg = buffer.push(Vector2::new(4.0, 0.0));
        // 10.0 fell out of the window
        assert!((avg.x - 3.0).abs() < 1e-6);
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buffer = SmoothingBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        let avg = buffer.push(Vector2::new(0.5, 0.25));
        assert_eq!(avg, Vector2::new(0.5, 0.25));
    }

    #[test]
    fn clear_resets_average() {
        let mut buffer = SmoothingBuffer::new(3);
        buffer.push(Vector2::new(3.0, 3.0));
        buffer.clear();
        assert_eq!(buffer.average(), Vector2::zeros());
    }
}
