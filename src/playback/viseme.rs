//! Mouth-shape queue stepped by audio progress
//!
//! Each queued `(index, weight)` pair covers one step of audio (`step_ms`).
//! As estimated consumption crosses step boundaries the queue pops one pair per
//! crossed step and the output vector shows whatever is at the head. The output
//! is always one-hot: a single slot is nonzero.

use std::collections::VecDeque;

/// FIFO of viseme pairs plus the one-hot output vector
#[derive(Debug, Clone)]
pub struct VisemeQueue {
    pairs: VecDeque<(usize, f32)>,
    weights: Vec<f32>,
    neutral_index: usize,
    bytes_per_step: u64,
    accumulated: u64,
    last_consumed: u64,
}

impl VisemeQueue {
    pub fn new(slot_count: usize, neutral_index: usize, bytes_per_step: u64) -> Self {
        let slot_count = slot_count.max(1);
        let mut queue = Self {
            pairs: VecDeque::new(),
            weights: vec![0.0; slot_count],
            neutral_index: neutral_index.min(slot_count - 1),
            bytes_per_step: bytes_per_step.max(1),
            accumulated: 0,
            last_consumed: 0,
        };
        queue.show_neutral();
        queue
    }

    /// Append resolved pairs. Indices past the last slot are clamped.
    pub fn push_pairs(&mut self, pairs: &[(usize, f32)]) {
        let max_index = self.weights.len() - 1;
        self.pairs.extend(
            pairs
                .iter()
                .map(|&(index, weight)| (index.min(max_index), weight.clamp(0.0, 1.0))),
        );
    }

    /// Queue `steps` neutral pairs at full weight (underflow padding)
    pub fn push_neutral(&mut self, steps: usize) {
        let neutral = self.neutral_index;
        self.pairs.extend(std::iter::repeat((neutral, 1.0)).take(steps));
    }

    /// Advance to the estimated consumption. Pops one pair per crossed step and
    /// refreshes the output when any step was crossed. Returns the steps crossed.
    pub fn advance(&mut self, consumed: u64, started: bool) -> usize {
        let delta = consumed.saturating_sub(self.last_consumed);
        self.last_consumed = self.last_consumed.max(consumed);
        if delta == 0 {
            return 0;
        }

        self.accumulated += delta;
        let steps = (self.accumulated / self.bytes_per_step) as usize;
        if steps == 0 {
            return 0;
        }
        self.accumulated %= self.bytes_per_step;

        let popped = steps.min(self.pairs.len());
        self.pairs.drain(..popped);
        self.show_head(started);
        steps
    }

    /// Timer-driven pop, only honoured before playback starts
    pub fn auto_pop(&mut self, started: bool) -> bool {
        if started {
            return false;
        }
        let popped = self.pairs.pop_front().is_some();
        self.show_head(started);
        popped
    }

    /// Show the queue head, or neutral before start or when the queue is empty
    pub fn show_head(&mut self, started: bool) {
        match self.pairs.front().copied() {
            Some((index, weight)) if started => {
                self.weights.fill(0.0);
                self.weights[index] = weight;
            }
            _ => self.show_neutral(),
        }
    }

    pub fn show_neutral(&mut self) {
        self.weights.fill(0.0);
        self.weights[self.neutral_index] = 1.0;
    }

    /// Change the step size and restart step accounting (new format epoch)
    pub fn set_bytes_per_step(&mut self, bytes_per_step: u64) {
        self.bytes_per_step = bytes_per_step.max(1);
        self.reset_progress();
    }

    pub fn reset_progress(&mut self) {
        self.accumulated = 0;
        self.last_consumed = 0;
    }

    /// Drop every queued pair and show neutral
    pub fn clear(&mut self) {
        self.pairs.clear();
        self.reset_progress();
        self.show_neutral();
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn head(&self) -> Option<(usize, f32)> {
        self.pairs.front().copied()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn bytes_per_step(&self) -> u64 {
        self.bytes_per_step
    }

    pub fn neutral_index(&self) -> usize {
        self.neutral_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonzero(weights: &[f32]) -> Vec<(usize, f32)> {
        weights
            .iter()
            .enumerate()
            .filter(|(_, w)| **w != 0.0)
            .map(|(i, w)| (i, *w))
            .collect()
    }

    #[test]
    fn test_neutral_before_start() {
        let mut queue = VisemeQueue::new(15, 2, 256);
        queue.push_pairs(&[(5, 0.7), (6, 0.8)]);
        queue.show_head(false);
        assert_eq!(nonzero(queue.weights()), vec![(2, 1.0)]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pop_per_crossed_step() {
        let mut queue = VisemeQueue::new(15, 0, 256);
        queue.push_pairs(&[(1, 1.0), (2, 0.5), (3, 0.25), (4, 1.0)]);
        queue.show_head(true);
        assert_eq!(nonzero(queue.weights()), vec![(1, 1.0)]);

        assert_eq!(queue.advance(200, true), 0);
        assert_eq!(queue.len(), 4);

        // 200 + 312 = 512 crosses two steps
        assert_eq!(queue.advance(512, true), 2);
        assert_eq!(nonzero(queue.weights()), vec![(3, 0.25)]);

        assert_eq!(queue.advance(767, true), 0);
        assert_eq!(queue.advance(768, true), 1);
        assert_eq!(nonzero(queue.weights()), vec![(4, 1.0)]);

        assert_eq!(queue.advance(2_000, true), 4);
        assert!(queue.is_empty());
        assert_eq!(nonzero(queue.weights()), vec![(0, 1.0)]);
    }

    #[test]
    fn test_indices_and_weights_clamped() {
        let mut queue = VisemeQueue::new(15, 0, 1);
        queue.push_pairs(&[(40, 3.0)]);
        queue.show_head(true);
        assert_eq!(nonzero(queue.weights()), vec![(14, 1.0)]);
    }

    #[test]
    fn test_zero_weight_head_leaves_all_slots_zero() {
        let mut queue = VisemeQueue::new(15, 0, 1);
        queue.push_pairs(&[(3, 0.0)]);
        queue.show_head(true);
        assert!(nonzero(queue.weights()).is_empty());
    }

    #[test]
    fn test_auto_pop_only_before_start() {
        let mut queue = VisemeQueue::new(15, 0, 256);
        queue.push_pairs(&[(1, 1.0), (2, 1.0)]);
        assert!(queue.auto_pop(false));
        assert_eq!(queue.head(), Some((2, 1.0)));
        assert!(!queue.auto_pop(true));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_neutral_padding_and_clear() {
        let mut queue = VisemeQueue::new(15, 7, 256);
        queue.push_neutral(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.head(), Some((7, 1.0)));

        queue.advance(300, true);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(nonzero(queue.weights()), vec![(7, 1.0)]);
        // progress restarted
        assert_eq!(queue.advance(255, true), 0);
    }

    #[test]
    fn test_consumption_going_backwards_is_ignored() {
        let mut queue = VisemeQueue::new(15, 0, 100);
        queue.push_pairs(&[(1, 1.0), (2, 1.0), (3, 1.0)]);
        assert_eq!(queue.advance(150, true), 1);
        assert_eq!(queue.advance(100, true), 0);
        assert_eq!(queue.advance(200, true), 1);
        assert_eq!(queue.len(), 1);
    }
}
