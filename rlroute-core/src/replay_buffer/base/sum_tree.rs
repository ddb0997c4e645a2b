//! Sum tree for prioritized sampling.
use rand::Rng;
use segment_tree::{ops::MaxIgnoreNaN, SegmentPoint};

/// Binary tree whose leaves hold `priority^alpha` and whose inner nodes hold
/// the sum of their children.
///
/// Leaf `ix` lives at node `ix + capacity - 1`.
#[derive(Debug)]
pub struct SumTree {
    alpha: f32,
    capacity: usize,
    tree: Vec<f32>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
}

impl SumTree {
    pub fn new(capacity: usize, alpha: f32) -> Self {
        Self {
            alpha,
            capacity,
            tree: vec![0f32; 2 * capacity - 1],
            max_tree: SegmentPoint::build(vec![0f32; capacity], MaxIgnoreNaN),
        }
    }

    fn propagate(&mut self, mut ix: usize, change: f32) {
        while ix != 0 {
            ix = (ix - 1) / 2;
            self.tree[ix] += change;
        }
    }

    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// Maximum raw priority, `0` when nothing is stored.
    pub fn max(&self) -> f32 {
        self.max_tree.query(0, self.max_tree.len())
    }

    /// Raw priority at `ix`.
    pub fn priority(&self, ix: usize) -> f32 {
        self.max_tree.query(ix, ix + 1)
    }

    /// Sets the raw priority of leaf `ix`.
    pub fn update(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);

        self.max_tree.modify(ix, p);
        let ix = ix + self.capacity - 1;
        let p = p.powf(self.alpha);
        let change = p - self.tree[ix];
        self.tree[ix] = p;
        self.propagate(ix, change);
    }

    pub fn clear(&mut self) {
        self.tree.iter_mut().for_each(|v| *v = 0f32);
        self.max_tree = SegmentPoint::build(vec![0f32; self.capacity], MaxIgnoreNaN);
    }

    /// Leaf index at which the cumulative weight first exceeds `s`.
    pub fn get(&self, mut s: f32) -> usize {
        let mut ix = 0;
        loop {
            let left = 2 * ix + 1;
            let right = left + 1;
            if left >= self.tree.len() {
                break;
            }
            if s < self.tree[left] || self.tree[right] <= 0f32 {
                ix = left;
            } else {
                s -= self.tree[left];
                ix = right;
            }
        }
        ix + 1 - self.capacity
    }

    /// Draws `n` leaf indices with replacement, proportionally to the leaf weights.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<usize> {
        let total = self.total();
        (0..n).map(|_| self.get(total * rng.gen::<f32>())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SumTree;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sum_tree_odd() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let mut sum_tree = SumTree::new(8, 1.0);
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.update(ix, p);
        }

        assert!((sum_tree.total() - data.iter().sum::<f32>()).abs() < 1e-5);
        assert_eq!(sum_tree.max(), 3.9);
        assert_eq!(sum_tree.get(0.0), 0);
        assert_eq!(sum_tree.get(0.4), 0);
        assert_eq!(sum_tree.get(0.6), 1);
        assert_eq!(sum_tree.get(1.2), 2);
        assert_eq!(sum_tree.get(1.6), 3);
        assert_eq!(sum_tree.get(2.0), 4);

        let mut rng = StdRng::seed_from_u64(0);
        let ixs = sum_tree.sample(10000, &mut rng);
        assert!(ixs.iter().all(|&ix| ix < data.len()));
    }

    #[test]
    fn test_sum_tree_non_power_of_two() {
        let mut sum_tree = SumTree::new(3, 1.0);
        sum_tree.update(0, 1.0);
        sum_tree.update(1, 2.0);
        sum_tree.update(2, 3.0);
        assert_eq!(sum_tree.total(), 6.0);

        let mut rng = StdRng::seed_from_u64(1);
        let ixs = sum_tree.sample(6000, &mut rng);
        let counts = (0..3)
            .map(|i| ixs.iter().filter(|&&ix| ix == i).count())
            .collect::<Vec<_>>();
        assert!(counts[0] < counts[1] && counts[1] < counts[2]);
    }
}
