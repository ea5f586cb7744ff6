use rand::Rng;
use rand::seq::SliceRandom;

/// How delay offsets are spread over the tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayOrdering {
    /// A shuffled set of offsets reused cyclically.
    #[default]
    Random,
    /// Tile `i` is delayed by `i` capture intervals, so time flows left to right.
    Sequential,
}

impl DelayOrdering {
    pub fn toggled(self) -> Self {
        match self {
            DelayOrdering::Random => DelayOrdering::Sequential,
            DelayOrdering::Sequential => DelayOrdering::Random,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DelayOrdering::Random => "random",
            DelayOrdering::Sequential => "sequential",
        }
    }
}

/// Per-tile delay offsets into the frame history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayOrder {
    pub ordering: DelayOrdering,
    offsets: Vec<usize>,
}

impl DelayOrder {
    /// Builds offsets for `tile_count` tiles over a history of `capacity` frames.
    pub fn build<R: Rng + ?Sized>(ordering: DelayOrdering, tile_count: usize, capacity: usize, rng: &mut R) -> Self {
        let capacity = capacity.max(1);
        let offsets = match ordering {
            DelayOrdering::Random => {
                let mut pool: Vec<usize> = (0..tile_count.min(capacity)).collect();
                pool.shuffle(rng);
                if pool.is_empty() {
                    Vec::new()
                } else {
                    (0..tile_count).map(|i| pool[i % pool.len()]).collect()
                }
            }
            DelayOrdering::Sequential => (0..tile_count).map(|i| i % capacity).collect(),
        };
        Self { ordering, offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offset(&self, tile: usize) -> Option<usize> {
        self.offsets.get(tile).copied()
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn sequential_wraps_at_capacity() {
        let mut rng = StdRng::seed_from_u64(0);
        let order = DelayOrder::build(DelayOrdering::Sequential, 120, 50, &mut rng);
        assert_eq!(order.offset(0), Some(0));
        assert_eq!(order.offset(49), Some(49));
        assert_eq!(order.offset(50), Some(0));
        assert_eq!(order.offset(119), Some(19));
        assert_eq!(order.offset(120), None);
    }

    #[test]
    fn random_is_a_permutation_reused_cyclically() {
        let mut rng = StdRng::seed_from_u64(11);
        let order = DelayOrder::build(DelayOrdering::Random, 104, 50, &mut rng);
        let mut first: Vec<usize> = order.offsets()[..50].to_vec();
        first.sort_unstable();
        assert_eq!(first, (0..50).collect::<Vec<_>>());
        assert_eq!(&order.offsets()[50..100], &order.offsets()[..50]);
    }

    #[test]
    fn small_grids_only_use_their_own_count() {
        let mut rng = StdRng::seed_from_u64(2);
        let order = DelayOrder::build(DelayOrdering::Random, 12, 50, &mut rng);
        assert!(order.offsets().iter().all(|o| *o < 12));
        assert_eq!(order.len(), 12);
    }

    #[test]
    fn toggle_flips() {
        assert_eq!(DelayOrdering::Random.toggled(), DelayOrdering::Sequential);
        assert_eq!(DelayOrdering::Sequential.toggled().name(), "random");
    }
}
