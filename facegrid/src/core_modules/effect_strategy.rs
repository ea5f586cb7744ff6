// THEORY:
// An `EffectStrategy` decides which shader variant each tile shows in effects
// mode. The look of the grid is a spatial pattern, not noise, so every strategy
// is a pure function of `(col, row, cols, rows, variants)`: calling it twice on
// the same grid yields the same table, and a resize that keeps the grid
// dimensions keeps every tile's look.
//
// Key architectural principles:
// 1.  **Pure Functions**: No RNG objects and no clocks. The `Random` strategy is
//     a multi-round integer hash, which is reproducible yet free of visible
//     clustering.
// 2.  **Interchangeable**: All five strategies share one signature and are
//     cycled by an external index (the `v` key).
// 3.  **Bounded Output**: Every strategy returns an index in `0..variants`,
//     including degenerate single-row or single-column grids.

const HASH_MODULUS: u64 = 982_451_653;

/// Spatial pattern used to distribute effect variants over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EffectStrategy {
    #[default]
    Random,
    Gradient,
    Symmetrical,
    Concentric,
    Diagonal,
}

impl EffectStrategy {
    pub const ALL: [EffectStrategy; 5] = [
        EffectStrategy::Random,
        EffectStrategy::Gradient,
        EffectStrategy::Symmetrical,
        EffectStrategy::Concentric,
        EffectStrategy::Diagonal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectStrategy::Random => "random",
            EffectStrategy::Gradient => "gradient",
            EffectStrategy::Symmetrical => "symmetrical",
            EffectStrategy::Concentric => "concentric",
            EffectStrategy::Diagonal => "diagonal",
        }
    }

    /// The strategy after this one, wrapping around.
    pub fn next(self) -> Self {
        let position = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(position + 1) % Self::ALL.len()]
    }

    /// Variant index for a single tile.
    pub fn variant_for(self, col: u32, row: u32, cols: u32, rows: u32, variants: usize) -> usize {
        if variants == 0 {
            return 0;
        }
        let last = variants - 1;
        match self {
            EffectStrategy::Random => hashed_variant(col, row, cols, rows, variants),
            EffectStrategy::Gradient => {
                let x = unit_position(col, cols);
                let y = unit_position(row, rows);
                (((x + y) / 2.0 * last as f32).floor() as usize).min(last)
            }
            EffectStrategy::Symmetrical => {
                let cx = cols as f32 / 2.0;
                let cy = rows as f32 / 2.0;
                let max_distance = (cx * cx + cy * cy).sqrt();
                let distance = distance_from(col, row, cx, cy);
                let normalized = if max_distance > 0.0 { distance / max_distance } else { 0.0 };
                ((normalized * last as f32).floor() as usize).min(last)
            }
            EffectStrategy::Concentric => {
                let cx = (cols as f32 - 1.0) / 2.0;
                let cy = (rows as f32 - 1.0) / 2.0;
                let max_radius = (cx * cx + cy * cy).sqrt();
                if max_radius <= 0.0 {
                    return 0;
                }
                let ring = distance_from(col, row, cx, cy) / max_radius * variants as f32;
                (ring.floor() as usize).min(last)
            }
            EffectStrategy::Diagonal => {
                let period = variants * 2;
                (((col + row) as usize % period) / 2).min(last)
            }
        }
    }

    /// Row-major tile → variant table for a whole grid.
    pub fn assign(self, cols: u32, rows: u32, variants: usize) -> Vec<usize> {
        (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (col, row)))
            .map(|(col, row)| self.variant_for(col, row, cols, rows, variants))
            .collect()
    }
}

fn unit_position(i: u32, count: u32) -> f32 {
    if count > 1 { i as f32 / (count - 1) as f32 } else { 0.0 }
}

fn distance_from(col: u32, row: u32, cx: f32, cy: f32) -> f32 {
    let dx = col as f32 - cx;
    let dy = row as f32 - cy;
    (dx * dx + dy * dy).sqrt()
}

/// Mixes grid identity, column, row and linear index through several rounds of
/// large-prime multiply/xor.
fn hashed_variant(col: u32, row: u32, cols: u32, rows: u32, variants: usize) -> usize {
    let index = row.wrapping_mul(cols).wrapping_add(col) as i32;
    let (col, row) = (col as i32, row as i32);
    let seed = (cols as i32).wrapping_mul(1000).wrapping_add(rows as i32);

    let mut hash = seed ^ col.wrapping_mul(73_856_093);
    hash = hash.wrapping_mul(19_349_663) ^ row.wrapping_mul(83_492_791);
    hash ^= index.wrapping_mul(50_331_653);
    hash = hash.wrapping_mul(28_629_151) ^ (col + row).wrapping_mul(97_563_461);

    let bucket = hash.unsigned_abs() as u64 % HASH_MODULUS;
    (bucket * variants as u64 / HASH_MODULUS) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn gradient_runs_corner_to_corner() {
        let table = EffectStrategy::Gradient.assign(3, 3, 6);
        assert_eq!(table, vec![0, 1, 2, 1, 2, 3, 2, 3, 5]);
    }

    #[test]
    fn diagonal_steps_every_two_cells() {
        let table = EffectStrategy::Diagonal.assign(4, 2, 3);
        assert_eq!(table, vec![0, 0, 1, 1, 0, 1, 1, 2]);
    }

    #[test]
    fn concentric_centre_is_ring_zero() {
        let table = EffectStrategy::Concentric.assign(5, 5, 6);
        assert_eq!(table[12], 0);
        assert_eq!(table[0], 5);
        assert_eq!(table[24], 5);
    }

    #[test]
    fn symmetrical_is_mirror_symmetric_about_centre_column() {
        // Centre is (cols/2, rows/2), so column c mirrors column cols - c.
        let table = EffectStrategy::Symmetrical.assign(6, 4, 6);
        for row in 0..4 {
            for col in 1..=2 {
                assert_eq!(table[row * 6 + col], table[row * 6 + (6 - col)]);
            }
        }
        assert_eq!(table[0], 5);
        assert_eq!(table[2 * 6 + 3], 0);
    }

    #[test]
    fn single_row_and_column_grids_do_not_divide_by_zero() {
        for strategy in EffectStrategy::ALL {
            assert_eq!(strategy.assign(1, 1, 6).len(), 1);
            assert!(strategy.assign(1, 7, 6).iter().all(|v| *v < 6));
            assert!(strategy.assign(9, 1, 6).iter().all(|v| *v < 6));
        }
    }

    #[test]
    fn cycling_visits_every_strategy() {
        let mut strategy = EffectStrategy::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(strategy.name());
            strategy = strategy.next();
        }
        assert_eq!(strategy, EffectStrategy::Random);
        assert_eq!(seen, vec!["random", "gradient", "symmetrical", "concentric", "diagonal"]);
    }

    #[test]
    fn random_strategy_uses_more_than_one_variant() {
        let table = EffectStrategy::Random.assign(13, 8, 6);
        let distinct: std::collections::HashSet<_> = table.iter().collect();
        assert!(distinct.len() > 1);
    }

    proptest! {
        #[test]
        fn strategies_are_deterministic_and_bounded(
            cols in 1u32..40,
            rows in 1u32..30,
            variants in 1usize..8,
        ) {
            for strategy in EffectStrategy::ALL {
                let first = strategy.assign(cols, rows, variants);
                let second = strategy.assign(cols, rows, variants);
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(first.len(), (cols * rows) as usize);
                prop_assert!(first.iter().all(|v| *v < variants));
            }
        }
    }
}
