// THEORY:
// The character scatterer spreads a headline over the grid, one glyph per tile,
// so that the word reads right-to-left across the screen while each glyph sits
// at a random height. Direction is expressed purely by column traversal order:
// the string is never reversed.
//
// Key architectural principles:
// 1.  **Column-First Flow**: candidate columns are collected from the rightmost
//     to the leftmost, keeping only columns with at least one open tile outside
//     the last row. Character `n` normally lands in candidate column `n`.
// 2.  **Optional Gaps, Guarded**: a tunable probability skips one or two extra
//     columns before a character, but only when a pre-flight capacity estimate
//     shows the columns can absorb it. If the walk still overflows, the whole
//     scatter is retried once with gaps forced off.
// 3.  **Graceful Exhaustion**: a character whose column has no open row falls
//     back to a full scan for any open tile in an unused column. A character that
//     cannot be placed anywhere is dropped with a logged error, never a panic.

use rand::Rng;
use std::collections::HashSet;

/// Gap probabilities cycled by the `p` key.
pub const GAP_PROBABILITY_STEPS: [f32; 3] = [0.0, 0.3, 0.6];

/// One glyph of the headline pinned to one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScatteredCharacter {
    pub character: char,
    /// Position of the glyph in the original headline.
    pub char_index: usize,
    pub row: u32,
    pub col: u32,
    pub tile_index: usize,
}

/// The probability after `current` in the `0 → 0.3 → 0.6 → 0` cycle.
pub fn next_gap_probability(current: f32) -> f32 {
    let position = GAP_PROBABILITY_STEPS
        .iter()
        .position(|step| (step - current).abs() < 1e-6);
    match position {
        Some(i) => GAP_PROBABILITY_STEPS[(i + 1) % GAP_PROBABILITY_STEPS.len()],
        None => GAP_PROBABILITY_STEPS[0],
    }
}

/// Splits a headline into its visual characters (Unicode scalar values), in
/// reading order.
pub fn split_headline(headline: &str) -> Vec<char> {
    headline.trim().chars().collect()
}

/// Grid and exclusions a scatter runs against.
#[derive(Debug, Clone)]
pub struct ScatterGrid<'a> {
    pub cols: u32,
    pub rows: u32,
    /// Tiles already claimed by text panels.
    pub claimed: &'a HashSet<usize>,
}

impl ScatterGrid<'_> {
    fn total(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    fn bottom_left(&self) -> usize {
        (self.rows.saturating_sub(1) * self.cols) as usize
    }

    fn is_open(&self, tile: usize) -> bool {
        tile < self.total() && tile != self.bottom_left() && !self.claimed.contains(&tile)
    }

    /// Rows usable for characters exclude the last row.
    fn usable_rows(&self) -> std::ops::Range<u32> {
        0..self.rows.saturating_sub(1)
    }

    fn candidate_columns(&self) -> Vec<u32> {
        (0..self.cols)
            .rev()
            .filter(|&col| {
                self.usable_rows()
                    .any(|row| self.is_open((row * self.cols + col) as usize))
            })
            .collect()
    }
}

/// Assigns each character of `characters` to a tile.
pub fn scatter_characters<R: Rng + ?Sized>(
    characters: &[char],
    grid: &ScatterGrid<'_>,
    gap_probability: f32,
    rng: &mut R,
) -> Vec<ScatteredCharacter> {
    match scatter_pass(characters, grid, gap_probability, false, rng) {
        Some(positions) => positions,
        None => {
            tracing::debug!("character gaps overflowed the grid, retrying without gaps");
            scatter_pass(characters, grid, 0.0, true, rng).unwrap_or_default()
        }
    }
}

/// One walk over the candidate columns. Returns `None` when gaps pushed the walk
/// past the last column and the caller should retry without them.
fn scatter_pass<R: Rng + ?Sized>(
    characters: &[char],
    grid: &ScatterGrid<'_>,
    gap_probability: f32,
    force_no_gaps: bool,
    rng: &mut R,
) -> Option<Vec<ScatteredCharacter>> {
    let columns = grid.candidate_columns();
    let total_characters = characters.len();
    if columns.len() < total_characters {
        tracing::warn!(
            columns = columns.len(),
            characters = total_characters,
            "fewer open columns than headline characters"
        );
    }

    let mut gap_probability = if force_no_gaps { 0.0 } else { gap_probability };
    if gap_probability > 0.0 {
        let estimated = total_characters + (total_characters as f32 * gap_probability * 1.5).floor() as usize;
        if estimated > columns.len() {
            gap_probability = 0.0;
        }
    }

    let mut positions: Vec<ScatteredCharacter> = Vec::with_capacity(total_characters);
    let mut used_columns: HashSet<u32> = HashSet::new();
    let mut used_tiles: HashSet<usize> = HashSet::new();
    let mut column_cursor = 0usize;

    for (char_index, &character) in characters.iter().enumerate() {
        if char_index > 0 && gap_probability > 0.0 && rng.gen_bool(gap_probability as f64) {
            column_cursor += rng.gen_range(1..=2);
        }

        let target_col = if column_cursor >= columns.len() {
            if !force_no_gaps {
                return None;
            }
            match columns.len() {
                0 => None,
                len => Some(columns[char_index % len]),
            }
        } else {
            let col = columns[column_cursor];
            column_cursor += 1;
            Some(col)
        };

        let open_rows: Vec<u32> = target_col
            .map(|col| {
                grid.usable_rows()
                    .filter(|row| {
                        let tile = (row * grid.cols + col) as usize;
                        grid.is_open(tile) && !used_tiles.contains(&tile)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let placed = match (target_col, open_rows.is_empty()) {
            (Some(col), false) => {
                let row = open_rows[rng.gen_range(0..open_rows.len())];
                Some((row, col))
            }
            _ => fallback_tile(grid, &used_columns, &used_tiles),
        };

        match placed {
            Some((row, col)) => {
                let tile_index = (row * grid.cols + col) as usize;
                used_columns.insert(col);
                used_tiles.insert(tile_index);
                positions.push(ScatteredCharacter { character, char_index, row, col, tile_index });
            }
            None => {
                tracing::error!(%character, char_index, "could not place headline character anywhere");
            }
        }
    }

    Some(positions)
}

/// Row-major scan for any open tile in a column no character uses yet.
fn fallback_tile(grid: &ScatterGrid<'_>, used_columns: &HashSet<u32>, used_tiles: &HashSet<usize>) -> Option<(u32, u32)> {
    grid.usable_rows().find_map(|row| {
        (0..grid.cols).find_map(|col| {
            let tile = (row * grid.cols + col) as usize;
            (grid.is_open(tile) && !used_columns.contains(&col) && !used_tiles.contains(&tile)).then_some((row, col))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn gap_probability_cycles() {
        assert_eq!(next_gap_probability(0.0), 0.3);
        assert_eq!(next_gap_probability(0.3), 0.6);
        assert_eq!(next_gap_probability(0.6), 0.0);
        assert_eq!(next_gap_probability(0.45), 0.0);
    }

    #[test]
    fn split_keeps_reading_order() {
        assert_eq!(split_headline(" אבג "), vec!['א', 'ב', 'ג']);
    }

    #[test]
    fn three_letters_on_eight_by_five() {
        let claimed: HashSet<usize> = [20, 21].into_iter().collect();
        let grid = ScatterGrid { cols: 8, rows: 5, claimed: &claimed };
        let mut rng = StdRng::seed_from_u64(99);
        let placed = scatter_characters(&split_headline("אבג"), &grid, 0.0, &mut rng);

        assert_eq!(placed.len(), 3);
        let columns: HashSet<u32> = placed.iter().map(|p| p.col).collect();
        assert_eq!(columns.len(), 3);
        assert!(placed.iter().all(|p| !claimed.contains(&p.tile_index)));
        // Without gaps the glyphs flow from the rightmost column leftwards.
        assert_eq!(placed.iter().map(|p| p.col).collect::<Vec<_>>(), vec![7, 6, 5]);
        assert_eq!(placed.iter().map(|p| p.character).collect::<String>(), "אבג");
    }

    #[test]
    fn rows_are_randomized_between_runs() {
        let claimed = HashSet::new();
        let grid = ScatterGrid { cols: 12, rows: 9, claimed: &claimed };
        let characters = split_headline("גחלילות");
        let mut rng = StdRng::seed_from_u64(3);
        let runs: Vec<Vec<u32>> = (0..4)
            .map(|_| scatter_characters(&characters, &grid, 0.0, &mut rng).iter().map(|p| p.row).collect())
            .collect();
        assert!(runs.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn overflowing_headline_still_places_unique_tiles() {
        let claimed = HashSet::new();
        let grid = ScatterGrid { cols: 3, rows: 3, claimed: &claimed };
        let mut rng = StdRng::seed_from_u64(5);
        let placed = scatter_characters(&split_headline("abcdefghij"), &grid, 0.6, &mut rng);
        let tiles: HashSet<usize> = placed.iter().map(|p| p.tile_index).collect();
        assert_eq!(tiles.len(), placed.len());
        assert!(placed.len() <= 6);
        assert!(placed.iter().all(|p| p.row < 2));
    }

    #[test]
    fn empty_grid_drops_everything() {
        let claimed: HashSet<usize> = (0..4).collect();
        let grid = ScatterGrid { cols: 2, rows: 3, claimed: &claimed };
        let mut rng = StdRng::seed_from_u64(5);
        assert!(scatter_characters(&['x'], &grid, 0.3, &mut rng).is_empty());
    }

    proptest! {
        #[test]
        fn placements_avoid_claimed_tiles(
            cols in 1u32..16,
            rows in 1u32..10,
            claimed in proptest::collection::hash_set(0usize..160, 0..12),
            headline in "[a-zא-ת]{0,12}",
            gap_step in 0usize..3,
            seed in any::<u64>(),
        ) {
            let grid = ScatterGrid { cols, rows, claimed: &claimed };
            let characters = split_headline(&headline);
            let mut rng = StdRng::seed_from_u64(seed);
            let placed = scatter_characters(&characters, &grid, GAP_PROBABILITY_STEPS[gap_step], &mut rng);

            prop_assert!(placed.len() <= characters.len());
            let mut tiles = HashSet::new();
            for p in &placed {
                prop_assert!(!claimed.contains(&p.tile_index));
                prop_assert!(p.tile_index != ((rows - 1) * cols) as usize);
                prop_assert!(p.row + 1 < rows);
                prop_assert_eq!(p.tile_index, (p.row * cols + p.col) as usize);
                prop_assert!(tiles.insert(p.tile_index));
            }
        }
    }
}
