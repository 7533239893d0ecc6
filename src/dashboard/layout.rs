/// Tallest span a single cell may occupy, in grid rows.
pub const MAX_ROW_SPAN: usize = 12;
/// Widest grid the packer lays out. Larger column counts are kept in the
/// configuration but rendered at this width.
pub const MAX_LAYOUT_COLUMNS: usize = 64;

/// Cell position on the dashboard grid, in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

/// Place cells in order, left to right and top to bottom.
///
/// Mirrors sparse grid auto-placement: the cursor only moves forward, so a
/// small cell never back-fills a gap left by an earlier wide one. Column spans
/// wider than the grid are clamped to the grid width and row spans to
/// [`MAX_ROW_SPAN`].
pub fn pack_cells(spans: &[(usize, usize)], columns: usize) -> Vec<Placement> {
    let columns = layout_columns(columns);
    let mut occupied: Vec<Vec<bool>> = Vec::new();
    let mut placements = Vec::with_capacity(spans.len());
    let (mut row, mut col) = (0usize, 0usize);

    for &(col_span, row_span) in spans {
        let col_span = col_span.clamp(1, columns);
        let row_span = clamp_row_span(row_span);
        loop {
            if col + col_span > columns {
                row += 1;
                col = 0;
                continue;
            }
            if fits(&occupied, row, col, row_span, col_span) {
                break;
            }
            col += 1;
        }
        mark(&mut occupied, columns, row, col, row_span, col_span);
        placements.push(Placement {
            row,
            col,
            row_span,
            col_span,
        });
        col += col_span;
    }

    placements
}

/// Column count actually laid out for a configured `columns`.
pub fn layout_columns(columns: usize) -> usize {
    columns.clamp(1, MAX_LAYOUT_COLUMNS)
}

pub fn clamp_row_span(row_span: usize) -> usize {
    row_span.clamp(1, MAX_ROW_SPAN)
}

/// Number of grid rows used by `placements`.
pub fn row_count(placements: &[Placement]) -> usize {
    placements
        .iter()
        .map(|p| p.row + p.row_span)
        .max()
        .unwrap_or(0)
}

fn fits(occupied: &[Vec<bool>], row: usize, col: usize, row_span: usize, col_span: usize) -> bool {
    (row..row + row_span).all(|r| {
        occupied
            .get(r)
            .map_or(true, |cells| (col..col + col_span).all(|c| !cells[c]))
    })
}

fn mark(
    occupied: &mut Vec<Vec<bool>>,
    columns: usize,
    row: usize,
    col: usize,
    row_span: usize,
    col_span: usize,
) {
    while occupied.len() < row + row_span {
        occupied.push(vec![false; columns]);
    }
    for cells in &mut occupied[row..row + row_span] {
        for cell in &mut cells[col..col + col_span] {
            *cell = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(row: usize, col: usize, row_span: usize, col_span: usize) -> Placement {
        Placement {
            row,
            col,
            row_span,
            col_span,
        }
    }

    #[test]
    fn fills_rows_left_to_right() {
        let placed = pack_cells(&[(1, 1); 4], 3);
        assert_eq!(
            placed,
            vec![at(0, 0, 1, 1), at(0, 1, 1, 1), at(0, 2, 1, 1), at(1, 0, 1, 1)]
        );
        assert_eq!(row_count(&placed), 2);
    }

    #[test]
    fn clamps_wide_cells_to_grid() {
        let placed = pack_cells(&[(5, 1)], 3);
        assert_eq!(placed, vec![at(0, 0, 1, 3)]);
    }

    #[test]
    fn tall_cells_push_later_cells_aside() {
        let placed = pack_cells(&[(1, 2), (2, 1), (2, 1)], 3);
        assert_eq!(placed[0], at(0, 0, 2, 1));
        assert_eq!(placed[1], at(0, 1, 1, 2));
        assert_eq!(placed[2], at(1, 1, 1, 2));
    }

    #[test]
    fn cursor_does_not_backfill() {
        let placed = pack_cells(&[(1, 1), (3, 1), (1, 1)], 3);
        assert_eq!(placed[1], at(1, 0, 1, 3));
        assert_eq!(placed[2], at(2, 0, 1, 1));
    }

    #[test]
    fn oversized_spans_are_bounded() {
        let placed = pack_cells(&[(1, u32::MAX as usize), (1, 1)], 3);
        assert_eq!(placed[0], at(0, 0, MAX_ROW_SPAN, 1));
        assert_eq!(placed[1], at(0, 1, 1, 1));
        assert_eq!(row_count(&placed), MAX_ROW_SPAN);

        let wide = pack_cells(&[(usize::MAX, 1)], u32::MAX as usize);
        assert_eq!(wide, vec![at(0, 0, 1, MAX_LAYOUT_COLUMNS)]);
    }

    #[test]
    fn empty_input_has_no_rows() {
        assert!(pack_cells(&[], 3).is_empty());
        assert_eq!(row_count(&[]), 0);
    }
}
