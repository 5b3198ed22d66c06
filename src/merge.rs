//! Token merging: reduce raw search hits to one highlight bar per line
//!
//! A literal search yields one rectangle per matched run. A highlight that
//! wraps across several lines should instead be drawn as full-width bars,
//! except for its first line (which starts mid-line) and its last line
//! (which ends mid-line). When the hits jump back up the page the reading
//! order has wrapped into a second column, and each column is merged on its
//! own.

use crate::geometry::SearchRect;

/// Default vertical tolerance for two rectangles to count as one line
pub const SAME_LINE_TOL: f32 = 1.5;

/// Whether two rectangles sit on the same text line
pub fn same_line(a: &SearchRect, b: &SearchRect, tolerance: f32) -> bool {
    (a.y0 - b.y0).abs() < tolerance && (a.y1 - b.y1).abs() < tolerance
}

/// Merge raw search hits (in reading order) into per-line highlight bars
pub fn merge_tokens(tokens: &[SearchRect], tolerance: f32) -> Vec<SearchRect> {
    if tokens.len() < 2 {
        return tokens.to_vec();
    }

    let mut first_column = vec![tokens[0]];
    let mut second_column = Vec::new();
    let mut is_double_column = false;

    for pair in tokens.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        // Jumping back up the page is only possible after a column wrap
        if !same_line(prev, next, tolerance) && prev.y0 > next.y0 {
            is_double_column = true;
        }
        if is_double_column {
            second_column.push(*next);
        } else {
            first_column.push(*next);
        }
    }

    if !is_double_column {
        return merge_column_tokens(&first_column, tolerance);
    }

    log::debug!(
        "Highlight spans two columns ({} + {} tokens)",
        first_column.len(),
        second_column.len()
    );
    let mut merged = merge_column_tokens(&first_column, tolerance);
    merged.extend(merge_column_tokens(&second_column, tolerance));
    merged
}

/// Merge the tokens of a single column into line bars
pub fn merge_column_tokens(tokens: &[SearchRect], tolerance: f32) -> Vec<SearchRect> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let left_most = tokens
        .iter()
        .map(|t| t.x0.min(t.x1))
        .fold(f32::INFINITY, f32::min);
    let right_most = tokens
        .iter()
        .map(|t| t.x0.max(t.x1))
        .fold(f32::NEG_INFINITY, f32::max);

    // Group consecutive tokens by comparing against the first token of the line
    let mut lines: Vec<Vec<SearchRect>> = Vec::new();
    for token in tokens {
        match lines.last_mut() {
            Some(line) if same_line(&line[0], token, tolerance) => line.push(*token),
            _ => lines.push(vec![*token]),
        }
    }

    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let top = line.iter().map(|t| t.y0).fold(f32::INFINITY, f32::min);
            let bottom = line.iter().map(|t| t.y1).fold(f32::NEG_INFINITY, f32::max);
            if i == 0 {
                SearchRect::new(line[0].x0, top, right_most, bottom)
            } else if i == last {
                SearchRect::new(left_most, top, line[line.len() - 1].x1, bottom)
            } else {
                SearchRect::new(left_most, top, right_most, bottom)
            }
        })
        .collect()
}
