use crate::data::filter::{ShiftWindow, window_indices};

// ---------------------------------------------------------------------------
// Text plot of one or more traces over a shift window
// ---------------------------------------------------------------------------

/// One trace to draw, sharing the x-axis passed to [`render`].
pub struct Series<'a> {
    pub y: &'a [f64],
    pub glyph: char,
}

/// Draw `series` over `window` as a `width × height` character grid.
///
/// Samples are averaged per column; all series share one y scale. Each
/// `markers` shift gets a `|` in every empty cell of its column. Later series
/// are drawn over earlier ones.
pub fn render(
    x: &[f64],
    series: &[Series<'_>],
    window: ShiftWindow,
    markers: &[f64],
    width: usize,
    height: usize,
) -> String {
    let indices = window_indices(x, window);
    if indices.is_empty() || width == 0 || height < 2 {
        return format!("(no samples between {:.1} and {:.1})\n", window.low, window.high);
    }

    let span = window.high - window.low;
    let column_of = |xi: f64| (((xi - window.low) / span * width as f64) as usize).min(width - 1);

    // Per-series column means.
    let columns: Vec<Vec<Option<f64>>> = series
        .iter()
        .map(|s| {
            let mut sum = vec![0.0; width];
            let mut count = vec![0usize; width];
            for &i in &indices {
                let Some(&yi) = s.y.get(i) else { continue };
                if yi.is_finite() {
                    let c = column_of(x[i]);
                    sum[c] += yi;
                    count[c] += 1;
                }
            }
            sum.iter()
                .zip(&count)
                .map(|(&s, &n)| (n > 0).then(|| s / n as f64))
                .collect()
        })
        .collect();

    let (min, max) = columns
        .iter()
        .flatten()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return format!("(nothing to draw between {:.1} and {:.1})\n", window.low, window.high);
    }
    let range = if max > min { max - min } else { 1.0 };

    let mut grid = vec![vec![' '; width]; height];
    for (s, values) in series.iter().zip(&columns) {
        for (c, v) in values.iter().enumerate() {
            if let Some(v) = v {
                let row = (((v - min) / range) * (height - 1) as f64).round() as usize;
                grid[height - 1 - row.min(height - 1)][c] = s.glyph;
            }
        }
    }
    for &m in markers {
        if window.contains(m) {
            let c = column_of(m);
            for row in grid.iter_mut() {
                if row[c] == ' ' {
                    row[c] = '|';
                }
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format!("{max:.1}\n"));
    for row in &grid {
        out.extend(row.iter());
        out.push('\n');
    }
    out.push_str(&format!("{min:.1}\n"));
    let low = format!("{:.1}", window.low);
    let high = format!("{:.1}", window.high);
    let gap = width.saturating_sub(low.len() + high.len()).max(1);
    out.push_str(&format!("{low}{}{high}\n", " ".repeat(gap)));
    out
}
