// ---------------------------------------------------------------------------
// Spectral windows: which samples of a trace take part in a computation
// ---------------------------------------------------------------------------

/// A Raman-shift window with both bounds exclusive: `low < x < high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftWindow {
    pub low: f64,
    pub high: f64,
}

impl ShiftWindow {
    pub fn new(low: f64, high: f64) -> Self {
        ShiftWindow { low, high }
    }

    /// `center ± half_width`.
    pub fn around(center: f64, half_width: f64) -> Self {
        ShiftWindow::new(center - half_width, center + half_width)
    }

    pub fn contains(&self, x: f64) -> bool {
        x > self.low && x < self.high
    }
}

/// Return indices of samples whose shift falls inside `window`.
pub fn window_indices(raman_shift: &[f64], window: ShiftWindow) -> Vec<usize> {
    raman_shift
        .iter()
        .enumerate()
        .filter(|(_, &x)| window.contains(x))
        .map(|(i, _)| i)
        .collect()
}

/// Copy out the `(x, y)` samples inside `window`.
pub fn select(raman_shift: &[f64], intensity: &[f64], window: ShiftWindow) -> (Vec<f64>, Vec<f64>) {
    raman_shift
        .iter()
        .zip(intensity)
        .filter(|(&x, _)| window.contains(x))
        .map(|(&x, &y)| (x, y))
        .unzip()
}

/// Index of the sample closest to `value` on an ascending axis.
///
/// Ties resolve to the upper neighbour, values past either end clamp to the
/// nearest edge. An empty axis yields 0.
pub fn nearest_index(raman_shift: &[f64], value: f64) -> usize {
    let idx = raman_shift.partition_point(|&x| x < value);
    if idx > 0
        && (idx == raman_shift.len()
            || (value - raman_shift[idx - 1]).abs() < (value - raman_shift[idx]).abs())
    {
        idx - 1
    } else {
        idx
    }
}
