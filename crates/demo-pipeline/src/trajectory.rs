use nalgebra::Vector3;
use ndarray::{Array2, ArrayView1};

/// Sampling parameters for future-trajectory labels. Caller-supplied per
/// source kind, never hardcoded at a call site.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WindowParams {
    /// Stride between sampled future positions.
    pub point_gap: usize,
    /// Number of future positions per window.
    pub future_points: usize,
}

impl WindowParams {
    /// Width of one flattened window.
    pub fn flat_len(self) -> usize {
        3 * self.future_points
    }
}

/// Restartable iterator producing one fixed-width window per start index.
///
/// Window `i` samples positions at `i + k * point_gap` for
/// `k = 1..=future_points`, clamping to the final index once the stride
/// runs past the end of the episode. Windows near the end therefore repeat
/// the terminal position instead of shrinking.
#[derive(Clone)]
pub struct TrajectoryWindows<'a> {
    positions: &'a [Vector3<f64>],
    params: WindowParams,
    next: usize,
}

impl<'a> TrajectoryWindows<'a> {
    pub fn new(positions: &'a [Vector3<f64>], params: WindowParams) -> Self {
        Self {
            positions,
            params,
            next: 0,
        }
    }

    /// Flattened window for one start index.
    pub fn window_at(&self, start: usize) -> Vec<f64> {
        if self.positions.is_empty() {
            return Vec::new();
        }
        let last = self.positions.len() - 1;
        let mut flat = Vec::with_capacity(self.params.flat_len());
        for k in 1..=self.params.future_points {
            let idx = (start + k * self.params.point_gap).min(last);
            let p = &self.positions[idx];
            flat.extend_from_slice(&[p[0], p[1], p[2]]);
        }
        flat
    }
}

impl Iterator for TrajectoryWindows<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.positions.len() {
            return None;
        }
        let window = self.window_at(self.next);
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.positions.len() - self.next;
        (remaining, Some(remaining))
    }
}

/// Materialize one window per timestep into `[N, 3 * future_points]`.
pub fn future_trajectories(positions: &[Vector3<f64>], params: WindowParams) -> Array2<f64> {
    let mut out = Array2::zeros((positions.len(), params.flat_len()));
    for (i, window) in TrajectoryWindows::new(positions, params).enumerate() {
        out.row_mut(i).assign(&ArrayView1::from(window.as_slice()));
    }
    out
}
