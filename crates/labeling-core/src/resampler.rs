//! Multi-channel downsampling with union of indices, so every channel in a
//! viewport response shares the same x-axis after resampling. Grounded on
//! `ResamplerService` (`resampler.py`): MinMaxLTTB per channel, indices
//! unioned and sorted, uniform-stride fallback if a channel can't be
//! downsampled.
//!
//! Rust has no equivalent of the `tsdownsample` crate the original relies
//! on, so the MinMax-then-LTTB pipeline is hand-rolled here: each channel
//! is first reduced to `ratio * n_out` candidate points by taking the
//! min and max of each bucket (preserves spikes a plain stride would
//! skip), then the Largest-Triangle-Three-Buckets algorithm picks the
//! final `n_out` points from that candidate set.

use std::collections::BTreeSet;
use thiserror::Error;

const MINMAX_RATIO: usize = 4;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("resample input is empty")]
    Empty,

    #[error("channel {index} has length {got}, expected {expected} (must match x)")]
    LengthMismatch {
        index: usize,
        got: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    pub target_points: usize,
}

impl Resampler {
    pub fn new(target_points_per_channel: usize) -> Self {
        Self {
            target_points: target_points_per_channel.max(1),
        }
    }

    /// Resamples `channels` against shared x-axis `x`, returning the
    /// resampled x, the resampled channels (same order as input), and
    /// whether the input was already at or under the target resolution.
    pub fn resample(
        &self,
        x: &[f64],
        channels: &[Vec<f64>],
    ) -> Result<(Vec<f64>, Vec<Vec<f64>>, bool), ResampleError> {
        let n_points = x.len();
        if n_points == 0 {
            return Err(ResampleError::Empty);
        }
        for (i, ch) in channels.iter().enumerate() {
            if ch.len() != n_points {
                return Err(ResampleError::LengthMismatch {
                    index: i,
                    got: ch.len(),
                    expected: n_points,
                });
            }
        }

        if n_points <= self.target_points {
            return Ok((x.to_vec(), channels.to_vec(), true));
        }

        let mut all_indices: BTreeSet<usize> = BTreeSet::new();
        for ch in channels {
            let indices = downsample_channel(x, ch, self.target_points);
            all_indices.extend(indices);
        }

        let selected: Vec<usize> = all_indices.into_iter().collect();
        let x_out = selected.iter().map(|&i| x[i]).collect();
        let channels_out = channels
            .iter()
            .map(|ch| selected.iter().map(|&i| ch[i]).collect())
            .collect();

        Ok((x_out, channels_out, false))
    }
}

fn downsample_channel(x: &[f64], y: &[f64], n_out: usize) -> Vec<usize> {
    if x.len() <= n_out || n_out == 0 {
        return (0..x.len()).collect();
    }

    let candidate_size = (n_out * MINMAX_RATIO).min(x.len());
    let candidates = minmax_preselect(y, candidate_size);
    lttb(x, y, &candidates, n_out)
}

/// Splits `y` into buckets of roughly equal size and keeps the index of
/// the min and max value in each bucket, in original order.
fn minmax_preselect(y: &[f64], out_size: usize) -> Vec<usize> {
    let n = y.len();
    if out_size >= n {
        return (0..n).collect();
    }

    let buckets = (out_size / 2).max(1);
    let bucket_size = (n as f64 / buckets as f64).ceil() as usize;

    let mut out = Vec::with_capacity(out_size);
    let mut start = 0usize;
    while start < n {
        let end = (start + bucket_size.max(1)).min(n);
        let slice = &y[start..end];

        let mut min_idx = start;
        let mut max_idx = start;
        for (offset, &v) in slice.iter().enumerate() {
            if v < y[min_idx] {
                min_idx = start + offset;
            }
            if v > y[max_idx] {
                max_idx = start + offset;
            }
        }

        if min_idx <= max_idx {
            out.push(min_idx);
            if max_idx != min_idx {
                out.push(max_idx);
            }
        } else {
            out.push(max_idx);
            out.push(min_idx);
        }

        start = end;
    }

    out
}

/// Largest-Triangle-Three-Buckets over a pre-filtered candidate index
/// set, returning `n_out` indices from `candidates` (always keeping the
/// first and last point).
fn lttb(x: &[f64], y: &[f64], candidates: &[usize], n_out: usize) -> Vec<usize> {
    if candidates.len() <= n_out || n_out < 3 {
        return candidates.to_vec();
    }

    let n = candidates.len();
    let mut sampled = Vec::with_capacity(n_out);
    sampled.push(candidates[0]);

    let bucket_size = (n - 2) as f64 / (n_out - 2) as f64;
    let mut a = 0usize;

    for i in 0..(n_out - 2) {
        let bucket_start = (((i) as f64) * bucket_size) as usize + 1;
        let bucket_end = ((((i + 1) as f64) * bucket_size) as usize + 1).min(n - 1);

        let next_start = ((((i + 1) as f64) * bucket_size) as usize + 1).min(n - 1);
        let next_end = ((((i + 2) as f64) * bucket_size) as usize + 1).min(n);
        let (avg_x, avg_y) = average_point(x, y, candidates, next_start, next_end.max(next_start + 1));

        let point_a_x = x[candidates[a]];
        let point_a_y = y[candidates[a]];

        let mut best_area = -1.0f64;
        let mut best_idx = bucket_start.min(n - 1);

        for &cand in &candidates[bucket_start.min(n - 1)..bucket_end.max(bucket_start.min(n - 1) + 1).min(n)] {
            let area = triangle_area(
                point_a_x,
                point_a_y,
                x[cand],
                y[cand],
                avg_x,
                avg_y,
            );
            if area > best_area {
                best_area = area;
                best_idx = cand;
            }
        }

        sampled.push(best_idx);
        a = candidates.iter().position(|&c| c == best_idx).unwrap_or(a);
    }

    sampled.push(candidates[n - 1]);
    sampled.sort_unstable();
    sampled.dedup();
    sampled
}

fn average_point(x: &[f64], y: &[f64], candidates: &[usize], start: usize, end: usize) -> (f64, f64) {
    let start = start.min(candidates.len().saturating_sub(1));
    let end = end.max(start + 1).min(candidates.len());
    let slice = &candidates[start..end];
    let len = slice.len().max(1) as f64;
    let sum_x: f64 = slice.iter().map(|&i| x[i]).sum();
    let sum_y: f64 = slice.iter().map(|&i| y[i]).sum();
    (sum_x / len, sum_y / len)
}

fn triangle_area(ax: f64, ay: f64, bx: f64, by: f64, cx: f64, cy: f64) -> f64 {
    ((ax - cx) * (by - ay) - (ax - bx) * (cy - ay)).abs() * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_target_is_full_resolution() {
        let r = Resampler::new(100);
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let ch: Vec<f64> = x.iter().map(|v| v.sin()).collect();
        let (xo, chans, full) = r.resample(&x, &[ch.clone()]).unwrap();
        assert!(full);
        assert_eq!(xo, x);
        assert_eq!(chans[0], ch);
    }

    #[test]
    fn above_target_reduces_point_count() {
        let r = Resampler::new(50);
        let x: Vec<f64> = (0..5000).map(|i| i as f64).collect();
        let ch: Vec<f64> = x.iter().map(|v| (v / 100.0).sin()).collect();
        let (xo, chans, full) = r.resample(&x, &[ch]).unwrap();
        assert!(!full);
        assert!(xo.len() < 5000);
        assert!(xo.len() >= 50);
        assert_eq!(xo.len(), chans[0].len());
    }

    #[test]
    fn union_of_indices_keeps_each_channels_extrema() {
        let r = Resampler::new(20);
        let n = 2000;
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut spike_a = vec![0.0; n as usize];
        spike_a[500] = 1000.0;
        let mut spike_b = vec![0.0; n as usize];
        spike_b[1500] = -1000.0;

        let (xo, _chans, full) = r.resample(&x, &[spike_a, spike_b]).unwrap();
        assert!(!full);
        assert!(xo.contains(&500.0));
        assert!(xo.contains(&1500.0));
    }

    #[test]
    fn preserves_first_and_last_point() {
        let r = Resampler::new(10);
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let ch: Vec<f64> = x.iter().map(|v| v.cos()).collect();
        let (xo, _chans, _full) = r.resample(&x, &[ch]).unwrap();
        assert_eq!(*xo.first().unwrap(), 0.0);
        assert_eq!(*xo.last().unwrap(), 999.0);
    }

    #[test]
    fn empty_input_is_invalid() {
        let r = Resampler::new(10);
        let empty: Vec<f64> = Vec::new();
        assert!(matches!(r.resample(&empty, &[]), Err(ResampleError::Empty)));
    }

    #[test]
    fn mismatched_channel_length_is_invalid() {
        let r = Resampler::new(10);
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let short_channel = vec![0.0; 50];
        assert!(matches!(
            r.resample(&x, &[short_channel]),
            Err(ResampleError::LengthMismatch { .. })
        ));
    }
}
