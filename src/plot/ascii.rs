//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed samples: `o`
//! - fitted curve: `-` line

use crate::domain::{CurveFile, FitResult, Sample};
use crate::models::FittedCurve;

/// Render a plot for an in-memory fit result.
///
/// Curve points where the model is undefined are left out.
pub fn render_ascii_plot(samples: &[Sample], fit: &FitResult, width: usize, height: usize) -> String {
    let (v_min, v_max) = volume_range(samples.iter().map(|s| s.volume))
        .unwrap_or((fit.params.v0 * 0.8, fit.params.v0 * 1.2));
    let curve = sample_curve(&FittedCurve::from(fit), v_min, v_max, width.max(2));
    render_plot(samples, Some(&curve), v_min, v_max, width, height)
}

/// Render a plot from a saved curve JSON file, with optional overlay samples.
pub fn render_ascii_plot_from_curve_file(
    samples: &[Sample],
    curve: &CurveFile,
    width: usize,
    height: usize,
) -> String {
    let curve_points: Vec<(f64, f64)> = curve
        .grid
        .volume
        .iter()
        .zip(curve.grid.energy.iter())
        .map(|(&v, &e)| (v, e))
        .collect();
    let (v_min, v_max) = volume_range(curve.grid.volume.iter().copied())
        .unwrap_or((curve.params.v0 * 0.8, curve.params.v0 * 1.2));

    render_plot(samples, Some(&curve_points), v_min, v_max, width, height)
}

fn render_plot(
    samples: &[Sample],
    curve_points: Option<&[(f64, f64)]>,
    v_min: f64,
    v_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (e_min, e_max) = energy_range(samples, curve_points).unwrap_or((0.0, 1.0));
    let (e_min, e_max) = pad_range(e_min, e_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curve first (so points can overlay).
    if let Some(curve) = curve_points {
        draw_curve(&mut grid, curve, v_min, v_max, e_min, e_max);
    }

    for s in samples {
        let x = map_x(s.volume, v_min, v_max, width);
        let y = map_y(s.energy, e_min, e_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: volume=[{v_min:.3}, {v_max:.3}] | energy=[{e_min:.4}, {e_max:.4}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn volume_range(volumes: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for v in volumes {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v.is_finite() && max_v.is_finite() && max_v > min_v {
        Some((min_v, max_v))
    } else {
        None
    }
}

fn sample_curve(curve: &FittedCurve, v_min: f64, v_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .filter_map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let v = v_min + u * (v_max - v_min);
            curve.energy_at(v).ok().map(|e| (v, e))
        })
        .collect()
}

fn energy_range(samples: &[Sample], curve: Option<&[(f64, f64)]>) -> Option<(f64, f64)> {
    let mut min_e = f64::INFINITY;
    let mut max_e = f64::NEG_INFINITY;

    for s in samples {
        min_e = min_e.min(s.energy);
        max_e = max_e.max(s.energy);
    }
    if let Some(curve) = curve {
        for &(_, e) in curve {
            min_e = min_e.min(e);
            max_e = max_e.max(e);
        }
    }

    if min_e.is_finite() && max_e.is_finite() && max_e > min_e {
        Some((min_e, max_e))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, v_min: f64, v_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((v - v_min) / (v_max - v_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(e: f64, e_min: f64, e_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((e - e_min) / (e_max - e_min)).clamp(0.0, 1.0);
    // Highest energy on row 0.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], v_min: f64, v_max: f64, e_min: f64, e_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(v, e) in curve {
        let x = map_x(v, v_min, v_max, width);
        let y = map_y(e, e_min, e_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, y, '-');
        } else {
            grid[y][x] = '-';
        }
        prev = Some((x, y));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
