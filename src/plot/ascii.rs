//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of one correction record in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - correction curve: `-` line
//! - marker columns (validity edges or reference pT): `|`
//! - out-of-bounds samples inside the validity window: `!`
//!
//! Stored histograms get a bar listing (1D) or a cell table (2D).

use crate::domain::{EvaluatedSeries, Histogram};

/// Options for an ASCII correction plot.
#[derive(Debug, Clone, Copy)]
pub struct AsciiOptions {
    pub width: usize,
    pub height: usize,
    /// Map x through `log10` before placing it on the grid.
    pub log_x: bool,
}

/// Render one evaluated series with its marker positions.
pub fn render_ascii_plot(series: &EvaluatedSeries, markers: &[f64], opts: AsciiOptions) -> String {
    let width = opts.width.max(10);
    let height = opts.height.max(5);
    let axis = |x: f64| if opts.log_x { x.log10() } else { x };

    let points: Vec<(f64, f64)> = series
        .points
        .iter()
        .filter(|(x, y)| y.is_finite() && (!opts.log_x || *x > 0.0))
        .map(|&(x, y)| (axis(x), y))
        .collect();

    let Some((x_min, x_max)) = range(points.iter().map(|p| p.0)) else {
        return "Plot: no finite samples\n".to_string();
    };
    let (y_min, y_max) = range(points.iter().map(|p| p.1)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    for &m in markers {
        if opts.log_x && m <= 0.0 {
            continue;
        }
        let mx = axis(m);
        if mx < x_min || mx > x_max {
            continue;
        }
        let col = map_x(mx, x_min, x_max, width);
        for row in grid.iter_mut() {
            row[col] = '|';
        }
    }

    draw_curve(&mut grid, &points, x_min, x_max, y_min, y_max);

    for w in &series.warnings {
        if !w.value.is_finite() || (opts.log_x && w.x <= 0.0) {
            continue;
        }
        let col = map_x(axis(w.x), x_min, x_max, width);
        let row = map_y(w.value, y_min, y_max, height);
        grid[row][col] = '!';
    }

    let (lo, hi) = match (series.points.first(), series.points.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => (x_min, x_max),
    };
    let scale = if opts.log_x { "log" } else { "lin" };
    let mut out = String::new();
    out.push_str(&format!(
        "Plot: x=[{lo:.3}, {hi:.3}] ({scale}) | y=[{y_min:.4}, {y_max:.4}]\n"
    ));
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

/// Longest bar of `render_ascii_histogram`.
const BAR_WIDTH: f64 = 50.0;

/// One row per bin: number, center, `*` bar scaled to the largest content.
///
/// At most `max_bins` bins are listed; NaN bins are summarized at the end.
pub fn render_ascii_histogram(hist: &Histogram, max_bins: usize) -> String {
    let max_content = hist
        .contents
        .iter()
        .copied()
        .filter(|c| !c.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    let separator = "-".repeat(40);

    let mut out = String::new();
    out.push_str(&format!("{:>7}{:>12} | Content\n", "Bin", "Center"));
    out.push_str(&separator);
    out.push('\n');

    let mut nan_bins = Vec::new();
    for bin in 0..hist.n_bins().min(max_bins) {
        let content = hist.contents[bin];
        out.push_str(&format!("{:>7}{:>12.2} | ", bin + 1, hist.center(bin)));
        if content.is_nan() {
            nan_bins.push(bin + 1);
            out.push_str("NaN\n");
            continue;
        }
        let bar = if max_content > 0.0 {
            (BAR_WIDTH * content / max_content).clamp(0.0, BAR_WIDTH) as usize
        } else {
            0
        };
        out.push_str(&"*".repeat(bar));
        out.push_str(&format!("{content:>8.2}\n"));
    }
    out.push_str(&separator);
    out.push('\n');

    if !nan_bins.is_empty() {
        out.push_str("Warning: The following bins contain NaN values:\n");
        for bin in nan_bins {
            out.push_str(&format!("  - Bin {bin}\n"));
        }
    }
    out
}

/// Cell table of a 2D histogram, highest y bin first.
pub fn render_ascii_grid(hist: &Histogram, max_x: usize, max_y: usize) -> String {
    let nx = hist.n_bins().min(max_x);
    let ny = hist.y_edges.len().saturating_sub(1).min(max_y);

    let mut out = format!("Grid Histogram: {}\n", hist.name);
    out.push_str(&" ".repeat(12));
    for bin in 1..=nx {
        out.push_str(&format!("{bin:>8}"));
    }
    out.push('\n');
    out.push_str(&" ".repeat(12));
    for bin in 0..nx {
        out.push_str(&format!("{:>8.2}", hist.center(bin)));
    }
    out.push('\n');

    for ybin in (0..ny).rev() {
        out.push_str(&format!("{:>3}{:>8.2} | ", ybin + 1, hist.y_center(ybin)));
        for xbin in 0..nx {
            let content = hist.cell(xbin, ybin);
            let cell = if content == 0.0 {
                format!("{content:>8.0}")
            } else if content < 1.0 {
                format!("{content:>8.2}")
            } else {
                format!("{content:>8.1}")
            };
            out.push_str(&cell);
        }
        out.push('\n');
    }
    out
}

fn range<I: Iterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for v in values {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v.is_finite() && max_v.is_finite() && max_v > min_v {
        Some((min_v, max_v))
    } else if min_v.is_finite() && min_v == max_v {
        Some((min_v - 0.5, max_v + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, '-'),
            None => grid[row][col] = '-',
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish). Only blank or marker cells are overwritten.
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
        if y0 >= 0 && (y0 as usize) < grid.len() && x0 >= 0 && (x0 as usize) < grid[0].len() {
            let cell = &mut grid[y0 as usize][x0 as usize];
            if *cell == ' ' || *cell == '|' {
                *cell = ch;
            }
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
