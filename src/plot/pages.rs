//! Plotters-powered report pages.
//!
//! Every page is drawn into an SVG string with Plotters' SVG backend; the
//! report document (`report::document`) stitches the pages together.
//!
//! Pages are data-driven: callers describe a chart as a list of layers and
//! `draw_chart` does the drawing, choosing a log or linear x axis.

use std::ops::Range;

use plotters::coord::Shift;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::ranged1d::{Ranged, ValueFormatter};
use plotters::coord::types::RangedCoordf64;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::element::ErrorBar;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use thiserror::Error;

use crate::compare::{Comparison, DiffPair, HistStats, ProfileGrid, ProfilePanel, RatioPoint};
use crate::domain::{CorrectionRecord, EvaluatedSeries, Histogram, PlotProfile};
use crate::report::format::{parameter_lines, wrap_text};

/// Title wrap width in characters.
pub const TITLE_WRAP: usize = 60;

const FONT: &str = "sans-serif";

const CURVE_COLOR: RGBColor = RGBColor(31, 119, 180);
const MARKER_COLOR: RGBColor = RGBColor(0, 128, 0);
const V1_COLOR: RGBColor = BLUE;
const V2_COLOR: RGBColor = RED;
const OLD_COLOR: RGBColor = RED;
const NEW_COLOR: RGBColor = BLUE;
const RATIO_COLOR: RGBColor = BLACK;
const DIFF_COLOR: RGBColor = RGBColor(0, 153, 0);
const REFERENCE_COLOR: RGBColor = RGBColor(128, 128, 128);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("drawing failed: {0}")]
    Draw(String),
}

impl RenderError {
    fn from_draw<E: std::error::Error + Send + Sync>(err: DrawingAreaErrorKind<E>) -> Self {
        RenderError::Draw(err.to_string())
    }
}

type DrawResult<DB> = Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

/// One drawable element of a chart.
#[derive(Debug, Clone)]
enum Layer {
    Line {
        points: Vec<(f64, f64)>,
        color: RGBColor,
        label: Option<String>,
    },
    Dashed {
        points: Vec<(f64, f64)>,
        color: RGBColor,
        label: Option<String>,
    },
    /// Markers with symmetric vertical error bars: `(x, y, error)`.
    Errors {
        points: Vec<(f64, f64, f64)>,
        color: RGBColor,
        label: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct ChartSpec {
    caption: Option<String>,
    x_desc: String,
    y_desc: String,
    x_range: Range<f64>,
    y_range: Range<f64>,
    log_x: bool,
    layers: Vec<Layer>,
}

/// A correction-function page bound to one record.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionPage<'a> {
    pub template: &'a str,
    pub source_name: &'a str,
    pub record: &'a CorrectionRecord,
    pub series: &'a EvaluatedSeries,
    pub profile: PlotProfile,
    pub reference_x: f64,
}

impl CorrectionPage<'_> {
    /// Dashed marker positions with their legend labels.
    pub fn markers(&self) -> Vec<(f64, String)> {
        match self.profile {
            PlotProfile::Validity => vec![
                (self.record.validity.min, format!("valid pT min = {}", self.record.validity.min)),
                (self.record.validity.max, format!("valid pT max = {}", self.record.validity.max)),
            ],
            PlotProfile::Reference => {
                vec![(self.reference_x, format!("Raw Jet pT = {}", self.reference_x))]
            }
        }
    }
}

/// Draw a correction page into an SVG string.
pub fn correction_page_svg(page: &CorrectionPage<'_>, size: (u32, u32)) -> Result<String, RenderError> {
    render_svg(size, |root| draw_correction_page(root, page))
}

/// Overlay/ratio page plus the optional percent-difference page.
pub fn comparison_pages_svg(cmp: &Comparison<'_>, size: (u32, u32)) -> Result<Vec<String>, RenderError> {
    let mut pages = vec![render_svg(size, |root| draw_comparison_page(root, cmp))?];
    if let Some(diff) = &cmp.diff {
        let diff_size = (size.0, size.1 * 3 / 4);
        pages.push(render_svg(diff_size, |root| draw_diff_page(root, &cmp.key, diff))?);
    }
    Ok(pages)
}

/// Overlay of one object present in two files, with a first/second ratio pad.
///
/// `labels` name the two files in the legend.
pub fn diff_pair_svg(pair: &DiffPair<'_>, labels: (&str, &str), size: (u32, u32)) -> Result<String, RenderError> {
    render_svg(size, |root| draw_diff_pair(root, pair, labels))
}

/// One grid page of profile panels.
pub fn profile_grid_svg(grid: &ProfileGrid<'_>, panel_size: (u32, u32)) -> Result<String, RenderError> {
    let (cols, rows) = grid.dimensions();
    let size = (panel_size.0 * cols as u32, panel_size.1 * rows as u32);
    render_svg(size, |root| draw_profile_grid(root, grid, cols, rows))
}

fn render_svg<F>(size: (u32, u32), draw: F) -> Result<String, RenderError>
where
    F: FnOnce(&DrawingArea<SVGBackend<'_>, Shift>) -> Result<(), DrawingAreaErrorKind<std::io::Error>>,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE).map_err(RenderError::from_draw)?;
        draw(&root).map_err(RenderError::from_draw)?;
        root.present().map_err(RenderError::from_draw)?;
    }
    Ok(svg)
}

fn draw_correction_page<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    page: &CorrectionPage<'_>,
) -> DrawResult<DB> {
    let (width, height) = root.dim_in_pixel();
    let title = wrap_text(page.template, TITLE_WRAP);
    let title_height = 20 + 18 * title.len() as u32;
    let (top, body) = root.split_vertically(title_height.min(height / 3));
    draw_text_lines(&top, &title, (width as i32 / 2 - 240).max(10), 14, BLACK)?;

    let (plot_area, side) = body.split_horizontally(width.saturating_sub(170));
    draw_text_lines(&side, &parameter_lines(&page.record.parameters), 8, 12, BLACK)?;

    let points = &page.series.points;
    let x_range = match (points.first(), points.last()) {
        (Some(&(a, _)), Some(&(b, _))) if b > a => a..b,
        _ => return draw_no_data(&plot_area),
    };
    let y_range = padded_range(points.iter().map(|&(_, y)| y)).unwrap_or(0.0..1.0);
    let log_x = page.profile.log_x() && x_range.start > 0.0;

    let mut layers = vec![Layer::Line {
        points: points.clone(),
        color: CURVE_COLOR,
        label: Some(page.record.eta.label()),
    }];
    for (x, label) in page.markers() {
        if x_range.start <= x && x <= x_range.end {
            layers.push(Layer::Dashed {
                points: vec![(x, y_range.start), (x, y_range.end)],
                color: MARKER_COLOR,
                label: Some(label),
            });
        }
    }

    draw_chart(
        &plot_area,
        &ChartSpec {
            caption: None,
            x_desc: "x = Jet pT (GeV)".to_string(),
            y_desc: format!("Correction : {}", page.source_name),
            x_range,
            y_range,
            log_x,
            layers,
        },
    )
}

fn draw_comparison_page<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    cmp: &Comparison<'_>,
) -> DrawResult<DB> {
    let (_, height) = root.dim_in_pixel();
    let (upper, lower) = root.split_vertically(height * 7 / 10);

    let x_range = hist_x_range(cmp.v1);
    let y_range = padded_range(
        cmp.v1
            .contents
            .iter()
            .chain(cmp.v2.contents.iter())
            .copied(),
    )
    .unwrap_or(0.0..1.0);
    draw_chart(
        &upper,
        &ChartSpec {
            caption: Some(format!("{} : V1 vs V2 Correction Factors", cmp.key)),
            x_desc: String::new(),
            y_desc: "Events".to_string(),
            x_range: x_range.clone(),
            y_range,
            log_x: false,
            layers: vec![
                Layer::Line {
                    points: step_points(cmp.v1),
                    color: V1_COLOR,
                    label: Some("V1".to_string()),
                },
                Layer::Line {
                    points: step_points(cmp.v2),
                    color: V2_COLOR,
                    label: Some("V2".to_string()),
                },
            ],
        },
    )?;

    draw_ratio(&lower, &cmp.ratio(), x_range, false, "Correction Factor", "V2 / V1")
}

fn draw_diff_pair<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    pair: &DiffPair<'_>,
    labels: (&str, &str),
) -> DrawResult<DB> {
    let (_, height) = root.dim_in_pixel();
    let (upper, lower) = root.split_vertically(height * 7 / 10);

    let x_range = hist_x_range(pair.a);
    let log_x = x_range.start > 0.0;
    let y_range = padded_range(pair.a.contents.iter().chain(pair.b.contents.iter()).copied()).unwrap_or(0.0..1.0);
    let legend = |label: &str, hist: &Histogram| {
        format!(
            "{label}, Entries: {}, Mean: {:.1}, RMS: {:.1}",
            hist.entries as i64,
            hist.mean(),
            hist.rms()
        )
    };
    draw_chart(
        &upper,
        &ChartSpec {
            caption: Some(pair.path.clone()),
            x_desc: String::new(),
            y_desc: pair.a.title.clone(),
            x_range: x_range.clone(),
            y_range,
            log_x,
            layers: vec![
                Layer::Line {
                    points: step_points(pair.a),
                    color: OLD_COLOR,
                    label: Some(legend(labels.0, pair.a)),
                },
                Layer::Line {
                    points: step_points(pair.b),
                    color: NEW_COLOR,
                    label: Some(legend(labels.1, pair.b)),
                },
            ],
        },
    )?;

    draw_ratio(&lower, &pair.ratio(), x_range, log_x, "", "Ratio")
}

fn draw_diff_page<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    key: &str,
    diff: &Histogram,
) -> DrawResult<DB> {
    let points: Vec<(f64, f64, f64)> = (0..diff.n_bins())
        .map(|bin| (diff.center(bin), diff.contents[bin], diff.error(bin)))
        .collect();
    let y_range = padded_range(points.iter().flat_map(|&(_, y, e)| [y - e, y + e])).unwrap_or(-1.0..1.0);
    draw_chart(
        root,
        &ChartSpec {
            caption: Some(format!("{key} : 100*(V1 - V2)/V1 vs pT")),
            x_desc: "Jet pT [GeV]".to_string(),
            y_desc: "Difference in % (100 x (V1 - V2)/V1)".to_string(),
            x_range: hist_x_range(diff),
            y_range,
            log_x: false,
            layers: vec![Layer::Errors {
                points,
                color: DIFF_COLOR,
                label: None,
            }],
        },
    )
}

fn draw_profile_grid<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    grid: &ProfileGrid<'_>,
    cols: usize,
    rows: usize,
) -> DrawResult<DB> {
    let cells = root.split_evenly((rows, cols));
    for (cell, panel) in cells.iter().zip(grid.panels.iter()) {
        if let Some(panel) = panel {
            draw_profile_panel(cell, grid, panel)?;
        }
    }
    Ok(())
}

fn draw_profile_panel<DB: DrawingBackend>(
    cell: &DrawingArea<DB, Shift>,
    grid: &ProfileGrid<'_>,
    panel: &ProfilePanel<'_>,
) -> DrawResult<DB> {
    let (_, height) = cell.dim_in_pixel();
    let (header, rest) = cell.split_vertically(54);
    let (upper, lower) = rest.split_vertically(height.saturating_sub(54) * 7 / 10);

    let old = HistStats::of(panel.old);
    let new = HistStats::of(panel.new);
    draw_text_lines(&header, &[panel.bin.clone()], 10, 13, BLACK)?;
    let v1_text = format!("{} (entries {}, mean {:.3})", grid.label_v1, old.entries, old.mean);
    let v2_text = format!("{} (entries {}, mean {:.3})", grid.label_v2, new.entries, new.mean);
    header.draw(&Text::new(v1_text, (10, 20), (FONT, 11.0).into_font().color(&OLD_COLOR)))?;
    header.draw(&Text::new(v2_text, (10, 36), (FONT, 11.0).into_font().color(&NEW_COLOR)))?;

    let x_range = hist_x_range(panel.old);
    let log_x = grid.log_x() && x_range.start > 0.0;
    let to_points = |h: &Histogram| -> Vec<(f64, f64, f64)> {
        (0..h.n_bins())
            .map(|bin| (h.center(bin), h.contents[bin], h.error(bin)))
            .collect()
    };
    let old_points = to_points(panel.old);
    let new_points = to_points(panel.new);
    let y_range = padded_range(
        old_points
            .iter()
            .chain(new_points.iter())
            .flat_map(|&(_, y, e)| [y - e, y + e]),
    )
    .unwrap_or(0.0..2.0);

    draw_chart(
        &upper,
        &ChartSpec {
            caption: None,
            x_desc: String::new(),
            y_desc: "Mean of Correction".to_string(),
            x_range: x_range.clone(),
            y_range,
            log_x,
            layers: vec![
                Layer::Errors {
                    points: old_points,
                    color: OLD_COLOR,
                    label: None,
                },
                Layer::Errors {
                    points: new_points,
                    color: NEW_COLOR,
                    label: None,
                },
            ],
        },
    )?;

    let x_desc = if grid.log_x() { "Jet pT" } else { "Jet eta" };
    draw_ratio(&lower, &panel.ratio(), x_range, log_x, x_desc, "pCorrOld / pCorrNew")
}

fn draw_ratio<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    ratio: &[RatioPoint],
    x_range: Range<f64>,
    log_x: bool,
    x_desc: &str,
    y_desc: &str,
) -> DrawResult<DB> {
    let points: Vec<(f64, f64, f64)> = ratio.iter().map(|p| (p.x, p.y, p.error)).collect();
    let y_range = padded_range(
        points
            .iter()
            .flat_map(|&(_, y, e)| [y - e, y + e])
            .chain([1.0]),
    )
    .unwrap_or(0.5..1.5);
    let reference = vec![(x_range.start, 1.0), (x_range.end, 1.0)];
    draw_chart(
        area,
        &ChartSpec {
            caption: None,
            x_desc: x_desc.to_string(),
            y_desc: y_desc.to_string(),
            x_range,
            y_range,
            log_x,
            layers: vec![
                Layer::Dashed {
                    points: reference,
                    color: REFERENCE_COLOR,
                    label: None,
                },
                Layer::Errors {
                    points,
                    color: RATIO_COLOR,
                    label: None,
                },
            ],
        },
    )
}

fn draw_chart<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, spec: &ChartSpec) -> DrawResult<DB> {
    let mut builder = ChartBuilder::on(area);
    builder
        .margin(10)
        .x_label_area_size(36)
        .y_label_area_size(56);
    if let Some(caption) = &spec.caption {
        builder.caption(caption, (FONT, 16.0));
    }

    let x = spec.x_range.clone();
    let y = spec.y_range.clone();
    if spec.log_x {
        let mut chart = builder.build_cartesian_2d(x.log_scale(), y)?;
        fill_chart(&mut chart, spec)
    } else {
        let mut chart = builder.build_cartesian_2d(x, y)?;
        fill_chart(&mut chart, spec)
    }
}

fn fill_chart<'a, DB, X>(
    chart: &mut ChartContext<'a, DB, Cartesian2d<X, RangedCoordf64>>,
    spec: &ChartSpec,
) -> DrawResult<DB>
where
    DB: DrawingBackend + 'a,
    X: Ranged<ValueType = f64> + ValueFormatter<f64>,
{
    chart
        .configure_mesh()
        .x_desc(spec.x_desc.as_str())
        .y_desc(spec.y_desc.as_str())
        .x_labels(8)
        .y_labels(6)
        .label_style((FONT, 11.0))
        .light_line_style(&WHITE)
        .draw()?;

    let mut labelled = false;
    for layer in &spec.layers {
        match layer {
            Layer::Line {
                points,
                color,
                label,
            } => {
                let color = *color;
                let anno = chart.draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?;
                if let Some(label) = label {
                    labelled = true;
                    anno.label(label.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
                }
            }
            Layer::Dashed {
                points,
                color,
                label,
            } => {
                let color = *color;
                let anno = chart.draw_series(DashedLineSeries::new(
                    points.iter().copied(),
                    6,
                    4,
                    color.stroke_width(1),
                ))?;
                if let Some(label) = label {
                    labelled = true;
                    anno.label(label.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                }
            }
            Layer::Errors {
                points,
                color,
                label,
            } => {
                let color = *color;
                chart.draw_series(
                    points
                        .iter()
                        .filter(|&&(_, _, e)| e > 0.0)
                        .map(|&(x, y, e)| ErrorBar::new_vertical(x, y - e, y, y + e, color.filled(), 4)),
                )?;
                let anno = chart.draw_series(
                    points
                        .iter()
                        .map(|&(x, y, _)| Circle::new((x, y), 2, color.filled())),
                )?;
                if let Some(label) = label {
                    labelled = true;
                    anno.label(label.as_str())
                        .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
                }
            }
        }
    }

    if labelled {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .label_font((FONT, 11.0))
            .background_style(&WHITE)
            .border_style(&BLACK)
            .draw()?;
    }
    Ok(())
}

fn draw_text_lines<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    lines: &[String],
    x: i32,
    font_size: u32,
    color: RGBColor,
) -> DrawResult<DB> {
    let step = font_size as i32 + 4;
    for (i, line) in lines.iter().enumerate() {
        let y = 8 + step * i as i32;
        area.draw(&Text::new(
            line.as_str(),
            (x, y),
            (FONT, font_size as f64).into_font().color(&color),
        ))?;
    }
    Ok(())
}

fn draw_no_data<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
    draw_text_lines(area, &["No data to plot.".to_string()], 20, 14, BLACK)
}

/// Outline of a histogram as a step line.
fn step_points(hist: &Histogram) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(hist.n_bins() * 2);
    for bin in 0..hist.n_bins() {
        out.push((hist.edges[bin], hist.contents[bin]));
        out.push((hist.edges[bin + 1], hist.contents[bin]));
    }
    out
}

fn hist_x_range(hist: &Histogram) -> Range<f64> {
    match (hist.edges.first(), hist.edges.last()) {
        (Some(&a), Some(&b)) if b > a => a..b,
        _ => 0.0..1.0,
    }
}

/// Finite min/max of `values` padded by 5% (or ±0.5 for a flat series).
fn padded_range<I: IntoIterator<Item = f64>>(values: I) -> Option<Range<f64>> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    if hi - lo < 1e-12 {
        return Some(lo - 0.5..hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    Some(lo - pad..hi + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EtaBin, RowLayout, SamplingGrid, ValidityWindow};

    fn record() -> CorrectionRecord {
        CorrectionRecord {
            line: 2,
            layout: RowLayout::Minimal,
            eta: EtaBin { low: 0.0, high: 1.3 },
            validity: ValidityWindow { min: 15.0, max: 1000.0 },
            parameters: vec![1.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        }
    }

    fn series(profile: PlotProfile) -> EvaluatedSeries {
        let grid = SamplingGrid { count: 200, ..profile.default_grid() };
        EvaluatedSeries {
            points: grid.points().into_iter().map(|x| (x, 1.0 + 0.5 * x.log10())).collect(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn correction_page_contains_title_legend_and_parameters() {
        let record = record();
        let series = series(PlotProfile::Validity);
        let page = CorrectionPage {
            template: "max(0.0001,[0]+[1]*log10(x))",
            source_name: "L2Relative.txt",
            record: &record,
            series: &series,
            profile: PlotProfile::Validity,
            reference_x: 56.7143,
        };
        let svg = correction_page_svg(&page, (800, 600)).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("max(0.0001,[0]+[1]*log10(x))"));
        assert!(svg.contains("Jet Eta [0, 1.3]"));
        assert!(svg.contains("valid pT min = 15"));
        assert!(svg.contains("[1] = 0.5"));
    }

    #[test]
    fn reference_profile_draws_a_single_marker() {
        let record = record();
        let series = series(PlotProfile::Reference);
        let page = CorrectionPage {
            template: "[0]",
            source_name: "in.txt",
            record: &record,
            series: &series,
            profile: PlotProfile::Reference,
            reference_x: 56.7143,
        };
        assert_eq!(page.markers().len(), 1);
        let svg = correction_page_svg(&page, (640, 480)).unwrap();
        assert!(svg.contains("Raw Jet pT = 56.7143"));
        assert!(!svg.contains("valid pT min"));
    }

    #[test]
    fn empty_series_renders_placeholder() {
        let record = record();
        let series = EvaluatedSeries::default();
        let page = CorrectionPage {
            template: "[0]",
            source_name: "in.txt",
            record: &record,
            series: &series,
            profile: PlotProfile::Validity,
            reference_x: 56.7143,
        };
        let svg = correction_page_svg(&page, (400, 300)).unwrap();
        assert!(svg.contains("No data to plot."));
    }

    #[test]
    fn padded_range_handles_flat_and_empty_input() {
        assert_eq!(padded_range([2.0, 2.0]), Some(1.5..2.5));
        assert_eq!(padded_range([f64::NAN]), None);
        let r = padded_range([0.0, 10.0, f64::INFINITY]).unwrap();
        assert!((r.start + 0.5).abs() < 1e-12 && (r.end - 10.5).abs() < 1e-12);
    }

    #[test]
    fn diff_page_shows_path_and_both_files() {
        let a = Histogram {
            edges: vec![10.0, 20.0, 40.0],
            contents: vec![3.0, 2.0],
            entries: 5.0,
            ..Histogram::default()
        };
        let b = Histogram {
            contents: vec![2.0, 1.0],
            ..a.clone()
        };
        let pair = DiffPair {
            path: "Eta/h_resp".into(),
            a: &a,
            b: &b,
        };
        let svg = diff_pair_svg(&pair, ("first.json", "second.json"), (600, 600)).unwrap();
        assert!(svg.contains("Eta/h_resp"));
        assert!(svg.contains("first.json, Entries: 5, Mean: 21.0"));
        assert!(svg.contains("second.json"));
    }

    #[test]
    fn step_points_trace_bin_edges() {
        let h = Histogram {
            name: "h".into(),
            edges: vec![0.0, 1.0, 3.0],
            contents: vec![2.0, 4.0],
            ..Histogram::default()
        };
        assert_eq!(
            step_points(&h),
            vec![(0.0, 2.0), (1.0, 2.0), (1.0, 4.0), (3.0, 4.0)]
        );
    }
}
