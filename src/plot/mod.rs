//! Plotting: terminal ASCII previews and SVG report pages.

pub mod ascii;
pub mod pages;

pub use ascii::{AsciiOptions, render_ascii_grid, render_ascii_histogram, render_ascii_plot};
pub use pages::{
    CorrectionPage, RenderError, comparison_pages_svg, correction_page_svg, diff_pair_svg,
    profile_grid_svg,
};
