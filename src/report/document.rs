//! Multi-page report documents.
//!
//! The output format follows the file extension:
//!
//! - `.html`/`.htm`: one `<section>` per page, page breaks for printing.
//!   Pages are streamed to disk as they are added.
//! - `.svg`: all pages stacked vertically in a single SVG. Pages are buffered
//!   and written when the document is finished.
//!
//! A document is always finalized: `finish` does it explicitly, and `Drop`
//! does it for documents abandoned by an early return.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Html,
    Svg,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("html") | Some("htm") => Ok(DocumentFormat::Html),
            Some("svg") => Ok(DocumentFormat::Svg),
            _ => Err(AppError::new(
                2,
                format!(
                    "Unsupported output format '{}': use a .html or .svg file.",
                    path.display()
                ),
            )),
        }
    }
}

struct SvgPage {
    width: u32,
    height: u32,
    body: String,
}

/// A report being written to `path`.
pub struct ReportDocument {
    path: PathBuf,
    format: DocumentFormat,
    writer: Option<BufWriter<File>>,
    svg_pages: Vec<SvgPage>,
    pages: usize,
}

impl ReportDocument {
    /// Create the output file and write the document preamble.
    pub fn create(path: &Path, title: &str) -> Result<Self, AppError> {
        let format = DocumentFormat::from_path(path)?;
        let file = File::create(path).map_err(|e| {
            AppError::new(4, format!("Failed to create report '{}': {e}", path.display()))
        })?;
        let mut doc = Self {
            path: path.to_path_buf(),
            format,
            writer: Some(BufWriter::new(file)),
            svg_pages: Vec::new(),
            pages: 0,
        };
        if format == DocumentFormat::Html {
            let preamble = html_preamble(title);
            doc.write_raw(&preamble)?;
        }
        Ok(doc)
    }

    /// Append one page rendered as a standalone SVG string.
    pub fn add_page(&mut self, caption: &str, svg: &str) -> Result<(), AppError> {
        self.pages += 1;
        debug!(page = self.pages, caption, "adding page");
        match self.format {
            DocumentFormat::Html => {
                let section = format!(
                    "<section class=\"page\">\n<h2>{}</h2>\n{}\n</section>\n",
                    escape_html(caption),
                    strip_xml_declaration(svg)
                );
                self.write_raw(&section)
            }
            DocumentFormat::Svg => {
                let (width, height) = svg_size(svg).unwrap_or((800, 600));
                self.svg_pages.push(SvgPage {
                    width,
                    height,
                    body: strip_xml_declaration(svg).to_string(),
                });
                Ok(())
            }
        }
    }

    /// Write the closing part of the document and flush it.
    pub fn finish(mut self) -> Result<usize, AppError> {
        self.finalize()?;
        Ok(self.pages)
    }

    fn finalize(&mut self) -> Result<(), AppError> {
        if self.writer.is_none() {
            return Ok(());
        }
        let tail = match self.format {
            DocumentFormat::Html => {
                let mut tail = String::new();
                if self.pages == 0 {
                    tail.push_str("<p>No pages were produced.</p>\n");
                }
                tail.push_str("</body>\n</html>\n");
                tail
            }
            DocumentFormat::Svg => stack_svg_pages(&self.svg_pages),
        };
        self.write_raw(&tail)?;

        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                AppError::new(4, format!("Failed to flush report '{}': {e}", self.path.display()))
            })?;
        }
        Ok(())
    }

    fn write_raw(&mut self, text: &str) -> Result<(), AppError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(AppError::new(4, "Report document already closed."));
        };
        writer.write_all(text.as_bytes()).map_err(|e| {
            AppError::new(4, format!("Failed to write report '{}': {e}", self.path.display()))
        })
    }
}

impl Drop for ReportDocument {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(err) = self.finalize() {
                warn!(path = %self.path.display(), error = %err, "failed to finalize report");
            }
        }
    }
}

fn html_preamble(title: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>\nbody {{ font-family: sans-serif; }}\n\
         section.page {{ page-break-after: always; break-after: page; margin-bottom: 2em; }}\n\
         h2 {{ font-size: 1em; }}\n</style>\n</head>\n<body>\n\
         <header><h1>{title}</h1><p>Generated {}</p></header>\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

fn stack_svg_pages(pages: &[SvgPage]) -> String {
    let width = pages.iter().map(|p| p.width).max().unwrap_or(0);
    let height: u32 = pages.iter().map(|p| p.height).sum();
    let mut out = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
    );
    let mut offset = 0;
    for page in pages {
        out.push_str(&format!("<g transform=\"translate(0,{offset})\">\n"));
        out.push_str(&page.body);
        out.push_str("\n</g>\n");
        offset += page.height;
    }
    out.push_str("</svg>\n");
    out
}

/// `width`/`height` attributes of the root `<svg>` element.
fn svg_size(svg: &str) -> Option<(u32, u32)> {
    let start = svg.find("<svg")?;
    let end = start + svg[start..].find('>')?;
    let tag = &svg[start..end];
    Some((attr_u32(tag, "width")?, attr_u32(tag, "height")?))
}

fn attr_u32(tag: &str, name: &str) -> Option<u32> {
    let needle = format!(" {name}=\"");
    let from = tag.find(&needle)? + needle.len();
    let len = tag[from..].find('"')?;
    tag[from..from + len].trim_end_matches("px").parse().ok()
}

fn strip_xml_declaration(svg: &str) -> &str {
    let trimmed = svg.trim_start();
    if trimmed.starts_with("<?xml") {
        match trimmed.find("?>") {
            Some(end) => trimmed[end + 2..].trim_start(),
            None => trimmed,
        }
    } else {
        trimmed
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
