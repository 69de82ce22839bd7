//! Correction text-file parsing.
//!
//! A correction file is line-oriented:
//!
//! ```text
//! {1 JetEta 1 JetPt max(0.0001,[0]+[1]*log10(x)) Correction L2Relative}
//! -5.191 -4.889 13 10 6500 1.02 0.3 ...
//! ```
//!
//! The first line starting with `{` is the header; the formula is the text
//! between `JetPt` and `Correction`. Every other non-blank line is a data row.
//!
//! Row-level problems never abort the file: the row is recorded in
//! `row_errors` and parsing continues.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::domain::{CorrectionRecord, EtaBin, LayoutMode, RowLayout, ValidityWindow};
use crate::error::AppError;

const FORMULA_START: &str = "JetPt";
const FORMULA_END: &str = "Correction";

/// File-level header problems (fatal for the file).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HeaderError {
    #[error("No header function found in the file.")]
    MissingHeader,
    #[error("Error parsing function expression from header: no `JetPt` marker in '{0}'")]
    MissingFormula(String),
    #[error("Error parsing function expression from header: empty formula in '{0}'")]
    EmptyFormula(String),
}

/// Why a data row was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowIssue {
    #[error("row has {found} tokens but the {layout:?} layout needs {needed}")]
    TooShort {
        found: usize,
        needed: usize,
        layout: RowLayout,
    },
    #[error("cannot convert {field} '{token}' to a number")]
    NumericConversion { field: &'static str, token: String },
    #[error("validity range {min} -- {max} is not an increasing finite range")]
    InvalidValidity { min: f64, max: f64 },
}

/// A skipped data row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub text: String,
    pub issue: RowIssue,
}

/// Parse output: formula template, usable records, skipped rows.
#[derive(Debug, Clone)]
pub struct CorrectionFile {
    pub template: String,
    pub header_line: usize,
    pub records: Vec<CorrectionRecord>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Read and parse a correction text file.
pub fn load_correction_file(path: &Path, layout: LayoutMode) -> Result<CorrectionFile, AppError> {
    if !path.is_file() {
        return Err(AppError::missing_file("correction file", path));
    }
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::new(2, format!("Failed to read correction file '{}': {e}", path.display()))
    })?;
    Ok(parse_lines(text.lines(), layout)?)
}

/// Parse the lines of a correction file.
pub fn parse_lines<'a, I>(lines: I, layout: LayoutMode) -> Result<CorrectionFile, HeaderError>
where
    I: IntoIterator<Item = &'a str>,
{
    let lines: Vec<&str> = lines.into_iter().collect();

    let (header_idx, header) = lines
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx, line.trim()))
        .find(|(_, line)| line.starts_with('{'))
        .ok_or(HeaderError::MissingHeader)?;
    let template = extract_template(header)?;

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('{') {
            continue;
        }
        rows_read += 1;

        match parse_row(idx + 1, line, layout) {
            Ok(record) => records.push(record),
            Err(issue) => row_errors.push(RowError {
                line: idx + 1,
                text: line.to_string(),
                issue,
            }),
        }
    }

    Ok(CorrectionFile {
        template,
        header_line: header_idx + 1,
        records,
        row_errors,
        rows_read,
    })
}

/// Extract the formula template from a header line.
pub fn extract_template(header: &str) -> Result<String, HeaderError> {
    let inner = header.trim().trim_matches(|c: char| c == '{' || c == '}');
    let (_, after_start) = inner
        .split_once(FORMULA_START)
        .ok_or_else(|| HeaderError::MissingFormula(inner.to_string()))?;
    // Without an end marker the rest of the header is the formula.
    let formula = match after_start.split_once(FORMULA_END) {
        Some((formula, _)) => formula,
        None => after_start,
    }
    .trim();

    if formula.is_empty() {
        return Err(HeaderError::EmptyFormula(inner.to_string()));
    }
    Ok(formula.to_string())
}

/// Parse one whitespace-separated data row.
pub fn parse_row(line: usize, text: &str, mode: LayoutMode) -> Result<CorrectionRecord, RowIssue> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let layout = mode.resolve(tokens.len());

    if tokens.len() < layout.min_tokens() {
        return Err(RowIssue::TooShort {
            found: tokens.len(),
            needed: layout.min_tokens(),
            layout,
        });
    }

    let eta = EtaBin {
        low: parse_field(tokens[0], "eta_low")?,
        high: parse_field(tokens[1], "eta_high")?,
    };

    let v = layout.validity_index();
    let validity = ValidityWindow {
        min: parse_field(tokens[v], "pt_min")?,
        max: parse_field(tokens[v + 1], "pt_max")?,
    };
    if !(validity.min.is_finite() && validity.max.is_finite()) || validity.min > validity.max {
        return Err(RowIssue::InvalidValidity {
            min: validity.min,
            max: validity.max,
        });
    }

    let p = layout.parameter_index();
    let parameters = tokens[p..p + RowLayout::PARAMETER_COUNT]
        .iter()
        .map(|tok| parse_field(tok, "parameter"))
        .collect::<Result<Vec<f64>, RowIssue>>()?;

    Ok(CorrectionRecord {
        line,
        layout,
        eta,
        validity,
        parameters,
    })
}

fn parse_field(token: &str, field: &'static str) -> Result<f64, RowIssue> {
    token.parse::<f64>().map_err(|_| RowIssue::NumericConversion {
        field,
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "{1 JetEta 1 JetPt max(0.0001,[0]+[1]*log10(x)) Correction L2Relative}";

    fn minimal_row(eta_low: &str) -> String {
        format!("{eta_low} 3.0 13 10 6500 1.0 0.5 0 0 0 0 0 0 0 0 0")
    }

    #[test]
    fn extracts_template_between_markers() {
        assert_eq!(
            extract_template(HEADER).unwrap(),
            "max(0.0001,[0]+[1]*log10(x))"
        );
        assert_eq!(extract_template("{JetPt [0]*x}").unwrap(), "[0]*x");
        assert!(matches!(
            extract_template("{1 JetEta Correction}"),
            Err(HeaderError::MissingFormula(_))
        ));
        assert!(matches!(
            extract_template("{JetPt Correction}"),
            Err(HeaderError::EmptyFormula(_))
        ));
    }

    #[test]
    fn minimal_row_yields_eleven_parameters() {
        let record = parse_row(2, &minimal_row("0.0"), LayoutMode::Auto).unwrap();
        assert_eq!(record.layout, RowLayout::Minimal);
        assert_eq!(record.eta, EtaBin { low: 0.0, high: 3.0 });
        assert_eq!(record.validity, ValidityWindow { min: 10.0, max: 6500.0 });
        assert_eq!(record.parameters.len(), 11);
        assert_eq!(record.parameters[0], 1.0);
        assert_eq!(record.parameters[1], 0.5);
    }

    #[test]
    fn extended_row_shifts_offsets_by_two() {
        let text = "-5.191 -4.889 7 9 13 15 3500 1 2 3 4 5 6 7 8 9 10 11";
        let record = parse_row(3, text, LayoutMode::Auto).unwrap();
        assert_eq!(record.layout, RowLayout::Extended);
        assert_eq!(record.eta, EtaBin { low: -5.191, high: -4.889 });
        assert_eq!(record.validity, ValidityWindow { min: 15.0, max: 3500.0 });
        assert_eq!(record.parameters, (1..=11).map(f64::from).collect::<Vec<_>>());
        assert!(record.validity.min <= record.validity.max);
    }

    #[test]
    fn forced_layout_overrides_token_count() {
        let text = format!("{} extra", minimal_row("0.0"));
        let auto = parse_row(1, &text, LayoutMode::Auto);
        assert!(matches!(auto, Err(RowIssue::TooShort { needed: 18, .. })));

        let forced = parse_row(1, &text, LayoutMode::Minimal).unwrap();
        assert_eq!(forced.layout, RowLayout::Minimal);
        assert_eq!(forced.parameters.len(), 11);
    }

    #[test]
    fn short_and_bad_rows_are_skipped_not_fatal() {
        let good = minimal_row("0.0");
        let bad_number = minimal_row("abc");
        let lines = vec![
            "",
            HEADER,
            "1 2 3 4 5 6 7 8 9 10",
            good.as_str(),
            bad_number.as_str(),
            "0 1 13 500 10 1 1 1 1 1 1 1 1 1 1 1",
            good.as_str(),
        ];
        let parsed = parse_lines(lines, LayoutMode::Auto).unwrap();

        assert_eq!(parsed.template, "max(0.0001,[0]+[1]*log10(x))");
        assert_eq!(parsed.header_line, 2);
        assert_eq!(parsed.rows_read, 5);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].line, 4);
        assert_eq!(parsed.records[1].line, 7);

        assert_eq!(parsed.row_errors.len(), 3);
        assert_eq!(parsed.row_errors[0].line, 3);
        assert!(matches!(
            parsed.row_errors[0].issue,
            RowIssue::TooShort { found: 10, needed: 16, .. }
        ));
        assert!(matches!(
            parsed.row_errors[1].issue,
            RowIssue::NumericConversion { field: "eta_low", .. }
        ));
        assert!(matches!(
            parsed.row_errors[2].issue,
            RowIssue::InvalidValidity { .. }
        ));
    }

    #[test]
    fn missing_header_is_fatal() {
        let row = minimal_row("0.0");
        let err = parse_lines(vec![row.as_str()], LayoutMode::Auto).unwrap_err();
        assert_eq!(err, HeaderError::MissingHeader);
    }

    #[test]
    fn additional_brace_lines_are_not_data() {
        let row = minimal_row("0.0");
        let lines = vec![HEADER, "{ a second header }", row.as_str()];
        let parsed = parse_lines(lines, LayoutMode::Auto).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.row_errors.is_empty());
    }
}
