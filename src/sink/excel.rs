use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, DataType, Reader, Xlsx};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::error::{Result, TrackerError};
use crate::report::{Report, COLUMNS, STATUS_COLUMN};
use crate::sink::ReportSink;

pub const WORKBOOK_NAME: &str = "contribution_summary.xlsx";

const HEADER_FONT_SIZE: f64 = 16.0;
const BODY_FONT_SIZE: f64 = 14.0;
const EXCEEDED_FILL: u32 = 0xFF9999;
const ZOOM_PERCENT: u16 = 120;

/// Writes `contribution_summary.xlsx` into the configured directory.
/// One sheet per report identity; a same-named sheet from an earlier
/// run the same day is replaced in place, other sheets are kept.
pub struct ExcelSink {
    directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
}

type Grid = Vec<Vec<Option<Cell>>>;

impl ExcelSink {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn workbook_path(&self) -> PathBuf {
        self.directory.join(WORKBOOK_NAME)
    }
}

impl ReportSink for ExcelSink {
    fn name(&self) -> &'static str {
        "excel file"
    }

    fn write(&self, report: &Report) -> Result<()> {
        fs::create_dir_all(&self.directory).map_err(|e| {
            TrackerError::FilePersistence(format!(
                "failed to create {}: {e}",
                self.directory.display()
            ))
        })?;
        let path = self.workbook_path();

        let mut sheets = if path.exists() {
            read_existing(&path)?
        } else {
            Vec::new()
        };
        let grid = report_grid(report);
        match sheets.iter().position(|(name, _)| *name == report.sheet_name) {
            Some(i) => {
                tracing::info!(sheet = %report.sheet_name, "replacing existing report sheet");
                sheets[i].1 = grid;
            }
            None => sheets.push((report.sheet_name.clone(), grid)),
        }

        let mut workbook = Workbook::new();
        for (name, grid) in &sheets {
            write_sheet(&mut workbook, name, grid)?;
        }
        workbook.save(&path).map_err(|e| {
            TrackerError::FilePersistence(format!("failed to save {}: {e}", path.display()))
        })?;

        println!(
            "Contribution data saved to {}, sheet {}",
            path.display(),
            report.sheet_name
        );
        Ok(())
    }
}

fn report_grid(report: &Report) -> Grid {
    let mut grid: Grid = Vec::with_capacity(report.rows.len() + 1);
    grid.push(
        COLUMNS
            .iter()
            .map(|h| Some(Cell::Text(h.to_string())))
            .collect(),
    );
    for row in &report.rows {
        grid.push(vec![
            Some(Cell::Text(row.contribution_type.to_string())),
            Some(Cell::Number(row.contributed.to_f64().unwrap_or_default())),
            Some(Cell::Text(row.status.to_string())),
            Some(Cell::Number(row.amount.to_f64().unwrap_or_default())),
            Some(Cell::Number(row.limit.to_f64().unwrap_or_default())),
        ]);
    }
    grid
}

/// Reads every sheet of the existing workbook back as raw cell values.
/// The whole workbook is rewritten on save, so older report sheets are
/// carried over and re-styled with the same formats.
fn read_existing(path: &Path) -> Result<Vec<(String, Grid)>> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| {
        TrackerError::FilePersistence(format!("failed to open {}: {e}", path.display()))
    })?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name).map_err(|e| {
            TrackerError::FilePersistence(format!("failed to read sheet {name}: {e}"))
        })?;
        let (row_start, col_start) = range.start().unwrap_or((0, 0));
        let mut grid: Grid = vec![Vec::new(); row_start as usize];
        for row in range.rows() {
            let mut cells: Vec<Option<Cell>> = vec![None; col_start as usize];
            cells.extend(row.iter().map(cell_from));
            grid.push(cells);
        }
        sheets.push((name, grid));
    }
    Ok(sheets)
}

fn cell_from(data: &Data) -> Option<Cell> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(Cell::Text(s.clone())),
        Data::Bool(b) => Some(Cell::Text(b.to_string())),
        other => other
            .as_f64()
            .map(Cell::Number)
            .or_else(|| other.as_string().map(Cell::Text)),
    }
}

fn write_sheet(workbook: &mut Workbook, name: &str, grid: &Grid) -> Result<()> {
    let header = Format::new().set_bold().set_font_size(HEADER_FONT_SIZE);
    let body = Format::new().set_font_size(BODY_FONT_SIZE);
    let exceeded = Format::new()
        .set_font_size(BODY_FONT_SIZE)
        .set_background_color(EXCEEDED_FILL);

    let sheet = workbook.add_worksheet();
    sheet.set_name(name).map_err(persist_err)?;

    for (r, row) in grid.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let Some(cell) = cell else { continue };
            let format = if r == 0 {
                &header
            } else if c == STATUS_COLUMN && is_exceeded(cell) {
                &exceeded
            } else {
                &body
            };
            match cell {
                Cell::Text(s) => sheet.write_with_format(r as u32, c as u16, s.as_str(), format),
                Cell::Number(n) => sheet.write_with_format(r as u32, c as u16, *n, format),
            }
            .map_err(persist_err)?;
        }
    }

    for (c, width) in column_widths(grid) {
        sheet.set_column_width(c as u16, width).map_err(persist_err)?;
    }
    sheet.set_zoom(ZOOM_PERCENT);
    Ok(())
}

fn is_exceeded(cell: &Cell) -> bool {
    matches!(cell, Cell::Text(s) if s.contains("Exceeded"))
}

/// Content-fitted widths, same heuristic as the sheet column sizing the
/// report has always used: longest cell text plus padding.
fn column_widths(grid: &Grid) -> Vec<(usize, f64)> {
    let mut max_lens: Vec<usize> = Vec::new();
    for row in grid {
        for (c, cell) in row.iter().enumerate() {
            if max_lens.len() <= c {
                max_lens.resize(c + 1, 0);
            }
            if let Some(cell) = cell {
                max_lens[c] = max_lens[c].max(cell_text(cell).len());
            }
        }
    }
    max_lens
        .into_iter()
        .enumerate()
        .filter(|(_, len)| *len > 0)
        .map(|(c, len)| (c, (len + 2) as f64 * 1.2))
        .collect()
}

fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => s.clone(),
        Cell::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        Cell::Number(n) => n.to_string(),
    }
}

fn persist_err(e: XlsxError) -> TrackerError {
    TrackerError::FilePersistence(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{evaluate_all, ContributionInput};
    use crate::limits::LimitTable;
    use crate::report::Report;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn report_for(year: i32, hsa: Decimal, k401: Decimal, day: time::Date) -> Report {
        let input = ContributionInput::new(year, hsa, k401, false).unwrap();
        let statuses = evaluate_all(&input, &LimitTable::builtin()).unwrap();
        Report::new(year, &statuses, day).unwrap()
    }

    fn read_sheet(path: &Path, sheet: &str) -> Vec<Vec<Data>> {
        let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
        workbook
            .worksheet_range(sheet)
            .unwrap()
            .rows()
            .map(|r| r.to_vec())
            .collect()
    }

    #[test]
    fn writes_header_and_both_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ExcelSink::new(dir.path());
        let report = report_for(2024, dec!(5000), dec!(20000), date!(2024 - 06 - 01));
        sink.write(&report).unwrap();

        let rows = read_sheet(&sink.workbook_path(), "2024_Summary_2024-06-01");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Data::String("Contribution Type".to_string()));
        assert_eq!(rows[0][4], Data::String("Contribution Limit ($)".to_string()));
        assert_eq!(rows[1][0], Data::String("HSA Individual".to_string()));
        assert_eq!(rows[1][2], Data::String("Exceeded Contribution".to_string()));
        assert_eq!(rows[1][3], Data::Float(850.0));
        assert_eq!(rows[2][0], Data::String("401(k) Individual".to_string()));
        assert_eq!(rows[2][3], Data::Float(3000.0));
        assert_eq!(rows[2][4], Data::Float(23000.0));
    }

    #[test]
    fn same_day_rerun_replaces_the_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ExcelSink::new(dir.path());
        let day = date!(2024 - 06 - 01);
        sink.write(&report_for(2024, dec!(1000), dec!(1000), day))
            .unwrap();
        sink.write(&report_for(2024, dec!(2000), dec!(5000), day))
            .unwrap();

        let mut workbook: Xlsx<_> = open_workbook(sink.workbook_path()).unwrap();
        assert_eq!(workbook.sheet_names().len(), 1);
        let rows = read_sheet(&sink.workbook_path(), "2024_Summary_2024-06-01");
        assert_eq!(rows[1][1], Data::Float(2000.0));
        assert_eq!(rows[2][1], Data::Float(5000.0));
    }

    #[test]
    fn other_days_reports_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ExcelSink::new(dir.path());
        sink.write(&report_for(2024, dec!(1000), dec!(1000), date!(2024 - 06 - 01)))
            .unwrap();
        sink.write(&report_for(2024, dec!(2000), dec!(2000), date!(2024 - 06 - 02)))
            .unwrap();

        let mut workbook: Xlsx<_> = open_workbook(sink.workbook_path()).unwrap();
        let names = workbook.sheet_names();
        assert_eq!(
            names,
            vec![
                "2024_Summary_2024-06-01".to_string(),
                "2024_Summary_2024-06-02".to_string()
            ]
        );
        let rows = read_sheet(&sink.workbook_path(), "2024_Summary_2024-06-01");
        assert_eq!(rows[1][1], Data::Float(1000.0));
    }

    #[test]
    fn unwritable_directory_is_a_file_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, b"x").unwrap();
        let sink = ExcelSink::new(&file);
        let report = report_for(2024, dec!(0), dec!(0), date!(2024 - 06 - 01));
        assert!(matches!(
            sink.write(&report),
            Err(TrackerError::FilePersistence(_))
        ));
    }
}
