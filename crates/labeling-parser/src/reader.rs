use crate::error::{ParseError, Result};
use crate::template::FileType;
use calamine::Reader as CalamineReader;
use std::path::Path;

/// Reads every row of the raw file as strings, header row included. Column
/// layout and semantics are resolved later by the caller once it knows the
/// template's `headRow`/`skipRow`.
pub fn read_raw_rows(
    path: &Path,
    file_type: FileType,
    sheet_name: Option<&str>,
) -> Result<Vec<Vec<String>>> {
    match file_type {
        FileType::Csv => read_csv_rows(path),
        FileType::Xls | FileType::Xlsx => read_spreadsheet_rows(path, file_type, sheet_name),
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(ParseError::Csv)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(ParseError::Csv)?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

fn read_spreadsheet_rows(
    path: &Path,
    file_type: FileType,
    sheet_name: Option<&str>,
) -> Result<Vec<Vec<String>>> {
    let range = match file_type {
        FileType::Xlsx => {
            let mut wb: calamine::Xlsx<_> = calamine::open_workbook(path)
                .map_err(|e| ParseError::Calamine(calamine::Error::Xlsx(e)))?;
            let sheet = sheet_name
                .map(|s| s.to_string())
                .or_else(|| wb.sheet_names().first().cloned())
                .ok_or_else(|| ParseError::SheetNotFound("<none>".to_string()))?;
            wb.worksheet_range(&sheet)
                .map_err(|_| ParseError::SheetNotFound(sheet))?
        }
        FileType::Xls => {
            let mut wb: calamine::Xls<_> = calamine::open_workbook(path)
                .map_err(|e| ParseError::Calamine(calamine::Error::Xls(e)))?;
            let sheet = sheet_name
                .map(|s| s.to_string())
                .or_else(|| wb.sheet_names().first().cloned())
                .ok_or_else(|| ParseError::SheetNotFound("<none>".to_string()))?;
            wb.worksheet_range(&sheet)
                .map_err(|_| ParseError::SheetNotFound(sheet))?
        }
        FileType::Csv => unreachable!(),
    };

    let mut rows = Vec::with_capacity(range.height());
    for row in range.rows() {
        rows.push(row.iter().map(cell_to_string).collect());
    }
    Ok(rows)
}

fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_float(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}
