// elfwatch/src/summary.rs
//
// Untyped view of every CSV in the data directory, for the data-summary
// endpoint and the `explore` mode. Unlike the loader this accepts any
// column set: cells are typed per value as integer, float, string, or null
// (empty).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::loader::LoadError;

pub const SAMPLE_ROWS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub columns:   Vec<String>,
    pub row_count: usize,
    pub sample:    Vec<Map<String, Value>>,
}

/// Per-column profile shown by `explore`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name:     String,
    pub non_null: usize,
    pub dtype:    &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileProfile {
    pub file:    String,
    pub summary: FileSummary,
    pub columns: Vec<ColumnProfile>,
}

pub fn infer_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::String(s.to_string())
}

/// `*.csv` files directly under `dir`, sorted by name.
pub fn csv_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io = |source| LoadError::Io { path: dir.to_path_buf(), source };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        let is_csv = path.extension().map(|e| e.eq_ignore_ascii_case("csv")).unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn profile_file(path: &Path) -> Result<FileProfile, LoadError> {
    let csv_err = |source| LoadError::Csv { path: path.to_path_buf(), source };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let columns: Vec<String> = reader.headers().map_err(csv_err)?
        .iter().map(str::to_string).collect();

    let mut row_count = 0usize;
    let mut sample    = Vec::new();
    let mut non_null  = vec![0usize; columns.len()];
    let mut kinds     = vec![Kind::Empty; columns.len()];

    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        row_count += 1;

        let cells: Vec<Value> = record.iter().map(infer_cell).collect();
        for (i, cell) in cells.iter().enumerate().take(columns.len()) {
            if !cell.is_null() {
                non_null[i] += 1;
            }
            kinds[i] = kinds[i].widen(cell);
        }

        if sample.len() < SAMPLE_ROWS {
            let row: Map<String, Value> = columns.iter().cloned()
                .zip(cells.into_iter().chain(std::iter::repeat(Value::Null)))
                .collect();
            sample.push(row);
        }
    }

    let column_profiles = columns.iter().zip(non_null).zip(&kinds)
        .map(|((name, non_null), kind)| ColumnProfile {
            name: name.clone(),
            non_null,
            dtype: kind.dtype(),
        })
        .collect();

    let file = path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(FileProfile {
        file,
        summary: FileSummary { columns, row_count, sample },
        columns: column_profiles,
    })
}

/// Summaries for every CSV in `dir`, keyed by file name.
pub fn summarize_dir(dir: &Path) -> Result<BTreeMap<String, FileSummary>, LoadError> {
    csv_files(dir)?
        .iter()
        .map(|p| profile_file(p).map(|fp| (fp.file, fp.summary)))
        .collect()
}

/// Render the `explore` report for one file.
pub fn render_profile(fp: &FileProfile) -> String {
    let rule = "=".repeat(50);
    let mut out = String::new();
    out.push_str(&format!("\n{}\nExamining: {}\n{}\n", rule, fp.file, rule));
    out.push_str(&format!("\nColumns:\n{:?}\n", fp.summary.columns));
    out.push_str("\nFirst few rows:\n");
    for row in &fp.summary.sample {
        out.push_str(&format!("{}\n", Value::Object(row.clone())));
    }
    out.push_str(&format!("\nBasic information:\n{} rows, {} columns\n", fp.summary.row_count, fp.columns.len()));
    out.push_str(&format!(" {:<32} {:>10}  {}\n", "Column", "Non-Null", "Dtype"));
    for c in &fp.columns {
        out.push_str(&format!(" {:<32} {:>10}  {}\n", c.name, c.non_null, c.dtype));
    }
    out
}

// ── Column type widening ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind { Empty, Int, Float, Text }

impl Kind {
    fn widen(self, cell: &Value) -> Self {
        let seen = match cell {
            Value::Null => return self,
            Value::Number(n) if n.is_i64() => Kind::Int,
            Value::Number(_) => Kind::Float,
            _ => Kind::Text,
        };
        match (self, seen) {
            (Kind::Empty, k) => k,
            (Kind::Text, _) | (_, Kind::Text) => Kind::Text,
            (Kind::Float, _) | (_, Kind::Float) => Kind::Float,
            _ => Kind::Int,
        }
    }

    fn dtype(self) -> &'static str {
        match self {
            Kind::Int => "int64",
            Kind::Float => "float64",
            Kind::Empty | Kind::Text => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn infer_cell_types() {
        assert_eq!(infer_cell("42"), Value::from(42));
        assert_eq!(infer_cell("4.5"), Value::from(4.5));
        assert_eq!(infer_cell(" Wrapping "), Value::from("Wrapping"));
        assert_eq!(infer_cell(""), Value::Null);
        assert_eq!(infer_cell("NaN"), Value::from("NaN"));
    }

    #[test]
    fn summary_has_two_samples_and_full_row_count() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Elf_Schedule.csv"),
            "Elf_Name,Assigned_Production_Line,Days_Off\nA,Wrapping,Sunday\nB,Painting,\nC,Toys,Monday\nD,Toys,Friday\n",
        ).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let all = summarize_dir(dir.path()).unwrap();
        assert_eq!(all.len(), 1);
        let s = &all["Elf_Schedule.csv"];
        assert_eq!(s.columns.len(), 3);
        assert_eq!(s.row_count, 4);
        assert_eq!(s.sample.len(), 2);
        assert_eq!(s.sample[0]["Elf_Name"], Value::from("A"));
        assert!(s.sample[1]["Days_Off"].is_null());
    }

    #[test]
    fn short_files_sample_every_row() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.csv"), "x,y\n1,2\n").unwrap();
        let all = summarize_dir(dir.path()).unwrap();
        assert_eq!(all["one.csv"].row_count, 1);
        assert_eq!(all["one.csv"].sample.len(), 1);
    }

    #[test]
    fn column_profiles_widen_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        fs::write(&path, "a,b,c,d\n1,1,x,\n2,2.5,3,\n").unwrap();
        let fp = profile_file(&path).unwrap();
        let dtypes: Vec<_> = fp.columns.iter().map(|c| c.dtype).collect();
        assert_eq!(dtypes, vec!["int64", "float64", "object", "object"]);
        assert_eq!(fp.columns[3].non_null, 0);
        assert!(render_profile(&fp).contains("Examining: mixed.csv"));
    }
}
