use crate::domain::bar::{CombinedTable, DailyBar};
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Byte-order marker so spreadsheet tools detect UTF-8.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const DEFAULT_OUTPUT_PATH: &str = "data/top_10_acoes.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Table was empty; the destination was left untouched.
    Skipped,
    Written { rows: usize },
}

// Column names are part of the file contract read by the report pipeline.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "data")]
    date: NaiveDate,
    #[serde(rename = "abertura")]
    open: f64,
    #[serde(rename = "alta")]
    high: f64,
    #[serde(rename = "baixa")]
    low: f64,
    #[serde(rename = "fechamento")]
    close: f64,
    volume: f64,
    ticker: String,
}

impl From<&DailyBar> for CsvRow {
    fn from(bar: &DailyBar) -> Self {
        Self {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            ticker: bar.ticker.clone(),
        }
    }
}

impl From<CsvRow> for DailyBar {
    fn from(row: CsvRow) -> Self {
        Self {
            ticker: row.ticker,
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

/// Write the whole table in one shot, replacing any previous file.
///
/// Rows go to a temp file next to `path` which is then renamed over it, so a
/// failed write never leaves a partial CSV behind.
pub fn write_combined_table(
    table: &CombinedTable,
    path: impl AsRef<Path>,
) -> anyhow::Result<WriteOutcome> {
    if table.is_empty() {
        return Ok(WriteOutcome::Skipped);
    }

    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    // Temp files default to owner-only; ask for what a plain create would get.
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(UTF8_BOM).context("failed to write BOM")?;

    {
        let mut wtr = csv::Writer::from_writer(tmp.as_file_mut());
        for bar in table.rows() {
            wtr.serialize(CsvRow::from(bar))
                .with_context(|| format!("failed to write CSV row for {} {}", bar.ticker, bar.date))?;
        }
        wtr.flush().context("failed to flush CSV writer")?;
    }

    // An overwritten file keeps its mode.
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .with_context(|| format!("failed to copy permissions of {}", path.display()))?;
    }

    tmp.persist(path)
        .with_context(|| format!("failed to move CSV into place at {}", path.display()))?;

    tracing::debug!(path = %path.display(), rows = table.len(), "combined table written");
    Ok(WriteOutcome::Written { rows: table.len() })
}

pub fn read_combined_table(path: impl AsRef<Path>) -> anyhow::Result<CombinedTable> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut rdr = csv::Reader::from_reader(body);
    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = rec.with_context(|| format!("invalid row {} in {}", idx + 1, path.display()))?;
        rows.push(DailyBar::from(row));
    }

    Ok(CombinedTable::from_rows(rows))
}
