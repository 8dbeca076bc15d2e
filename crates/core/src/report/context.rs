use crate::storage::csv_table::UTF8_BOM;
use anyhow::Context;
use std::path::Path;

pub const NO_NEWS_PLACEHOLDER: &str = "Nenhuma noticia de investimento carregada do CSV.";

const NEWS_TITLE_COLUMN: &str = "titulo";
const NEWS_LINK_COLUMN: &str = "link";

/// A CSV file kept as plain strings; columns are whatever the header says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvDataset {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl CsvDataset {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("invalid CSV in {}", path.display()))
    }

    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut rdr = csv::Reader::from_reader(body);

        let headers: Vec<String> = rdr
            .headers()
            .context("failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records: Vec<Vec<String>> = Vec::new();
        for rec in rdr.records() {
            let rec = rec.context("failed to read CSV record")?;
            records.push(rec.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, records })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Pipe table with a header row; no index column.
    pub fn to_markdown_table(&self) -> String {
        let mut out = String::new();
        push_markdown_row(&mut out, &self.headers);
        out.push('|');
        for _ in &self.headers {
            out.push_str(" --- |");
        }
        out.push('\n');
        for rec in &self.records {
            push_markdown_row(&mut out, rec);
        }
        out
    }
}

fn push_markdown_row(out: &mut String, cells: &[String]) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&cell.replace('|', "\\|").replace('\n', " "));
        out.push_str(" |");
    }
    out.push('\n');
}

/// One `Titulo:`/`Link:` block per headline.
pub fn render_news(news: &CsvDataset) -> anyhow::Result<String> {
    if news.is_empty() {
        return Ok(NO_NEWS_PLACEHOLDER.to_string());
    }

    let title = news
        .column(NEWS_TITLE_COLUMN)
        .with_context(|| format!("news CSV has no '{NEWS_TITLE_COLUMN}' column"))?;
    let link = news
        .column(NEWS_LINK_COLUMN)
        .with_context(|| format!("news CSV has no '{NEWS_LINK_COLUMN}' column"))?;

    let blocks: Vec<String> = news
        .records
        .iter()
        .map(|rec| {
            let cell = |i: usize| rec.get(i).map(String::as_str).unwrap_or("");
            format!("Titulo: {}\nLink: {}", cell(title), cell(link))
        })
        .collect();
    Ok(blocks.join("\n"))
}

/// Prompt-ready renderings of the three input datasets.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub stocks: String,
    pub indicators: String,
    pub news: String,
}

impl ReportContext {
    pub fn from_datasets(
        stocks: &CsvDataset,
        news: &CsvDataset,
        indicators: &CsvDataset,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            stocks: stocks.to_markdown_table(),
            indicators: indicators.to_markdown_table(),
            news: render_news(news)?,
        })
    }

    /// Everything the macro analyst sees.
    pub fn general(&self) -> String {
        format!(
            "=== Dados historicos de indices economicos ===\n{}\n\
             === Noticias de investimento recentes ===\n{}\n\n\
             === Top 10 acoes ===\n{}",
            self.indicators, self.news, self.stocks
        )
    }
}
