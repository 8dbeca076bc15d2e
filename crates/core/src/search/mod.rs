//! Web search the report personas can call while they write.

pub mod serper;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>>;
}

/// Plain-text listing handed back to the model as a tool result.
pub fn render_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("Nenhum resultado para: {query}");
    }

    hits.iter()
        .map(|h| format!("Titulo: {}\nLink: {}\nResumo: {}", h.title, h.link, h.snippet))
        .collect::<Vec<_>>()
        .join("\n---\n")
}
