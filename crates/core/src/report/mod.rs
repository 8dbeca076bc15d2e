//! Markdown investment report built from the collected CSV datasets.
//!
//! Three personas run one after another (macro analyst, stock specialist,
//! report writer); each sees the CSV context plus the earlier outputs it
//! depends on. The writer's output is the report.

pub mod context;
pub mod pipeline;

use crate::llm::text::strip_code_fence;
use crate::llm::LlmClient;
use anyhow::Context;
use context::{CsvDataset, ReportContext};
use pipeline::{Agent, Pipeline, Task};
use std::path::{Path, PathBuf};

pub const DEFAULT_STOCKS_PATH: &str = "data/top_10_acoes.csv";
pub const DEFAULT_NEWS_PATH: &str = "data/noticias_investimentos.csv";
pub const DEFAULT_INDICATORS_PATH: &str = "data/indicadores_economicos.csv";
pub const DEFAULT_REPORT_PATH: &str = "reports/relatorio_investimentos.md";

#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub stocks: PathBuf,
    pub news: PathBuf,
    pub indicators: PathBuf,
}

impl Default for ReportInputs {
    fn default() -> Self {
        Self {
            stocks: PathBuf::from(DEFAULT_STOCKS_PATH),
            news: PathBuf::from(DEFAULT_NEWS_PATH),
            indicators: PathBuf::from(DEFAULT_INDICATORS_PATH),
        }
    }
}

impl ReportInputs {
    pub fn load_context(&self) -> anyhow::Result<ReportContext> {
        for path in [&self.stocks, &self.news, &self.indicators] {
            anyhow::ensure!(
                path.exists(),
                "CSV file not found: {}. Expected top_10_acoes.csv, noticias_investimentos.csv \
                 and indicadores_economicos.csv in the data directory",
                path.display()
            );
        }

        let stocks = CsvDataset::load(&self.stocks)?;
        let news = CsvDataset::load(&self.news)?;
        let indicators = CsvDataset::load(&self.indicators)?;

        tracing::info!(
            stocks = stocks.records.len(),
            news = news.records.len(),
            indicators = indicators.records.len(),
            "report inputs loaded"
        );

        ReportContext::from_datasets(&stocks, &news, &indicators)
    }
}

fn macro_analyst() -> Agent {
    Agent {
        role: "Analista Macroeconomico Senior".to_string(),
        goal: "Analisar a conjuntura economica brasileira, interpretar indicadores e noticias, \
               modelar cenarios e apontar seus efeitos sobre o mercado de acoes."
            .to_string(),
        backstory: "Economista com longa experiencia na analise da conjuntura brasileira, \
                    dos indicadores economicos e de seus efeitos sobre o mercado."
            .to_string(),
    }
}

fn stock_specialist() -> Agent {
    Agent {
        role: "Especialista em Analise de Acoes da Bovespa".to_string(),
        goal: "Avaliar empresas e setores, acompanhar precos e volumes negociados, interpretar \
               o cenario economico e recomendar compra, venda ou manutencao de acoes."
            .to_string(),
        backstory: "Economista especializado em mercado de acoes, valuation de empresas e \
                    estrategias de investimento."
            .to_string(),
    }
}

fn report_writer() -> Agent {
    Agent {
        role: "Redator de Relatorios de Investimentos".to_string(),
        goal: "Organizar as analises recebidas em um relatorio claro, objetivo e fiel as \
               recomendacoes dos analistas."
            .to_string(),
        backstory: "Profissional de comunicacao do mercado financeiro que transforma analises \
                    tecnicas complexas em relatorios acessiveis."
            .to_string(),
    }
}

/// The fixed three-step chain over the given CSV context.
pub fn investment_pipeline(ctx: &ReportContext) -> anyhow::Result<Pipeline> {
    let scenario = Task {
        name: "analise_cenario",
        description: format!(
            "Analise o cenario macroeconomico brasileiro com base nos dados abaixo. Se a \
             ferramenta web_search estiver disponivel, use-a para complementar com noticias \
             recentes.\n\n{}",
            ctx.general()
        ),
        expected_output: "Um relatorio conciso sobre o cenario macroeconomico brasileiro, destacando:\n\
             - a trajetoria recente dos indices e suas perspectivas;\n\
             - as principais noticias e eventos de investimento relevantes (do CSV e da \
               pesquisa online, quando disponivel);\n\
             - os impactos esperados sobre o mercado de acoes brasileiro."
            .to_string(),
        agent: macro_analyst(),
        context: vec![],
    };

    let picks = Task {
        name: "indicacao_acoes",
        description: format!(
            "Com base no cenario macroeconomico e nas cotacoes recentes abaixo, indique acoes \
             da Bovespa.\n\n=== Top 10 acoes ===\n{}",
            ctx.stocks
        ),
        expected_output: "Um relatorio de indicacoes de acoes contendo:\n\
             - recomendacoes claras de COMPRA, VENDA ou MANTER para 3 a 5 acoes da Bovespa;\n\
             - justificativa detalhada para cada recomendacao;\n\
             - prioridade para as acoes listadas nas cotacoes recentes."
            .to_string(),
        agent: stock_specialist(),
        context: vec![0],
    };

    let report = Task {
        name: "relatorio_final",
        description: format!(
            "Compile as analises anteriores em um relatorio de investimento final. Cotacoes de \
             referencia:\n\n{}",
            ctx.stocks
        ),
        expected_output: "O texto completo e final de um relatorio de investimento em formato \
             Markdown, em portugues do Brasil."
            .to_string(),
        agent: report_writer(),
        context: vec![0, 1],
    };

    Pipeline::new(vec![scenario, picks, report])
}

/// Run the pipeline over `ctx` and return the final Markdown text.
pub async fn generate_report(llm: &dyn LlmClient, ctx: &ReportContext) -> anyhow::Result<String> {
    let pipeline = investment_pipeline(ctx)?;
    let outputs = pipeline.run(llm).await?;

    let last = outputs.last().context("pipeline produced no output")?;
    Ok(strip_code_fence(&last.text).to_string())
}

pub fn write_report(markdown: &str, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    }

    let mut body = markdown.trim_end().to_string();
    body.push('\n');
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
