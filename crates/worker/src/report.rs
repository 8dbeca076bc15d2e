use pregao_core::config::Settings;
use pregao_core::llm::anthropic::AnthropicClient;
use pregao_core::report::{self, ReportInputs};
use pregao_core::search::serper::SerperClient;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    /// Collected daily quotes.
    #[arg(long, default_value = report::DEFAULT_STOCKS_PATH)]
    stocks: PathBuf,

    /// Investment news (columns: titulo, link).
    #[arg(long, default_value = report::DEFAULT_NEWS_PATH)]
    news: PathBuf,

    /// Economic indicators.
    #[arg(long, default_value = report::DEFAULT_INDICATORS_PATH)]
    indicators: PathBuf,

    /// Destination Markdown file.
    #[arg(long, default_value = report::DEFAULT_REPORT_PATH)]
    output: PathBuf,

    /// Do not offer web search even when SERPER_API_KEY is set.
    #[arg(long)]
    no_search: bool,
}

pub async fn run(settings: &Settings, args: ReportArgs) -> anyhow::Result<()> {
    let inputs = ReportInputs {
        stocks: args.stocks,
        news: args.news,
        indicators: args.indicators,
    };

    // Inputs are checked before LLM credentials are required.
    let ctx = inputs.load_context()?;

    let mut llm = AnthropicClient::from_settings(settings)?;
    match SerperClient::from_settings(settings)? {
        Some(search) if !args.no_search => {
            tracing::info!("web search enabled for report personas");
            llm = llm.with_search(Arc::new(search));
        }
        Some(_) => tracing::info!("web search disabled by --no-search"),
        None => tracing::info!("SERPER_API_KEY not set; report runs without web search"),
    }

    let markdown = report::generate_report(&llm, &ctx).await?;
    report::write_report(&markdown, &args.output)?;

    tracing::info!(path = %args.output.display(), chars = markdown.len(), "report written");
    Ok(())
}
