use std::sync::Arc;

use crate::ai::{collect_exports, BatchAnalyzer, ChannelAnalyzer, LlmClient, LlmError};
use crate::cli::AnalyzeArgs;
use crate::config::Config;
use crate::error::AppError;
use crate::meta::MetadataIndex;

pub async fn analyze_exports(config: &Config, args: AnalyzeArgs) -> Result<(), AppError> {
    let llm = &config.llm;
    let api_key = llm.api_key.clone().ok_or(LlmError::MissingApiKey)?;
    let model = llm.model_or_default().to_string();

    let client = LlmClient::new(llm.provider, api_key)
        .with_model(Some(&model))
        .with_base_url(llm.base_url.as_deref());
    let analyzer = ChannelAnalyzer::new(Arc::new(client), llm.language.clone());

    let files = collect_exports(&args.paths)?;
    if files.is_empty() {
        println!("No exports found.");
        return Ok(());
    }
    tracing::info!("Analyzing {} exports with {} ({})", files.len(), model, llm.provider);

    let index = Arc::new(MetadataIndex::load(MetadataIndex::path_for(&config.export_root)).await);
    let batch = BatchAnalyzer::new(
        Arc::new(analyzer),
        index,
        &config.export_root,
        llm.provider,
        model,
        llm.language.clone(),
    );

    let cancel = super::cancel_on_ctrl_c();
    let report = batch.run(&files, &cancel).await;

    for done in &report.analyzed {
        println!(
            "  #{}: {} in / {} out tokens, ${:.4} -> {}",
            done.channel_name,
            done.usage.input_tokens,
            done.usage.output_tokens,
            done.cost,
            done.report.display()
        );
    }
    for done in report.unindexed() {
        println!("  note: #{} is not in the index, analysis not recorded", done.channel_name);
    }
    for (path, error) in &report.failed {
        println!("  failed {}: {}", path.display(), error);
    }
    println!(
        "\nAnalyzed {} of {} exports, estimated cost ${:.4}",
        report.analyzed.len(),
        files.len(),
        report.total_cost()
    );
    if let Some(error) = &report.index_error {
        println!("  warning: index was not saved: {}", error);
    }
    Ok(())
}
