//! Markdown rendering of an analysis result.

use chrono::Local;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::types::{AnalysisResult, Sentiment};
use crate::export::{sanitize_filename, ExportError, ANALYSIS_SUFFIX};

const MAX_TOPICS_CELL: usize = 50;

pub fn report_path(channel_name: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{}{}", sanitize_filename(channel_name), ANALYSIS_SUFFIX))
}

/// Write `<channel>_analysis.md` into `dir`, replacing any earlier report.
pub async fn write_report(result: &AnalysisResult, dir: &Path) -> Result<PathBuf, ExportError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ExportError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = report_path(&result.channel_name, dir);
    tokio::fs::write(&path, render_report(result))
        .await
        .map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

    tracing::info!("Analysis saved to {}", path.display());
    Ok(path)
}

pub fn render_report(result: &AnalysisResult) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "# 📊 Channel Analysis: #{}\n", result.channel_name);
    let _ = writeln!(out, "> **Analyzed:** {}  ", Local::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "> **Total messages:** {}  \n", result.total_messages);
    out.push_str("---\n\n");

    out.push_str("## 📝 Summary\n\n");
    out.push_str(result.summary.trim());
    out.push_str("\n\n---\n\n");

    out.push_str("## 🎯 Topics\n\n");
    for (i, topic) in result.topics.iter().enumerate() {
        let _ = writeln!(out, "### {}. {} {}\n", i + 1, topic.name, importance_stars(topic.importance));
        let _ = writeln!(out, "**Description:** {}\n", topic.description);
        if !topic.keywords.is_empty() {
            let _ = writeln!(out, "**Keywords:** `{}`\n", topic.keywords.join("`, `"));
        }
        render_sentiment(&mut out, &topic.sentiment);
    }
    out.push_str("---\n\n");

    out.push_str("## 👥 Contributors\n\n");
    out.push_str("| Name | Messages | Topics |\n");
    out.push_str("|------|----------|--------|\n");
    for c in &result.contributors {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            c.name,
            c.message_count,
            truncate_cell(&c.topics.join(", "))
        );
    }
    out.push('\n');

    if result.contributors.iter().any(|c| !c.contributions.is_empty()) {
        out.push_str("### Key Contributions\n\n");
        for c in result.contributors.iter().filter(|c| !c.contributions.is_empty()) {
            let _ = writeln!(out, "**{}:**", c.name);
            for contribution in &c.contributions {
                let _ = writeln!(out, "- {}", contribution);
            }
            out.push('\n');
        }
    }

    out
}

/// One full star per two points of importance, a hollow one for the odd point.
fn importance_stars(importance: u8) -> String {
    let importance = importance.min(10);
    let mut stars = "⭐".repeat(usize::from(importance / 2));
    if importance % 2 == 1 {
        stars.push('☆');
    }
    stars
}

fn render_sentiment(out: &mut String, sentiment: &Sentiment) {
    let total = sentiment.total();
    if total == 0 {
        return;
    }
    let pct = |n: u32| f64::from(n) / f64::from(total) * 100.0;
    out.push_str("**Sentiment:**\n");
    let _ = writeln!(out, "- Positive 😊: {} ({:.0}%)", sentiment.positive, pct(sentiment.positive));
    let _ = writeln!(out, "- Negative 😟: {} ({:.0}%)", sentiment.negative, pct(sentiment.negative));
    let _ = writeln!(out, "- Neutral 😐: {} ({:.0}%)\n", sentiment.neutral, pct(sentiment.neutral));
}

fn truncate_cell(text: &str) -> String {
    if text.chars().count() <= MAX_TOPICS_CELL {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_TOPICS_CELL - 3).collect();
    format!("{kept}...")
}
