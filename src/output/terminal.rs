// Colored terminal output for batch outcomes, topics, and evaluations.
//
// Everything here prints already-computed values; main.rs gathers the data
// and delegates the formatting.

use colored::Colorize;

use crate::analysis::interpret::TopicInterpretation;
use crate::evaluation::coherence::CoherenceMeasure;
use crate::evaluation::convergence::ConvergenceReport;
use crate::pipeline::batch::{BatchReport, RunStatus};

/// Display the per-run outcome table of a batch.
pub fn display_outcomes(report: &BatchReport) {
    println!(
        "\n{}",
        format!("=== Batch Results ({} runs) ===", report.outcomes.len()).bold()
    );
    println!();

    println!(
        "  {:>4}  {:<24} {:<14} {}",
        "#".dimmed(),
        "Run".dimmed(),
        "Status".dimmed(),
        "Detail".dimmed(),
    );
    println!("  {}", "-".repeat(78).dimmed());

    for outcome in &report.outcomes {
        let run_id = super::truncate_chars(&outcome.run_id, 24);
        match &outcome.status {
            RunStatus::Succeeded {
                artifact,
                iterations,
                final_log_likelihood,
            } => {
                let ll = final_log_likelihood
                    .map(|v| format!("{v:.1}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:>4}. {:<24} {:<14} {} ({} iters, ll {})",
                    outcome.position,
                    run_id,
                    "ok".green(),
                    artifact.display(),
                    iterations,
                    ll,
                );
            }
            RunStatus::Failed(e) => {
                println!(
                    "  {:>4}. {:<24} {:<14} {}",
                    outcome.position,
                    run_id,
                    colorize_kind(e.kind()),
                    super::truncate_chars(&e.to_string(), 160).dimmed(),
                );
            }
        }
    }

    println!();
    let failed = report.failed();
    if failed == 0 {
        println!("  {} all {} runs succeeded", "ok".green().bold(), report.succeeded());
    } else {
        println!(
            "  {} {} succeeded, {} failed",
            "!!".red().bold(),
            report.succeeded(),
            failed
        );
    }
}

/// Display the top words of every topic.
pub fn display_topics(run_id: &str, topics: &[Vec<(String, f64)>]) {
    println!(
        "\n{}",
        format!("=== Topics for run {run_id} ({} topics) ===", topics.len()).bold()
    );
    println!();
    for (k, words) in topics.iter().enumerate() {
        let list: Vec<String> = words
            .iter()
            .map(|(word, weight)| format!("{word} {}", format!("{weight:.3}").dimmed()))
            .collect();
        println!("  {:>3}  {}", k.to_string().cyan(), list.join(", "));
    }
    println!();
}

/// Per-topic evaluation rows.
pub struct TopicRow {
    pub topic: usize,
    pub coherence: Option<f64>,
    pub similarity: f64,
    pub top_words: Vec<String>,
}

/// Display convergence and the per-topic coherence/similarity table.
pub fn display_evaluation(
    run_id: &str,
    convergence: &ConvergenceReport,
    measure: CoherenceMeasure,
    rows: &[TopicRow],
) {
    println!("\n{}", format!("=== Evaluation for run {run_id} ===").bold());
    println!();

    let status = if convergence.converged {
        "converged".green()
    } else {
        "not converged".yellow()
    };
    println!(
        "  Convergence: {} after {} iterations (last delta {:.4}, relative {:.2e})",
        status, convergence.iterations, convergence.last_delta, convergence.relative_change
    );
    println!();

    println!(
        "  {:>5}  {:>10}  {:>10}  {}",
        "Topic".dimmed(),
        measure.to_string().dimmed(),
        "Similarity".dimmed(),
        "Top words".dimmed(),
    );
    println!("  {}", "-".repeat(78).dimmed());
    for row in rows {
        let coherence = row
            .coherence
            .map(|c| format!("{c:.3}"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  {:>5}  {:>10}  {:>10.3}  {}",
            row.topic,
            coherence,
            row.similarity,
            super::truncate_chars(&row.top_words.join(", "), 60),
        );
    }

    let scored: Vec<f64> = rows.iter().filter_map(|r| r.coherence).collect();
    if !scored.is_empty() {
        let mean = scored.iter().sum::<f64>() / scored.len() as f64;
        println!();
        println!("  Mean {measure} coherence: {mean:.3}");
    }
    println!();
}

/// Display one document's topic mixture, heaviest topic first.
pub fn display_mixture(run_id: &str, doc: usize, mixture: &[f64], preview: Option<&str>) {
    println!(
        "\n{}",
        format!("=== Document {doc} in run {run_id} ===").bold()
    );
    if let Some(text) = preview {
        println!("  {}", super::truncate_chars(text, 140).dimmed());
    }
    println!();

    let mut order: Vec<usize> = (0..mixture.len()).collect();
    order.sort_by(|&a, &b| mixture[b].total_cmp(&mixture[a]).then(a.cmp(&b)));
    for k in order {
        let bar = "#".repeat((mixture[k] * 40.0).round() as usize);
        println!("  {:>3}  {:>6.3}  {}", k, mixture[k], bar.cyan());
    }
    println!();
}

/// Display an interpreter's answer for one topic.
pub fn display_interpretation(topic: usize, words: &[String], interpretation: &TopicInterpretation) {
    println!("\n{}", format!("=== Topic {topic} ===").bold());
    println!("  Top words: {}", words.join(", ").dimmed());
    println!();
    match (interpretation.topic_name(), interpretation.topic_description()) {
        (Some(name), description) => {
            println!("  {}", name.green().bold());
            if let Some(description) = description {
                println!("  {description}");
            }
        }
        _ => {
            // Unexpected shape: show the answer as-is
            println!("  {}", interpretation.0);
        }
    }
    println!();
}

/// Colorize a failure category.
fn colorize_kind(kind: &str) -> colored::ColoredString {
    match kind {
        "configuration" => kind.yellow(),
        "cancelled" => kind.dimmed(),
        "timeout" => kind.bright_red(),
        _ => kind.red().bold(),
    }
}
