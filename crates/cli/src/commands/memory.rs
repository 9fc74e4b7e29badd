//! `tasksmith memory`: inspect the episode store.

use tasksmith_agent::InsightAnalyst;
use tasksmith_config::AppConfig;
use tasksmith_core::memory::{Embedder, EpisodeFilter, EpisodeStats, MemoryStore};
use crate::bootstrap;

pub async fn stats(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = bootstrap::memory_store(&config.memory);
    let stats = store.stats().await?;

    println!("Memory Statistics");
    println!("=================");
    println!("  Backend:     {}", store.name());
    if config.memory.backend == "file" {
        let path = config.memory.episode_path();
        match std::fs::metadata(&path) {
            Ok(meta) => println!(
                "  Log file:    {} ({:.1} KB)",
                path.display(),
                meta.len() as f64 / 1024.0
            ),
            Err(_) => println!("  Log file:    (not created yet)"),
        }
    }
    println!("  Embeddings:  {}", config.memory.embedding_provider);
    for line in render_stats(&stats) {
        println!("{line}");
    }

    Ok(())
}

fn render_stats(stats: &EpisodeStats) -> Vec<String> {
    let mut lines = vec![
        format!("  Episodes:    {}", stats.total),
        format!(
            "  Successes:   {} ({:.0}%)",
            stats.successes,
            stats.success_rate * 100.0
        ),
        format!("  Avg quality: {:.2}", stats.avg_quality),
        format!("  Avg steps:   {:.1}", stats.avg_steps),
    ];
    if stats.total > 0 {
        lines.push(format!(
            "  Recent:      {:.0}% successful ({})",
            stats.recent_success_rate * 100.0,
            stats.trend
        ));
    }
    if !stats.tool_usage.is_empty() {
        lines.push("  Tool usage:".to_string());
        let mut usage: Vec<_> = stats.tool_usage.iter().collect();
        usage.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (tool, count) in usage {
            let rate = stats.tool_success_rate.get(tool).copied().unwrap_or(0.0);
            lines.push(format!("    {tool:<14} {count:>4}  {:>3.0}% ok", rate * 100.0));
        }
    }
    lines
}

pub async fn insights(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = bootstrap::memory_store(&config.memory);
    let analyst = InsightAnalyst::new(bootstrap::oracle(config));
    for line in insights_report(store.as_ref(), &analyst).await? {
        println!("{line}");
    }
    Ok(())
}

async fn insights_report(
    store: &dyn MemoryStore,
    analyst: &InsightAnalyst,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let stats = store.stats().await?;
    let advice = analyst.recommend(&stats).await?;

    let mut lines = render_stats(&stats);
    lines.push(String::new());
    lines.push("Recommendations".to_string());
    lines.push("===============".to_string());
    lines.extend(advice.lines().map(|line| format!("  {line}")));
    Ok(lines)
}

pub async fn search(
    config: &AppConfig,
    query: &str,
    limit: usize,
    successful: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = bootstrap::memory_store(&config.memory);
    let embedding = bootstrap::embedder(config).embed(query).await?;
    let filter = if successful {
        EpisodeFilter::successful()
    } else {
        EpisodeFilter::default()
    };

    println!("Searching episodes for: \"{query}\"");
    println!();

    let results = store.query_similar(&embedding, &filter, limit).await?;
    if results.is_empty() {
        println!("   No episodes found.");
        return Ok(());
    }

    for (i, scored) in results.iter().enumerate() {
        let episode = &scored.episode;
        println!(
            "  {:>2}. [similarity: {:.2}] {}",
            i + 1,
            scored.similarity,
            episode.task_text
        );
        println!(
            "      {} · quality {:.2} · {} · {}",
            episode.category,
            episode.quality_score,
            episode.outcome.as_str(),
            episode.created_at.format("%Y-%m-%d %H:%M")
        );
        if !episode.plan_summary.is_empty() {
            println!("      plan: {}", episode.plan_summary);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use tasksmith_agent::insights::NO_HISTORY;
    use tasksmith_core::error::OracleError;
    use tasksmith_core::memory::{Episode, EpisodeOutcome, Trend};
    use tasksmith_core::oracle::{Oracle, OracleRequest, OracleResponse, Tier};
    use tasksmith_core::task::{RunMode, TaskCategory};
    use tasksmith_memory::InMemoryStore;

    #[test]
    fn stats_list_most_used_tools_first() {
        let stats = EpisodeStats {
            total: 4,
            successes: 3,
            success_rate: 0.75,
            avg_quality: 0.8,
            avg_steps: 1.5,
            tool_usage: BTreeMap::from([
                ("text_writer".to_string(), 4),
                ("web_search".to_string(), 2),
                ("file_manager".to_string(), 2),
            ]),
            tool_success_rate: BTreeMap::from([
                ("text_writer".to_string(), 0.75),
                ("web_search".to_string(), 0.5),
                ("file_manager".to_string(), 1.0),
            ]),
            recent_success_rate: 0.75,
            trend: Trend::Stable,
        };
        let lines = render_stats(&stats);
        assert_eq!(lines[1], "  Successes:   3 (75%)");
        assert_eq!(lines[2], "  Avg quality: 0.80");
        assert_eq!(lines[4], "  Recent:      75% successful (stable)");
        assert!(lines[6].contains("text_writer"));
        assert!(lines[6].ends_with(" 75% ok"));
        assert!(lines[7].contains("file_manager"));
        assert!(lines[7].ends_with("100% ok"));
        assert!(lines[8].contains("web_search"));
    }

    #[test]
    fn empty_store_renders_zeroes() {
        let lines = render_stats(&EpisodeStats::default());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "  Episodes:    0");
    }

    /// Replies with a fixed text and keeps the tier of every call.
    struct AdviceOracle {
        tiers: Mutex<Vec<Tier>>,
    }

    #[async_trait::async_trait]
    impl Oracle for AdviceOracle {
        fn name(&self) -> &str {
            "advice_mock"
        }

        async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
            assert!(request.prompt.contains("Trend:"));
            self.tiers.lock().unwrap().push(request.tier);
            Ok(OracleResponse {
                text: "Retry flaky fetches before giving up.".into(),
                model: "mock-model".into(),
                usage: None,
            })
        }
    }

    fn episode(success: bool) -> Episode {
        Episode {
            id: Episode::new_id(),
            task_text: "fetch the rates page".into(),
            category: TaskCategory::Research,
            plan_summary: "1:web_fetch".into(),
            tools_used: vec!["web_fetch".into()],
            outcome_summary: String::new(),
            quality_score: if success { 0.9 } else { 0.1 },
            success,
            outcome: if success { EpisodeOutcome::Completed } else { EpisodeOutcome::Failed },
            mode: RunMode::Single,
            plan: None,
            step_count: 1,
            embedding: vec![],
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn insights_follow_the_statistics() {
        let store = InMemoryStore::new();
        store.write(episode(true)).await.unwrap();
        store.write(episode(false)).await.unwrap();
        let oracle = Arc::new(AdviceOracle { tiers: Mutex::new(Vec::new()) });

        let lines = insights_report(&store, &InsightAnalyst::new(oracle.clone())).await.unwrap();

        assert_eq!(lines[0], "  Episodes:    2");
        assert!(lines.contains(&"  Recent:      50% successful (stable)".to_string()));
        let heading = lines.iter().position(|l| l == "Recommendations").unwrap();
        assert_eq!(lines[heading + 2], "  Retry flaky fetches before giving up.");
        assert_eq!(*oracle.tiers.lock().unwrap(), vec![Tier::Balanced]);
    }

    #[tokio::test]
    async fn insights_on_an_empty_store_need_no_oracle() {
        let oracle = Arc::new(AdviceOracle { tiers: Mutex::new(Vec::new()) });
        let lines = insights_report(&InMemoryStore::new(), &InsightAnalyst::new(oracle.clone()))
            .await
            .unwrap();
        assert_eq!(lines.last().map(String::as_str), Some(format!("  {NO_HISTORY}").as_str()));
        assert!(oracle.tiers.lock().unwrap().is_empty());
    }
}
