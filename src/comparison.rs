//! Agent rankings per task and per category.
//!
//! Read-only projections of the store's aggregate views. Agents are ordered
//! by average overall score (descending), then average cost (ascending),
//! then name. Pairings without an overall score rank below every scored one.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::{AgentCategoryProfile, ResultsStore, TaskAgentAverage};

/// Grouping of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Task,
    Category,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" | "tasks" => Ok(Self::Task),
            "category" | "categories" => Ok(Self::Category),
            other => Err(format!("expected 'task' or 'category', got '{}'", other)),
        }
    }
}

/// One agent's place within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAgent {
    pub rank: u32,
    pub agent: String,
    pub avg_overall: Option<f64>,
    pub avg_cost: f64,
    pub success_rate: f64,
    pub runs: u32,
}

/// Ranked agents for one task or category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub group: String,
    pub entries: Vec<RankedAgent>,
}

/// Rankings per task.
pub fn rank_by_task(averages: &[TaskAgentAverage]) -> Vec<Ranking> {
    group_and_rank(averages.iter().map(|a| {
        (
            a.task_name.clone(),
            RankedAgent {
                rank: 0,
                agent: a.agent_name.clone(),
                avg_overall: a.avg_overall,
                avg_cost: a.avg_cost,
                success_rate: a.success_rate,
                runs: a.runs,
            },
        )
    }))
}

/// Rankings per category.
pub fn rank_by_category(profile: &[AgentCategoryProfile]) -> Vec<Ranking> {
    group_and_rank(profile.iter().map(|p| {
        (
            p.category.clone(),
            RankedAgent {
                rank: 0,
                agent: p.agent_name.clone(),
                avg_overall: p.avg_overall,
                avg_cost: p.avg_cost,
                success_rate: p.success_rate,
                runs: p.runs,
            },
        )
    }))
}

/// Reads the store and ranks by `by`.
pub async fn compare(store: &ResultsStore, by: GroupBy) -> Result<Vec<Ranking>, StoreError> {
    Ok(match by {
        GroupBy::Task => rank_by_task(&store.task_agent_averages().await?),
        GroupBy::Category => rank_by_category(&store.agent_category_profile().await?),
    })
}

fn group_and_rank(rows: impl Iterator<Item = (String, RankedAgent)>) -> Vec<Ranking> {
    let mut groups: BTreeMap<String, Vec<RankedAgent>> = BTreeMap::new();
    for (group, entry) in rows {
        groups.entry(group).or_default().push(entry);
    }

    groups
        .into_iter()
        .map(|(group, mut entries)| {
            entries.sort_by(compare_entries);
            for (i, entry) in entries.iter_mut().enumerate() {
                entry.rank = i as u32 + 1;
            }
            Ranking { group, entries }
        })
        .collect()
}

fn compare_entries(a: &RankedAgent, b: &RankedAgent) -> Ordering {
    let overall = match (a.avg_overall, b.avg_overall) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    overall
        .then_with(|| a.avg_cost.total_cmp(&b.avg_cost))
        .then_with(|| a.agent.cmp(&b.agent))
}

/// Plain-text tables, one per group.
pub fn render(rankings: &[Ranking], by: GroupBy) -> String {
    let label = match by {
        GroupBy::Task => "Task",
        GroupBy::Category => "Category",
    };

    let mut out = String::new();
    if rankings.is_empty() {
        out.push_str("No results recorded yet.\n");
        return out;
    }

    for ranking in rankings {
        let _ = writeln!(out, "{}: {}", label, ranking.group);
        let _ = writeln!(
            out,
            "  {:>4}  {:<24} {:>8} {:>10} {:>8} {:>5}",
            "Rank", "Agent", "Overall", "Cost ($)", "Success", "Runs"
        );
        let _ = writeln!(out, "  {}", "-".repeat(64));
        for e in &ranking.entries {
            let overall = e
                .avg_overall
                .map(|o| format!("{:.1}", o))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                out,
                "  {:>4}  {:<24} {:>8} {:>10.4} {:>7.0}% {:>5}",
                e.rank,
                e.agent,
                overall,
                e.avg_cost,
                e.success_rate * 100.0,
                e.runs
            );
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avg(task: &str, agent: &str, overall: Option<f64>, cost: f64) -> TaskAgentAverage {
        TaskAgentAverage {
            task_name: task.to_string(),
            task_category: "algorithms".to_string(),
            agent_name: agent.to_string(),
            runs: 1,
            success_rate: 1.0,
            avg_overall: overall,
            avg_correctness: overall,
            avg_speed: 100.0,
            avg_cost_score: 100.0,
            avg_autonomy: 100.0,
            avg_code_quality: 50.0,
            avg_cost: cost,
            avg_wall_time: 60.0,
        }
    }

    #[test]
    fn test_ranks_by_overall_then_cost_then_name() {
        let rows = vec![
            avg("quicksort", "agentA", Some(80.0), 0.05),
            avg("quicksort", "agentB", Some(92.0), 0.09),
            avg("quicksort", "agentC", Some(80.0), 0.02),
            avg("quicksort", "agentD", None, 0.00),
            avg("quicksort", "agentE", Some(80.0), 0.02),
        ];
        let rankings = rank_by_task(&rows);
        assert_eq!(rankings.len(), 1);

        let order: Vec<(&str, u32)> = rankings[0]
            .entries
            .iter()
            .map(|e| (e.agent.as_str(), e.rank))
            .collect();
        assert_eq!(
            order,
            vec![("agentB", 1), ("agentC", 2), ("agentE", 3), ("agentA", 4), ("agentD", 5)]
        );
    }

    #[test]
    fn test_groups_sorted_by_name() {
        let rows = vec![
            avg("quicksort", "agentX", Some(90.0), 0.03),
            avg("lru_cache", "agentX", Some(70.0), 0.03),
        ];
        let groups: Vec<String> = rank_by_task(&rows).into_iter().map(|r| r.group).collect();
        assert_eq!(groups, vec!["lru_cache", "quicksort"]);
    }

    #[test]
    fn test_rank_by_category() {
        let profile = vec![
            AgentCategoryProfile {
                agent_name: "agentX".to_string(),
                category: "algorithms".to_string(),
                runs: 2,
                success_rate: 1.0,
                avg_overall: Some(70.0),
                avg_correctness: Some(100.0),
                avg_speed: 50.0,
                avg_cost_score: 50.0,
                avg_autonomy: 100.0,
                avg_code_quality: 50.0,
                avg_cost: 0.04,
            },
            AgentCategoryProfile {
                agent_name: "agentY".to_string(),
                category: "algorithms".to_string(),
                runs: 2,
                success_rate: 0.5,
                avg_overall: Some(85.0),
                avg_correctness: Some(90.0),
                avg_speed: 80.0,
                avg_cost_score: 90.0,
                avg_autonomy: 100.0,
                avg_code_quality: 50.0,
                avg_cost: 0.06,
            },
        ];
        let rankings = rank_by_category(&profile);
        assert_eq!(rankings[0].group, "algorithms");
        assert_eq!(rankings[0].entries[0].agent, "agentY");
        assert_eq!(rankings[0].entries[1].rank, 2);
    }

    #[test]
    fn test_render_table() {
        let rankings = rank_by_task(&[avg("quicksort", "agentX", Some(96.0), 0.03)]);
        let text = render(&rankings, GroupBy::Task);
        assert!(text.starts_with("Task: quicksort"));
        assert!(text.contains("agentX"));
        assert!(text.contains("96.0"));
        assert_eq!(render(&[], GroupBy::Category), "No results recorded yet.\n");
    }

    #[test]
    fn test_group_by_parse() {
        assert_eq!("Category".parse::<GroupBy>().unwrap(), GroupBy::Category);
        assert_eq!("task".parse::<GroupBy>().unwrap(), GroupBy::Task);
        assert!("agent".parse::<GroupBy>().is_err());
    }
}
