//! Command registry and ranking.
//!
//! Each category owns a fixed, ordered list of commands. Ranking combines a
//! success rate (historical when known, else the command's baseline) with the
//! risk and cost weights:
//!
//! ```text
//! score = success_rate * 0.60 + risk_weight * 0.25 + cost_weight * 0.15
//! ```
//!
//! Recently failed commands have their score halved. Ties go to the command
//! listed first.

use super::types::{
    CommandCandidate, CommandSelection, CostLevel, HistoricalStats, RiskLevel, TipCategory,
};

const SUCCESS_WEIGHT: f64 = 0.60;
const RISK_WEIGHT: f64 = 0.25;
const COST_WEIGHT: f64 = 0.15;
const FAILED_PENALTY: f64 = 0.5;

/// Static description of a recommendable command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandSpec {
    pub command: &'static str,
    pub category: TipCategory,
    pub risk: RiskLevel,
    pub cost: CostLevel,
    /// Success rate assumed when there is no history
    pub baseline_success: f64,
}

const fn spec(
    command: &'static str,
    category: TipCategory,
    risk: RiskLevel,
    cost: CostLevel,
    baseline_success: f64,
) -> CommandSpec {
    CommandSpec {
        command,
        category,
        risk,
        cost,
        baseline_success,
    }
}

/// Every known command, grouped by category in ranking order.
pub const REGISTRY: &[CommandSpec] = &[
    spec("/undo:checkpoint", TipCategory::Safety, RiskLevel::None, CostLevel::Low, 0.85),
    spec("/undo:revert-last", TipCategory::Safety, RiskLevel::Medium, CostLevel::Low, 0.75),
    spec("/git:stash", TipCategory::Safety, RiskLevel::Low, CostLevel::Low, 0.80),
    spec("/review:diff", TipCategory::Quality, RiskLevel::None, CostLevel::Medium, 0.80),
    spec("/refactor:plan", TipCategory::Quality, RiskLevel::Low, CostLevel::High, 0.70),
    spec("/lint:fix", TipCategory::Quality, RiskLevel::Low, CostLevel::Low, 0.75),
    spec("/test:run", TipCategory::Testing, RiskLevel::None, CostLevel::Low, 0.90),
    spec("/test:fix", TipCategory::Testing, RiskLevel::Low, CostLevel::Medium, 0.70),
    spec("/test:coverage", TipCategory::Testing, RiskLevel::None, CostLevel::Medium, 0.75),
    spec("/context:compact", TipCategory::Context, RiskLevel::Low, CostLevel::Low, 0.85),
    spec("/context:summarize", TipCategory::Context, RiskLevel::None, CostLevel::Medium, 0.80),
    spec("/plan:review", TipCategory::Workflow, RiskLevel::None, CostLevel::Low, 0.80),
    spec("/session:handoff", TipCategory::Workflow, RiskLevel::None, CostLevel::Medium, 0.75),
];

/// Commands registered for `category`, in registry order.
pub fn candidates(category: TipCategory) -> impl Iterator<Item = &'static CommandSpec> {
    REGISTRY.iter().filter(move |c| c.category == category)
}

/// Look up a registered command by name.
pub fn find(command: &str) -> Option<&'static CommandSpec> {
    REGISTRY.iter().find(|c| c.command == command)
}

/// Score every candidate in `category`, best first.
pub fn rank(
    category: TipCategory,
    historical: &HistoricalStats,
    failed_commands: &[String],
) -> Vec<CommandCandidate> {
    let mut ranked: Vec<CommandCandidate> = candidates(category)
        .map(|spec| score(spec, historical, failed_commands))
        .collect();
    // Stable sort keeps registry order among equal scores.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Pick the best command in `category`, or `None` if it has no commands.
pub fn select_best(
    category: TipCategory,
    historical: &HistoricalStats,
    failed_commands: &[String],
) -> Option<CommandSelection> {
    let best = rank(category, historical, failed_commands).into_iter().next()?;
    Some(CommandSelection {
        rationale: rationale(&best),
        command: best.command,
        score: best.score,
    })
}

fn score(
    spec: &CommandSpec,
    historical: &HistoricalStats,
    failed_commands: &[String],
) -> CommandCandidate {
    let known = historical
        .command_success_rate(spec.command)
        .filter(|rate| rate.is_finite());
    let success_rate = known.unwrap_or(spec.baseline_success).clamp(0.0, 1.0);
    let recently_failed = failed_commands.iter().any(|c| c == spec.command);

    let mut score = success_rate * SUCCESS_WEIGHT
        + spec.risk.weight() * RISK_WEIGHT
        + spec.cost.weight() * COST_WEIGHT;
    if recently_failed {
        score *= FAILED_PENALTY;
    }

    CommandCandidate {
        command: spec.command.to_string(),
        risk: spec.risk,
        cost: spec.cost,
        success_rate,
        historical: known.is_some(),
        recently_failed,
        score,
    }
}

fn rationale(candidate: &CommandCandidate) -> String {
    let source = if candidate.historical {
        "historical"
    } else {
        "baseline"
    };
    let mut text = format!(
        "{} success rate {:.0}%, {:?} risk, {:?} cost",
        source,
        candidate.success_rate * 100.0,
        candidate.risk,
        candidate.cost
    )
    .to_lowercase();
    if candidate.recently_failed {
        text.push_str("; recently failed, score halved");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_commands() {
        for category in TipCategory::ALL {
            assert!(candidates(category).count() >= 2, "{category}");
        }
    }

    #[test]
    fn test_default_safety_choice() {
        let best = select_best(TipCategory::Safety, &HistoricalStats::default(), &[]).unwrap();
        assert_eq!(best.command, "/undo:checkpoint");
        assert!((best.score - 0.88).abs() < 1e-9);
        assert!(best.rationale.starts_with("baseline success rate 85%"));
    }

    #[test]
    fn test_failed_command_is_penalized() {
        let failed = vec!["/undo:checkpoint".to_string()];
        let best = select_best(TipCategory::Safety, &HistoricalStats::default(), &failed).unwrap();
        assert_eq!(best.command, "/git:stash");

        let ranked = rank(TipCategory::Safety, &HistoricalStats::default(), &failed);
        let checkpoint = ranked.iter().find(|c| c.command == "/undo:checkpoint").unwrap();
        assert!(checkpoint.recently_failed);
        assert!((checkpoint.score - 0.44).abs() < 1e-9);
    }

    #[test]
    fn test_history_overrides_baseline() {
        let mut historical = HistoricalStats::default();
        historical
            .command_success_rates
            .insert("/undo:checkpoint".to_string(), 0.10);
        let best = select_best(TipCategory::Safety, &historical, &[]).unwrap();
        assert_eq!(best.command, "/git:stash");

        historical
            .command_success_rates
            .insert("/git:stash".to_string(), 0.95);
        let ranked = rank(TipCategory::Safety, &historical, &[]);
        assert!(ranked[0].historical);
        assert!(select_best(TipCategory::Safety, &historical, &[])
            .unwrap()
            .rationale
            .starts_with("historical"));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let historical = HistoricalStats::default();
        let first = select_best(TipCategory::Testing, &historical, &[]);
        for _ in 0..10 {
            assert_eq!(select_best(TipCategory::Testing, &historical, &[]), first);
        }
    }
}
