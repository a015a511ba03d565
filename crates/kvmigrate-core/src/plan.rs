//! Execution plan generation.
//!
//! The planner is a pure transformation from a validated document to a
//! numbered, risk-annotated report; it never calls the store.

use crate::config::EnvironmentConfig;
use crate::document::{MigrationDocument, RiskLevel};
use chrono::{DateTime, Utc};

/// One numbered step in an execution plan.
#[derive(Debug, Clone)]
pub struct PlanStep {
    /// 1-based step number.
    pub number: usize,
    /// Operation type tag.
    pub op_type: &'static str,
    /// Target resource name ("-" for scripts).
    pub target: String,
    /// Human-readable intent.
    pub intent: String,
    /// Effective risk level.
    pub risk: RiskLevel,
    pub estimated_duration: Option<String>,
    /// Whether execution will ask for per-operation confirmation.
    pub destructive: bool,
}

/// A complete, ordered execution plan.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub migration_id: String,
    pub version: String,
    pub name: String,
    pub environment: String,
    pub steps: Vec<PlanStep>,
    /// Whether a backup will be taken before execution.
    pub backup_planned: bool,
    /// Whether the document declares a rollback procedure.
    pub has_rollback: bool,
    /// Manual checks the author asks for after execution.
    pub validation_steps: Vec<String>,
    /// Plan-only mode; no side effects will occur.
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Worst risk level across all steps.
    pub fn highest_risk(&self) -> RiskLevel {
        self.steps
            .iter()
            .map(|s| s.risk)
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    /// Steps that will require per-operation confirmation.
    pub fn destructive_steps(&self) -> Vec<&PlanStep> {
        self.steps.iter().filter(|s| s.destructive).collect()
    }

    /// Render the plan as a human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry-run)" } else { "" };
        out.push_str(&format!(
            "Migration plan{}: {} v{} [{}]\n",
            mode, self.name, self.version, self.environment
        ));
        out.push_str(&format!(
            "  backup: {}  rollback: {}  overall risk: {}\n",
            if self.backup_planned { "yes" } else { "no" },
            if self.has_rollback {
                "declared"
            } else {
                "none"
            },
            self.highest_risk()
        ));

        for step in &self.steps {
            let duration = step
                .estimated_duration
                .as_deref()
                .unwrap_or("unknown duration");
            out.push_str(&format!(
                "  {:>2}. [{}] {} ({}, {})\n",
                step.number,
                risk_marker(step.risk),
                step.intent,
                step.op_type,
                duration
            ));
        }

        if !self.validation_steps.is_empty() {
            out.push_str("  verify after applying:\n");
            for step in &self.validation_steps {
                out.push_str(&format!("    - {}\n", step));
            }
        }
        out
    }
}

fn risk_marker(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "MEDIUM",
        RiskLevel::High => "HIGH",
    }
}

/// Turns a validated document into an execution plan.
pub struct Planner<'a> {
    config: &'a EnvironmentConfig,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a EnvironmentConfig) -> Self {
        Self { config }
    }

    /// Build the plan for a document. Pure: no store calls.
    pub fn plan(
        &self,
        migration_id: &str,
        document: &MigrationDocument,
        dry_run: bool,
    ) -> ExecutionPlan {
        let steps = document
            .operations
            .iter()
            .enumerate()
            .map(|(index, operation)| PlanStep {
                number: index + 1,
                op_type: operation.type_name(),
                target: operation
                    .table_name()
                    .unwrap_or("-")
                    .to_string(),
                intent: operation.intent(),
                risk: operation.risk(),
                estimated_duration: operation.meta().estimated_duration.clone(),
                destructive: operation.is_destructive(),
            })
            .collect();

        ExecutionPlan {
            migration_id: migration_id.to_string(),
            version: document.version.clone(),
            name: document.name.clone(),
            environment: self.config.environment.clone(),
            steps,
            backup_planned: document.backup_required || self.config.is_production(),
            has_rollback: document.rollback_procedure.is_some(),
            validation_steps: document.validation_steps.clone().unwrap_or_default(),
            dry_run,
            created_at: Utc::now(),
        }
    }
}
