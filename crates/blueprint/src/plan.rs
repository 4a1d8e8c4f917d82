//! Migration plans and their execution.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use blueprint_sql::{Statement, render_script};
use serde::{Deserialize, Serialize};

use crate::{Connection, ConnectionExt, Error, Result};

/// Worst-case severity of a single step, ordered from harmless to refused.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
    #[default]
    None,
    Low,
    Medium,
    High,
    /// Would fail or lose data; a plan containing one is never executed.
    Impossible,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::None => "NONE",
            Risk::Low => "LOW",
            Risk::Medium => "MEDIUM",
            Risk::High => "HIGH",
            Risk::Impossible => "IMPOSSIBLE",
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Risk {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Risk::None),
            "LOW" => Ok(Risk::Low),
            "MEDIUM" => Ok(Risk::Medium),
            "HIGH" => Ok(Risk::High),
            "IMPOSSIBLE" => Ok(Risk::Impossible),
            _ => Err(format!("unknown risk level `{}`", s)),
        }
    }
}

/// One unit of DDL, run as a single batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Execution-order bucket, lower runs first.
    pub phase: u8,
    pub risk: Risk,
    pub description: String,
    pub statements: Vec<Statement>,
}

impl Step {
    pub fn new(
        phase: u8,
        risk: Risk,
        description: impl Into<String>,
        statements: Vec<Statement>,
    ) -> Self {
        Self {
            phase,
            risk,
            description: description.into(),
            statements,
        }
    }

    /// The SQL this step runs.
    pub fn query(&self) -> String {
        render_script(&self.statements)
    }
}

/// What happened when a step ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub query: String,
    pub risk: Risk,
    pub elapsed: Duration,
    /// Position in execution order, starting at 0.
    pub order: usize,
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    steps: Vec<Step>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        tracing::debug!(
            phase = step.phase,
            risk = %step.risk,
            description = %step.description,
            "planned step"
        );
        self.steps.push(step);
    }

    pub fn extend(&mut self, other: MigrationPlan) {
        self.steps.extend(other.steps);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The most severe risk in the plan, `None` for an empty plan.
    pub fn highest_risk(&self) -> Option<Risk> {
        if self.steps.iter().any(|s| s.risk == Risk::Impossible) {
            return Some(Risk::Impossible);
        }
        self.steps.iter().map(|s| s.risk).max()
    }

    /// Sort steps by phase. Steps within a phase keep their planned order.
    pub fn sort(&mut self) {
        self.steps.sort_by_key(|s| s.phase);
    }

    /// Run every step in phase order.
    ///
    /// Refuses to run anything if any step is impossible. A failing step
    /// stops execution; earlier steps are not rolled back.
    pub async fn execute<C: Connection>(mut self, conn: &C) -> Result<Vec<StepResult>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.sort();

        if self.highest_risk() == Some(Risk::Impossible) {
            let steps = self
                .steps
                .iter()
                .filter(|s| s.risk == Risk::Impossible)
                .map(|s| s.description.clone())
                .collect();
            return Err(Error::ImpossibleMigration { steps });
        }

        let conn = conn.traced();
        let mut results = Vec::with_capacity(self.steps.len());
        for (order, step) in self.steps.into_iter().enumerate() {
            let query = step.query();
            let start = Instant::now();
            conn.batch_execute(&query).await?;
            let elapsed = start.elapsed();

            tracing::info!(
                order,
                phase = step.phase,
                risk = %step.risk,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                step.description
            );
            results.push(StepResult {
                query,
                risk: step.risk,
                elapsed,
                order,
            });
        }
        Ok(results)
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return writeln!(f, "No changes.");
        }
        for step in &self.steps {
            writeln!(
                f,
                "[phase {}] {} {}",
                step.phase, step.risk, step.description
            )?;
            for line in step.query().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        Ok(())
    }
}
