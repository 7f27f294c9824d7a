//! Derived numeric field recompute.
//!
//! A `resultado` field holds `op(base1, base2)` over two sibling
//! fields. [`plan`] works out which results need a new value from one
//! snapshot of a section's fields; [`ResultRecomputer`] writes them.
//!
//! Results are evaluated in dependency order, so a result that is the
//! base of another result is settled first and the dependent one sees
//! the fresh value within the same pass. Results on a cycle are never
//! evaluated.

use std::collections::{HashMap, HashSet, VecDeque};

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use truelove_core::error::{TrueLoveError, TrueLoveResult};
use truelove_core::models::field::{Field, FieldMode, Operation};
use truelove_core::repository::FieldRepository;
use uuid::Uuid;

/// Round a money amount to cents, halves away from zero.
///
/// Values `Decimal` cannot represent are returned unchanged.
pub fn round_money(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// A value to write back to a result field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedWrite {
    pub field_id: Uuid,
    pub value: f64,
}

/// Outcome of evaluating one snapshot, before any write.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecomputePlan {
    /// Writes in dependency order.
    pub writes: Vec<PlannedWrite>,
    /// Results whose stored value is already current.
    pub unchanged: usize,
    /// Malformed, stale or cyclic results.
    pub skipped: usize,
}

/// Result field that can be evaluated: well-formed, with both bases
/// present in the snapshot.
struct Node<'a> {
    field: &'a Field,
    op: Operation,
    bases: [&'a Field; 2],
}

/// Evaluate every result field of a snapshot.
///
/// A field id listed more than once is evaluated once, from its first
/// occurrence.
pub fn plan(fields: &[Field]) -> RecomputePlan {
    let mut seen = HashSet::new();
    let fields: Vec<&Field> = fields.iter().filter(|f| seen.insert(f.id)).collect();

    let by_id: HashMap<Uuid, &Field> = fields.iter().map(|f| (f.id, *f)).collect();
    let mut out = RecomputePlan::default();

    let mut nodes: HashMap<Uuid, Node<'_>> = HashMap::new();
    for &field in fields.iter().filter(|f| f.options.is_result()) {
        let Some((id1, id2)) = field.base_pair() else {
            debug!(field_id = %field.id, "Result field has no base pair, skipping");
            out.skipped += 1;
            continue;
        };
        let Some(op) = field.options.op else {
            debug!(field_id = %field.id, "Result field has no known operation, skipping");
            out.skipped += 1;
            continue;
        };
        let (Some(base1), Some(base2)) = (by_id.get(&id1), by_id.get(&id2)) else {
            debug!(field_id = %field.id, "Base field missing, result left stale");
            out.skipped += 1;
            continue;
        };
        nodes.insert(
            field.id,
            Node {
                field,
                op,
                bases: [*base1, *base2],
            },
        );
    }

    // Kahn's algorithm over result -> base edges where the base is
    // itself an evaluable result.
    let mut pending: HashMap<Uuid, usize> = HashMap::new();
    let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (id, node) in &nodes {
        let mut count = 0;
        for base in node.bases {
            if nodes.contains_key(&base.id) {
                count += 1;
                dependents.entry(base.id).or_default().push(*id);
            }
        }
        pending.insert(*id, count);
    }

    // Seed in snapshot order so the write order is stable.
    let mut ready: VecDeque<Uuid> = fields
        .iter()
        .filter(|f| pending.get(&f.id) == Some(&0))
        .map(|f| f.id)
        .collect();

    let mut settled: HashMap<Uuid, f64> = HashMap::new();
    let mut visited = 0;

    while let Some(id) = ready.pop_front() {
        visited += 1;
        let Some(node) = nodes.get(&id) else {
            continue;
        };

        let value_of = |base: &Field| {
            settled
                .get(&base.id)
                .copied()
                .unwrap_or_else(|| base.options.numeric_value())
        };
        let (v1, v2) = (value_of(node.bases[0]), value_of(node.bases[1]));

        let value = evaluate(node, v1, v2);
        settled.insert(id, value);
        if node.field.options.stored_number() == Some(value) {
            out.unchanged += 1;
        } else {
            out.writes.push(PlannedWrite {
                field_id: id,
                value,
            });
        }

        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }

    let cyclic = nodes.len() - visited;
    if cyclic > 0 {
        let titles: Vec<&str> = nodes
            .iter()
            .filter(|(id, _)| pending.get(*id).is_some_and(|c| *c > 0))
            .map(|(_, node)| node.field.title.as_str())
            .collect();
        warn!(count = cyclic, fields = ?titles, "Result fields form a cycle, skipping");
        out.skipped += cyclic;
    }

    out
}

fn evaluate(node: &Node<'_>, v1: f64, v2: f64) -> f64 {
    let value = node.op.apply(v1, v2);
    let value = if value.is_finite() { value } else { 0.0 };

    let money = node.field.field_type.is_money()
        || node.bases.iter().any(|b| b.field_type.is_money());

    if money { round_money(value) } else { value }
}

/// Totals of one or more recompute passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RecomputeReport {
    pub fn merge(&mut self, other: RecomputeReport) {
        self.written += other.written;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Keeps result fields in step with their base fields.
pub struct ResultRecomputer<F: FieldRepository> {
    repo: F,
}

impl<F: FieldRepository> ResultRecomputer<F> {
    pub fn new(repo: F) -> Self {
        Self { repo }
    }

    /// Recompute every result field of one section snapshot.
    ///
    /// Only changed values are written, so a second pass over the same
    /// data writes nothing. A failed write is logged and counted; the
    /// remaining writes still run.
    pub async fn recompute_all(&self, fields: &[Field]) -> RecomputeReport {
        let plan = plan(fields);
        let mut report = RecomputeReport {
            unchanged: plan.unchanged,
            skipped: plan.skipped,
            ..Default::default()
        };

        for write in plan.writes {
            match self.repo.set_value(write.field_id, write.value).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    error!(field_id = %write.field_id, error = %e, "Failed to write result field");
                    report.failed += 1;
                }
            }
        }

        if report.written > 0 || report.failed > 0 {
            info!(
                written = report.written,
                failed = report.failed,
                "Result fields recomputed"
            );
        }

        report
    }

    /// Delete a result field and put its first base field back in
    /// `documentar` mode. The second base keeps its mode.
    pub async fn detach_result(&self, result: &Field) -> TrueLoveResult<()> {
        self.repo.delete(result.id).await?;

        if let Some(base_id) = result.first_base() {
            match self.repo.set_mode(base_id, FieldMode::Documentar).await {
                Ok(()) => {}
                Err(TrueLoveError::NotFound { .. }) => {
                    debug!(%base_id, "Base field already gone");
                }
                Err(e) => return Err(e),
            }
        }

        info!(field_id = %result.id, "Result field detached");

        Ok(())
    }

    /// Recompute each snapshot received until the sender is dropped.
    pub async fn run_on_snapshots(&self, mut snapshots: mpsc::Receiver<Vec<Field>>) -> RecomputeReport {
        let mut total = RecomputeReport::default();
        while let Some(fields) = snapshots.recv().await {
            total.merge(self.recompute_all(&fields).await);
        }

        debug!(?total, "Snapshot stream closed");

        total
    }
}
