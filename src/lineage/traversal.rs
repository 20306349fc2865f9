//! Bounded lineage walk
//!
//! Breadth-first walk over lineage rows, queried step by step from a
//! [`LineageSource`]. Facts may contain cycles, so every walk carries its own
//! visited set keyed by `schema.table`: each table is expanded at most once,
//! while every observed row is still reported to the visitor.

use crate::lineage::source::{LineageRow, LineageSource, SourceError};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Default hop bound shared by every walking operation
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Which way lineage is followed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From a table to what it feeds
    #[default]
    Downstream,
    /// From a table to what feeds it
    Upstream,
    Both,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "downstream" => Some(Direction::Downstream),
            "upstream" => Some(Direction::Upstream),
            "both" | "full" => Some(Direction::Both),
            _ => None,
        }
    }

    fn steps(self) -> &'static [Direction] {
        match self {
            Direction::Downstream => &[Direction::Downstream],
            Direction::Upstream => &[Direction::Upstream],
            Direction::Both => &[Direction::Downstream, Direction::Upstream],
        }
    }
}

/// Depth and time bounds of one walk
#[derive(Debug, Clone, Copy)]
pub struct TraversalLimits {
    pub max_depth: usize,
    pub deadline: Option<Instant>,
}

impl TraversalLimits {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

/// One lineage row observed during a walk
#[derive(Debug)]
pub struct Hop<'a> {
    pub row: &'a LineageRow,
    /// Direction of the step that produced this row
    pub direction: Direction,
    /// Hops between the start and the far end of this row
    pub depth: usize,
    /// False when the far end had already been reached
    pub first_visit: bool,
}

impl Hop<'_> {
    /// `(schema, table)` of the end the walk moves to
    pub fn far(&self) -> (&str, &str) {
        match self.direction {
            Direction::Upstream => (&self.row.schema_name, &self.row.object_name),
            _ => (&self.row.target_schema_name, &self.row.target_object_name),
        }
    }

    pub fn far_key(&self) -> String {
        let (schema, table) = self.far();
        format!("{}.{}", schema, table)
    }
}

/// Receives every hop of a walk
pub trait HopVisitor {
    fn visit(&mut self, hop: &Hop<'_>);
}

impl<F> HopVisitor for F
where
    F: FnMut(&Hop<'_>),
{
    fn visit(&mut self, hop: &Hop<'_>) {
        self(hop)
    }
}

/// Summary of a finished walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Tables reached, the start excluded
    pub reached: usize,
    /// Step queries that failed and contributed nothing
    pub failed_steps: usize,
    /// The deadline cut the walk short
    pub truncated: bool,
}

impl WalkOutcome {
    fn absorb(&mut self, other: WalkOutcome) {
        self.reached += other.reached;
        self.failed_steps += other.failed_steps;
        self.truncated |= other.truncated;
    }
}

/// Walk lineage from `schema.table` in `direction`, reporting every row.
///
/// `Both` runs a downstream walk then an upstream walk, each with its own
/// visited set.
pub async fn walk<V>(
    source: &dyn LineageSource,
    schema: &str,
    table: &str,
    direction: Direction,
    limits: TraversalLimits,
    visitor: &mut V,
) -> WalkOutcome
where
    V: HopVisitor + ?Sized,
{
    let mut outcome = WalkOutcome::default();
    for step in direction.steps() {
        let single = walk_one_way(source, schema, table, *step, limits, visitor).await;
        outcome.absorb(single);
    }
    outcome
}

async fn walk_one_way<V>(
    source: &dyn LineageSource,
    schema: &str,
    table: &str,
    direction: Direction,
    limits: TraversalLimits,
    visitor: &mut V,
) -> WalkOutcome
where
    V: HopVisitor + ?Sized,
{
    let mut outcome = WalkOutcome::default();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(format!("{}.{}", schema, table));

    let mut queue: VecDeque<(String, String, usize)> = VecDeque::new();
    queue.push_back((schema.to_string(), table.to_string(), 0));

    while let Some((current_schema, current_table, depth)) = queue.pop_front() {
        if depth >= limits.max_depth {
            continue;
        }
        if limits.is_expired() {
            warn!(
                "Lineage walk from {}.{} stopped at its deadline ({} tables reached)",
                schema, table, outcome.reached
            );
            outcome.truncated = true;
            break;
        }

        let rows = match step(source, &current_schema, &current_table, direction, &limits).await {
            Ok(rows) => rows,
            Err(SourceError::Timeout) => {
                warn!(
                    "Lineage step at {}.{} ran past the deadline",
                    current_schema, current_table
                );
                outcome.truncated = true;
                break;
            }
            Err(e) => {
                error!(
                    "Lineage step at {}.{} failed, treating as empty: {}",
                    current_schema, current_table, e
                );
                outcome.failed_steps += 1;
                continue;
            }
        };

        debug!(
            "{:?} step at {}.{} (depth {}) returned {} rows",
            direction,
            current_schema,
            current_table,
            depth,
            rows.len()
        );

        for row in &rows {
            let far_key = match direction {
                Direction::Upstream => row.source_key(),
                _ => row.target_key(),
            };
            let hop = Hop {
                row,
                direction,
                depth: depth + 1,
                first_visit: visited.insert(far_key),
            };
            visitor.visit(&hop);

            if hop.first_visit {
                outcome.reached += 1;
                let (next_schema, next_table) = hop.far();
                queue.push_back((next_schema.to_string(), next_table.to_string(), depth + 1));
            }
        }
    }

    outcome
}

async fn step(
    source: &dyn LineageSource,
    schema: &str,
    table: &str,
    direction: Direction,
    limits: &TraversalLimits,
) -> Result<Vec<LineageRow>, SourceError> {
    bounded(limits, async {
        match direction {
            Direction::Upstream => source.lineage_into(schema, table).await,
            _ => source.lineage_from(schema, table).await,
        }
    })
    .await
}

/// Run one source query within the time left by `limits`.
///
/// Fails with [`SourceError::Timeout`] without querying once the deadline
/// has passed.
pub async fn bounded<T, F>(limits: &TraversalLimits, query: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match limits.remaining() {
        Some(remaining) if remaining.is_zero() => Err(SourceError::Timeout),
        Some(remaining) => tokio::time::timeout(remaining, query)
            .await
            .map_err(|_| SourceError::Timeout)?,
        None => query.await,
    }
}
