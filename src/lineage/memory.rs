//! In-memory lineage store for tests
//!
//! Holds lineage facts in plain vectors and answers the same questions as
//! the Postgres store. Any source can be switched to failing so callers'
//! best-effort handling can be exercised.

use crate::lineage::source::{
    LineageRow, LineageSource, Reference, SourceError, TransformationRole, TransformationRow,
    WorkflowTaskRow,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A source that can be made to fail
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailingSource {
    Engine(String),
    Transformations,
    Workflows,
    TextSearch,
    /// Every per-step `lineage_from`/`lineage_into` query
    Traversal,
}

#[derive(Default)]
pub struct MemoryLineageStore {
    lineage: Vec<LineageRow>,
    transformations: Vec<TransformationRow>,
    tasks: Vec<WorkflowTaskRow>,
    /// `(name, configuration text)` of transformations for text search
    transformation_configs: Vec<(String, String)>,
    failing: Mutex<HashSet<FailingSource>>,
    step_queries: AtomicUsize,
    /// Delay before every answer
    latency: Option<Duration>,
}

impl MemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `schema.from -> schema.to` on the given engine
    pub fn with_edge(mut self, engine: &str, from: (&str, &str), to: (&str, &str), relationship: &str) -> Self {
        self.lineage.push(LineageRow {
            engine: engine.to_string(),
            schema_name: from.0.to_string(),
            object_name: from.1.to_string(),
            object_type: "table".to_string(),
            target_schema_name: to.0.to_string(),
            target_object_name: to.1.to_string(),
            target_object_type: "table".to_string(),
            relationship_type: relationship.to_string(),
            column_name: None,
            target_column_name: None,
        });
        self
    }

    pub fn with_row(mut self, row: LineageRow) -> Self {
        self.lineage.push(row);
        self
    }

    pub fn with_transformation(mut self, row: TransformationRow) -> Self {
        self.transformations.push(row);
        self
    }

    pub fn with_transformation_config(mut self, name: &str, config: &str) -> Self {
        self.transformation_configs
            .push((name.to_string(), config.to_string()));
        self
    }

    pub fn with_task(mut self, row: WorkflowTaskRow) -> Self {
        self.tasks.push(row);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn failing(self, source: FailingSource) -> Self {
        self.fail(source);
        self
    }

    pub fn fail(&self, source: FailingSource) {
        self.failing.lock().unwrap().insert(source);
    }

    /// Number of per-step traversal queries answered so far
    pub fn step_queries(&self) -> usize {
        self.step_queries.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check(&self, source: &FailingSource) -> Result<(), SourceError> {
        if self.failing.lock().unwrap().contains(source) {
            return Err(SourceError::Unavailable(format!("{:?} is failing", source)));
        }
        Ok(())
    }

    fn engine_ok(&self, engine: &str) -> bool {
        self.check(&FailingSource::Engine(engine.to_string())).is_ok()
    }

    fn matching<F>(&self, keep: F) -> Vec<LineageRow>
    where
        F: Fn(&LineageRow) -> bool,
    {
        self.step_queries.fetch_add(1, Ordering::SeqCst);
        let mut seen = HashSet::new();
        self.lineage
            .iter()
            .filter(|row| self.engine_ok(&row.engine) && keep(row))
            .filter(|row| {
                seen.insert((
                    row.source_key(),
                    row.target_key(),
                    row.relationship_type.clone(),
                    row.column_name.clone(),
                    row.target_column_name.clone(),
                ))
            })
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl LineageSource for MemoryLineageStore {
    async fn engine_lineage(&self, engine: &str) -> Result<Vec<LineageRow>, SourceError> {
        self.pause().await;
        self.check(&FailingSource::Engine(engine.to_string()))?;
        Ok(self
            .lineage
            .iter()
            .filter(|row| row.engine == engine)
            .cloned()
            .collect())
    }

    async fn lineage_from(&self, schema: &str, table: &str) -> Result<Vec<LineageRow>, SourceError> {
        self.pause().await;
        self.check(&FailingSource::Traversal)?;
        Ok(self.matching(|row| row.schema_name == schema && row.object_name == table))
    }

    async fn lineage_into(&self, schema: &str, table: &str) -> Result<Vec<LineageRow>, SourceError> {
        self.pause().await;
        self.check(&FailingSource::Traversal)?;
        Ok(self.matching(|row| row.target_schema_name == schema && row.target_object_name == table))
    }

    async fn transformation_lineage(&self) -> Result<Vec<TransformationRow>, SourceError> {
        self.pause().await;
        self.check(&FailingSource::Transformations)?;
        Ok(self.transformations.clone())
    }

    async fn workflow_tasks(&self, workflow_names: &[String]) -> Result<Vec<WorkflowTaskRow>, SourceError> {
        self.pause().await;
        self.check(&FailingSource::Workflows)?;
        Ok(self
            .tasks
            .iter()
            .filter(|task| workflow_names.is_empty() || workflow_names.contains(&task.workflow_name))
            .cloned()
            .collect())
    }

    async fn workflow_references(&self, schema: &str, table: &str) -> Result<Vec<Reference>, SourceError> {
        self.pause().await;
        self.check(&FailingSource::Workflows)?;
        let qualified = format!("{}.{}", schema, table);
        let text_search_ok = self.check(&FailingSource::TextSearch).is_ok();

        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for task in &self.tasks {
            if task.table_refs.contains(&qualified) && seen.insert(task.workflow_name.clone()) {
                references.push(Reference::declared(&task.workflow_name));
            }
        }
        if text_search_ok {
            for task in &self.tasks {
                if task.task_config.contains(&qualified) && seen.insert(task.workflow_name.clone()) {
                    references.push(Reference::text_search(&task.workflow_name));
                }
            }
        }
        Ok(references)
    }

    async fn transformation_references(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        role: TransformationRole,
    ) -> Result<Vec<Reference>, SourceError> {
        self.pause().await;
        self.check(&FailingSource::Transformations)?;

        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for row in &self.transformations {
            let tables = match role {
                TransformationRole::Consumer => row.inputs(),
                TransformationRole::Producer => row.outputs(),
            };
            if tables.iter().any(|(s, t)| s == schema && t == table) && seen.insert(row.name()) {
                references.push(Reference::declared(row.name()));
            }
        }

        if role == TransformationRole::Consumer && self.check(&FailingSource::TextSearch).is_ok() {
            let qualified = format!("{}.{}", schema, table);
            for (name, config) in &self.transformation_configs {
                let mentions = config.contains(&qualified) && (column.is_empty() || config.contains(column));
                if mentions && seen.insert(name.clone()) {
                    references.push(Reference::text_search(name));
                }
            }
        }
        Ok(references)
    }

    async fn column_targets(&self, schema: &str, table: &str, column: &str) -> Result<Vec<String>, SourceError> {
        self.pause().await;
        let mut seen = HashSet::new();
        Ok(self
            .lineage
            .iter()
            .filter(|row| self.engine_ok(&row.engine))
            .filter(|row| {
                row.schema_name == schema
                    && row.object_name == table
                    && row.column_name.as_deref() == Some(column)
            })
            .filter_map(|row| {
                let target_column = row.target_column_name.as_deref()?;
                Some(format!(
                    "{}.{}.{}",
                    row.target_schema_name, row.target_object_name, target_column
                ))
            })
            .filter(|qualified| seen.insert(qualified.clone()))
            .collect())
    }
}
