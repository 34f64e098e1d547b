//! The pipeline evaluator.
//!
//! A single interpreter walks the step list. Leading `Get` steps descend the
//! source-record tree; the value the descent ends on is expanded into one
//! record per collection element, and the remaining steps apply to each
//! record independently and concurrently (bounded by the bridge's fan-out
//! limit). A `Filter` miss short-circuits all downstream steps for that
//! record; a per-record error removes only that record from the output.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};

use chainproj_core::record::expand_collection;
use chainproj_core::{Entity, ResolveError, SourceRecord, Value};

use crate::bridge::{ResolverBridge, RunCache};
use crate::error::ProjectionError;
use crate::pipeline::Pipeline;
use crate::step::Step;

/// The flat field mapping a record has been projected down to.
pub type ProjectedFields = BTreeMap<String, Value>;

/// Outcome of one pipeline run over one source record.
///
/// Per-record failures are collected alongside the surviving records, keyed
/// by the element's expansion index, so one bad element never hides its
/// siblings.
#[derive(Debug, Default)]
pub struct RunResult {
    /// Surviving `(expansion_index, fields)` pairs in expansion order. The
    /// index identifies the source element even after filtering or
    /// per-record failures have removed its siblings.
    pub records: Vec<(usize, ProjectedFields)>,
    /// `(expansion_index, error)` pairs for records that failed.
    pub errors: Vec<(usize, ProjectionError)>,
    /// How many elements the descent expanded into, before filtering.
    pub total_expanded: usize,
}

impl Pipeline {
    /// Execute the pipeline over one source record.
    ///
    /// A fresh resolution cache is created for this run and dropped with it.
    /// Returns `Err` only when the root descent itself fails; element-level
    /// failures are reported in [`RunResult::errors`].
    pub async fn run(
        &self,
        record: &SourceRecord,
        bridge: &ResolverBridge,
    ) -> Result<RunResult, ProjectionError> {
        // Descent phase: leading Get steps navigate the tree.
        let mut value = record.root();
        let mut consumed = 0;
        while let Some(Step::Get { path, optional }) = self.steps().get(consumed) {
            match value.as_map().and_then(|m| m.get(path)) {
                Some(sub) => {
                    value = sub;
                    consumed += 1;
                }
                None if *optional => return Ok(RunResult::default()),
                None => {
                    return Err(ProjectionError::PathNotFound { path: path.clone() });
                }
            }
        }

        let elements = expand_collection(value);
        let total_expanded = elements.len();
        let rest = &self.steps()[consumed..];
        let cache = RunCache::new();

        // Record phase: elements evaluate independently and out of order.
        let mut outcomes: Vec<(usize, Result<Option<ProjectedFields>, ProjectionError>)> =
            stream::iter(elements.into_iter().enumerate())
                .map(|(index, fields)| {
                    let cache = &cache;
                    async move { (index, apply_steps(rest, fields, bridge, cache).await) }
                })
                .buffer_unordered(bridge.fan_out())
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut result = RunResult {
            total_expanded,
            ..Default::default()
        };
        for (index, outcome) in outcomes {
            match outcome {
                Ok(Some(fields)) => result.records.push((index, fields)),
                Ok(None) => {} // filtered out
                Err(err) => {
                    tracing::debug!(index, error = %err, "Record dropped from projection");
                    result.errors.push((index, err));
                }
            }
        }
        Ok(result)
    }
}

/// Apply the record-phase steps to one element.
///
/// `Ok(None)` means the record was dropped (filter miss or optional-get
/// absence) — not an error.
async fn apply_steps(
    steps: &[Step],
    mut fields: ProjectedFields,
    bridge: &ResolverBridge,
    cache: &RunCache,
) -> Result<Option<ProjectedFields>, ProjectionError> {
    for step in steps {
        match step {
            Step::Get { path, optional } => {
                let sub = match fields.get(path) {
                    Some(Value::Map(sub)) => Some(sub.clone()),
                    _ => None,
                };
                match sub {
                    Some(sub) => fields = sub,
                    None if *optional => return Ok(None),
                    None => return Err(ProjectionError::PathNotFound { path: path.clone() }),
                }
            }
            Step::Select { fields: keep } => {
                let mut selected = ProjectedFields::new();
                for name in keep {
                    match fields.remove(name) {
                        Some(v) => {
                            selected.insert(name.clone(), v);
                        }
                        None => {
                            return Err(ProjectionError::UnknownField {
                                field: name.clone(),
                            })
                        }
                    }
                }
                fields = selected;
            }
            Step::Rename { pairs } => {
                for (from, to) in pairs {
                    match fields.remove(from) {
                        Some(v) => {
                            fields.insert(to.clone(), v);
                        }
                        None => {
                            return Err(ProjectionError::UnknownField {
                                field: from.clone(),
                            })
                        }
                    }
                }
            }
            Step::Over { field, func } => match fields.remove(field) {
                Some(v) => {
                    fields.insert(field.clone(), func(v));
                }
                None => {
                    return Err(ProjectionError::UnknownField {
                        field: field.clone(),
                    })
                }
            },
            Step::Resolve { field } => {
                let reference = match fields.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => {
                        return Err(ProjectionError::Resolution(ResolveError::Malformed {
                            reference: format!("{other:?}"),
                            reason: "content reference must be a string".into(),
                        }))
                    }
                    None => {
                        return Err(ProjectionError::UnknownField {
                            field: field.clone(),
                        })
                    }
                };
                let resolved = bridge.resolve(cache, &reference).await?;
                fields.insert(field.clone(), resolved);
            }
            Step::Filter { field, value } => {
                if fields.get(field) != Some(value) {
                    return Ok(None);
                }
            }
            Step::Flatten => {
                fields = flatten_one_level(fields);
            }
            Step::Exclude { fields: drop } => {
                for name in drop {
                    if fields.remove(name).is_none() {
                        return Err(ProjectionError::UnknownField {
                            field: name.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(Some(fields))
}

/// Merge one nesting level into the parent namespace.
///
/// The parent's own scalar fields land first; nested-map entries are
/// applied afterwards in field order, so on a name collision the inner
/// value wins (last-write-wins).
fn flatten_one_level(fields: ProjectedFields) -> ProjectedFields {
    let mut out = ProjectedFields::new();
    let mut nested: Vec<(String, BTreeMap<String, Value>)> = Vec::new();
    for (name, value) in fields {
        match value {
            Value::Map(sub) => nested.push((name, sub)),
            other => {
                out.insert(name, other);
            }
        }
    }
    for (_, sub) in nested {
        for (name, value) in sub {
            out.insert(name, value);
        }
    }
    out
}

// ─── Projector ───────────────────────────────────────────────────────────────

/// Binds a pipeline to an entity type and an id field, turning surviving
/// records into entities.
#[derive(Debug, Clone)]
pub struct Projector {
    entity_type: String,
    id_field: String,
    pipeline: Pipeline,
}

/// Entities produced by one projection, plus the per-record errors.
#[derive(Debug, Default)]
pub struct ProjectOutcome {
    pub entities: Vec<Entity>,
    pub errors: Vec<(usize, ProjectionError)>,
    pub total_expanded: usize,
}

impl Projector {
    /// The id is read from the record's `"id"` field by default; use
    /// [`Projector::id_field`] to change it.
    pub fn new(entity_type: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            entity_type: entity_type.into(),
            id_field: "id".to_string(),
            pipeline,
        }
    }

    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = name.into();
        self
    }

    /// Run the pipeline and convert surviving records into entities.
    ///
    /// The id field is removed from the entity's field set; a record
    /// without a usable id fails with `UnknownField` for that record only.
    pub async fn project(
        &self,
        record: &SourceRecord,
        bridge: &ResolverBridge,
    ) -> Result<ProjectOutcome, ProjectionError> {
        let run = self.pipeline.run(record, bridge).await?;
        let mut outcome = ProjectOutcome {
            errors: run.errors,
            total_expanded: run.total_expanded,
            ..Default::default()
        };
        for (index, mut fields) in run.records {
            let id = fields
                .remove(&self.id_field)
                .as_ref()
                .and_then(Entity::id_from_value);
            match id {
                Some(id) => outcome
                    .entities
                    .push(Entity::new(self.entity_type.clone(), id, fields)),
                None => outcome.errors.push((
                    index,
                    ProjectionError::UnknownField {
                        field: self.id_field.clone(),
                    },
                )),
            }
        }
        Ok(outcome)
    }
}
