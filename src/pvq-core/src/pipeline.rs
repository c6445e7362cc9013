//! Records pipeline: load, derive, join, derive again, filter
//!
//! Orchestrates the engines in dependency order. Computed fields referencing a
//! join's result prefix cannot run until that join has merged its output, so
//! fields split into pre-join and post-join phases around the join step.
//! Filters run last of all: a selection may key on a join-prefixed field or a
//! post-join computed field, which only exist once both phases are done.

use indexmap::IndexSet;

use pvq_expr::fields::{compile, split_by_join_dependency, CompiledField, ComputedFieldSpec};
use pvq_shared::record::Record;

use crate::diag::{JoinDebug, Warnings};
use crate::error::{Error, Result};
use crate::filter::{apply_filters, merge_layers, resolve_filter_types, FieldTypes, FilterSet};
use crate::join::{merge_with_lookup, JoinData, JoinSpec, Lookup, StreamingJoinBuilder};
use crate::limits::EngineLimits;
use crate::pivot::{pivot, PivotSpec, PivotView, StreamingPivotBuilder};

/// Collaborator that loads records by source id.
pub trait RecordSource {
    /// Load all records of one source.
    fn load(
        &self,
        source_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Record>>> + Send;
}

/// Collaborator that delivers the base records in chunks.
pub trait ChunkedRecordSource {
    /// The next chunk, or `None` after the last one.
    fn next_chunk(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<Vec<Record>>>> + Send;
}

/// One pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    /// Base record source id
    pub source_id: String,
    /// Computed-field configuration
    pub computed_fields: Vec<ComputedFieldSpec>,
    /// Joins, applied in order
    pub joins: Vec<JoinSpec>,
    /// Request-global filter layer
    pub global_filters: FilterSet,
    /// Container filter layer, overriding the global one per key
    pub container_filters: FilterSet,
    /// Declared field types for filter resolution
    pub field_types: FieldTypes,
}

/// The enriched record set plus diagnostics.
#[derive(Debug)]
pub struct PipelineResult {
    /// Records after fields, filters, and joins
    pub records: Vec<Record>,
    /// Base records loaded before filtering
    pub loaded_count: usize,
    /// Records after all joins
    pub joined_count: usize,
    /// Per-join diagnostics, in join order
    pub joins_applied: Vec<JoinDebug>,
    /// Deduplicated warnings in first-seen order
    pub warnings: Vec<String>,
}

/// A pivot view plus the pipeline diagnostics behind it.
#[derive(Debug)]
pub struct PivotResult {
    /// The finalized view
    pub view: PivotView,
    /// Base records loaded
    pub loaded_count: usize,
    /// Records after joins
    pub joined_count: usize,
    /// Per-join diagnostics
    pub joins_applied: Vec<JoinDebug>,
}

/// Build the enriched record set for a request. Filters layer global under
/// container; pivot-spec defaults are layered in by [`build_pivot`].
pub async fn build_records<S: RecordSource>(
    request: &PipelineRequest,
    source: &S,
    limits: &EngineLimits,
) -> Result<PipelineResult> {
    let filters = merge_layers(&[&request.global_filters, &request.container_filters]);
    run_pipeline(request, source, limits, &filters).await
}

async fn run_pipeline<S: RecordSource>(
    request: &PipelineRequest,
    source: &S,
    limits: &EngineLimits,
    filters: &FilterSet,
) -> Result<PipelineResult> {
    let mut warnings = Warnings::new();

    let join_rows = resolve_join_data(&request.joins, source).await?;
    let lookups = build_lookups(&request.joins, &join_rows, limits, &mut warnings)?;

    let fields = compile(&request.computed_fields);
    let prefixes: Vec<Option<&str>> = request.joins.iter().map(JoinSpec::prefix).collect();
    let (pre_fields, post_fields) = split_by_join_dependency(&fields, &prefixes);

    let mut records = source.load(&request.source_id).await?;
    let loaded_count = records.len();
    if loaded_count > limits.max_records {
        return Err(Error::limit("records", limits.max_records, loaded_count));
    }

    apply_fields(&pre_fields, &mut records, &mut warnings);

    let mut joins_applied = Vec::with_capacity(request.joins.len());
    for (join, lookup) in request.joins.iter().zip(&lookups) {
        let outcome = merge_with_lookup(records, join, lookup);
        records = outcome.records;
        joins_applied.push(outcome.debug);
        if records.len() > limits.max_join_records {
            return Err(Error::limit(
                "joined records",
                limits.max_join_records,
                records.len(),
            ));
        }
    }
    let joined_count = records.len();

    apply_fields(&post_fields, &mut records, &mut warnings);

    let filter_types = resolve_filter_types(filters, &request.field_types, &records);
    records = apply_filters(records, filters, &filter_types);

    Ok(PipelineResult {
        records,
        loaded_count,
        joined_count,
        joins_applied,
        warnings: warnings.into_vec(),
    })
}

/// Run the pipeline and the batch pivot engine over its output.
pub async fn build_pivot<S: RecordSource>(
    request: &PipelineRequest,
    spec: &PivotSpec,
    source: &S,
    limits: &EngineLimits,
) -> Result<PivotResult> {
    let filters = merge_layers(&[
        &spec.default_filters,
        &request.global_filters,
        &request.container_filters,
    ]);
    let pipeline = run_pipeline(request, source, limits, &filters).await?;
    let mut view = pivot(&pipeline.records, spec, limits)?;
    view.warnings = merge_warnings(pipeline.warnings, view.warnings);
    Ok(PivotResult {
        view,
        loaded_count: pipeline.loaded_count,
        joined_count: pipeline.joined_count,
        joins_applied: pipeline.joins_applied,
    })
}

/// Run the pipeline chunk by chunk into the streaming pivot builder. The view
/// is identical to [`build_pivot`] over the concatenated chunks.
pub async fn build_pivot_streaming<S, C>(
    request: &PipelineRequest,
    spec: &PivotSpec,
    source: &S,
    mut chunks: C,
    limits: &EngineLimits,
) -> Result<PivotResult>
where
    S: RecordSource,
    C: ChunkedRecordSource,
{
    let filters = merge_layers(&[
        &spec.default_filters,
        &request.global_filters,
        &request.container_filters,
    ]);
    let mut warnings = Warnings::new();

    let join_rows = resolve_join_data(&request.joins, source).await?;
    let lookups = build_lookups(&request.joins, &join_rows, limits, &mut warnings)?;

    let fields = compile(&request.computed_fields);
    let prefixes: Vec<Option<&str>> = request.joins.iter().map(JoinSpec::prefix).collect();
    let (pre_fields, post_fields) = split_by_join_dependency(&fields, &prefixes);

    let mut builder = StreamingPivotBuilder::new(spec, limits);
    let mut filter_types: Option<FieldTypes> = None;
    let mut loaded_count = 0usize;
    let mut joined_count = 0usize;
    let mut joins_applied: Vec<JoinDebug> = request
        .joins
        .iter()
        .map(|join| JoinDebug {
            prefix: join.result_prefix.clone(),
            base_before: 0,
            base_after: 0,
            matched_rows: 0,
            sample_keys: Vec::new(),
        })
        .collect();

    while let Some(chunk) = chunks.next_chunk().await? {
        loaded_count += chunk.len();
        if loaded_count > limits.max_records {
            return Err(Error::limit("records", limits.max_records, loaded_count));
        }
        let mut records = chunk;
        apply_fields(&pre_fields, &mut records, &mut warnings);

        for ((join, lookup), debug) in request
            .joins
            .iter()
            .zip(&lookups)
            .zip(joins_applied.iter_mut())
        {
            let outcome = merge_with_lookup(records, join, lookup);
            records = outcome.records;
            accumulate_debug(debug, &outcome.debug);
        }
        joined_count += records.len();
        if joined_count > limits.max_join_records {
            return Err(Error::limit(
                "joined records",
                limits.max_join_records,
                joined_count,
            ));
        }

        apply_fields(&post_fields, &mut records, &mut warnings);

        // Types resolve once, against the first non-empty chunk, so an
        // undeclared field's inferred type cannot flip between chunks.
        if filter_types.is_none() && !records.is_empty() {
            filter_types = Some(resolve_filter_types(
                &filters,
                &request.field_types,
                &records,
            ));
        }
        if let Some(types) = &filter_types {
            records = apply_filters(records, &filters, types);
        }

        builder.push_chunk(&records)?;
    }

    let mut view = builder.finish();
    view.warnings = merge_warnings(warnings.into_vec(), view.warnings);
    Ok(PivotResult {
        view,
        loaded_count,
        joined_count,
        joins_applied,
    })
}

async fn resolve_join_data<S: RecordSource>(
    joins: &[JoinSpec],
    source: &S,
) -> Result<Vec<Vec<Record>>> {
    let loads = joins.iter().map(|join| async move {
        match &join.data {
            JoinData::Rows(rows) => Ok(rows.clone()),
            JoinData::Source(id) => source.load(id).await,
        }
    });
    futures::future::try_join_all(loads).await
}

fn build_lookups(
    joins: &[JoinSpec],
    join_rows: &[Vec<Record>],
    limits: &EngineLimits,
    warnings: &mut Warnings,
) -> Result<Vec<Lookup>> {
    joins
        .iter()
        .zip(join_rows)
        .map(|(join, rows)| {
            let mut builder = StreamingJoinBuilder::new(join, limits);
            builder.push_chunk(rows)?;
            Ok(builder.finish(warnings))
        })
        .collect()
}

fn apply_fields(fields: &[&CompiledField], records: &mut [Record], warnings: &mut Warnings) {
    let mut messages = Vec::new();
    for field in fields {
        field.apply(records, &mut messages);
    }
    warnings.extend(messages);
}

fn accumulate_debug(total: &mut JoinDebug, chunk: &JoinDebug) {
    total.base_before += chunk.base_before;
    total.base_after += chunk.base_after;
    total.matched_rows += chunk.matched_rows;
    let mut seen: IndexSet<String> = total.sample_keys.drain(..).collect();
    for key in &chunk.sample_keys {
        if seen.len() >= 5 {
            break;
        }
        seen.insert(key.clone());
    }
    total.sample_keys = seen.into_iter().collect();
}

fn merge_warnings(pipeline: Vec<String>, view: Vec<String>) -> Vec<String> {
    let mut merged = Warnings::new();
    merged.extend(pipeline);
    merged.extend(view);
    merged.into_vec()
}
