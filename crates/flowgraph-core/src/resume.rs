//! Resuming a run from a checkpoint.
//!
//! Resuming reuses the same run id and the same checkpoint store the
//! original run used, and continues the sequence counter from the last
//! record rather than restarting it at zero. That is the one respect in
//! which resuming differs from a fresh [`crate::compiled::CompiledGraph::run`]:
//! everything else — iteration counting, node execution, routing, fork/join
//! — goes through the same [`crate::executor::drive`] loop.

use std::sync::Arc;

use flowgraph_checkpoint::{CheckpointError, CheckpointRecord, CheckpointStore, CHECKPOINT_VERSION};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::checkpoint_manager;
use crate::compiled::CompiledGraph;
use crate::context::ExecutionContext;
use crate::error::{FlowError, RunError};
use crate::executor::{self, RunCounters, StopAt};
use crate::ids::is_end;
use crate::options::{ResumeOptions, RunOptions};
use crate::state::ParallelState;
use crate::telemetry::LogLevel;

impl<S> CompiledGraph<S>
where
    S: ParallelState + Serialize + DeserializeOwned + Default,
{
    /// Resume the most recent checkpoint of `run_id`.
    pub async fn resume(
        &self,
        ctx: ExecutionContext,
        run_id: impl Into<String>,
        store: Arc<dyn CheckpointStore>,
        options: ResumeOptions<S>,
    ) -> std::result::Result<S, RunError<S>> {
        let run_id = run_id.into();
        let record = store
            .load_latest(&run_id)
            .await
            .map_err(|err| map_lookup_error(err, &run_id));
        self.resume_from_record(ctx, run_id, store, record, options).await
    }

    /// Resume a specific checkpointed node of `run_id`, rather than its
    /// latest.
    pub async fn resume_from(
        &self,
        ctx: ExecutionContext,
        run_id: impl Into<String>,
        node_id: &str,
        store: Arc<dyn CheckpointStore>,
        options: ResumeOptions<S>,
    ) -> std::result::Result<S, RunError<S>> {
        let run_id = run_id.into();
        let record = store
            .load(&run_id, node_id)
            .await
            .map_err(|err| map_lookup_error(err, &run_id));
        self.resume_from_record(ctx, run_id, store, record, options).await
    }

    async fn resume_from_record(
        &self,
        ctx: ExecutionContext,
        run_id: String,
        store: Arc<dyn CheckpointStore>,
        record: Result<CheckpointRecord, FlowError>,
        options: ResumeOptions<S>,
    ) -> std::result::Result<S, RunError<S>> {
        let record = record.map_err(|error| RunError { error, state: S::default() })?;

        if record.version != CHECKPOINT_VERSION {
            return Err(RunError {
                error: FlowError::CheckpointVersionMismatch {
                    found: record.version,
                    expected: CHECKPOINT_VERSION,
                },
                state: S::default(),
            });
        }

        let mut state: S =
            checkpoint_manager::deserialize_state(&record.node_id, &record.state, record.compressed)
                .map_err(|err| RunError { error: err, state: S::default() })?;

        if let Some(override_fn) = options.state_override {
            state = override_fn(state);
        }
        if let Some(validate) = options.state_validation.as_ref() {
            if let Err(err) = validate(&state) {
                return Err(RunError { error: err, state });
            }
        }

        let start_node = if options.replay_node {
            record.node_id.clone()
        } else {
            record
                .next_node_id
                .clone()
                .unwrap_or_else(|| crate::ids::END.to_string())
        };

        if !is_end(&start_node) && !self.has_node(&start_node) {
            return Err(RunError { error: FlowError::InvalidResumeNode(start_node), state });
        }

        if is_end(&start_node) {
            ctx.logger()
                .log(LogLevel::Info, "resume found run already at END", ctx.run_id(), &record.node_id);
            return Ok(state);
        }

        let run_options: RunOptions = options
            .run_options
            .with_run_id(run_id.clone())
            .with_checkpointing(store);
        let ctx = ctx.with_run_id(run_id);

        ctx.logger().log(LogLevel::Info, "resuming run", ctx.run_id(), &start_node);

        let counters = RunCounters::starting_at(record.sequence);
        let prev_node = if options.replay_node {
            record.prev_node_id.clone()
        } else {
            Some(record.node_id.clone())
        };

        let outcome =
            executor::drive(self, &ctx, state, &start_node, StopAt::End, prev_node, &run_options, &counters)
                .await?;
        Ok(outcome.state)
    }
}

fn map_lookup_error(err: CheckpointError, run_id: &str) -> FlowError {
    match err {
        CheckpointError::NotFound { .. } => FlowError::NoCheckpoints(run_id.to_string()),
        other => FlowError::Store(other),
    }
}
