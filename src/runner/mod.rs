//! Dependency-aware step runner.
//!
//! Steps are named closures with explicit dependency edges. A step runs only
//! once all of its dependencies are decided and OK; otherwise it is skipped
//! with a pointer at the dependency that caused the skip. Scheduling is
//! deterministic: ready steps execute in sorted-name order.

pub mod config;
pub mod events;
pub mod reporter;

pub use config::{RunConfig, RunMode};
pub use reporter::{Reporter, StepStatus};

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Failures surfaced by the runner and the tuning guardrails.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline could not make progress (cycle or undefined deps); remaining steps: {remaining}")]
    NoProgress { remaining: String },

    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("guardrail failure: {0}")]
    Guardrail(String),
}

type StepFn<'a, V> = Box<dyn FnOnce(&BTreeMap<String, V>) -> anyhow::Result<V> + 'a>;

struct StepDef<'a, V> {
    deps: Vec<String>,
    func: Option<StepFn<'a, V>>,
    context: BTreeMap<String, String>,
}

/// Step registry with dependency edges.
///
/// `V` is the step-output type; successful outputs accumulate into a result
/// map keyed by step name, which later steps receive by reference.
pub struct Pipeline<'a, V> {
    steps: BTreeMap<String, StepDef<'a, V>>,
}

impl<'a, V> Default for Pipeline<'a, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, V> Pipeline<'a, V> {
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Register a named step.
    pub fn add(
        &mut self,
        name: &str,
        deps: &[&str],
        func: impl FnOnce(&BTreeMap<String, V>) -> anyhow::Result<V> + 'a,
    ) -> Result<(), PipelineError> {
        self.add_with_context(name, deps, BTreeMap::new(), func)
    }

    /// Register a named step with context attached to its failure records.
    pub fn add_with_context(
        &mut self,
        name: &str,
        deps: &[&str],
        context: BTreeMap<String, String>,
        func: impl FnOnce(&BTreeMap<String, V>) -> anyhow::Result<V> + 'a,
    ) -> Result<(), PipelineError> {
        if self.steps.contains_key(name) {
            return Err(PipelineError::DuplicateStep(name.to_string()));
        }
        self.steps.insert(
            name.to_string(),
            StepDef {
                deps: deps.iter().map(|d| d.to_string()).collect(),
                func: Some(Box::new(func)),
                context,
            },
        );
        Ok(())
    }

    /// Execute all steps in dependency order.
    ///
    /// Returns the map of successful step outputs. In debug mode the first
    /// failure aborts with [`PipelineError::StepFailed`]; in run mode
    /// failures are recorded and dependents are skipped. A cycle or an
    /// undefined dependency is a fatal [`PipelineError::NoProgress`].
    pub fn run(mut self, reporter: &mut Reporter) -> Result<BTreeMap<String, V>, PipelineError> {
        let mut results: BTreeMap<String, V> = BTreeMap::new();
        let mut remaining: BTreeSet<String> = self.steps.keys().cloned().collect();
        let mut decided: BTreeSet<String> = BTreeSet::new();

        let max_failures_reached = |reporter: &Reporter| -> bool {
            if reporter.cfg().mode != RunMode::Run {
                return false;
            }
            reporter
                .cfg()
                .max_failures
                .is_some_and(|mf| reporter.failures_count() >= mf)
        };

        fn skip_all<W>(
            remaining: &BTreeSet<String>,
            steps: &BTreeMap<String, StepDef<'_, W>>,
            reporter: &mut Reporter,
        ) {
            for name in remaining {
                if reporter.status(name).is_none() {
                    let context = steps
                        .get(name)
                        .map(|s| s.context.clone())
                        .unwrap_or_default();
                    reporter.mark_skipped(name, "max_failures", &context);
                }
            }
        }

        while !remaining.is_empty() {
            let mut progressed = false;

            if max_failures_reached(reporter) {
                skip_all(&remaining, &self.steps, reporter);
                break;
            }

            let pass: Vec<String> = remaining.iter().cloned().collect();
            for name in pass {
                if !remaining.contains(&name) {
                    continue;
                }
                let deps = self.steps[&name].deps.clone();

                // dependencies not yet decided: try again next pass
                if deps.iter().any(|d| !decided.contains(d)) {
                    continue;
                }

                // a failed or skipped dependency skips this step
                if let Some(bad) = deps.iter().find(|d| !reporter.ok(d)) {
                    let context = self.steps[&name].context.clone();
                    reporter.mark_skipped(&name, bad, &context);
                    remaining.remove(&name);
                    decided.insert(name);
                    progressed = true;
                    if max_failures_reached(reporter) {
                        skip_all(&remaining, &self.steps, reporter);
                        remaining.clear();
                        break;
                    }
                    continue;
                }

                // all dependencies OK: run
                let Some(step) = self.steps.get_mut(&name).and_then(|s| s.func.take()) else {
                    remaining.remove(&name);
                    decided.insert(name);
                    continue;
                };
                let context = self.steps[&name].context.clone();
                match step(&results) {
                    Ok(value) => {
                        reporter.mark_ok(&name);
                        results.insert(name.clone(), value);
                    }
                    Err(error) => {
                        reporter.mark_failed(&name, &error, &context);
                        if reporter.cfg().mode == RunMode::Debug {
                            return Err(PipelineError::StepFailed {
                                step: name,
                                source: error,
                            });
                        }
                    }
                }
                remaining.remove(&name);
                decided.insert(name);
                progressed = true;

                // enforce max_failures immediately after a step completes
                if max_failures_reached(reporter) {
                    skip_all(&remaining, &self.steps, reporter);
                    remaining.clear();
                    break;
                }
            }

            if !progressed && !remaining.is_empty() {
                let unresolved = remaining.iter().cloned().collect::<Vec<_>>().join(", ");
                return Err(PipelineError::NoProgress {
                    remaining: unresolved,
                });
            }
        }

        Ok(results)
    }
}
