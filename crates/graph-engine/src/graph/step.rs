//! The step loop

use std::time::Instant;

use serde_json::Value;

use crate::constants::{hooks, limits};
use crate::error::Result;
use crate::events::GraphEvent;
use crate::graph::Graph;
use crate::node::ExecOptions;
use crate::types::NodeMode;

impl Graph {
    /// Run `num` steps over the executable nodes
    ///
    /// ALWAYS nodes execute; other executable nodes only get their queued
    /// actions delivered. At most `limit` nodes (and never more than the
    /// node cap) are visited per step. Every step advances `iteration` and
    /// clears the per-step guards.
    ///
    /// An uncaught node error ends the run: `errors_in_execution` is set and
    /// the error is returned when `throw_errors` is enabled, logged otherwise.
    pub fn run_step(&mut self, num: usize, limit: Option<usize>) -> Result<()> {
        let start = Instant::now();
        self.globaltime = self.started.elapsed().as_secs_f64();
        let config = self.runtime().config();

        let mut result = Ok(());
        for _ in 0..num {
            let nodes = self.executable.clone();
            let cap = limit
                .unwrap_or(nodes.len())
                .min(config.max_number_of_nodes);
            let mut executed = 0;
            for id in nodes.iter().take(cap) {
                let Some(node) = self.nodes.get(id) else { continue };
                let always = node.mode == NodeMode::Always;
                let pending = !node.waiting_actions.is_empty();
                let step = if always {
                    executed += 1;
                    self.do_execute(id, Value::Null, ExecOptions::default())
                } else if config.use_deferred_actions && pending {
                    self.execute_pending_actions(id)
                } else {
                    Ok(())
                };
                if let Err(e) = step {
                    result = Err(e);
                    break;
                }
            }
            if result.is_err() {
                break;
            }

            self.fixedtime += limits::FIXED_TIME_LAPSE;
            self.fire(hooks::ON_EXECUTE_STEP, &[]);
            self.finish_iteration(executed);
        }

        if let Err(error) = result {
            self.errors_in_execution = true;
            self.finish_iteration(0);
            self.update_timing(start);
            if config.throw_errors {
                return Err(error);
            }
            log::warn!("Error during execution: {}", error);
            return Ok(());
        }

        self.fire(hooks::ON_AFTER_EXECUTE, &[]);
        self.errors_in_execution = false;
        self.update_timing(start);
        Ok(())
    }

    fn finish_iteration(&mut self, executed: usize) {
        self.emit(GraphEvent::StepCompleted {
            iteration: self.iteration,
            executed,
        });
        self.iteration += 1;
        self.clear_step_guards();
    }

    fn update_timing(&mut self, start: Instant) {
        let now = Instant::now();
        self.execution_time = now.duration_since(start).as_secs_f64();
        self.elapsed_time = self
            .last_update
            .map_or(self.execution_time, |last| now.duration_since(last).as_secs_f64());
        self.last_update = Some(now);
    }
}
