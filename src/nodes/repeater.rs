// SPDX-License-Identifier: MIT

//! Repeater: asks the scheduler to re-run the flow after a delay
//!
//! The executor itself never blocks or schedules anything. It stamps the
//! repeat directive and the incremented generation counter into its output;
//! the run scheduler strips the directive and hands the fresh context to the
//! background task supervisor. With `max_repeats` 0 the node repeats until
//! the process stops.

use async_trait::async_trait;
use serde_json::json;

use crate::engine::context::{Context, REPEAT_COUNT_KEY, RESCHEDULE_KEY};
use crate::engine::error::NodeError;
use crate::engine::executor::{NodeConfig, NodeExecutor};

use super::{config_f64, config_u64};

pub struct RepeaterExecutor;

#[async_trait]
impl NodeExecutor for RepeaterExecutor {
    async fn receive(
        &self,
        mut input: Context,
        config: &NodeConfig,
    ) -> Result<Option<Context>, NodeError> {
        let delay = config_f64(config, "delay", 1.0).max(0.0);
        let max_repeats = config_u64(config, "max_repeats", 0);
        let count = input.repeat_count();

        if max_repeats == 0 || count < max_repeats {
            input.insert(REPEAT_COUNT_KEY, json!(count + 1));
            input.insert(RESCHEDULE_KEY, json!({"delay": delay}));
        } else {
            log::info!(
                "Repeater reached max repeats ({}); not rescheduling",
                max_repeats
            );
        }

        Ok(Some(input))
    }

    async fn send(&self, processed: Context) -> Result<Context, NodeError> {
        Ok(processed)
    }
}
