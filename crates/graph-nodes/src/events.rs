//! Event nodes
//!
//! Nodes on the push path: they receive actions, keep a little state and
//! fire their EVENT outputs. Time-based nodes measure with the graph's
//! `elapsed_time`, the wall time between the last two steps.

use std::collections::VecDeque;

use graph_engine::{
    impl_as_any, ExecOptions, NodeBehavior, NodeContext, NodeDescriptor, NodeTypeMetadata, Result,
};
use serde_json::{json, Value};

use crate::as_number;

/// Logs every event it receives
///
/// The params of the last `keep` events stay readable through
/// [`LogEvent::received`].
#[derive(Default)]
pub struct LogEvent {
    received: VecDeque<Value>,
}

impl LogEvent {
    pub const NODE_TYPE: &'static str = "events/log";
    const DEFAULT_KEEP: u64 = 16;

    /// Params of the most recent events, oldest first
    pub fn received(&self) -> &VecDeque<Value> {
        &self.received
    }
}

impl NodeDescriptor for LogEvent {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Log Event")
            .with_description("Log event in console")
            .action("event")
            .property("keep", json!(Self::DEFAULT_KEEP))
    }
}

impl NodeBehavior for LogEvent {
    fn handles_actions(&self) -> bool {
        true
    }

    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        action: &str,
        param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        log::info!("Node {} event '{}': {}", ctx.node_id(), action, param);
        let keep = as_number(ctx.property("keep").as_ref())
            .map_or(Self::DEFAULT_KEEP as usize, |n| n.max(0.0) as usize);
        self.received.push_back(param.clone());
        while self.received.len() > keep {
            self.received.pop_front();
        }
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<LogEvent>());

/// Counts events
///
/// `inc`, `dec` and `reset` change the count; every change fires `change`
/// with the new count. With `doCountExecution` set, each execution counts too.
#[derive(Default)]
pub struct EventCounter {
    num: i64,
}

impl EventCounter {
    pub const NODE_TYPE: &'static str = "events/counter";
    pub const PORT_CHANGE: &'static str = "change";

    pub fn count(&self) -> i64 {
        self.num
    }

    fn changed(&self, ctx: &mut NodeContext<'_>) -> Result<()> {
        ctx.trigger(Some(Self::PORT_CHANGE), json!(self.num), ExecOptions::default())
    }
}

impl NodeDescriptor for EventCounter {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Counter")
            .with_description("Counts events")
            .action("inc")
            .action("dec")
            .action("reset")
            .event(Self::PORT_CHANGE)
            .output("num", "number")
            .property("doCountExecution", json!(false))
    }
}

impl NodeBehavior for EventCounter {
    fn executes(&self) -> bool {
        true
    }

    fn handles_actions(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        if crate::truthy(ctx.property("doCountExecution").as_ref()) {
            self.num += 1;
            self.changed(ctx)?;
        }
        ctx.set_output_data(1, json!(self.num));
        Ok(())
    }

    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        action: &str,
        _param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        let before = self.num;
        match action {
            "inc" => self.num += 1,
            "dec" => self.num -= 1,
            "reset" => self.num = 0,
            other => log::debug!("Counter {}: ignoring action '{}'", ctx.node_id(), other),
        }
        ctx.set_output_data(1, json!(self.num));
        if self.num != before {
            self.changed(ctx)?;
        }
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<EventCounter>());

/// Fires `on_tick` every `interval` milliseconds
///
/// The first execution always fires. The interval comes from an `interval`
/// input when one is connected, else from the property, and is at least 1ms.
pub struct TimerEvent {
    time: Option<f64>,
    last_interval: f64,
}

impl Default for TimerEvent {
    fn default() -> Self {
        Self {
            time: None,
            last_interval: 1000.0,
        }
    }
}

impl TimerEvent {
    pub const NODE_TYPE: &'static str = "events/timer";

    pub fn last_interval(&self) -> f64 {
        self.last_interval
    }
}

impl NodeDescriptor for TimerEvent {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Timer")
            .with_description("Sends an event every N milliseconds")
            .event("on_tick")
            .property("interval", json!(1000))
            .property("event", json!("tick"))
    }
}

impl NodeBehavior for TimerEvent {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let dt = ctx.graph().elapsed_time * 1000.0;
        let first = self.time.is_none();
        let time = self.time.unwrap_or(0.0) + dt;

        let interval = as_number(ctx.input_or_property("interval").as_ref()).unwrap_or(f64::NAN);
        self.last_interval = interval.trunc().max(1.0);

        if !first && (time < self.last_interval || interval.is_nan()) {
            self.time = Some(time);
            return Ok(());
        }
        self.time = Some(time % self.last_interval);
        let event = ctx.property("event").unwrap_or(Value::Null);
        ctx.trigger(Some("on_tick"), event, ExecOptions::default())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<TimerEvent>());

/// Holds each event for `time_in_ms` before passing it on
#[derive(Default)]
pub struct DelayEvent {
    pending: Vec<(f64, Value)>,
}

impl DelayEvent {
    pub const NODE_TYPE: &'static str = "events/delay";

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl NodeDescriptor for DelayEvent {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Delay")
            .with_description("Delays one event")
            .action("event")
            .event("on_time")
            .property("time_in_ms", json!(1000))
    }
}

impl NodeBehavior for DelayEvent {
    fn executes(&self) -> bool {
        true
    }

    fn handles_actions(&self) -> bool {
        true
    }

    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _action: &str,
        param: &Value,
        options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        let time = as_number(ctx.property("time_in_ms").as_ref()).unwrap_or(0.0);
        if time <= 0.0 {
            return ctx.trigger(None, param.clone(), options.clone());
        }
        self.pending.push((time, param.clone()));
        Ok(())
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, options: &ExecOptions) -> Result<()> {
        let dt = ctx.graph().elapsed_time * 1000.0;
        let mut due = Vec::new();
        self.pending.retain_mut(|(remaining, param)| {
            *remaining -= dt;
            if *remaining > 0.0 {
                return true;
            }
            due.push(std::mem::take(param));
            false
        });
        for param in due {
            ctx.trigger(None, param, options.clone())?;
        }
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<DelayEvent>());
