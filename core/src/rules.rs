//! Deterministic rule engine.
//!
//! RULE: Rules are pure functions of the shared evaluation context.
//! No side effects, no I/O. The engine is a registered collection of
//! independent predicate/weight pairs, not a chain of branches: adding
//! or removing a rule touches only this registry and the configuration,
//! never the combiner or the workers.

use crate::config::RulesConfig;
use crate::features::EvalContext;

/// A single registered heuristic: the predicate it evaluates over the
/// shared context and the weight it contributes when triggered.
struct WeightedRule {
    id: &'static str,
    weight: f64,
    predicate: Box<dyn Fn(&EvalContext) -> bool + Send + Sync>,
}

pub struct RuleEngine {
    rules: Vec<WeightedRule>,
}

/// Result of one rule-engine pass.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    /// Sum of triggered weights, clamped to [0, 1].
    pub score: f64,
    pub triggered: Vec<&'static str>,
}

impl RuleEngine {
    /// The default rule set: amount-over-threshold, night-hours,
    /// first-seen device, location mismatch, and velocity-over-window.
    pub fn from_config(cfg: &RulesConfig) -> Self {
        let mut engine = Self { rules: Vec::new() };

        let amount_threshold = cfg.high_amount_threshold;
        engine.register("high_amount", cfg.high_amount_weight, move |ctx| {
            ctx.amount > amount_threshold
        });
        engine.register("night_hours", cfg.night_weight, |ctx| ctx.is_night);
        engine.register("new_device", cfg.new_device_weight, |ctx| ctx.is_new_device);
        engine.register("location_mismatch", cfg.location_mismatch_weight, |ctx| {
            ctx.is_location_mismatch
        });
        let velocity_max = cfg.velocity_max_txns;
        engine.register("velocity", cfg.velocity_weight, move |ctx| {
            ctx.recent_user_txns > velocity_max
        });

        engine
    }

    /// An engine with no registered rules; callers add their own.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register an additional rule. Weights are expected in [0, 1].
    pub fn register<F>(&mut self, id: &'static str, weight: f64, predicate: F)
    where
        F: Fn(&EvalContext) -> bool + Send + Sync + 'static,
    {
        self.rules.push(WeightedRule {
            id,
            weight,
            predicate: Box::new(predicate),
        });
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate every registered rule over the shared context.
    pub fn evaluate(&self, ctx: &EvalContext) -> RuleOutcome {
        let mut raw = 0.0;
        let mut triggered = Vec::new();
        for rule in &self.rules {
            if (rule.predicate)(ctx) {
                raw += rule.weight;
                triggered.push(rule.id);
                log::debug!("rule triggered: {} (+{:.3})", rule.id, rule.weight);
            }
        }
        RuleOutcome {
            score: raw.clamp(0.0, 1.0),
            triggered,
        }
    }
}
