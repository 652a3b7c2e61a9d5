//! Cost module: per-rule instruction budgeting.
//!
//! The figures are advisory. Nothing here refuses to emit an oversized rule; callers decide
//! what to do with a report that is over budget.

use crate::config::Config;
use crate::ir::Node;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostReport {
    pub conditions: usize,
    pub actions: usize,
    pub overhead: usize,
    pub total: usize,
    pub limit: usize,
}

impl CostReport {
    pub fn over_budget(&self) -> bool {
        self.total > self.limit
    }
}

/// Sums statement weights plus the fixed per-rule overhead.
#[tracing::instrument(level = "debug", skip_all, fields(conditions = conditions.len(), actions = actions.len()))]
pub fn rule_cost(conditions: &[Node], actions: &[Node], config: &Config) -> CostReport {
    let conditions: usize = conditions.iter().map(Node::weight).sum();
    let actions: usize = actions.iter().map(Node::weight).sum();
    let overhead = config.rule_overhead;
    let report = CostReport {
        conditions,
        actions,
        overhead,
        total: conditions + actions + overhead,
        limit: config.rule_element_limit,
    };
    if report.over_budget() {
        warn!(total = report.total, limit = report.limit, "rule exceeds the element limit");
    }
    report
}
