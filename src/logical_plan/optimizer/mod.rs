//! Rule-driven plan rewriting. Each pass projects the current plan into an
//! immutable [`PlanView`], lets every rule record edits against it, then
//! commits the edits into a new plan. Passes repeat until a full pass
//! changes nothing (fixpoint) or the pass cap trips.

mod view;

pub use view::{NodeId, PlanView};

use crate::catalog::ArcCatalog;
use crate::errors::Error;
use crate::logical_plan::expr::{is_comparison, BooleanBinaryExpr, LogicalExpr};
use crate::logical_plan::plan::{Filter, IndexScan, LogicalPlan, Projection, TableScan};
use anyhow::{bail, Result};
use sqlparser::ast::BinaryOperator;
use std::collections::HashSet;
use tracing::debug;

/// Every rule makes monotone progress in a well-founded measure, so the
/// fixpoint arrives long before this cap; hitting it means a rule broke
/// that contract.
pub const MAX_PASSES: usize = 32;

pub trait Rule {
    fn name(&self) -> &'static str;
    /// Inspects the view, records edits, reports whether anything changed.
    fn apply(&self, view: &mut PlanView) -> Result<bool>;
}

pub struct Optimizer {
    rules: Vec<Box<dyn Rule>>,
}

impl Optimizer {
    pub fn new(catalog: ArcCatalog) -> Self {
        Self {
            rules: vec![
                Box::new(SwapOperands),
                Box::new(PredicatePushdown {
                    catalog: catalog.clone(),
                }),
                Box::new(ProjectionPushdown {
                    catalog: catalog.clone(),
                }),
                Box::new(IndexScanOptimization { catalog }),
            ],
        }
    }

    /// Rewrites a copy of the plan to fixpoint. The input plan is left
    /// untouched, so a failure preserves it.
    pub fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let mut current = plan.clone();

        for pass in 0..MAX_PASSES {
            let mut view = PlanView::new(&current);
            let mut changed = false;

            for rule in &self.rules {
                if rule.apply(&mut view)? {
                    debug!(pass, rule = rule.name(), "rule changed the plan");
                    changed = true;
                }
            }

            if !changed {
                return Ok(current);
            }
            let mut edits = view.into_edits();
            current = view::materialize(current, &mut edits)?;
        }

        bail!(Error::OptimizerDiverged)
    }
}

/// Canonicalizes commutative comparisons to `column OP literal`, mirroring
/// the operator direction (`5 < x` becomes `x > 5`).
struct SwapOperands;

impl Rule for SwapOperands {
    fn name(&self) -> &'static str {
        "SwapOperands"
    }

    fn apply(&self, view: &mut PlanView) -> Result<bool> {
        let mut changed = false;
        for id in view.node_ids() {
            let predicate = match view.predicate(id) {
                Some(predicate) if !view.is_edited(id) => predicate,
                _ => continue,
            };
            if is_comparison(&predicate.op)
                && matches!(predicate.left, LogicalExpr::Literal(_))
                && matches!(predicate.right, LogicalExpr::Column(_))
            {
                view.rewrite_predicate(id, predicate.swapped());
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Pushes a filter below a projection when every column the predicate
/// references is already available underneath the projection.
struct PredicatePushdown {
    catalog: ArcCatalog,
}

impl Rule for PredicatePushdown {
    fn name(&self) -> &'static str {
        "PredicatePushdown"
    }

    fn apply(&self, view: &mut PlanView) -> Result<bool> {
        let mut changed = false;
        for id in view.node_ids() {
            if view.is_edited(id) {
                continue;
            }
            let filter = match view.node(id) {
                LogicalPlan::Filter(filter) => filter,
                _ => continue,
            };
            let projection = match filter.input.as_ref() {
                LogicalPlan::Projection(projection) => projection,
                _ => continue,
            };

            let mut needed = HashSet::new();
            filter.predicate.columns(&mut needed);
            let below = projection.input.schema(&self.catalog.read())?;
            if !needed.iter().all(|name| below.field_index(name).is_some()) {
                continue;
            }

            let pushed = LogicalPlan::Projection(Projection::new(
                LogicalPlan::Filter(Filter::new(
                    projection.input.as_ref().clone(),
                    filter.predicate.clone(),
                )),
                projection.projections.clone(),
            ));
            view.replace_subtree(id, pushed);
            changed = true;
        }
        Ok(changed)
    }
}

/// Narrows a table scan to the columns actually consumed above it, so the
/// row width shrinks as early as possible.
struct ProjectionPushdown {
    catalog: ArcCatalog,
}

impl Rule for ProjectionPushdown {
    fn name(&self) -> &'static str {
        "ProjectionPushdown"
    }

    fn apply(&self, view: &mut PlanView) -> Result<bool> {
        let mut changed = false;
        for id in view.node_ids() {
            if view.is_edited(id) {
                continue;
            }
            let scan = match view.node(id) {
                LogicalPlan::TableScan(scan) if scan.projection.is_none() => scan,
                _ => continue,
            };

            // climb through filters and limits to the nearest projection,
            // collecting every column referenced on the way; any other
            // ancestor needs the full row
            let mut required = HashSet::new();
            let mut cursor = view.parent(id);
            let mut narrowed_by_projection = false;
            while let Some(parent) = cursor {
                match view.node(parent) {
                    LogicalPlan::Filter(filter) => {
                        filter.predicate.columns(&mut required);
                        cursor = view.parent(parent);
                    }
                    LogicalPlan::Limit(_) => cursor = view.parent(parent),
                    LogicalPlan::Projection(projection) => {
                        for expr in &projection.projections {
                            expr.columns(&mut required);
                        }
                        narrowed_by_projection = true;
                        break;
                    }
                    _ => break,
                }
            }
            if !narrowed_by_projection || required.is_empty() {
                continue;
            }

            let table = self.catalog.read().table(&scan.table_name)?;
            let schema = table.read().schema().clone();
            if required.len() >= schema.fields.len() {
                continue;
            }
            let columns: Vec<String> = schema
                .fields
                .iter()
                .map(|field| field.name.clone())
                .filter(|name| required.contains(name))
                .collect();
            if columns.len() != required.len() {
                // the predicate references columns this table cannot supply
                continue;
            }

            view.replace_subtree(
                id,
                LogicalPlan::TableScan(TableScan {
                    table_name: scan.table_name.clone(),
                    projection: Some(columns),
                }),
            );
            changed = true;
        }
        Ok(changed)
    }
}

/// Replaces `Filter(col = k)` over a table scan with an index probe when
/// an index over that column exists.
struct IndexScanOptimization {
    catalog: ArcCatalog,
}

impl Rule for IndexScanOptimization {
    fn name(&self) -> &'static str {
        "IndexScanOptimization"
    }

    fn apply(&self, view: &mut PlanView) -> Result<bool> {
        let mut changed = false;
        for id in view.node_ids() {
            if view.is_edited(id) {
                continue;
            }
            let filter = match view.node(id) {
                LogicalPlan::Filter(filter) => filter,
                _ => continue,
            };
            let scan = match filter.input.as_ref() {
                LogicalPlan::TableScan(scan) if scan.projection.is_none() => scan,
                _ => continue,
            };
            let (column, key) = match &filter.predicate {
                BooleanBinaryExpr {
                    left: LogicalExpr::Column(column),
                    op: BinaryOperator::Eq,
                    right: LogicalExpr::Literal(key),
                } => (column, key),
                _ => continue,
            };

            let catalog = self.catalog.read();
            let index = match catalog.index_on(&scan.table_name, column) {
                Some(info) => info.name.clone(),
                None => continue,
            };
            drop(catalog);

            view.replace_subtree(
                id,
                LogicalPlan::IndexScan(IndexScan::key(&scan.table_name, &index, key.clone())),
            );
            changed = true;
        }
        Ok(changed)
    }
}
