//! The immutable plan view: a handle-addressable projection of a logical
//! plan. Rules inspect it through [`NodeId`]s and record edits; nothing is
//! applied until the driver commits, so a failing rule never damages the
//! plan under optimization.

use crate::errors::Error;
use crate::logical_plan::expr::BooleanBinaryExpr;
use crate::logical_plan::plan::{Delete, Filter, Insert, Limit, LogicalPlan, Projection};
use anyhow::{bail, Result};
use std::collections::BTreeMap;

pub type NodeId = usize;

#[derive(Debug)]
pub(super) enum Edit {
    ReplaceSubtree(LogicalPlan),
    RewritePredicate(BooleanBinaryExpr),
}

struct ViewNode<'a> {
    plan: &'a LogicalPlan,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

pub struct PlanView<'a> {
    nodes: Vec<ViewNode<'a>>,
    edits: BTreeMap<NodeId, Edit>,
}

impl<'a> PlanView<'a> {
    /// Indexes the plan in preorder; node 0 is the root.
    pub fn new(root: &'a LogicalPlan) -> Self {
        let mut view = Self {
            nodes: Vec::with_capacity(root.num_nodes()),
            edits: BTreeMap::new(),
        };
        view.index(root, None);
        view
    }

    fn index(&mut self, plan: &'a LogicalPlan, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ViewNode {
            plan,
            parent,
            children: Vec::new(),
        });
        for child in plan.children() {
            let child_id = self.index(child, Some(id));
            self.nodes[id].children.push(child_id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> std::ops::Range<NodeId> {
        0..self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &'a LogicalPlan {
        self.nodes[id].plan
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// The predicate attribute, for filter nodes.
    pub fn predicate(&self, id: NodeId) -> Option<&'a BooleanBinaryExpr> {
        match self.node(id) {
            LogicalPlan::Filter(filter) => Some(&filter.predicate),
            _ => None,
        }
    }

    pub fn is_edited(&self, id: NodeId) -> bool {
        self.edits.contains_key(&id)
    }

    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Substitute the whole subtree rooted at `id` on commit.
    pub fn replace_subtree(&mut self, id: NodeId, replacement: LogicalPlan) {
        self.edits.insert(id, Edit::ReplaceSubtree(replacement));
    }

    /// Rewrite the predicate of the filter node `id`, keeping its subtree.
    pub fn rewrite_predicate(&mut self, id: NodeId, predicate: BooleanBinaryExpr) {
        self.edits.insert(id, Edit::RewritePredicate(predicate));
    }

    pub(super) fn into_edits(self) -> BTreeMap<NodeId, Edit> {
        self.edits
    }
}

/// Materializes the edited plan. Walks top-down in the same preorder the
/// view used: an untouched subtree is stolen from the original wholesale,
/// an edited node is built from its edit record. O(|plan|).
pub(super) fn materialize(
    plan: LogicalPlan,
    edits: &mut BTreeMap<NodeId, Edit>,
) -> Result<LogicalPlan> {
    let mut counter = 0;
    apply(plan, edits, &mut counter)
}

fn apply(
    plan: LogicalPlan,
    edits: &mut BTreeMap<NodeId, Edit>,
    counter: &mut NodeId,
) -> Result<LogicalPlan> {
    let id = *counter;
    let size = plan.num_nodes();
    *counter += 1;

    if edits.range(id..id + size).next().is_none() {
        *counter += size - 1;
        return Ok(plan);
    }

    match edits.remove(&id) {
        Some(Edit::ReplaceSubtree(replacement)) => {
            // edits recorded underneath a replaced subtree are orphaned
            let orphaned: Vec<NodeId> = edits.range(id..id + size).map(|(k, _)| *k).collect();
            for key in orphaned {
                edits.remove(&key);
            }
            *counter += size - 1;
            Ok(replacement)
        }
        Some(Edit::RewritePredicate(predicate)) => match plan {
            LogicalPlan::Filter(filter) => Ok(LogicalPlan::Filter(Filter {
                input: Box::new(apply(*filter.input, edits, counter)?),
                predicate,
            })),
            other => bail!(Error::Internal(
                "optimizer".into(),
                format!("predicate rewrite on a {} node", other.name())
            )),
        },
        None => Ok(match plan {
            LogicalPlan::Filter(f) => LogicalPlan::Filter(Filter {
                input: Box::new(apply(*f.input, edits, counter)?),
                predicate: f.predicate,
            }),
            LogicalPlan::Projection(p) => LogicalPlan::Projection(Projection {
                input: Box::new(apply(*p.input, edits, counter)?),
                projections: p.projections,
            }),
            LogicalPlan::Limit(l) => LogicalPlan::Limit(Limit {
                input: Box::new(apply(*l.input, edits, counter)?),
                limit: l.limit,
                offset: l.offset,
            }),
            LogicalPlan::Insert(i) => LogicalPlan::Insert(Insert {
                input: Box::new(apply(*i.input, edits, counter)?),
                table_name: i.table_name,
            }),
            LogicalPlan::Delete(d) => LogicalPlan::Delete(Delete {
                input: Box::new(apply(*d.input, edits, counter)?),
                table_name: d.table_name,
            }),
            leaf => leaf,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lit;
    use crate::logical_plan::expr::LogicalExpr;
    use crate::logical_plan::plan::TableScan;
    use sqlparser::ast::BinaryOperator;

    fn filter_over_scan() -> Result<LogicalPlan> {
        Ok(LogicalPlan::Filter(Filter::new(
            LogicalPlan::TableScan(TableScan::new("users")),
            BooleanBinaryExpr::new(
                LogicalExpr::Column("x".into()),
                BinaryOperator::Eq,
                LogicalExpr::Literal(lit!(UInt, "5")?),
            ),
        )))
    }

    #[test]
    fn test_preorder_handles() -> Result<()> {
        let plan = filter_over_scan()?;
        let view = PlanView::new(&plan);

        assert_eq!(view.len(), 2);
        assert_eq!(view.node(0).name(), "Filter");
        assert_eq!(view.node(1).name(), "TableScan");
        assert_eq!(view.parent(1), Some(0));
        assert_eq!(view.children(0), &[1]);
        assert!(view.predicate(0).is_some());
        assert!(view.predicate(1).is_none());
        Ok(())
    }

    #[test]
    fn test_commit_without_edits_is_identity() -> Result<()> {
        let plan = filter_over_scan()?;
        let view = PlanView::new(&plan);
        assert!(!view.has_edits());

        let mut edits = view.into_edits();
        let committed = materialize(plan.clone(), &mut edits)?;
        assert_eq!(committed, plan);
        Ok(())
    }

    #[test]
    fn test_subtree_substitution() -> Result<()> {
        let plan = filter_over_scan()?;
        let mut view = PlanView::new(&plan);
        view.replace_subtree(1, LogicalPlan::TableScan(TableScan::new("accounts")));

        let mut edits = view.into_edits();
        let committed = materialize(plan, &mut edits)?;
        match committed {
            LogicalPlan::Filter(f) => match f.input.as_ref() {
                LogicalPlan::TableScan(s) => assert_eq!(s.table_name, "accounts"),
                other => panic!("unexpected child {}", other.name()),
            },
            other => panic!("unexpected root {}", other.name()),
        }
        Ok(())
    }

    #[test]
    fn test_predicate_rewrite_keeps_subtree() -> Result<()> {
        let plan = filter_over_scan()?;
        let mut view = PlanView::new(&plan);
        let swapped = view.predicate(0).expect("filter root").swapped();
        view.rewrite_predicate(0, swapped.clone());

        let mut edits = view.into_edits();
        let committed = materialize(plan, &mut edits)?;
        match committed {
            LogicalPlan::Filter(f) => {
                assert_eq!(f.predicate, swapped);
                assert_eq!(f.input.name(), "TableScan");
            }
            other => panic!("unexpected root {}", other.name()),
        }
        Ok(())
    }
}
