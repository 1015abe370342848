//! Post-construction passes over expressions.
//!
//! [`Normalizer`] records, once per comparison node, the query item the
//! comparison filters. [`expand_in`] rewrites `IN` lists into `OR` chains for
//! targets without list membership.

use crate::ast::{
    AllProperties, BetweenOperator, BinaryOperator, CountAggregate, Expr, FunctionExpression,
    InOperator, IsOperator, ListExpression, PropertyReference, TableSlot,
};
use crate::error::QueryError;
use crate::literal::{Literal, PatternList};
use crate::query::{ItemRef, QueryGraph};
use crate::visit::{Visitor, VisitorMut};

/// Attribute every comparison in `expr`. Returns how many nodes were
/// attributed by this call; nodes attributed earlier are left alone.
pub fn normalize(expr: &Expr) -> usize {
    let mut normalizer = Normalizer::default();
    expr.accept(&mut normalizer);
    normalizer.attributed
}

/// Attribute every filter and join condition of every item in `graph`.
pub fn normalize_graph(graph: &QueryGraph) -> usize {
    let mut normalizer = Normalizer::default();
    for (_, item) in graph.iter() {
        for join in &item.joins {
            join.condition.accept(&mut normalizer);
        }
        if let Some(filter) = &item.where_clause {
            filter.accept(&mut normalizer);
        }
    }
    tracing::debug!(items = graph.len(), attributed = normalizer.attributed, "normalized query graph");
    normalizer.attributed
}

/// Fills the table cache of comparison nodes.
///
/// The cache is write-once, so normalizing again never changes an earlier
/// result.
#[derive(Debug, Default)]
pub struct Normalizer {
    attributed: usize,
}

impl Normalizer {
    pub fn attributed(&self) -> usize {
        self.attributed
    }

    fn attribute(&mut self, slot: &TableSlot, operands: &[&Expr]) {
        if slot.is_set() {
            return;
        }
        let table = slot.get_or_init(|| operands.iter().find_map(|expr| first_table(expr)));
        tracing::trace!(table = ?table, "attributed comparison");
        self.attributed += 1;
    }
}

impl Visitor for Normalizer {
    type Output = ();

    fn visit_literal(&mut self, _: &Literal) {}

    fn visit_property(&mut self, _: &PropertyReference) {}

    fn visit_all_properties(&mut self, _: &AllProperties) {}

    fn visit_patterns(&mut self, _: &PatternList) {}

    fn visit_list(&mut self, list: &ListExpression) {
        for value in &list.values {
            value.accept(self);
        }
    }

    fn visit_binary(&mut self, op: &BinaryOperator) {
        if op.op.is_comparison() {
            self.attribute(&op.table, &[&*op.left, &*op.right]);
        }
        op.left.accept(self);
        op.right.accept(self);
    }

    fn visit_between(&mut self, op: &BetweenOperator) {
        self.attribute(&op.table, &[&*op.left, &*op.min, &*op.max]);
        op.left.accept(self);
        op.min.accept(self);
        op.max.accept(self);
    }

    fn visit_in(&mut self, op: &InOperator) {
        let mut operands = vec![op.left.as_ref()];
        operands.extend(op.right.values.iter());
        self.attribute(&op.table, &operands);
        op.left.accept(self);
        self.visit_list(&op.right);
    }

    fn visit_is(&mut self, op: &IsOperator) {
        self.attribute(&op.table, &[&*op.left]);
        op.left.accept(self);
    }

    fn visit_not(&mut self, arg: &Expr) {
        arg.accept(self);
    }

    fn visit_negation(&mut self, arg: &Expr) {
        arg.accept(self);
    }

    fn visit_function(&mut self, func: &FunctionExpression) {
        for arg in &func.args {
            arg.accept(self);
        }
    }

    fn visit_count(&mut self, _: &CountAggregate) {}
}

/// The first table referenced in `expr`, searching operands left to right.
pub(crate) fn first_table(expr: &Expr) -> Option<ItemRef> {
    expr.accept(&mut TableFinder)
}

struct TableFinder;

impl Visitor for TableFinder {
    type Output = Option<ItemRef>;

    fn visit_literal(&mut self, _: &Literal) -> Option<ItemRef> {
        None
    }

    fn visit_property(&mut self, prop: &PropertyReference) -> Option<ItemRef> {
        Some(prop.table)
    }

    fn visit_all_properties(&mut self, all: &AllProperties) -> Option<ItemRef> {
        Some(all.table)
    }

    fn visit_patterns(&mut self, _: &PatternList) -> Option<ItemRef> {
        None
    }

    fn visit_list(&mut self, list: &ListExpression) -> Option<ItemRef> {
        list.values.iter().find_map(|value| value.accept(self))
    }

    fn visit_binary(&mut self, op: &BinaryOperator) -> Option<ItemRef> {
        op.left.accept(self).or_else(|| op.right.accept(self))
    }

    fn visit_between(&mut self, op: &BetweenOperator) -> Option<ItemRef> {
        op.left
            .accept(self)
            .or_else(|| op.min.accept(self))
            .or_else(|| op.max.accept(self))
    }

    fn visit_in(&mut self, op: &InOperator) -> Option<ItemRef> {
        op.left.accept(self).or_else(|| self.visit_list(&op.right))
    }

    fn visit_is(&mut self, op: &IsOperator) -> Option<ItemRef> {
        op.left.accept(self)
    }

    fn visit_not(&mut self, arg: &Expr) -> Option<ItemRef> {
        arg.accept(self)
    }

    fn visit_negation(&mut self, arg: &Expr) -> Option<ItemRef> {
        arg.accept(self)
    }

    fn visit_function(&mut self, func: &FunctionExpression) -> Option<ItemRef> {
        func.args.iter().find_map(|arg| arg.accept(self))
    }

    fn visit_count(&mut self, count: &CountAggregate) -> Option<ItemRef> {
        count.table_path.last().copied()
    }
}

impl InOperator {
    /// The equivalent `OR` chain of equality tests, folded from the left:
    /// `((L = v0) OR (L = v1)) OR (L = v2)`.
    pub fn to_conditional(&self) -> Result<Expr, QueryError> {
        let mut values = self.right.values.iter();
        let first = values.next().ok_or(QueryError::UnsupportedRewrite)?;
        tracing::trace!(values = self.right.values.len(), "expanding IN list");

        let seed = Expr::equals(self.left.as_ref().clone(), first.clone());
        Ok(values.fold(seed, |chain, value| {
            Expr::or(chain, Expr::equals(self.left.as_ref().clone(), value.clone()))
        }))
    }
}

/// Replace every `IN` in `expr` with its `OR` chain. Returns the number of
/// lists expanded. On error `expr` is left unchanged.
pub fn expand_in(expr: &mut Expr) -> Result<usize, QueryError> {
    let mut rewritten = expr.clone();
    let mut expander = InExpander::default();
    expander.rewrite(&mut rewritten)?;
    *expr = rewritten;
    Ok(expander.expanded)
}

/// Returns the replacement for a node, if it has one.
#[derive(Default)]
struct InExpander {
    expanded: usize,
}

impl InExpander {
    fn rewrite(&mut self, expr: &mut Expr) -> Result<(), QueryError> {
        if let Some(replacement) = expr.accept_mut(self)? {
            *expr = replacement;
        }
        Ok(())
    }
}

impl VisitorMut for InExpander {
    type Output = Result<Option<Expr>, QueryError>;

    fn visit_literal(&mut self, _: &mut Literal) -> Self::Output {
        Ok(None)
    }

    fn visit_property(&mut self, _: &mut PropertyReference) -> Self::Output {
        Ok(None)
    }

    fn visit_all_properties(&mut self, _: &mut AllProperties) -> Self::Output {
        Ok(None)
    }

    fn visit_patterns(&mut self, _: &mut PatternList) -> Self::Output {
        Ok(None)
    }

    fn visit_list(&mut self, list: &mut ListExpression) -> Self::Output {
        for value in &mut list.values {
            self.rewrite(value)?;
        }
        Ok(None)
    }

    fn visit_binary(&mut self, op: &mut BinaryOperator) -> Self::Output {
        self.rewrite(&mut op.left)?;
        self.rewrite(&mut op.right)?;
        Ok(None)
    }

    fn visit_between(&mut self, op: &mut BetweenOperator) -> Self::Output {
        self.rewrite(&mut op.left)?;
        self.rewrite(&mut op.min)?;
        self.rewrite(&mut op.max)?;
        Ok(None)
    }

    fn visit_in(&mut self, op: &mut InOperator) -> Self::Output {
        self.rewrite(&mut op.left)?;
        self.visit_list(&mut op.right)?;
        self.expanded += 1;
        op.to_conditional().map(Some)
    }

    fn visit_is(&mut self, op: &mut IsOperator) -> Self::Output {
        self.rewrite(&mut op.left)?;
        Ok(None)
    }

    fn visit_not(&mut self, arg: &mut Expr) -> Self::Output {
        self.rewrite(arg)?;
        Ok(None)
    }

    fn visit_negation(&mut self, arg: &mut Expr) -> Self::Output {
        self.rewrite(arg)?;
        Ok(None)
    }

    fn visit_function(&mut self, func: &mut FunctionExpression) -> Self::Output {
        for arg in &mut func.args {
            self.rewrite(arg)?;
        }
        Ok(None)
    }

    fn visit_count(&mut self, _: &mut CountAggregate) -> Self::Output {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{JoinKind, QueryItem};

    fn two_tables() -> (QueryGraph, ItemRef, ItemRef) {
        let mut graph = QueryGraph::new();
        let part = graph.add(QueryItem::new("Part"));
        let bom = graph.add(QueryItem::new("Part BOM"));
        (graph, part, bom)
    }

    #[test]
    fn attributes_to_first_referenced_table() {
        let (_, part, bom) = two_tables();
        let left = Expr::equals(Expr::prop(part, "name"), Expr::lit("x"));
        let right = Expr::equals(Expr::lit("x"), Expr::prop(bom, "name"));
        let nested = Expr::like(
            Expr::function("UPPER", vec![Expr::prop(bom, "name")]),
            Expr::lit("A%"),
        );
        let constant = Expr::equals(Expr::lit(1), Expr::lit(1));

        for expr in [&left, &right, &nested, &constant] {
            assert_eq!(normalize(expr), 1);
        }
        assert_eq!(left.attributed_table(), Some(part));
        assert_eq!(right.attributed_table(), Some(bom));
        assert_eq!(nested.attributed_table(), Some(bom));
        assert_eq!(constant.attributed_table(), None);
    }

    #[test]
    fn logical_operators_are_not_attributed() {
        let (_, part, bom) = two_tables();
        let expr = Expr::and(
            Expr::is_not_null(Expr::prop(part, "name")),
            Expr::logical_not(Expr::between(
                Expr::prop(bom, "quantity"),
                Expr::lit(1),
                Expr::lit(5),
            )),
        );
        assert_eq!(normalize(&expr), 2);
        assert_eq!(expr.attributed_table(), None);
        let Expr::Binary(and) = &expr else {
            panic!("expected AND");
        };
        assert_eq!(and.left.attributed_table(), Some(part));
        let Expr::Not(inner) = and.right.as_ref() else {
            panic!("expected NOT");
        };
        assert_eq!(inner.attributed_table(), Some(bom));
    }

    #[test]
    fn normalization_is_idempotent() {
        let (_, part, _) = two_tables();
        let expr = Expr::in_list(Expr::prop(part, "state"), vec![Expr::lit("a")]);
        assert_eq!(normalize(&expr), 1);
        let first = expr.attributed_table();
        assert_eq!(normalize(&expr), 0);
        assert_eq!(expr.attributed_table(), first);
        assert_eq!(first, Some(part));
    }

    #[test]
    fn graph_normalization_covers_joins_and_filters() {
        let (mut graph, part, bom) = two_tables();
        graph
            .join(
                JoinKind::Inner,
                part,
                bom,
                Expr::equals(Expr::prop(bom, "source_id"), Expr::prop(part, "id")),
            )
            .unwrap();
        graph
            .get_mut(bom)
            .unwrap()
            .add_where(Expr::greater_than(Expr::prop(bom, "quantity"), Expr::lit(0)));

        assert_eq!(normalize_graph(&graph), 2);
        assert_eq!(graph[part].joins[0].condition.attributed_table(), Some(bom));
        assert_eq!(
            graph[bom].where_clause.as_ref().and_then(Expr::attributed_table),
            Some(bom)
        );
        assert_eq!(normalize_graph(&graph), 0);
    }

    #[test]
    fn in_folds_left_into_or_chain() {
        let (_, part, _) = two_tables();
        let left = Expr::prop(part, "state");
        let Expr::In(op) = Expr::in_list(
            left.clone(),
            vec![Expr::lit(1), Expr::lit(2), Expr::lit(3)],
        ) else {
            unreachable!()
        };
        assert_eq!(
            op.to_conditional().unwrap(),
            Expr::or(
                Expr::or(
                    Expr::equals(left.clone(), Expr::lit(1)),
                    Expr::equals(left.clone(), Expr::lit(2)),
                ),
                Expr::equals(left, Expr::lit(3)),
            )
        );
    }

    #[test]
    fn single_value_in_is_one_comparison() {
        let (_, part, _) = two_tables();
        let Expr::In(op) = Expr::in_list(Expr::prop(part, "state"), vec![Expr::lit("a")]) else {
            unreachable!()
        };
        assert_eq!(
            op.to_conditional().unwrap(),
            Expr::equals(Expr::prop(part, "state"), Expr::lit("a"))
        );
    }

    #[test]
    fn empty_in_cannot_be_rewritten() {
        let (_, part, _) = two_tables();
        let Expr::In(op) = Expr::in_list(Expr::prop(part, "state"), vec![]) else {
            unreachable!()
        };
        assert_eq!(op.to_conditional(), Err(QueryError::UnsupportedRewrite));
    }

    #[test]
    fn expand_in_rewrites_nested_lists() {
        let (_, part, _) = two_tables();
        let mut expr = Expr::and(
            Expr::equals(Expr::prop(part, "name"), Expr::lit("x")),
            Expr::logical_not(Expr::in_list(
                Expr::prop(part, "state"),
                vec![Expr::lit("a"), Expr::lit("b")],
            )),
        );
        assert_eq!(expand_in(&mut expr).unwrap(), 1);
        assert_eq!(
            expr,
            Expr::and(
                Expr::equals(Expr::prop(part, "name"), Expr::lit("x")),
                Expr::logical_not(Expr::or(
                    Expr::equals(Expr::prop(part, "state"), Expr::lit("a")),
                    Expr::equals(Expr::prop(part, "state"), Expr::lit("b")),
                )),
            )
        );
    }

    #[test]
    fn failed_expansion_leaves_expression_unchanged() {
        let (_, part, _) = two_tables();
        let original = Expr::or(
            Expr::in_list(Expr::prop(part, "a"), vec![Expr::lit(1)]),
            Expr::in_list(Expr::prop(part, "b"), vec![]),
        );
        let mut expr = original.clone();
        assert_eq!(expand_in(&mut expr), Err(QueryError::UnsupportedRewrite));
        assert_eq!(expr, original);
    }
}
