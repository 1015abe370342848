//! Deep copy of expressions and query-item graphs.
//!
//! Query items are copied through an identity memo keyed by [`ItemRef`]:
//! an item reached twice (a shared join target, a self-join, a property
//! pointing at a joined table) is copied once and every reference to it is
//! rebound to that one copy.

use std::collections::HashMap;

use crate::ast::{
    AllProperties, BetweenOperator, BinaryOperator, CountAggregate, Expr, FunctionExpression,
    InOperator, IsOperator, ListExpression, PropertyReference, TableSlot,
};
use crate::error::QueryError;
use crate::literal::{Literal, ObjectLiteral, PatternList};
use crate::query::{
    ItemRef, Join, OrderByExpression, QueryGraph, QueryItem, SelectExpression,
};
use crate::visit::Visitor;

/// Per-kind hooks applied while cloning.
pub trait CloneMapper {
    /// Produce the copy of a property reference. `table` is the property's
    /// table already resolved against the clone memo.
    fn map_property(
        &mut self,
        prop: &PropertyReference,
        table: ItemRef,
    ) -> Result<PropertyReference, QueryError> {
        Ok(PropertyReference::new(prop.name.clone(), table))
    }

    /// Produce the copy of a literal compared against `prop`.
    fn map_value(
        &mut self,
        _prop: &PropertyReference,
        literal: &Literal,
    ) -> Result<Literal, QueryError> {
        Ok(clone_literal(literal))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMapper;

impl CloneMapper for DefaultMapper {}

/// Copy a literal. Object literals start with an empty resolution cache.
pub fn clone_literal(literal: &Literal) -> Literal {
    match literal {
        Literal::Boolean(value) => Literal::Boolean(*value),
        Literal::Integer(value) => Literal::Integer(*value),
        Literal::Float(value) => Literal::Float(*value),
        Literal::String(value) => Literal::String(value.clone()),
        Literal::DateTime(value) => Literal::DateTime(*value),
        Literal::Object(object) => Literal::Object(ObjectLiteral::new(
            object.type_name(),
            object.provider().clone(),
        )),
        Literal::Parameter(param) => Literal::Parameter(param.clone()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    /// Tables outside the memo are kept as they are.
    PassThrough,
    /// Tables outside the memo are an error.
    Strict,
}

/// Deep-copies expressions and query items, rebinding table references to
/// their copies.
pub struct CloneVisitor<M = DefaultMapper> {
    mapper: M,
    memo: HashMap<ItemRef, ItemRef>,
    resolution: Resolution,
}

impl CloneVisitor<DefaultMapper> {
    pub fn new() -> Self {
        Self::with_mapper(DefaultMapper)
    }
}

impl Default for CloneVisitor<DefaultMapper> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: CloneMapper> CloneVisitor<M> {
    pub fn with_mapper(mapper: M) -> Self {
        Self {
            mapper,
            memo: HashMap::new(),
            resolution: Resolution::PassThrough,
        }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// The copy made of `source`, if it has been cloned.
    pub fn cloned(&self, source: ItemRef) -> Option<ItemRef> {
        self.memo.get(&source).copied()
    }

    /// Copy an expression. Tables already cloned by this visitor are rebound
    /// to their copies; any other table is kept.
    pub fn clone_expr(&mut self, expr: &Expr) -> Result<Expr, QueryError> {
        expr.accept(self)
    }

    /// Copy the items reachable from `root` into the same graph and return
    /// the copy of `root`. Tables outside the copied sub-graph stay shared.
    ///
    /// On error the graph and the memo are left as they were.
    pub fn clone_subgraph(
        &mut self,
        graph: &mut QueryGraph,
        root: ItemRef,
    ) -> Result<ItemRef, QueryError> {
        let saved = self.memo.clone();
        self.resolution = Resolution::PassThrough;
        let source: &QueryGraph = graph;
        match self.clone_items(source, root, source) {
            Ok((copy, items)) => {
                tracing::debug!(root = %root, copy = %copy, items = items.len(), "cloned query sub-graph");
                graph.extend(items);
                Ok(copy)
            }
            Err(err) => {
                self.memo = saved;
                Err(err)
            }
        }
    }

    /// Copy the items reachable from `root` into a new graph. Every table
    /// referenced from the copied items must itself be copied; a reference
    /// to anything outside fails with [`QueryError::UnresolvedReference`].
    ///
    /// The memo is left as it was: it keeps describing copies made inside
    /// the source graph.
    pub fn detach(
        &mut self,
        graph: &QueryGraph,
        root: ItemRef,
    ) -> Result<(QueryGraph, ItemRef), QueryError> {
        let saved = std::mem::take(&mut self.memo);
        self.resolution = Resolution::Strict;
        let mut detached = QueryGraph::new();
        let result = self.clone_items(graph, root, &detached);
        self.resolution = Resolution::PassThrough;
        self.memo = saved;

        let (copy, items) = result?;
        detached.extend(items);
        tracing::debug!(root = %root, items = detached.len(), "detached query sub-graph");
        Ok((detached, copy))
    }

    /// Copy the sub-graph at `root`; the copies are numbered as if appended
    /// to `target` in order.
    fn clone_items(
        &mut self,
        graph: &QueryGraph,
        root: ItemRef,
        target: &QueryGraph,
    ) -> Result<(ItemRef, Vec<QueryItem>), QueryError> {
        // Every item gets its copy's handle before any expression is copied,
        // so a filter may reference any table of the sub-graph.
        let mut sources = Vec::new();
        self.reserve(graph, root, target, &mut sources)?;
        let copy = self.resolve_table(root)?;

        let mut items = Vec::with_capacity(sources.len());
        for source in sources {
            items.push(self.clone_item(source, graph.get(source)?)?);
        }
        Ok((copy, items))
    }

    /// Reserve copies for the items reachable from `item`, root first, in
    /// join order. Items already in the memo end the walk.
    fn reserve(
        &mut self,
        graph: &QueryGraph,
        item: ItemRef,
        target: &QueryGraph,
        sources: &mut Vec<ItemRef>,
    ) -> Result<(), QueryError> {
        if self.memo.contains_key(&item) {
            return Ok(());
        }
        let original = graph.get(item)?;
        self.memo.insert(item, target.next_ref(sources.len()));
        sources.push(item);
        for join in &original.joins {
            self.reserve(graph, join.left, target, sources)?;
            self.reserve(graph, join.right, target, sources)?;
        }
        Ok(())
    }

    fn clone_item(&mut self, source: ItemRef, original: &QueryItem) -> Result<QueryItem, QueryError> {
        tracing::trace!(source = %source, item_type = %original.item_type, "cloning query item");

        let mut item = QueryItem {
            item_type: original.item_type.clone(),
            type_provider: original.type_provider.clone(),
            alias: original.alias.clone(),
            joins: Vec::with_capacity(original.joins.len()),
            where_clause: None,
            select: Vec::with_capacity(original.select.len()),
            order_by: Vec::with_capacity(original.order_by.len()),
            fetch: original.fetch,
            offset: original.offset,
        };

        for join in &original.joins {
            item.joins.push(Join {
                kind: join.kind,
                left: self.resolve_table(join.left)?,
                right: self.resolve_table(join.right)?,
                condition: self.clone_expr(&join.condition)?,
            });
        }

        for order_by in &original.order_by {
            item.order_by.push(OrderByExpression {
                expression: self.clone_expr(&order_by.expression)?,
                ascending: order_by.ascending,
            });
        }

        for select in &original.select {
            item.select.push(SelectExpression {
                expression: self.clone_expr(&select.expression)?,
                alias: select.alias.clone(),
                only_return_non_null: select.only_return_non_null,
            });
        }

        item.where_clause = original
            .where_clause
            .as_ref()
            .map(|filter| self.clone_expr(filter))
            .transpose()?;
        Ok(item)
    }

    fn resolve_table(&self, table: ItemRef) -> Result<ItemRef, QueryError> {
        match (self.memo.get(&table), self.resolution) {
            (Some(copy), _) => Ok(*copy),
            (None, Resolution::PassThrough) => Ok(table),
            (None, Resolution::Strict) => Err(QueryError::UnresolvedReference(table)),
        }
    }

    /// Copy the right-hand side of a comparison against `left`.
    fn clone_value(&mut self, left: &Expr, right: &Expr) -> Result<Expr, QueryError> {
        match (left, right) {
            (Expr::Property(prop), Expr::Literal(literal)) => {
                Ok(Expr::Literal(self.mapper.map_value(prop, literal)?))
            }
            _ => self.clone_expr(right),
        }
    }

    /// Copy a list whose members are compared against `compared_to`.
    fn clone_list(
        &mut self,
        list: &ListExpression,
        compared_to: Option<&PropertyReference>,
    ) -> Result<ListExpression, QueryError> {
        let mut values = Vec::with_capacity(list.values.len());
        for value in &list.values {
            values.push(match (compared_to, value) {
                (Some(prop), Expr::Literal(literal)) => {
                    Expr::Literal(self.mapper.map_value(prop, literal)?)
                }
                _ => self.clone_expr(value)?,
            });
        }
        Ok(ListExpression::new(values))
    }
}

impl<M: CloneMapper> Visitor for CloneVisitor<M> {
    type Output = Result<Expr, QueryError>;

    fn visit_literal(&mut self, literal: &Literal) -> Self::Output {
        Ok(Expr::Literal(clone_literal(literal)))
    }

    fn visit_property(&mut self, prop: &PropertyReference) -> Self::Output {
        let table = self.resolve_table(prop.table)?;
        Ok(Expr::Property(self.mapper.map_property(prop, table)?))
    }

    fn visit_all_properties(&mut self, all: &AllProperties) -> Self::Output {
        Ok(Expr::AllProperties(AllProperties {
            table: self.resolve_table(all.table)?,
            extended: all.extended,
        }))
    }

    fn visit_patterns(&mut self, patterns: &PatternList) -> Self::Output {
        Ok(Expr::Patterns(patterns.clone()))
    }

    fn visit_list(&mut self, list: &ListExpression) -> Self::Output {
        Ok(Expr::List(self.clone_list(list, None)?))
    }

    fn visit_binary(&mut self, op: &BinaryOperator) -> Self::Output {
        let left = self.clone_expr(&op.left)?;
        let right = if op.op.is_logical() {
            self.clone_expr(&op.right)?
        } else {
            self.clone_value(&op.left, &op.right)?
        };
        Ok(Expr::Binary(BinaryOperator {
            op: op.op,
            left: Box::new(left),
            right: Box::new(right),
            table: TableSlot::new(),
        }))
    }

    fn visit_between(&mut self, op: &BetweenOperator) -> Self::Output {
        Ok(Expr::Between(BetweenOperator {
            left: Box::new(self.clone_expr(&op.left)?),
            min: Box::new(self.clone_value(&op.left, &op.min)?),
            max: Box::new(self.clone_value(&op.left, &op.max)?),
            table: TableSlot::new(),
        }))
    }

    fn visit_in(&mut self, op: &InOperator) -> Self::Output {
        Ok(Expr::In(InOperator {
            left: Box::new(self.clone_expr(&op.left)?),
            right: self.clone_list(&op.right, op.left.as_property())?,
            table: TableSlot::new(),
        }))
    }

    fn visit_is(&mut self, op: &IsOperator) -> Self::Output {
        Ok(Expr::Is(IsOperator {
            left: Box::new(self.clone_expr(&op.left)?),
            right: op.right,
            table: TableSlot::new(),
        }))
    }

    fn visit_not(&mut self, arg: &Expr) -> Self::Output {
        Ok(Expr::Not(Box::new(self.clone_expr(arg)?)))
    }

    fn visit_negation(&mut self, arg: &Expr) -> Self::Output {
        Ok(Expr::Negation(Box::new(self.clone_expr(arg)?)))
    }

    fn visit_function(&mut self, func: &FunctionExpression) -> Self::Output {
        Ok(Expr::Function(func.clone_with(|arg| self.clone_expr(arg))?))
    }

    fn visit_count(&mut self, count: &CountAggregate) -> Self::Output {
        let table_path = count
            .table_path
            .iter()
            .map(|table| self.resolve_table(*table))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::Count(CountAggregate { table_path }))
    }
}
