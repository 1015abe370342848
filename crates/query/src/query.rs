//! Query items and the arena that owns them.
//!
//! Items reference each other through [`ItemRef`] handles, so a join target
//! can be shared by several joins, referenced by properties at the same time,
//! or point back at its own owner. Identity is the handle: two items with
//! identical fields are still two different tables.

use std::collections::HashSet;
use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use itemql_core::TypeProvider;
use serde::{Deserialize, Serialize};

use crate::ast::Expr;
use crate::error::QueryError;

static NEXT_GRAPH: AtomicU64 = AtomicU64::new(1);

/// Handle to a [`QueryItem`] inside a [`QueryGraph`]. A handle only
/// resolves in the graph that issued it and in clones of that graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemRef {
    graph: u64,
    index: usize,
}

impl ItemRef {
    pub(crate) fn new(graph: u64, index: usize) -> Self {
        Self { graph, index }
    }

    /// Position of the item in its graph.
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.graph, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    /// No join condition is rendered.
    Cross,
}

impl JoinKind {
    pub const fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub left: ItemRef,
    pub right: ItemRef,
    pub condition: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpression {
    pub expression: Expr,
    pub alias: Option<String>,
    pub only_return_non_null: bool,
}

impl SelectExpression {
    pub fn new(expression: Expr) -> Self {
        Self {
            expression,
            alias: None,
            only_return_non_null: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpression {
    pub expression: Expr,
    pub ascending: bool,
}

/// One queried table: its joins, filter, projection, ordering and paging.
#[derive(Debug, Clone)]
pub struct QueryItem {
    pub item_type: String,
    pub type_provider: Option<Arc<dyn TypeProvider>>,
    /// Friendly name, needed to tell self-joined tables apart.
    pub alias: Option<String>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub select: Vec<SelectExpression>,
    pub order_by: Vec<OrderByExpression>,
    pub fetch: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryItem {
    pub fn new(item_type: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            type_provider: None,
            alias: None,
            joins: Vec::new(),
            where_clause: None,
            select: Vec::new(),
            order_by: Vec::new(),
            fetch: None,
            offset: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_type_provider(mut self, provider: Arc<dyn TypeProvider>) -> Self {
        self.type_provider = Some(provider);
        self
    }

    /// AND `condition` onto the existing filter.
    pub fn add_where(&mut self, condition: Expr) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => Expr::and(existing, condition),
            None => condition,
        });
    }

    pub fn add_select(&mut self, expression: Expr) {
        self.select.push(SelectExpression::new(expression));
    }

    pub fn add_order_by(&mut self, expression: Expr, ascending: bool) {
        self.order_by.push(OrderByExpression {
            expression,
            ascending,
        });
    }
}

/// Arena owning every query item of one query.
///
/// Each graph gets its own id, so handles issued by another graph fail to
/// resolve instead of landing on an unrelated item. A cloned graph keeps
/// the id of its source.
#[derive(Debug, Clone)]
pub struct QueryGraph {
    id: u64,
    items: Vec<QueryItem>,
}

impl Default for QueryGraph {
    fn default() -> Self {
        Self {
            id: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            items: Vec::new(),
        }
    }
}

impl QueryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: QueryItem) -> ItemRef {
        self.items.push(item);
        ItemRef::new(self.id, self.items.len() - 1)
    }

    pub fn get(&self, item: ItemRef) -> Result<&QueryItem, QueryError> {
        if item.graph != self.id {
            return Err(QueryError::UnresolvedReference(item));
        }
        self.items
            .get(item.index)
            .ok_or(QueryError::UnresolvedReference(item))
    }

    pub fn get_mut(&mut self, item: ItemRef) -> Result<&mut QueryItem, QueryError> {
        if item.graph != self.id {
            return Err(QueryError::UnresolvedReference(item));
        }
        self.items
            .get_mut(item.index)
            .ok_or(QueryError::UnresolvedReference(item))
    }

    pub fn contains(&self, item: ItemRef) -> bool {
        item.graph == self.id && item.index < self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemRef, &QueryItem)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (ItemRef::new(self.id, index), item))
    }

    /// Record a join on `left`.
    pub fn join(
        &mut self,
        kind: JoinKind,
        left: ItemRef,
        right: ItemRef,
        condition: Expr,
    ) -> Result<(), QueryError> {
        if !self.contains(right) {
            return Err(QueryError::UnresolvedReference(right));
        }
        self.get_mut(left)?.joins.push(Join {
            kind,
            left,
            right,
            condition,
        });
        Ok(())
    }

    /// Items reachable from `root` through joins, root first, each once.
    pub fn reachable(&self, root: ItemRef) -> Result<Vec<ItemRef>, QueryError> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        self.collect_reachable(root, &mut seen, &mut order)?;
        Ok(order)
    }

    fn collect_reachable(
        &self,
        item: ItemRef,
        seen: &mut HashSet<ItemRef>,
        order: &mut Vec<ItemRef>,
    ) -> Result<(), QueryError> {
        if !seen.insert(item) {
            return Ok(());
        }
        order.push(item);
        for join in &self.get(item)?.joins {
            self.collect_reachable(join.left, seen, order)?;
            self.collect_reachable(join.right, seen, order)?;
        }
        Ok(())
    }

    /// Handle the next added item will receive.
    pub(crate) fn next_ref(&self, offset: usize) -> ItemRef {
        ItemRef::new(self.id, self.items.len() + offset)
    }

    pub(crate) fn extend(&mut self, items: Vec<QueryItem>) {
        self.items.extend(items);
    }
}

impl Index<ItemRef> for QueryGraph {
    type Output = QueryItem;

    /// Panics when `item` does not resolve in this graph.
    fn index(&self, item: ItemRef) -> &QueryItem {
        match self.get(item) {
            Ok(found) => found,
            Err(err) => panic!("{err}"),
        }
    }
}
