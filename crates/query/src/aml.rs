//! Wire-document rendering.
//!
//! A query graph becomes a tree of tag nodes: one `Item` node per query
//! item, joined items nested under the property or `Relationships` node
//! that links them, and each filter fragment attached to the item it was
//! attributed to by [`normalize_graph`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use itemql_core::item::validate::{validate_alias, validate_tag_name, validate_type_name};
use itemql_core::QueryConfig;
use serde::Serialize;

use crate::ast::{BinaryOp, Expr, IsOperand, PropertyReference};
use crate::error::{QueryError, RenderError};
use crate::literal::Literal;
use crate::normalize::{first_table, normalize_graph};
use crate::query::{ItemRef, Join, JoinKind, QueryGraph, QueryItem};
use crate::sql::{parameter_text, quote};

/// One tag of the wire document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AmlNode {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AmlNode>,
}

impl AmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: AmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&AmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Write the node as XML. Pretty output indents two spaces per level.
    pub fn to_xml(&self, pretty: bool) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, pretty, 0);
        out
    }

    fn write_xml(&self, out: &mut String, pretty: bool, depth: usize) {
        if pretty {
            out.push_str(&"  ".repeat(depth));
        }
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, " {name}=\"{}\"", escape(value, true));
        }
        if self.text.is_none() && self.children.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            if let Some(text) = &self.text {
                out.push_str(&escape(text, false));
            }
            if !self.children.is_empty() {
                if pretty {
                    out.push('\n');
                }
                for child in &self.children {
                    child.write_xml(out, pretty, depth + 1);
                }
                if pretty {
                    out.push_str(&"  ".repeat(depth));
                }
            }
            let _ = write!(out, "</{}>", self.name);
        }
        if pretty {
            out.push('\n');
        }
    }
}

fn escape(value: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders a query graph as a wire document.
#[derive(Debug)]
pub struct AmlWriter<'g> {
    graph: &'g QueryGraph,
    action: String,
    pretty: bool,
}

enum JoinShape<'a> {
    /// `left.p = right.id`: the right item is the value of `p`.
    Property(&'a str),
    /// `right.source_id = left.id`: the right item is a relationship.
    Relationship,
}

type Filters<'g> = HashMap<ItemRef, Vec<&'g Expr>>;

impl<'g> AmlWriter<'g> {
    pub fn new(graph: &'g QueryGraph, config: &QueryConfig) -> Self {
        Self {
            graph,
            action: config.default_action.clone(),
            pretty: config.pretty,
        }
    }

    /// Build the document for the query rooted at `root`. Normalizes the
    /// graph first.
    pub fn render(&self, root: ItemRef) -> Result<AmlNode, RenderError> {
        normalize_graph(self.graph);
        let mut filters = self.group_filters(root)?;
        let mut rendered = HashSet::new();
        let node = self.item_node(root, &mut filters, &mut rendered)?;

        // Fragments attributed to an item outside the rendered tree.
        if let Some(table) = filters
            .iter()
            .filter(|(_, fragments)| !fragments.is_empty())
            .map(|(table, _)| *table)
            .min()
        {
            return Err(QueryError::UnresolvedReference(table).into());
        }
        tracing::debug!(root = %root, items = rendered.len(), "rendered wire document");
        Ok(node)
    }

    pub fn render_xml(&self, root: ItemRef) -> Result<String, RenderError> {
        Ok(self.render(root)?.to_xml(self.pretty))
    }

    /// Split every reachable filter into top-level `AND` conjuncts keyed by
    /// the item each one filters.
    fn group_filters(&self, root: ItemRef) -> Result<Filters<'g>, RenderError> {
        let mut filters = Filters::new();
        for item in self.graph.reachable(root)? {
            let Some(filter) = &self.graph.get(item)?.where_clause else {
                continue;
            };
            let mut parts = Vec::new();
            conjuncts(filter, &mut parts);
            for part in parts {
                let table = part
                    .attributed_table()
                    .or_else(|| first_table(part))
                    .unwrap_or(item);
                filters.entry(table).or_default().push(part);
            }
        }
        Ok(filters)
    }

    fn item_node(
        &self,
        table: ItemRef,
        filters: &mut Filters<'g>,
        rendered: &mut HashSet<ItemRef>,
    ) -> Result<AmlNode, RenderError> {
        rendered.insert(table);
        let item = self.graph.get(table)?;
        validate_type_name(&item.item_type)?;

        let mut node = AmlNode::new("Item")
            .with_attr("type", item.item_type.as_str())
            .with_attr("action", self.action.as_str());
        if let Some(alias) = &item.alias {
            validate_alias(alias)?;
            node.set_attr("alias", alias.as_str());
        }
        if let Some(type_id) = item
            .type_provider
            .as_ref()
            .and_then(|provider| provider.type_id(&item.item_type))
        {
            node.set_attr("typeId", type_id.as_str());
        }
        if let Some(select) = select_list(table, item)? {
            node.set_attr("select", select);
        }
        if let Some(order_by) = order_list(table, item)? {
            node.set_attr("orderBy", order_by);
        }
        paging(item, &mut node)?;

        for fragment in filters.remove(&table).unwrap_or_default() {
            if node.attr("id").is_none() {
                if let Some(id) = id_literal(fragment, table) {
                    node.set_attr("id", id);
                    continue;
                }
            }
            node.children.push(condition(fragment, table)?);
        }

        for join in &item.joins {
            self.join(join, &mut node, filters, rendered)?;
        }
        Ok(node)
    }

    fn join(
        &self,
        join: &Join,
        node: &mut AmlNode,
        filters: &mut Filters<'g>,
        rendered: &mut HashSet<ItemRef>,
    ) -> Result<(), RenderError> {
        let unsupported = || RenderError::UnsupportedJoin {
            left: join.left,
            right: join.right,
        };
        // Nesting expresses inner joins only.
        if join.kind != JoinKind::Inner || rendered.contains(&join.right) {
            return Err(unsupported());
        }
        let shape = join_shape(join).ok_or_else(unsupported)?;
        let child = self.item_node(join.right, filters, rendered)?;
        match shape {
            JoinShape::Property(name) => {
                validate_tag_name(name)?;
                node.children.push(AmlNode::new(name).with_child(child));
            }
            JoinShape::Relationship => relationships(node).children.push(child),
        }
        Ok(())
    }
}

fn conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Binary(op) if op.op == BinaryOp::And => {
            conjuncts(&op.left, out);
            conjuncts(&op.right, out);
        }
        other => out.push(other),
    }
}

fn join_shape(join: &Join) -> Option<JoinShape<'_>> {
    let Expr::Binary(op) = &join.condition else {
        return None;
    };
    if op.op != BinaryOp::Eq {
        return None;
    }
    let (a, b) = (op.left.as_property()?, op.right.as_property()?);
    for (near, far) in [(a, b), (b, a)] {
        if near.table != join.left || far.table != join.right {
            continue;
        }
        if far.name == "source_id" && near.name == "id" {
            return Some(JoinShape::Relationship);
        }
        if far.name == "id" {
            return Some(JoinShape::Property(&near.name));
        }
    }
    None
}

fn relationships(node: &mut AmlNode) -> &mut AmlNode {
    let index = match node
        .children
        .iter()
        .position(|child| child.name == "Relationships")
    {
        Some(index) => index,
        None => {
            node.children.push(AmlNode::new("Relationships"));
            node.children.len() - 1
        }
    };
    &mut node.children[index]
}

/// The property `expr` names, which must belong to `table`.
fn owned_property(expr: &Expr, table: ItemRef) -> Result<&PropertyReference, RenderError> {
    let prop = expr
        .as_property()
        .ok_or_else(|| RenderError::UnsupportedExpression(describe(expr)))?;
    if prop.table != table {
        return Err(RenderError::MixedTableFilter {
            first: table,
            second: prop.table,
        });
    }
    validate_tag_name(&prop.name)?;
    Ok(prop)
}

fn select_list(table: ItemRef, item: &QueryItem) -> Result<Option<String>, RenderError> {
    let mut names = Vec::new();
    for column in &item.select {
        if let Expr::AllProperties(all) = &column.expression {
            if all.table == table {
                return Ok(None);
            }
        }
        let prop = owned_property(&column.expression, table)?;
        if let Some(alias) = column.alias.as_deref().filter(|alias| *alias != prop.name) {
            return Err(RenderError::UnsupportedExpression(format!(
                "{} AS {alias}",
                prop.name
            )));
        }
        names.push(prop.name.as_str());
    }
    Ok((!names.is_empty()).then(|| names.join(",")))
}

fn order_list(table: ItemRef, item: &QueryItem) -> Result<Option<String>, RenderError> {
    let mut names = Vec::new();
    for sort in &item.order_by {
        let prop = owned_property(&sort.expression, table)?;
        names.push(if sort.ascending {
            prop.name.clone()
        } else {
            format!("{} DESC", prop.name)
        });
    }
    Ok((!names.is_empty()).then(|| names.join(",")))
}

/// Fetch alone is `maxRecords`; an offset must fall on a page boundary.
fn paging(item: &QueryItem, node: &mut AmlNode) -> Result<(), RenderError> {
    match (item.fetch, item.offset.unwrap_or(0)) {
        (None, 0) => {}
        (Some(fetch), 0) => node.set_attr("maxRecords", fetch.to_string()),
        (Some(fetch), offset) if fetch > 0 && offset % fetch == 0 => {
            node.set_attr("page", (offset / fetch + 1).to_string());
            node.set_attr("pagesize", fetch.to_string());
        }
        (fetch, offset) => return Err(RenderError::UnsupportedPaging { offset, fetch }),
    }
    Ok(())
}

/// `id = 'literal'` on `table` itself.
fn id_literal(expr: &Expr, table: ItemRef) -> Option<String> {
    let Expr::Binary(op) = expr else {
        return None;
    };
    match (op.op, op.left.as_property(), op.right.as_literal()) {
        (BinaryOp::Eq, Some(prop), Some(Literal::String(id)))
            if prop.table == table && prop.name == "id" =>
        {
            Some(id.clone())
        }
        _ => None,
    }
}

fn condition(expr: &Expr, table: ItemRef) -> Result<AmlNode, RenderError> {
    match expr {
        Expr::Binary(op) if op.op.is_logical() => {
            let mut operands = Vec::new();
            flatten(expr, op.op, &mut operands);
            let mut node = AmlNode::new(if op.op == BinaryOp::And { "and" } else { "or" });
            for operand in operands {
                node.children.push(condition(operand, table)?);
            }
            Ok(node)
        }
        Expr::Not(arg) => Ok(AmlNode::new("not").with_child(condition(arg, table)?)),
        Expr::Binary(op) if op.op.is_comparison() => {
            let name = condition_name(op.op)
                .ok_or_else(|| RenderError::UnsupportedExpression(describe(expr)))?;
            let prop = owned_property(&op.left, table)?;
            let value = match op.right.as_ref() {
                Expr::Patterns(patterns) if patterns.len() == 1 => patterns.patterns[0].to_like(),
                other => value_text(other)?,
            };
            Ok(AmlNode::new(prop.name.as_str())
                .with_attr("condition", name)
                .with_text(value))
        }
        Expr::Between(op) => {
            let prop = owned_property(&op.left, table)?;
            Ok(AmlNode::new(prop.name.as_str())
                .with_attr("condition", "between")
                .with_text(format!("{} and {}", value_text(&op.min)?, value_text(&op.max)?)))
        }
        Expr::In(op) => {
            let prop = owned_property(&op.left, table)?;
            let values = op
                .right
                .values
                .iter()
                .map(|value| match value {
                    Expr::Literal(Literal::String(s)) => Ok(quote(s)),
                    other => value_text(other),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AmlNode::new(prop.name.as_str())
                .with_attr("condition", "in")
                .with_text(values.join(",")))
        }
        Expr::Is(op) => {
            let prop = owned_property(&op.left, table)?;
            Ok(AmlNode::new(prop.name.as_str()).with_attr(
                "condition",
                match op.right {
                    IsOperand::Null => "is null",
                    IsOperand::NotNull => "is not null",
                },
            ))
        }
        other => Err(RenderError::UnsupportedExpression(describe(other))),
    }
}

fn flatten<'a>(expr: &'a Expr, logical: BinaryOp, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Binary(op) if op.op == logical => {
            flatten(&op.left, logical, out);
            flatten(&op.right, logical, out);
        }
        other => out.push(other),
    }
}

fn condition_name(op: BinaryOp) -> Option<&'static str> {
    Some(match op {
        BinaryOp::Eq => "eq",
        BinaryOp::NotEq => "ne",
        BinaryOp::Lt => "lt",
        BinaryOp::LtEq => "le",
        BinaryOp::Gt => "gt",
        BinaryOp::GtEq => "ge",
        BinaryOp::Like => "like",
        BinaryOp::NotLike => "not like",
        _ => return None,
    })
}

fn value_text(expr: &Expr) -> Result<String, RenderError> {
    let Expr::Literal(literal) = expr else {
        return Err(RenderError::UnsupportedExpression(describe(expr)));
    };
    Ok(match literal {
        Literal::Boolean(true) => "1".to_string(),
        Literal::Boolean(false) => "0".to_string(),
        Literal::Integer(value) => value.to_string(),
        Literal::Float(value) => Literal::format_float(*value)
            .ok_or_else(|| RenderError::UnsupportedExpression(value.to_string()))?,
        Literal::String(value) => value.clone(),
        Literal::DateTime(value) => Literal::format_date_time(value),
        Literal::Object(object) => object.resolve()?.to_string(),
        Literal::Parameter(param) => parameter_text(param)?,
    })
}

fn describe(expr: &Expr) -> String {
    expr.to_sql().unwrap_or_else(|err| err.to_string())
}
