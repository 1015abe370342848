//! SQL-like text rendering.
//!
//! A child expression is parenthesized when it binds looser than its
//! position allows. Left operands of a binary operator may share the
//! operator's precedence; right operands must bind tighter, so
//! `a AND b OR c` needs no parentheses while `a AND (b OR c)` keeps them.

use std::collections::HashSet;
use std::fmt::Write as _;

use itemql_core::item::validate::{
    validate_alias, validate_function_name, validate_parameter_name, validate_property_name,
    validate_type_name,
};
use itemql_core::QueryConfig;

use crate::ast::{
    AllProperties, BetweenOperator, BinaryOperator, CountAggregate, Expr, FunctionExpression,
    InOperator, IsOperand, IsOperator, ListExpression, Precedence, PropertyReference,
};
use crate::error::{QueryError, RenderError};
use crate::literal::{Literal, ParameterReference, PatternList};
use crate::query::{ItemRef, JoinKind, QueryGraph};
use crate::visit::Visitor;

/// Renders expressions and whole queries as text.
#[derive(Debug, Clone, Copy)]
pub struct SqlWriter<'g> {
    graph: Option<&'g QueryGraph>,
    qualify: bool,
    pretty: bool,
}

impl<'g> SqlWriter<'g> {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            graph: None,
            qualify: config.qualify_properties,
            pretty: config.pretty,
        }
    }

    /// Writer that renders bare property names and needs no graph.
    pub fn unqualified() -> Self {
        Self {
            graph: None,
            qualify: false,
            pretty: false,
        }
    }

    /// Resolve table references against `graph`.
    pub fn with_graph(mut self, graph: &'g QueryGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn expression(&self, expr: &Expr) -> Result<String, RenderError> {
        let mut text = TextVisitor::new(self);
        expr.accept(&mut text)?;
        Ok(text.out)
    }

    /// Render the query rooted at `root`, including every item reachable
    /// through its joins.
    pub fn query(&self, root: ItemRef) -> Result<String, RenderError> {
        let graph = self.graph.ok_or(QueryError::UnresolvedReference(root))?;
        let mut declared = HashSet::new();
        let mut from = self.table_declaration(graph, root)?;
        declared.insert(root);
        let mut predicates = Vec::new();
        self.write_joins(graph, root, &mut declared, &mut from, &mut predicates)?;

        let order = graph.reachable(root)?;
        let mut select = Vec::new();
        let mut order_by = Vec::new();
        for item in &order {
            let item = graph.get(*item)?;
            for column in &item.select {
                let mut text = self.expression(&column.expression)?;
                if let Some(alias) = &column.alias {
                    validate_alias(alias)?;
                    let _ = write!(text, " AS {alias}");
                }
                select.push(text);
            }
            for sort in &item.order_by {
                let text = self.expression(&sort.expression)?;
                order_by.push(if sort.ascending {
                    text
                } else {
                    format!("{text} DESC")
                });
            }
        }
        for item in &order {
            if let Some(filter) = &graph.get(*item)?.where_clause {
                predicates.push(filter);
            }
        }

        let mut clauses = Vec::new();
        clauses.push(if select.is_empty() {
            "SELECT *".to_string()
        } else {
            format!("SELECT {}", select.join(", "))
        });
        clauses.push(format!("FROM {from}"));
        if !predicates.is_empty() {
            let mut text = TextVisitor::new(self);
            for (i, predicate) in predicates.iter().enumerate() {
                if i > 0 {
                    text.out.push_str(" AND ");
                }
                text.child(predicate, Precedence::And)?;
            }
            clauses.push(format!("WHERE {}", text.out));
        }
        if !order_by.is_empty() {
            clauses.push(format!("ORDER BY {}", order_by.join(", ")));
        }
        let root_item = graph.get(root)?;
        if root_item.offset.is_some() || root_item.fetch.is_some() {
            clauses.push(format!("OFFSET {} ROWS", root_item.offset.unwrap_or(0)));
        }
        if let Some(fetch) = root_item.fetch {
            clauses.push(format!("FETCH NEXT {fetch} ROWS ONLY"));
        }

        tracing::debug!(root = %root, items = order.len(), "rendered query text");
        Ok(clauses.join(if self.pretty { "\n" } else { " " }))
    }

    fn write_joins<'a>(
        &self,
        graph: &'a QueryGraph,
        item: ItemRef,
        declared: &mut HashSet<ItemRef>,
        from: &mut String,
        predicates: &mut Vec<&'a Expr>,
    ) -> Result<(), RenderError> {
        for join in &graph.get(item)?.joins {
            if !declared.insert(join.right) {
                // Already in FROM: the condition filters instead of joining.
                predicates.push(&join.condition);
                continue;
            }
            let table = self.table_declaration(graph, join.right)?;
            let _ = write!(from, " {} {table}", join.kind.as_sql());
            if join.kind == JoinKind::Cross {
                predicates.push(&join.condition);
            } else {
                let _ = write!(from, " ON {}", self.expression(&join.condition)?);
            }
            self.write_joins(graph, join.right, declared, from, predicates)?;
        }
        Ok(())
    }

    fn table_declaration(&self, graph: &QueryGraph, table: ItemRef) -> Result<String, RenderError> {
        let item = graph.get(table)?;
        validate_type_name(&item.item_type)?;
        Ok(match &item.alias {
            Some(alias) => {
                validate_alias(alias)?;
                format!("[{}] AS {alias}", item.item_type)
            }
            None => format!("[{}]", item.item_type),
        })
    }

    /// How `table` is named inside expressions.
    fn table_name(&self, table: ItemRef) -> Result<String, RenderError> {
        let graph = self.graph.ok_or(QueryError::UnresolvedReference(table))?;
        let item = graph.get(table)?;
        Ok(match &item.alias {
            Some(alias) => {
                validate_alias(alias)?;
                alias.clone()
            }
            None => {
                validate_type_name(&item.item_type)?;
                format!("[{}]", item.item_type)
            }
        })
    }
}

/// Quote a string literal, doubling embedded quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `@name`, or `@!name` for raw parameters.
pub fn parameter_text(param: &ParameterReference) -> Result<String, RenderError> {
    validate_parameter_name(&param.name)?;
    Ok(if param.is_raw {
        format!("@!{}", param.name)
    } else {
        format!("@{}", param.name)
    })
}

/// Text form of a literal.
pub fn literal_text(literal: &Literal) -> Result<String, RenderError> {
    Ok(match literal {
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Integer(value) => value.to_string(),
        Literal::Float(value) => Literal::format_float(*value)
            .ok_or_else(|| RenderError::UnsupportedExpression(value.to_string()))?,
        Literal::String(value) => quote(value),
        Literal::DateTime(value) => quote(&Literal::format_date_time(value)),
        Literal::Object(object) => quote(object.resolve()?.as_str()),
        Literal::Parameter(param) => parameter_text(param)?,
    })
}

struct TextVisitor<'w, 'g> {
    writer: &'w SqlWriter<'g>,
    out: String,
}

impl<'w, 'g> TextVisitor<'w, 'g> {
    fn new(writer: &'w SqlWriter<'g>) -> Self {
        Self {
            writer,
            out: String::new(),
        }
    }

    /// Write `expr`, parenthesized when it binds looser than `min`.
    fn child(&mut self, expr: &Expr, min: Precedence) -> Result<(), RenderError> {
        if expr.precedence() < min {
            self.out.push('(');
            expr.accept(self)?;
            self.out.push(')');
            Ok(())
        } else {
            expr.accept(self)
        }
    }

    fn comma_list(&mut self, values: &[Expr]) -> Result<(), RenderError> {
        self.out.push('(');
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.child(value, Precedence::Or)?;
        }
        self.out.push(')');
        Ok(())
    }
}

impl Visitor for TextVisitor<'_, '_> {
    type Output = Result<(), RenderError>;

    fn visit_literal(&mut self, literal: &Literal) -> Self::Output {
        self.out.push_str(&literal_text(literal)?);
        Ok(())
    }

    fn visit_property(&mut self, prop: &PropertyReference) -> Self::Output {
        validate_property_name(&prop.name)?;
        if self.writer.qualify {
            let table = self.writer.table_name(prop.table)?;
            let _ = write!(self.out, "{table}.{}", prop.name);
        } else {
            self.out.push_str(&prop.name);
        }
        Ok(())
    }

    fn visit_all_properties(&mut self, all: &AllProperties) -> Self::Output {
        if self.writer.qualify {
            let table = self.writer.table_name(all.table)?;
            let _ = write!(self.out, "{table}.*");
        } else {
            self.out.push('*');
        }
        Ok(())
    }

    fn visit_patterns(&mut self, patterns: &PatternList) -> Self::Output {
        match patterns.patterns.as_slice() {
            [single] => self.out.push_str(&quote(&single.to_like())),
            many => {
                let quoted: Vec<String> = many.iter().map(|p| quote(&p.to_like())).collect();
                let _ = write!(self.out, "({})", quoted.join(", "));
            }
        }
        Ok(())
    }

    fn visit_list(&mut self, list: &ListExpression) -> Self::Output {
        self.comma_list(&list.values)
    }

    fn visit_binary(&mut self, op: &BinaryOperator) -> Self::Output {
        let prec = op.op.precedence();
        let left_min = if op.op.is_comparison() {
            prec.tighter()
        } else {
            prec
        };
        self.child(&op.left, left_min)?;
        let _ = write!(self.out, " {} ", op.op.symbol());
        self.child(&op.right, prec.tighter())
    }

    fn visit_between(&mut self, op: &BetweenOperator) -> Self::Output {
        self.child(&op.left, Precedence::Additive)?;
        self.out.push_str(" BETWEEN ");
        self.child(&op.min, Precedence::Additive)?;
        self.out.push_str(" AND ");
        self.child(&op.max, Precedence::Additive)
    }

    fn visit_in(&mut self, op: &InOperator) -> Self::Output {
        self.child(&op.left, Precedence::Additive)?;
        self.out.push_str(" IN ");
        self.comma_list(&op.right.values)
    }

    fn visit_is(&mut self, op: &IsOperator) -> Self::Output {
        self.child(&op.left, Precedence::Additive)?;
        self.out.push_str(match op.right {
            IsOperand::Null => " IS NULL",
            IsOperand::NotNull => " IS NOT NULL",
        });
        Ok(())
    }

    fn visit_not(&mut self, arg: &Expr) -> Self::Output {
        self.out.push_str("NOT ");
        self.child(arg, Precedence::Atomic)
    }

    fn visit_negation(&mut self, arg: &Expr) -> Self::Output {
        self.out.push('-');
        self.child(arg, Precedence::Atomic)
    }

    fn visit_function(&mut self, func: &FunctionExpression) -> Self::Output {
        validate_function_name(&func.name)?;
        self.out.push_str(&func.name);
        self.comma_list(&func.args)
    }

    fn visit_count(&mut self, count: &CountAggregate) -> Self::Output {
        match count.table_path.last() {
            Some(table) if self.writer.qualify => {
                let table = self.writer.table_name(*table)?;
                let _ = write!(self.out, "COUNT({table}.id)");
            }
            _ => self.out.push_str("COUNT(*)"),
        }
        Ok(())
    }
}

impl Expr {
    /// Unqualified text form.
    pub fn to_sql(&self) -> Result<String, RenderError> {
        SqlWriter::unqualified().expression(self)
    }
}
