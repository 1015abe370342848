use std::sync::OnceLock;

use crate::literal::{Literal, ParameterReference, PatternList};
use crate::query::ItemRef;

/// Binding strength used to decide parenthesization, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Or = 1,
    And,
    Comparison,
    Additive,
    Multiplicative,
    Unary,
    Atomic,
}

impl Precedence {
    /// The next tighter level.
    pub fn tighter(self) -> Self {
        match self {
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Comparison,
            Precedence::Comparison => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary | Precedence::Atomic => Precedence::Atomic,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Logical
    And,
    Or,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// String concatenation
    Concat,
}

impl BinaryOp {
    pub const fn precedence(self) -> Precedence {
        match self {
            Self::Or => Precedence::Or,
            Self::And => Precedence::And,
            Self::Eq
            | Self::NotEq
            | Self::Lt
            | Self::LtEq
            | Self::Gt
            | Self::GtEq
            | Self::Like
            | Self::NotLike => Precedence::Comparison,
            Self::Add | Self::Sub | Self::Concat => Precedence::Additive,
            Self::Mul | Self::Div | Self::Mod => Precedence::Multiplicative,
        }
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    pub const fn is_comparison(self) -> bool {
        matches!(self.precedence(), Precedence::Comparison)
    }

    /// `(a op b) op c` means the same as `a op (b op c)`.
    pub const fn is_associative(self) -> bool {
        matches!(
            self,
            Self::And | Self::Or | Self::Add | Self::Mul | Self::Concat
        )
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Concat => "||",
        }
    }
}

/// Cached attribution of a comparison to the query item it filters.
///
/// Filled at most once by normalization. The cache never participates in
/// equality.
#[derive(Debug, Clone, Default)]
pub struct TableSlot(OnceLock<Option<ItemRef>>);

impl TableSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attributed item, if normalization ran and found one.
    pub fn get(&self) -> Option<ItemRef> {
        self.0.get().copied().flatten()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> Option<ItemRef>) -> Option<ItemRef> {
        *self.0.get_or_init(init)
    }
}

impl PartialEq for TableSlot {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// A property of a query item. The item is referenced, not owned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyReference {
    pub name: String,
    pub table: ItemRef,
}

impl PropertyReference {
    pub fn new(name: impl Into<String>, table: ItemRef) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

/// `table.*`, optionally including extended properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllProperties {
    pub table: ItemRef,
    pub extended: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListExpression {
    pub values: Vec<Expr>,
}

impl ListExpression {
    pub fn new(values: Vec<Expr>) -> Self {
        Self { values }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsOperand {
    Null,
    NotNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperator {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub table: TableSlot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetweenOperator {
    pub left: Box<Expr>,
    pub min: Box<Expr>,
    pub max: Box<Expr>,
    pub table: TableSlot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InOperator {
    pub left: Box<Expr>,
    pub right: ListExpression,
    pub table: TableSlot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsOperator {
    pub left: Box<Expr>,
    pub right: IsOperand,
    pub table: TableSlot,
}

/// A call to a server-side function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    pub name: String,
    pub args: Vec<Expr>,
}

impl FunctionExpression {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Copy the call, producing each argument through `map_arg`.
    pub fn clone_with<E, F>(&self, mut map_arg: F) -> Result<Self, E>
    where
        F: FnMut(&Expr) -> Result<Expr, E>,
    {
        let args = self
            .args
            .iter()
            .map(&mut map_arg)
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            name: self.name.clone(),
            args,
        })
    }
}

/// `COUNT` through a chain of joined items; the last item is counted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountAggregate {
    pub table_path: Vec<ItemRef>,
}

/// Query expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Property(PropertyReference),
    AllProperties(AllProperties),
    Patterns(PatternList),
    List(ListExpression),
    Binary(BinaryOperator),
    Between(BetweenOperator),
    In(InOperator),
    Is(IsOperator),
    Not(Box<Expr>),
    Negation(Box<Expr>),
    Function(FunctionExpression),
    Count(CountAggregate),
}

impl Expr {
    pub fn precedence(&self) -> Precedence {
        match self {
            Expr::Literal(literal) if literal.is_negative() => Precedence::Unary,
            Expr::Binary(op) => op.op.precedence(),
            Expr::Between(_) | Expr::In(_) | Expr::Is(_) => Precedence::Comparison,
            Expr::Not(_) | Expr::Negation(_) => Precedence::Unary,
            Expr::Literal(_)
            | Expr::Property(_)
            | Expr::AllProperties(_)
            | Expr::Patterns(_)
            | Expr::List(_)
            | Expr::Function(_)
            | Expr::Count(_) => Precedence::Atomic,
        }
    }

    pub fn as_property(&self) -> Option<&PropertyReference> {
        match self {
            Expr::Property(prop) => Some(prop),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Table attribution cached on a comparison node.
    pub fn attributed_table(&self) -> Option<ItemRef> {
        match self {
            Expr::Binary(op) => op.table.get(),
            Expr::Between(op) => op.table.get(),
            Expr::In(op) => op.table.get(),
            Expr::Is(op) => op.table.get(),
            _ => None,
        }
    }

    // Builders

    pub fn prop(table: ItemRef, name: impl Into<String>) -> Self {
        Expr::Property(PropertyReference::new(name, table))
    }

    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn param(name: impl Into<String>, is_raw: bool) -> Self {
        Expr::Literal(Literal::Parameter(ParameterReference::new(name, is_raw)))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryOperator {
            op,
            left: Box::new(left),
            right: Box::new(right),
            table: TableSlot::new(),
        })
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn not_equals(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::NotEq, left, right)
    }

    pub fn less_than(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Lt, left, right)
    }

    pub fn greater_than(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Gt, left, right)
    }

    pub fn like(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Like, left, right)
    }

    pub fn logical_not(arg: Expr) -> Self {
        Expr::Not(Box::new(arg))
    }

    pub fn negate(arg: Expr) -> Self {
        Expr::Negation(Box::new(arg))
    }

    pub fn in_list(left: Expr, values: Vec<Expr>) -> Self {
        Expr::In(InOperator {
            left: Box::new(left),
            right: ListExpression::new(values),
            table: TableSlot::new(),
        })
    }

    pub fn between(left: Expr, min: Expr, max: Expr) -> Self {
        Expr::Between(BetweenOperator {
            left: Box::new(left),
            min: Box::new(min),
            max: Box::new(max),
            table: TableSlot::new(),
        })
    }

    pub fn is_null(left: Expr) -> Self {
        Self::is(left, IsOperand::Null)
    }

    pub fn is_not_null(left: Expr) -> Self {
        Self::is(left, IsOperand::NotNull)
    }

    fn is(left: Expr, right: IsOperand) -> Self {
        Expr::Is(IsOperator {
            left: Box::new(left),
            right,
            table: TableSlot::new(),
        })
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function(FunctionExpression::new(name, args))
    }

    pub fn count(table_path: Vec<ItemRef>) -> Self {
        Expr::Count(CountAggregate { table_path })
    }

    pub fn all_properties(table: ItemRef, extended: bool) -> Self {
        Expr::AllProperties(AllProperties { table, extended })
    }
}

impl From<Literal> for Expr {
    fn from(literal: Literal) -> Self {
        Expr::Literal(literal)
    }
}

impl From<PropertyReference> for Expr {
    fn from(prop: PropertyReference) -> Self {
        Expr::Property(prop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryGraph, QueryItem};

    #[test]
    fn precedence_ordering() {
        assert!(Precedence::Unary > Precedence::Multiplicative);
        assert!(BinaryOp::Mul.precedence() > BinaryOp::Add.precedence());
        assert!(BinaryOp::Concat.precedence() == BinaryOp::Sub.precedence());
        assert!(BinaryOp::Add.precedence() > BinaryOp::Like.precedence());
        assert!(BinaryOp::Eq.precedence() > BinaryOp::And.precedence());
        assert!(BinaryOp::And.precedence() > BinaryOp::Or.precedence());
        assert_eq!(Precedence::Or.tighter(), Precedence::And);
        assert_eq!(Precedence::Atomic.tighter(), Precedence::Atomic);
    }

    #[test]
    fn expression_precedence() {
        let mut graph = QueryGraph::new();
        let part = graph.add(QueryItem::new("Part"));
        assert_eq!(
            Expr::in_list(Expr::prop(part, "state"), vec![]).precedence(),
            Precedence::Comparison
        );
        assert_eq!(Expr::lit(-5).precedence(), Precedence::Unary);
        assert_eq!(Expr::lit(5).precedence(), Precedence::Atomic);
        assert_eq!(
            Expr::negate(Expr::lit(5)).precedence(),
            Precedence::Unary
        );
    }

    #[test]
    fn equality_ignores_attribution_cache() {
        let mut graph = QueryGraph::new();
        let part = graph.add(QueryItem::new("Part"));
        let a = Expr::equals(Expr::prop(part, "name"), Expr::lit("x"));
        let b = a.clone();
        if let Expr::Binary(op) = &a {
            op.table.get_or_init(|| Some(part));
        }
        assert_eq!(a.attributed_table(), Some(part));
        assert_eq!(b.attributed_table(), None);
        assert_eq!(a, b);
    }

    #[test]
    fn function_clone_with_maps_each_argument() {
        let func = FunctionExpression::new("UPPER", vec![Expr::lit("a"), Expr::lit("b")]);
        let mut seen = 0;
        let copy = func
            .clone_with(|arg| -> Result<Expr, ()> {
                seen += 1;
                Ok(arg.clone())
            })
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(copy, func);

        let failed = func.clone_with(|_| Err("boom"));
        assert_eq!(failed, Err("boom"));
    }
}
