//! Per-variant dispatch over [`Expr`].
//!
//! Every visitor implements one method per node kind with no defaults, so
//! adding a variant fails to compile until every pass handles it.

use crate::ast::{
    AllProperties, BetweenOperator, BinaryOperator, CountAggregate, Expr, FunctionExpression,
    InOperator, IsOperator, ListExpression, PropertyReference,
};
use crate::literal::{Literal, PatternList};

/// Read-only visitor producing a value per node.
pub trait Visitor {
    type Output;

    fn visit_literal(&mut self, literal: &Literal) -> Self::Output;
    fn visit_property(&mut self, prop: &PropertyReference) -> Self::Output;
    fn visit_all_properties(&mut self, all: &AllProperties) -> Self::Output;
    fn visit_patterns(&mut self, patterns: &PatternList) -> Self::Output;
    fn visit_list(&mut self, list: &ListExpression) -> Self::Output;
    fn visit_binary(&mut self, op: &BinaryOperator) -> Self::Output;
    fn visit_between(&mut self, op: &BetweenOperator) -> Self::Output;
    fn visit_in(&mut self, op: &InOperator) -> Self::Output;
    fn visit_is(&mut self, op: &IsOperator) -> Self::Output;
    fn visit_not(&mut self, arg: &Expr) -> Self::Output;
    fn visit_negation(&mut self, arg: &Expr) -> Self::Output;
    fn visit_function(&mut self, func: &FunctionExpression) -> Self::Output;
    fn visit_count(&mut self, count: &CountAggregate) -> Self::Output;
}

/// Visitor with mutable access to each node, for in-place rewrites.
pub trait VisitorMut {
    type Output;

    fn visit_literal(&mut self, literal: &mut Literal) -> Self::Output;
    fn visit_property(&mut self, prop: &mut PropertyReference) -> Self::Output;
    fn visit_all_properties(&mut self, all: &mut AllProperties) -> Self::Output;
    fn visit_patterns(&mut self, patterns: &mut PatternList) -> Self::Output;
    fn visit_list(&mut self, list: &mut ListExpression) -> Self::Output;
    fn visit_binary(&mut self, op: &mut BinaryOperator) -> Self::Output;
    fn visit_between(&mut self, op: &mut BetweenOperator) -> Self::Output;
    fn visit_in(&mut self, op: &mut InOperator) -> Self::Output;
    fn visit_is(&mut self, op: &mut IsOperator) -> Self::Output;
    fn visit_not(&mut self, arg: &mut Expr) -> Self::Output;
    fn visit_negation(&mut self, arg: &mut Expr) -> Self::Output;
    fn visit_function(&mut self, func: &mut FunctionExpression) -> Self::Output;
    fn visit_count(&mut self, count: &mut CountAggregate) -> Self::Output;
}

impl Expr {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expr::Literal(literal) => visitor.visit_literal(literal),
            Expr::Property(prop) => visitor.visit_property(prop),
            Expr::AllProperties(all) => visitor.visit_all_properties(all),
            Expr::Patterns(patterns) => visitor.visit_patterns(patterns),
            Expr::List(list) => visitor.visit_list(list),
            Expr::Binary(op) => visitor.visit_binary(op),
            Expr::Between(op) => visitor.visit_between(op),
            Expr::In(op) => visitor.visit_in(op),
            Expr::Is(op) => visitor.visit_is(op),
            Expr::Not(arg) => visitor.visit_not(arg),
            Expr::Negation(arg) => visitor.visit_negation(arg),
            Expr::Function(func) => visitor.visit_function(func),
            Expr::Count(count) => visitor.visit_count(count),
        }
    }

    pub fn accept_mut<V: VisitorMut + ?Sized>(&mut self, visitor: &mut V) -> V::Output {
        match self {
            Expr::Literal(literal) => visitor.visit_literal(literal),
            Expr::Property(prop) => visitor.visit_property(prop),
            Expr::AllProperties(all) => visitor.visit_all_properties(all),
            Expr::Patterns(patterns) => visitor.visit_patterns(patterns),
            Expr::List(list) => visitor.visit_list(list),
            Expr::Binary(op) => visitor.visit_binary(op),
            Expr::Between(op) => visitor.visit_between(op),
            Expr::In(op) => visitor.visit_in(op),
            Expr::Is(op) => visitor.visit_is(op),
            Expr::Not(arg) => visitor.visit_not(arg),
            Expr::Negation(arg) => visitor.visit_negation(arg),
            Expr::Function(func) => visitor.visit_function(func),
            Expr::Count(count) => visitor.visit_count(count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryGraph, QueryItem};

    /// Names the variant it was dispatched to.
    struct Kind;

    impl Visitor for Kind {
        type Output = &'static str;

        fn visit_literal(&mut self, _: &Literal) -> &'static str {
            "literal"
        }
        fn visit_property(&mut self, _: &PropertyReference) -> &'static str {
            "property"
        }
        fn visit_all_properties(&mut self, _: &AllProperties) -> &'static str {
            "all"
        }
        fn visit_patterns(&mut self, _: &PatternList) -> &'static str {
            "patterns"
        }
        fn visit_list(&mut self, _: &ListExpression) -> &'static str {
            "list"
        }
        fn visit_binary(&mut self, _: &BinaryOperator) -> &'static str {
            "binary"
        }
        fn visit_between(&mut self, _: &BetweenOperator) -> &'static str {
            "between"
        }
        fn visit_in(&mut self, _: &InOperator) -> &'static str {
            "in"
        }
        fn visit_is(&mut self, _: &IsOperator) -> &'static str {
            "is"
        }
        fn visit_not(&mut self, _: &Expr) -> &'static str {
            "not"
        }
        fn visit_negation(&mut self, _: &Expr) -> &'static str {
            "negation"
        }
        fn visit_function(&mut self, _: &FunctionExpression) -> &'static str {
            "function"
        }
        fn visit_count(&mut self, _: &CountAggregate) -> &'static str {
            "count"
        }
    }

    /// Upper-cases every string literal in place.
    struct Shout;

    impl VisitorMut for Shout {
        type Output = ();

        fn visit_literal(&mut self, literal: &mut Literal) {
            if let Literal::String(s) = literal {
                *s = s.to_uppercase();
            }
        }
        fn visit_property(&mut self, _: &mut PropertyReference) {}
        fn visit_all_properties(&mut self, _: &mut AllProperties) {}
        fn visit_patterns(&mut self, _: &mut PatternList) {}
        fn visit_list(&mut self, list: &mut ListExpression) {
            for value in &mut list.values {
                value.accept_mut(self);
            }
        }
        fn visit_binary(&mut self, op: &mut BinaryOperator) {
            op.left.accept_mut(self);
            op.right.accept_mut(self);
        }
        fn visit_between(&mut self, _: &mut BetweenOperator) {}
        fn visit_in(&mut self, op: &mut InOperator) {
            self.visit_list(&mut op.right);
        }
        fn visit_is(&mut self, _: &mut IsOperator) {}
        fn visit_not(&mut self, arg: &mut Expr) {
            arg.accept_mut(self);
        }
        fn visit_negation(&mut self, _: &mut Expr) {}
        fn visit_function(&mut self, _: &mut FunctionExpression) {}
        fn visit_count(&mut self, _: &mut CountAggregate) {}
    }

    #[test]
    fn dispatches_to_exactly_one_handler() {
        let mut graph = QueryGraph::new();
        let part = graph.add(QueryItem::new("Part"));
        let cases = [
            (Expr::lit(1), "literal"),
            (Expr::prop(part, "name"), "property"),
            (Expr::all_properties(part, false), "all"),
            (Expr::Patterns(Default::default()), "patterns"),
            (Expr::List(Default::default()), "list"),
            (Expr::and(Expr::lit(true), Expr::lit(false)), "binary"),
            (
                Expr::between(Expr::lit(1), Expr::lit(0), Expr::lit(2)),
                "between",
            ),
            (Expr::in_list(Expr::lit(1), vec![]), "in"),
            (Expr::is_null(Expr::prop(part, "name")), "is"),
            (Expr::logical_not(Expr::lit(true)), "not"),
            (Expr::negate(Expr::lit(1)), "negation"),
            (Expr::function("GETDATE", vec![]), "function"),
            (Expr::count(vec![part]), "count"),
        ];
        for (expr, expected) in cases {
            assert_eq!(expr.accept(&mut Kind), expected);
        }
    }

    #[test]
    fn mutable_visitor_rewrites_in_place() {
        let mut graph = QueryGraph::new();
        let part = graph.add(QueryItem::new("Part"));
        let mut expr = Expr::logical_not(Expr::in_list(
            Expr::prop(part, "state"),
            vec![Expr::lit("released"), Expr::lit(3)],
        ));
        expr.accept_mut(&mut Shout);
        assert_eq!(
            expr,
            Expr::logical_not(Expr::in_list(
                Expr::prop(part, "state"),
                vec![Expr::lit("RELEASED"), Expr::lit(3)],
            ))
        );
    }
}
