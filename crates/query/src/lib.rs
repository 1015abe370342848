//! Query expression core: the expression tree, the query-item graph, deep
//! copy with table rebinding, normalization passes, and the text and
//! wire-document renderers.

pub mod aml;
pub mod ast;
pub mod clone;
pub mod error;
pub mod literal;
pub mod normalize;
pub mod query;
pub mod sql;
pub mod visit;

pub use aml::{AmlNode, AmlWriter};
pub use ast::{BinaryOp, Expr, Precedence, PropertyReference};
pub use clone::{CloneMapper, CloneVisitor, DefaultMapper};
pub use error::{QueryError, RenderError};
pub use literal::{Literal, ObjectLiteral, ParameterReference, Pattern, PatternList};
pub use normalize::{expand_in, normalize, normalize_graph, Normalizer};
pub use query::{ItemRef, JoinKind, QueryGraph, QueryItem};
pub use sql::SqlWriter;
pub use visit::{Visitor, VisitorMut};
