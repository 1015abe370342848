use itemql_core::ValidationError;

use crate::query::ItemRef;

/// Errors raised while transforming a query graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("cannot rewrite IN over an empty value list")]
    UnsupportedRewrite,
    #[error("query item {0} cannot be resolved")]
    UnresolvedReference(ItemRef),
    #[error("type {0:?} cannot be resolved to a type id")]
    UnresolvedType(String),
}

/// Errors raised by the text and wire renderers.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("invalid identifier: {0}")]
    Validation(#[from] ValidationError),
    #[error("{0} cannot be expressed in the wire document")]
    UnsupportedExpression(String),
    #[error("join from {left} to {right} cannot be nested in the wire document")]
    UnsupportedJoin { left: ItemRef, right: ItemRef },
    #[error("filter mixes conditions on {first} and {second}")]
    MixedTableFilter { first: ItemRef, second: ItemRef },
    #[error("offset {offset} with fetch {fetch:?} cannot be expressed as pages")]
    UnsupportedPaging { offset: u64, fetch: Option<u64> },
}
