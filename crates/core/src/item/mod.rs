pub mod id;
pub mod types;
pub mod validate;

pub use id::{IdError, ItemId};
pub use types::{TypeMap, TypeProvider};
pub use validate::ValidationError;
