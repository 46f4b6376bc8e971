pub mod errors;

pub use errors::{DatabaseError, DatabaseResult};
