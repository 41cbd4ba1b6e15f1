pub mod destination;
pub mod error;
mod escape;
pub mod mirror;
pub mod records;
pub mod shutdown;
pub mod source;
pub mod table;
pub mod values;

pub use error::ErrorKind;
pub use records::{Checkpoint, Record, RecordBatch};

// re-export tokio_postgres so callers wiring up sources and destinations
// can use its types without a separate dependency
pub use tokio_postgres;
