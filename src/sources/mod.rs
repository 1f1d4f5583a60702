pub mod invoker;
pub mod mapping;
pub mod traits;

pub use invoker::SqlProcedureInvoker;
pub use mapping::SqlMappingSource;
pub use traits::{MappingSource, ProcedureInvoker};
