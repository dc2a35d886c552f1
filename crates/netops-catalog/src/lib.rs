//! Operation catalog for the netops action engine
//!
//! Each named operation composes one or more dashboard calls into a domain
//! action: port updates over a range, traffic aggregation, root-cause
//! correlation, and a table of single-call endpoints.
//!
//! ```no_run
//! use netops_catalog::default_catalog;
//!
//! let catalog = default_catalog();
//! for def in catalog.definitions() {
//!     println!("{}: {}", def.name, def.description);
//! }
//! ```

pub mod aggregate;
pub mod entries;
pub mod operation;
pub mod range;
pub mod registry;

pub use entries::default_catalog;
pub use operation::{
    analysis_prompt, BoxedOperation, Family, Operation, OperationContext, OperationOutput,
};
pub use registry::{OperationCatalog, OperationDefinition, OperationStats};
