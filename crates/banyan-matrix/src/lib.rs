//! Matrix expansion: turning a task's declared dimensions into an ordered
//! list of execution variants.
//!
//! A matrix declares named dimensions with candidate values. Expansion takes
//! the cartesian product in declaration order, appends `include` tuples,
//! removes `exclude` matches and finally applies the invocation's
//! command-line filter. The resulting order is stable and observable:
//! sequence numbers derived from it reach task aggregators.

mod entry;
mod filter;
mod spec;

pub use entry::MatrixEntry;
pub use filter::MatrixFilter;
pub use spec::MatrixSpec;
