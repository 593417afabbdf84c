//! Multi-repository search.

mod coordinator;
mod filter;

pub use coordinator::{PAGE_SIZE, SearchCoordinator, SearchOutcome, SearchRequest};
pub use filter::ResourceFilter;
pub(crate) use filter::CASE_INSENSITIVE;
