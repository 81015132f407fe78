//! Pure helpers: input parsing, data-directory layout and event rendering.
//! Nothing here touches the ledger or prints.

pub mod amounts;
pub mod describe;
pub mod paths;

pub use amounts::{format_amount, parse_address, parse_amount};
pub use describe::describe_event;
pub use paths::DataPaths;
