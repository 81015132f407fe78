//! LeadFive ledger primitives.
//! Stable, protocol-neutral, behavior-free.
//!
//! Rule: money is integers in token base units. Ever.

pub mod primitives;

pub use primitives::{
    Address, AddressParseError, Amount, Bps, Timestamp, ADDRESS_LEN, BPS_DENOMINATOR,
};
