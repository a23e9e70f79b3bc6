//! Sales domain module.
//!
//! A sale is the durable record of one purchase attempt. This crate owns the
//! closed status enumeration and the state machine that moves a sale from
//! `PENDING` to a terminal outcome, implemented as deterministic domain logic
//! (no IO, no HTTP, no storage).

pub mod sale;

pub use sale::{buyer_document, NewSale, Sale, SaleStatus, Transition};
