//! `carlot-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, money, the domain error model and the clock capability.

pub mod clock;
pub mod error;
pub mod id;
pub mod money;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{PaymentId, SaleId, VehicleId};
pub use money::Price;
