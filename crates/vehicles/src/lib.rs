//! Vehicle catalog domain module.
//!
//! This crate contains the rules for catalog entries (what a valid vehicle is and
//! how partial updates apply), implemented as deterministic domain logic
//! (no IO, no HTTP, no storage).

pub mod vehicle;

pub use vehicle::{NewVehicle, Vehicle, VehicleUpdate};
