//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the sorter workspace.
//! Business crates depend only on this crate for their cross-component types;
//! reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All timestamps are monotonic `std::time::Instant` values taken on arrival
//! - Weights travel as grams (`f64`), dimensions as millimetres (`f64`)

mod actuation;
mod blueprint;
mod connection;
mod error;
mod parcel;
mod resolver;
mod transport;
mod weight;

pub use actuation::*;
pub use blueprint::*;
pub use connection::ConnectionState;
pub use error::*;
pub use parcel::*;
pub use resolver::{ChuteResolver, LocalChuteResolver};
pub use transport::*;
pub use weight::*;
