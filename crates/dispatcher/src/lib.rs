//! # Dispatcher
//!
//! Actuator bus dispatch.
//!
//! Responsibilities:
//! - Queue routed parcels without blocking the caller
//! - Bound concurrent chute sequences with permits
//! - Serialize car commands on the shared bus with sequence numbering
//! - Built-in prefix routing for lines without a rule engine

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod resolver;
pub mod sequence;

pub use contracts::{ActuationPlan, ParcelEvent};
pub use dispatcher::ActuationDispatcher;
pub use error::{ActuationError, Result};
pub use handle::DispatcherHandle;
pub use metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
pub use resolver::DefaultChuteResolver;
pub use sequence::SequenceCounter;
pub use tokio_util::sync::CancellationToken;
