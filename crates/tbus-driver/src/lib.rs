//! NK-IPS Router Driver
//!
//! Drives a Ross NK-series router through its NK-IPS T-Bus over TCP
//! interface:
//! - [`SessionManager`] keeps one supervised connection alive (handshake,
//!   heartbeat, delayed reconnect)
//! - [`StagingStore`] accumulates multi-stage level/destination/source
//!   selections per controller
//! - [`RouterDriver`] ties both together behind [`RouterDriver::dispatch`]
//!
//! ```no_run
//! use tbus_driver::{Command, RouterDriver};
//! use tbus_core::{CrosspointCommand, Level};
//!
//! # async fn run() -> tbus_driver::Result<()> {
//! let driver = RouterDriver::builder("10.0.0.20")
//!     .address(254)
//!     .sources(144)
//!     .destinations(144)
//!     .build()?;
//!
//! driver.start()?;
//! driver.dispatch(Command::DirectCrosspoint(CrosspointCommand::new(
//!     Level::SdiVideo,
//!     5,
//!     10,
//! )))?;
//! driver.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod driver;
pub mod error;
pub mod registration;
pub mod session;
pub mod staging;
pub mod status;

pub use builder::RouterDriverBuilder;
pub use config::{DriverConfig, StagingConfig};
pub use driver::{ActionParams, Command, DispatchOutcome, RouterDriver};
pub use error::{DriverError, Result, SessionError};
pub use registration::{FunctionDescriptor, FunctionId, ProviderRegistration, REGISTRATION};
pub use session::{SessionConfig, SessionManager, SessionState};
pub use staging::{ControllerId, StagingEntry, StagingField, StagingIncomplete, StagingStore};
pub use status::{DeviceStatus, LogSink, StatusSink, StatusUpdate};
