//! Calendar event engine: optimistic writes, grace periods, conflict retries.
//!
//! This crate provides the workflows the calendar UI runs against a
//! calendar server:
//! - Create, modify and remove events, including single occurrences of
//!   recurring series
//! - Deferred writes the user can cancel during a grace period
//! - Automatic retry on version conflicts
//! - A registration ledger of local deltas for rendering
//! - A live update hub fanning changes out to attendees
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use calsync_core::{CalendarEvent, EventTime};
//! use calsync_engine::CalendarEngine;
//! use calsync_transport::CreateOptions;
//! use calsync_transport::caldav::{CalDavConfig, CalDavTransport};
//! use chrono::{Duration, Utc};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(CalDavTransport::new(CalDavConfig::new("https://dav.example.com/")?)?);
//!     let engine = CalendarEngine::builder(transport.clone(), transport).build()?;
//!
//!     let start = Utc::now();
//!     let mut event = CalendarEvent::new(
//!         "abc",
//!         "Standup",
//!         EventTime::from_utc(start),
//!         EventTime::from_utc(start + Duration::minutes(15)),
//!     );
//!     engine
//!         .create_event("default", "/calendars/home1/default", &mut event, CreateOptions::with_grace_period())
//!         .await?;
//!     Ok(())
//! }
//! ```

mod config;
mod emitter;
mod engine;
mod error;
mod grace;
mod ledger;
mod live;
mod master_cache;
mod notify;
mod significance;
#[cfg(test)]
mod testing;

pub use config::{EngineConfig, EngineSettings};
pub use emitter::{BroadcastEmitter, EventEmitter, UiSignal};
pub use engine::{
    CalendarEngine, CalendarEngineBuilder, ModifyOptions, RollbackHandler, WorkflowOutcome,
};
pub use error::{EngineError, EngineResult, Operation};
pub use grace::{CancelOutcome, GraceManager, GraceMessages, GraceOutcome, GraceTask};
pub use ledger::{DeltaKind, Registration, RegistrationLedger, SharedLedger, shared_ledger};
pub use live::LiveHub;
pub use master_cache::MasterEventCache;
pub use notify::{DesktopNotifier, DesktopNotifierConfig, TracingNotifier, UserNotifier};
pub use significance::{ChangeComparator, DefaultComparator};
