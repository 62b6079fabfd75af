//! CalDAV transport implementation.
//!
//! [`CalDavTransport`] implements both [`CalendarTransport`](crate::CalendarTransport)
//! and [`GracePeriodApi`](crate::GracePeriodApi) over HTTP:
//!
//! - REPORT calendar-query for listing and searching
//! - GET / PUT / DELETE with `If-Match` / `If-None-Match` version checks
//! - `?graceperiod=true` deferred writes answered with `202 {"id": ...}`
//! - grace task cancellation with `DELETE {base}/graceperiod/api/tasks/{id}`
//!
//! # Example
//!
//! ```ignore
//! use calsync_transport::caldav::{CalDavConfig, CalDavTransport, Credentials};
//!
//! let config = CalDavConfig::new("https://dav.example.com/")?
//!     .with_credentials(Credentials::basic("user", "password"));
//! let transport = CalDavTransport::new(config)?;
//! ```

mod auth;
mod client;
mod config;
mod transport;
mod xml;

pub use auth::Credentials;
pub use config::CalDavConfig;
pub use transport::CalDavTransport;
