//! The read side of Chronicle: turning activity entries and revisions into
//! paginated, human-readable timelines.
//!
//! Works against any [`chronicle_core::store::AuditStore`]. Each entry is
//! projected independently, so one unreadable revision degrades to a
//! placeholder instead of failing the page.
//!
//! # Reading a provider's timeline
//!
//! ```rust,ignore
//! let timeline = Timeline::new(store, ActivityConfig::default());
//! let page = timeline
//!   .timeline(&TimelineFilter::entity(provider_id), PageRequest::page(1, 25))
//!   .await?;
//! ```

pub mod config;
pub mod error;
pub mod links;
pub mod projector;
pub mod summary;
pub mod timeline;

pub use config::ActivityConfig;
pub use error::{Error, Result};
pub use timeline::{
  LastChanged, LastChangedOptions, Timeline, TimelineFilter, TimelineItem,
  TimelinePage,
};

#[cfg(test)]
mod tests;
