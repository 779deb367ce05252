//! Client-side Caseflow state.
//!
//! The backend keeps nothing durable; everything a user needs to revisit a
//! case lives here, in the [`archive::CaseArchive`].

pub mod api;
pub mod archive;
pub mod chat;
pub mod config;
pub mod demo;
pub mod live;
pub mod merger;
pub mod reminders;
pub mod store;
pub mod transport;

pub use config::{Client, ClientConfig};
