//! Domain types: records, macros, settings and the events the services publish.

pub mod error;
pub mod glucose;
pub mod models;
pub mod racp;
pub mod readings;
pub mod settings;
pub mod uart;
