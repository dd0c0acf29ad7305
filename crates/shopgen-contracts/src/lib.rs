pub mod catalog;
pub mod error;
pub mod events;
pub mod models;
pub mod providers;
pub mod runs;
