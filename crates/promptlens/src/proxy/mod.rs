//! The capturing proxy: transparent forwarding plus trace capture.

pub mod forward;
pub mod server;
pub mod stats;

pub use server::{run, AppState};
