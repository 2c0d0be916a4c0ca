//! HTTP route handlers.

pub mod accounts;
pub mod activity;
pub mod orders;
pub mod system;
pub mod toggles;
