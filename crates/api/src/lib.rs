//! `campusmarket-api` — HTTP surface for the campus marketplace.

pub mod app;
pub mod context;
pub mod middleware;
