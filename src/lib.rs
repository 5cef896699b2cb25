//! NewsChain client core
//!
//! Session lifecycle and topic-filtered news retrieval against the hosted
//! NewsChain backend. Screens sit on top of the repositories and the
//! navigator exposed here.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod navigation;
pub mod news;
pub mod platform;
pub mod profile;
pub mod session;
pub mod topics;

#[cfg(test)]
mod test_support;
