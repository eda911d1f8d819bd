//! foundry-installer
//!
//! A one-shot web installer: it accepts a signed FoundryVTT download link (or
//! an uploaded archive), places the archive at a fixed path, reports progress
//! to the browser and then exits so its supervisor can continue.

pub mod config;
pub mod error;
pub mod install;
pub mod lifecycle;
pub mod progress;
pub mod service;

#[cfg(test)]
mod testing;
