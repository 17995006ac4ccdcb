//! cardsync - one-way flashcard sync agent
//!
//! Pulls flashcards from a remote spaced-repetition service and reconciles
//! them into a local note collection. Safe to run on every startup: re-runs
//! are idempotent and an interrupted run resumes from its last checkpoint.
//!
//! # Architecture
//!
//! - [`sync`] - Reconciliation core (mapper, resolver, planner, executor, coordinator)
//! - [`model`] - Remote flashcard and local note types
//! - [`storage`] - Host collection traits and the SQLite collection
//! - [`remote`] - Remote change feed trait and HTTP client
//! - [`auth`] - OAuth loopback login
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
