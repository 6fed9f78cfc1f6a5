//! # rssforward
//!
//! Turns websites without usable feeds into RSS files and serves them locally.
//!
//! ## Architecture
//!
//! A set of independent generators runs on a timer in a background thread:
//!
//! ```text
//! Scheduler → Manager → Registry → Generator.generate() → OutputWriter → FeedServer
//!                          ↑                                  ↓
//!                     AuthResolver                       watermark
//! ```
//!
//! - [`scheduler`]: background loop with stop / run-now / health callback
//! - [`manager`]: one sequential cycle with per-generator failure isolation
//! - [`registry`]: builds and authenticates generators in config order
//! - [`generator`]: the `Generator` trait and the built-in catalog
//! - [`server`]: static file server for the output tree
//!
//! ## Quick Start
//!
//! ```bash
//! # Generate feeds every refresh interval and serve them on :8080
//! rssforward -c config.toml
//!
//! # One cycle, no server
//! rssforward -c config.toml generate
//!
//! # What is configured
//! rssforward -c config.toml list
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) owns the tokio runtime and builds the
/// manager, scheduler and server from the configuration.
pub mod app;

/// Credential resolution: RAW pairs and secret store lookups with retry.
pub mod auth;

/// Command-line interface using clap.
///
/// - `run` - generate periodically and serve (default)
/// - `generate` - one cycle
/// - `list` - configured generators
/// - `open-log` - open the log file
pub mod cli;

/// TOML configuration: `[general]`, `[secrets]` and `[[item]]` entries.
pub mod config;

/// Core domain models.
///
/// - [`GeneratorSpec`](domain::GeneratorSpec) and [`AuthSpec`](domain::AuthSpec): configured sources
/// - [`FeedChannel`](domain::FeedChannel) and [`FeedItem`](domain::FeedItem): feed contents
/// - [`Payload`](domain::Payload): named files produced by one generator run
pub mod domain;

/// RSS 2.0 rendering.
pub mod feed;

/// HTTP fetching with conditional request support.
pub mod fetcher;

pub mod generator;

pub mod manager;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`FeedItem`](domain::FeedItem) structs.
pub mod normalizer;

pub mod output;

/// Listing page loading (plain HTTP or headless Chrome) and CSS extraction.
pub mod page;

pub mod registry;

pub mod scheduler;

pub mod server;

pub mod watermark;
