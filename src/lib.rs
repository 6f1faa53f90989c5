// Library root
// ------------
// This crate exposes the library surface behind the `bwm` binary. The
// binary (`main.rs`) parses arguments and hands them to `cli::run`.
//
// Module responsibilities:
// - `paths`: reads the environment once and resolves file locations.
// - `credentials`: API key resolution and the local credentials file.
// - `config_store`: persisted settings such as the default site.
// - `api`: blocking HTTP client for the Bing Webmaster endpoints.
// - `index_status` / `diagnosis`: index checks and crawl-issue reasons.
// - `input`: date ranges, URL validation and URL lists.
// - `output`: table, JSON and CSV rendering.
// - `cli`: the command tree and per-command handlers.
// - `logging`: tracing subscriber on stderr.
//
// Only `paths` reads the process environment; everything else receives its
// paths and settings explicitly.
pub mod api;
pub mod cli;
pub mod config_store;
pub mod credentials;
pub mod diagnosis;
pub mod error;
pub mod index_status;
pub mod input;
pub mod logging;
pub mod output;
pub mod paths;

pub use error::{BwmError, Result};
