//! # Symbol Chatter
//!
//! Incremental collector of social-media chatter about listed stock symbols.
//!
//! For every symbol in a symbol table, Symbol Chatter searches Reddit
//! (submissions and comments) and Twitter for posts mentioning it, and
//! appends new posts to one delimited archive file per symbol and post
//! kind. Runs resume from the newest archived post, so repeated runs only
//! fetch what is new.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Symbol table │──▶│ Query plans │──▶│ Worker pool  │──▶│ Archives  │
//! │   (catalog)  │   │  + filter   │   │  (fetchers)  │   │ CSV/PSV   │
//! └──────────────┘   └─────────────┘   └──────┬───────┘   └───────────┘
//!                                             │
//!                                      ┌──────▼───────┐
//!                                      │ Identity gate│
//!                                      │ (Tor control)│
//!                                      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chatter --reddit                 # update subreddit archives
//! chatter --twitter                # update tweet archives
//! chatter --all --progress json    # both, with JSON progress on stderr
//! chatter --status                 # what is on disk
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`catalog`] | Symbol table loading and selection |
//! | [`query`] | Query plans and the cashtag collision filter |
//! | [`sanitize`] | Delimiter-safe field cleaning |
//! | [`archive`] | Append-only archive files and resume cursors |
//! | [`identity`] | Network identity rotation |
//! | [`fetch`] | Incremental fetcher |
//! | [`pool`] | Worker pool |
//! | [`connector_reddit`] | Reddit source |
//! | [`connector_twitter`] | Twitter source |

pub mod archive;
pub mod catalog;
pub mod config;
pub mod connector_reddit;
pub mod connector_twitter;
pub mod dictionary;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod models;
pub mod pool;
pub mod progress;
pub mod query;
pub mod sanitize;
pub mod status;
pub mod traits;
pub mod update;
