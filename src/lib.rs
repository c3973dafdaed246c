//! # PCS Assistant
//!
//! An AI-powered chatbot backend for professional cycling statistics.
//!
//! PCS Assistant answers natural-language questions about riders, races,
//! teams, and rankings. Each chat turn is planned into a structured query
//! by a language model, executed against a cached gateway over a
//! ProCyclingStats data source, and rendered back into prose with an
//! optional chart projection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐
//! │   HTTP   │──▶│ Planner  │──▶│ Assembler │──▶│  Gateway  │
//! │  (axum)  │   │ LLM→plan │   │  dispatch │   │cache-aside│
//! └──────────┘   └──────────┘   └─────┬─────┘   └─────┬─────┘
//!                                     │               │
//!                                     ▼               ▼
//!                               ┌──────────┐   ┌───────────┐
//!                               │   LLM    │   │ Blocking  │
//!                               │ response │   │  source   │
//!                               └──────────┘   └───────────┘
//! ```
//!
//! A chat turn flows: question → [`planner`] produces a [`models::QueryPlan`]
//! (or the safe fallback) → [`assembler`] fans out over the plan's entities
//! through the [`gateway`] → the completion backend turns the gathered data
//! into prose → an optional chart projection is derived. Every failure mode
//! degrades into the response payload; a chat turn never returns an HTTP
//! error for planning, fetching, or generation problems.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and wire shapes |
//! | [`slug`] | Name → slug normalization |
//! | [`dates`] | Lenient date parsing and year extraction |
//! | [`cache`] | In-memory TTL cache with periodic sweep |
//! | [`resolver`] | Alias tables and entity resolution |
//! | [`source`] | The opaque blocking data source seam |
//! | [`gateway`] | Cache-aside fetch operations on a worker pool |
//! | [`completion`] | Completion backend abstraction (OpenAI/Anthropic) |
//! | [`planner`] | Question → query plan via the LLM |
//! | [`assembler`] | Plan execution, prose, and chart projections |
//! | [`server`] | HTTP API server |

pub mod assembler;
pub mod cache;
pub mod completion;
pub mod config;
pub mod dates;
pub mod gateway;
pub mod models;
pub mod planner;
pub mod resolver;
pub mod server;
pub mod slug;
pub mod source;
