//! # Prompt Docs
//!
//! Incremental, content-addressed document indexing with a
//! retrieval-augmented question loop on top.
//!
//! Files in one source directory are digested (MD5 of their bytes) and
//! compared against an append-only hash ledger; only content never seen
//! before is extracted, embedded and written to a SQLite-backed vector
//! index. Questions are answered by a language model given the closest
//! indexed fragments as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────────┐   ┌──────────────┐
//! │ Source dir │──▶│    Pipeline     │──▶│ Vector index │
//! │  (*.pdf)   │   │ extract+embed  │   │   (SQLite)   │
//! └────────────┘   └───────┬────────┘   └──────┬───────┘
//!                          │ then               │ search
//!                          ▼                    ▼
//!                   ┌────────────┐       ┌────────────┐
//!                   │ Hash ledger│       │ Chat loop  │──▶ LLM
//!                   └────────────┘       └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdocs init                # create the index and collection
//! pdocs index               # index new or changed files
//! pdocs chat                # ask questions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `[HH:MM:SS]` console logging |
//! | [`ledger`] | Content digests and the hash ledger |
//! | [`connector_fs`] | Source directory scan |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`chunk`] | Fragment splitting |
//! | [`embedding`] | Embedding function abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`index`] | Vector index adapter |
//! | [`ingest`] | Incremental indexing pipeline |
//! | [`llm`] | Language model binding |
//! | [`prompt`] | Prompt templates |
//! | [`chat`] | Retrieval-augmented query loop |
//! | [`models`] | Core data types |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod ledger;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod prompt;
