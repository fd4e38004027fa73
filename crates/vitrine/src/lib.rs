//! # Vitrine Architecture
//!
//! Vitrine stores, resolves and repairs the images a marketplace attaches to
//! its stores and products. It is a library first: the `vitrine` binary is one
//! client, an HTTP server embedding the routes is another.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (vitrine-cli)                                    │
//! │  - Parses arguments, renders messages or JSON               │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs, init.rs)                                │
//! │  - Thin facade over commands                                │
//! │  - Parses owners and record ids                             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs)                              │
//! │  - Runs one operation, returns a CmdResult                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Engine (paths, resolver, reconcile, guard, cascade,        │
//! │          routes)                                            │
//! │  - Pure decisions over records and file listings            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage (store/, files/)                                   │
//! │  - ImageRecordStore: SQLite, JSON, in-memory                │
//! │  - FileBackend: uploads directory on disk, in-memory        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Canonical Layout
//!
//! Every image has exactly one canonical location derived from its owner:
//!
//! ```text
//! uploads/stores/{store_id}/{filename}
//! uploads/stores/{store_id}/products/{product_id}/{filename}
//! uploads/stores/{store_id}/.../thumbnails/{filename}
//! ```
//!
//! Records hold only the filename. Older rows that still carry a full path are
//! read through [`paths::StoredReference`] and rewritten by the reconciler.
//!
//! ## No I/O Assumptions in Core
//!
//! From `api.rs` inward, code never prints and never exits. Failures are
//! [`error::VitrineError`]s; per-action repair failures are data in a
//! [`reconcile::RepairOutcome`], not early returns.
//!
//! ## Testing Strategy
//!
//! 1. **Engine and commands**: unit tests against `MemoryRecordStore` and
//!    `MemFiles`. Most tests live here.
//! 2. **API**: dispatch and argument parsing.
//! 3. **Disk and SQLite**: integration tests under `tests/` on temp directories.
//! 4. **CLI**: end-to-end tests in `vitrine-cli/tests`.
//!
//! ## Module Overview
//!
//! - [`model`]: owners, record ids, image records
//! - [`paths`]: canonical path building and filename validation
//! - [`store`]: image record persistence
//! - [`files`]: uploads tree access
//! - [`resolver`]: primary image resolution with bounded fallback
//! - [`reconcile`]: diagnose and repair records against files
//! - [`guard`]: safe serving of uploads paths
//! - [`cascade`]: the client-side image fallback state machine
//! - [`routes`]: primary-image endpoints and upload serving
//! - [`config`]: layered configuration

pub mod api;
pub mod cascade;
pub mod commands;
pub mod config;
pub mod error;
pub mod files;
pub mod guard;
pub mod init;
pub mod model;
pub mod paths;
pub mod reconcile;
pub mod resolver;
pub mod routes;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
