//! Civic issue reporting back-end.
//!
//! ## Overview
//!
//! Citizens submit infrastructure problems (potholes, broken lights, graffiti)
//! with a photo and a location. A repair team browses, searches and moves
//! each issue through its lifecycle until it is resolved or rejected.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  HTTP   ┌──────────────────────────────────────────────────┐
//! │ Citizen  │ ──────> │  server.rs  (axum Router, ServerConfig)          │
//! │   Team   │ <────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘         │         │                                        │
//!                      │         ├─ ingest.rs      submit_issue()         │
//!                      │         │     └─ blob.rs  (BlobStore trait)      │
//!                      │         ├─ query.rs       list / get / search    │
//!                      │         └─ transition.rs  update / take          │
//!                      │                   │                              │
//!                      │                   v                              │
//!                      │  db.rs  (IssueDb, DbHandle over SQLite)          │
//!                      └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module   | Responsibility                                           |
//! |----------|----------------------------------------------------------|
//! | `models` | `Issue`, `Location`, `IssueStatus` and its transitions   |
//! | `blob`   | Image storage behind `BlobStore`; `DiskBlobStore` impl    |

pub mod api;
pub mod blob;
pub mod db;
pub mod ingest;
pub mod models;
pub mod query;
pub mod server;
pub mod transition;
