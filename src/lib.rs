//! rset - deferred, composable resultsets
//!
//! A resultset is an immutable query specification: searching, ordering,
//! joining or paging one produces a new resultset, and no query runs until
//! rows are actually asked for.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         rset Database                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  Condition  │  │  ResultSet  │  │   Schema Registry       │  │
//! │  │  Parser     │  │  Builders   │  │   (Result Sources)      │  │
//! │  └──────┬──────┘  └──────┬──────┘  └───────────┬─────────────┘  │
//! │         │                │                     │                │
//! │         ▼                ▼                     ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │          Query Specification (SelectSpec, ...)              ││
//! │  └───────────────┬─────────────────────────────┬───────────────┘│
//! │                  │                             │                │
//! │                  ▼                             ▼                │
//! │  ┌───────────────────────────┐  ┌─────────────────────────────┐ │
//! │  │  Query Compiler           │  │  Storage (lazy cursor,      │ │
//! │  │  SQL + ordered binds      │  │  terminals)                 │ │
//! │  └───────────────────────────┘  └──────────────┬──────────────┘ │
//! │                                                │                │
//! │                                                ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │        Memory tables  /data/{table}.yaml                    ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod database;
pub mod demo;
pub mod error;
pub mod resultset;
pub mod schema;
pub mod storage;
pub mod validation;
pub mod value;

pub use config::Config;
pub use database::Database;
pub use error::{Error, Result};
pub use resultset::{Attributes, Cursor, Pager, ResultSet, ResultSetOptions};
pub use schema::{ResultSource, SchemaRegistry};
pub use storage::{MemoryStorage, Storage};
pub use value::{Row, Value};
