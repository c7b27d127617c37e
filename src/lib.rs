//! Authorization and workflow engine for a three-role document review process.
//!
//! Grantees upload documents, admins bind one reviewer to each document, and
//! the bound reviewer records evaluations. [`service::ReviewService`] is the
//! entry point; [`routes`] maps it onto HTTP.

pub mod access;
pub mod assignment;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod schema;
pub mod service;
pub mod state;
pub mod storage;
pub mod store;
pub mod workflow;

pub use auth::{Identity, IdentityContext};
pub use error::{CoreError, CoreResult};
pub use service::ReviewService;
