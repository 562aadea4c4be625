//! Per-owner health-record document repository over a remote blob store.
//!
//! The [`services`] module holds the synchronization core: the registry of
//! an owner's documents and the upload, retrieval and deletion managers that
//! keep it consistent with the store. [`startup`] and [`handlers`] expose it
//! over HTTP.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use error::DocumentError;
