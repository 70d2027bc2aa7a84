//! Keyed record stores over the normalized tables.
//!
//! Write functions take a [`rusqlite::Connection`] (or a transaction that
//! derefs to one) so the synchronization applier can compose them inside
//! a single atomic block; reads go through the [`Backend`] adapter.
//!
//! [`Backend`]: crate::backend::Backend

pub mod accounts;
pub mod chain;
pub mod notes;
pub mod settings;
pub mod tags;
pub mod transactions;
