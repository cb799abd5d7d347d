//! Fungus identification by average-hash distance against a flat directory of
//! labeled reference images.

pub mod api;
pub mod config;
pub mod database;
pub mod hashing;
pub mod matcher;
pub mod pages;
pub mod store;
