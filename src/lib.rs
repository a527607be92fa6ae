//! Console statistics service.
//!
//! Serves per-application usage statistics (messages, conversations, token
//! costs, satisfaction and workflow runs) from the console database, and owns
//! the schema migration for the company/tenant custom columns.

pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod local_date;
pub mod migration;
pub mod models;
pub mod statistics;
pub mod timerange;
pub mod web;

#[cfg(test)]
mod fixtures;
