//! Task tracker for small teams.
//!
//! Workers, positions, projects, teams, tags, task types and tasks, with a task
//! completion lifecycle, a per-kind permission gate, task search and a generic
//! CRUD flow, served over HTTP.

pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod types;
pub mod validation;
pub mod web;
