//! Shared configuration, errors and data types for the Herald notification service.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
