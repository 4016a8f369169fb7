//! Digital business cards with shareable public links and claimable NFC tags
//!
//! This module exposes internal components for testing and for the binary.

pub mod cards;
pub mod claim;
pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod links;
pub mod middleware;
pub mod model;
pub mod password;
pub mod route;
pub mod token;
pub mod users;
