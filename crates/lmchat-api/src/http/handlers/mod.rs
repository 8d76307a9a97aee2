//! HTTP request handlers for the persistence proxy.

pub mod chat;
pub mod models;
