//! Middleware modules
//!
//! Contains the signed session cookie layer.

pub mod session;
