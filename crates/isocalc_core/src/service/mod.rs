//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Apply the access policy before any mutation.
//! - Keep transport layers decoupled from storage details.

pub mod catalog_service;
pub mod order_service;
