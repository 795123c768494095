//! Strata Core
//!
//! Core types and abstractions for the Strata provisioning pipeline.
//!
//! This crate contains:
//! - Domain types: stages, runs, credentials, resources and traffic weights
//! - DTOs: run definitions, run reports and the wire format of external collaborators
//! - Errors: the run-level and stage-level error taxonomy
//! - Backend traits: the identity provider and provisioning backend boundaries

pub mod backend;
pub mod domain;
pub mod dto;
pub mod error;
