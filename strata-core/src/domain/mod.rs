//! Core domain types
//!
//! This module contains the structures the orchestration core reasons about.
//! They are shared between the engine (which mutates them during a run) and
//! the client and CLI (which serialize definitions and reports).

pub mod credential;
pub mod log;
pub mod resource;
pub mod rollout;
pub mod run;
pub mod stage;
