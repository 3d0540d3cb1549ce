//! Integration tests for peg-bot.
//!
//! These tests verify the interaction between components:
//! - Feed connection lifecycle
//! - Price events through the orchestrator to execution

pub mod common;
