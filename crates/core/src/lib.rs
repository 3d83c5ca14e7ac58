//! Core library for OpenClaw Board
//!
//! This crate contains the domain types shared by the execution engine and
//! the API server:
//! - Task model (the payload a board hands to the execution core)
//! - Agent profiles and selection
//! - Instruction payload rendering for the worker

pub mod agent;
pub mod task;
