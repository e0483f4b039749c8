// src/exec/mod.rs

//! Process execution layer.
//!
//! Collaborators shipped with gatedag (planner, stage processor, synthesizer)
//! are external commands. This module owns spawning them with
//! `tokio::process::Command`, feeding stdin, applying timeouts and reading
//! stdout either in one piece ([`shell::run_capture`]) or line by line
//! ([`shell::run_streaming`]).

pub mod shell;

pub use shell::{run_capture, run_streaming};
