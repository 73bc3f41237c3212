//! Public entry points for the command-line binary.

pub mod cli;
