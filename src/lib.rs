// ABOUTME: Library root for fastssh - remote commands and file transfer over SSH.
// ABOUTME: The command-line binary is in main.rs.

pub mod config;
pub mod error;
pub mod ssh;
