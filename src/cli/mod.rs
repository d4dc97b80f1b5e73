//! CLI module for phaser.

pub mod commands;

pub use commands::Cli;
