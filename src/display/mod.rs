// src/display/mod.rs
//! Listeners that present provider events to a user

pub mod terminal;

pub use terminal::TerminalListener;
