//! wraith-vt: terminal emulation engine for Wraith.
//!
//! Provides a small Rust API over `alacritty_terminal`. This crate parses PTY
//! output into a terminal grid and collects the bytes the terminal wants to
//! write back to the shell (device status replies).
//! Rendering is left to the presentation layer.

pub mod terminal;

pub use terminal::VtTerminal;
