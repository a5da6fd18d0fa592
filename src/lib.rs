//! Parley is a full-screen terminal chat client for a lightweight chat API
//! server, with typewriter-animated markdown replies.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`render`] is the core: markdown formatting, segment extraction, and
//!   the typing animation that replays segments onto a surface.
//! - [`core`] owns runtime state: the phase machine per chat surface, the
//!   session value object, the HTTP transport, and the services that run
//!   transport calls and animations as tasks.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives user input and display updates.
//! - [`commands`] implements slash-command parsing used by the chat loop.
//! - [`api`] defines the wire payloads exchanged with the chat service.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which dispatches into [`ui::chat_loop`]
//! for interactive sessions.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod render;
pub mod ui;
pub mod utils;
