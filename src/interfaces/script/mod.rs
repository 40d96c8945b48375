//! JSON-lines command scripts: one operation per line, replayed in order.

pub mod command;
pub mod command_reader;
pub mod runner;
