pub mod cli;
pub mod csv;
pub mod script;
