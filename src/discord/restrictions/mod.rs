// Discord adapters for channel restrictions.

pub mod commands;
pub mod handler;
pub mod sink;
