pub mod args;
pub mod entry;
pub mod parse;
pub mod resolve;
pub mod tags;
pub mod target;
pub mod version;
