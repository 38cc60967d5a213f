pub mod chat;
pub mod config_cmd;
pub mod run;

mod console;
mod setup;
