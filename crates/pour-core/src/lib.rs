pub mod config;
pub mod logging;

pub mod archive;
pub mod checksum;
pub mod control;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod install;
pub mod pipeline;
pub mod platform;
pub mod retry;
pub mod smoke;
pub mod url_model;
