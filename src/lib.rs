pub mod archive;
pub mod catalog;
pub mod commands;
pub mod http;
pub mod manifest;
pub mod package;
pub mod repo;
pub mod resolve;
pub mod runtime;
pub mod vcs;
pub mod version;
