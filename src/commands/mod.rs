//! One function per CLI command.
//!
//! Commands print results; progress notices come from the installer service.

pub mod config;
mod install;
mod list;
mod path;
mod remove;
mod repository;
mod run;
mod set;

pub use config::{Config, Options};
pub use install::{install, install_local, install_vcs, update};
pub use list::list;
pub use path::{libpath, path};
pub use remove::remove;
pub use repository::{deleterepo, newrepo, print_config, setup};
pub use run::run;
pub use set::{dev, set};
