//! CLI subcommands.

pub mod common;
pub mod geodesic;
pub mod locate;
pub mod maps;
pub mod view;
