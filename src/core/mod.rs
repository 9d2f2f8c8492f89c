//! Document session engine: archives, assets, settings, session persistence and tabs

pub mod archive;
pub mod assets;
pub mod close;
pub mod content;
pub mod debounce;
pub mod error;
pub mod fs_util;
pub mod host;
pub mod registry;
pub mod session;
pub mod settings;
pub mod tab;

#[cfg(test)]
pub mod test_support;
