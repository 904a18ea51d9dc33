//! CLI command implementations

pub(crate) mod apply;
pub(crate) mod build;
pub(crate) mod common;
pub(crate) mod init;
pub(crate) mod list;
pub(crate) mod rollback;
pub(crate) mod status;
pub(crate) mod verify;
