//! Command handlers

pub mod configure;
pub mod decode;
pub mod extract;
pub mod list;
