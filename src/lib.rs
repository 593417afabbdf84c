pub mod application;
pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod context;
pub mod error;
pub mod feed;
pub mod http;
pub mod package;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod search;

#[cfg(test)]
mod test_utils;
