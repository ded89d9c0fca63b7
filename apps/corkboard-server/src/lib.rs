#![forbid(unsafe_code)]

mod server;

pub use server::*;
