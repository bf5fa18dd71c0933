#![allow(dead_code)] // Not every test binary uses every helper

pub mod handlers;
pub mod stores;
pub mod strategies;

pub use handlers::*;
pub use stores::*;
pub use strategies::*;
