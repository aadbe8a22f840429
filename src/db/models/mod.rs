#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` work.

pub mod completion;
pub mod event;
pub mod user;

// Re-export all types at the `crate::db::models` namespace.
pub use self::completion::*;
pub use self::event::*;
pub use self::user::*;
