//! A [`tempora_core::Backend`] implementation over an embedded [`redb`] database.

mod backend;
mod error;
mod tables;

pub use backend::RedbBackend;
