//! Shared text utilities

pub mod markup;
