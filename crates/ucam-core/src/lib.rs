//! UCAM Core: domain models, error taxonomy, repository traits, the
//! access rule evaluator and typed warehouse statement builders.
//!
//! Nothing in this crate performs I/O. Storage bindings implement the
//! traits in [`repository`]; the service layer composes them.

pub mod error;
pub mod evaluator;
pub mod models;
pub mod repository;
pub mod statement;
pub mod validation;

pub use error::{UcamError, UcamResult};
pub use evaluator::{Decision, evaluate};
