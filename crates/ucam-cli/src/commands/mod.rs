pub mod audit;
pub mod catalog;
pub mod policy;
pub mod rules;
