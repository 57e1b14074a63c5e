//! Logic modules: translate a detected system and a run configuration into
//! concrete package lists and a phase-ordered stage plan.
//!
//! # Modules
//!
//! - `constraint`: version constraint keys (`common`, ranges, `||`)
//! - `template`: package-name template substitution
//! - `matrix`: package matrix data model with per-axis lookups
//! - `resolver`: Package Matrix Resolver
//! - `composer`: Stage Plan Composer

pub mod composer;
pub mod constraint;
pub mod matrix;
pub mod resolver;
pub mod template;
