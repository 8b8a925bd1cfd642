//! Analysis phases
//!
//! Each unit goes through two passes separated by a project-wide barrier:
//! - `declaration_phase`: collect scopes and declarations (pass 1)
//! - `forward_merge`: unify forward and full type declarations, and routine
//!   headings with their bodies
//! - `resolution_phase`: bind references and type expressions (pass 2)
//!
//! `type_resolution`, `lookup` and `overload` are the services the
//! resolution pass is built on.

pub mod declaration_phase;
pub mod forward_merge;
pub mod lookup;
pub mod overload;
pub mod resolution_phase;
pub mod type_resolution;
