//! Type compatibility predicates shared by the resolver and the rules.

pub mod type_compat;
