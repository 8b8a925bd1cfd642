//! Overload resolution
//!
//! Candidates are filtered by arity, then each argument is ranked against
//! the corresponding parameter. A candidate wins when no other candidate is
//! at least as good on every argument and strictly better on one. Ties and
//! empty results give no binding at all, so callers fall back to `Unknown`.

use super::type_resolution::ParamType;
use crate::core::type_compat::{MatchRank, TypeCompatibility};
use crate::symbols::DeclId;
use crate::types::{TypeArena, TypeId};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub decl: DeclId,
    pub params: Vec<ParamType>,
    /// Accepts any number of trailing arguments (`Write`, `Format`-like
    /// intrinsics).
    pub variadic: bool,
}

impl Candidate {
    fn required(&self) -> usize {
        self.params.iter().filter(|p| !p.has_default).count()
    }

    fn accepts_arity(&self, count: usize) -> bool {
        count >= self.required() && (self.variadic || count <= self.params.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Unique(DeclId),
    /// More than one candidate matches equally well.
    Ambiguous,
    NoMatch,
}

impl Selection {
    pub fn decl(self) -> Option<DeclId> {
        match self {
            Selection::Unique(decl) => Some(decl),
            Selection::Ambiguous | Selection::NoMatch => None,
        }
    }
}

/// Pick the best candidate for a call with the given argument types.
///
/// A single candidate is accepted on arity alone: with nothing to choose
/// from, argument types only matter to rules that check them.
pub fn select(arena: &TypeArena, candidates: &[Candidate], args: &[TypeId]) -> Selection {
    let applicable: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.accepts_arity(args.len()))
        .collect();

    match applicable.as_slice() {
        [] => return Selection::NoMatch,
        [only] if candidates.len() == 1 => return Selection::Unique(only.decl),
        _ => {}
    }

    let ranked: Vec<(DeclId, Vec<MatchRank>)> = applicable
        .iter()
        .filter_map(|candidate| rank(arena, candidate, args).map(|ranks| (candidate.decl, ranks)))
        .collect();

    let best: Vec<&(DeclId, Vec<MatchRank>)> = ranked
        .iter()
        .filter(|(decl, ranks)| {
            !ranked
                .iter()
                .any(|(other, other_ranks)| other != decl && dominates(other_ranks, ranks))
        })
        .collect();

    match best.as_slice() {
        [] => Selection::NoMatch,
        [(decl, _)] => Selection::Unique(*decl),
        _ => Selection::Ambiguous,
    }
}

fn rank(arena: &TypeArena, candidate: &Candidate, args: &[TypeId]) -> Option<Vec<MatchRank>> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| match candidate.params.get(i) {
            Some(param) => TypeCompatibility::match_rank(arena, *arg, param.ty, param.mode),
            None => Some(MatchRank::Untyped),
        })
        .collect()
}

fn dominates(a: &[MatchRank], b: &[MatchRank]) -> bool {
    a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::UnitId;
    use crate::syntax::ast::ParamMode;
    use crate::types::{IntKind, RealKind, StringKind, TypeKind};

    fn param(ty: TypeId) -> ParamType {
        ParamType {
            mode: ParamMode::Value,
            ty: Some(ty),
            has_default: false,
        }
    }

    fn candidate(index: usize, params: Vec<ParamType>) -> Candidate {
        Candidate {
            decl: DeclId::new(UnitId(2), index),
            params,
            variadic: false,
        }
    }

    #[test]
    fn test_exact_match_beats_widening() {
        let mut arena = TypeArena::new();
        let int = arena.intern(TypeKind::Int(IntKind::Integer));
        let int64 = arena.intern(TypeKind::Int(IntKind::Int64));
        let candidates = vec![candidate(1, vec![param(int64)]), candidate(2, vec![param(int)])];
        assert_eq!(
            select(&arena, &candidates, &[int]),
            Selection::Unique(DeclId::new(UnitId(2), 2))
        );
    }

    #[test]
    fn test_tie_is_ambiguous() {
        let mut arena = TypeArena::new();
        let int = arena.intern(TypeKind::Int(IntKind::Integer));
        let real = arena.intern(TypeKind::Real(RealKind::Double));
        let candidates = vec![
            candidate(1, vec![param(int), param(real)]),
            candidate(2, vec![param(real), param(int)]),
        ];
        assert_eq!(select(&arena, &candidates, &[int, int]), Selection::Ambiguous);
    }

    #[test]
    fn test_unknown_argument_is_ambiguous_between_overloads() {
        let mut arena = TypeArena::new();
        let int = arena.intern(TypeKind::Int(IntKind::Integer));
        let s = arena.intern(TypeKind::Str(StringKind::Unicode));
        let candidates = vec![candidate(1, vec![param(int)]), candidate(2, vec![param(s)])];
        assert_eq!(
            select(&arena, &candidates, &[TypeArena::UNKNOWN]),
            Selection::Ambiguous
        );
    }

    #[test]
    fn test_arity_filters_candidates() {
        let mut arena = TypeArena::new();
        let int = arena.intern(TypeKind::Int(IntKind::Integer));
        let mut optional = param(int);
        optional.has_default = true;
        let candidates = vec![
            candidate(1, vec![param(int), optional]),
            candidate(2, vec![param(int), param(int), param(int)]),
        ];
        assert_eq!(
            select(&arena, &candidates, &[int]),
            Selection::Unique(DeclId::new(UnitId(2), 1))
        );
        assert_eq!(select(&arena, &candidates, &[]), Selection::NoMatch);
    }

    #[test]
    fn test_single_candidate_binds_on_arity() {
        let mut arena = TypeArena::new();
        let int = arena.intern(TypeKind::Int(IntKind::Integer));
        let s = arena.intern(TypeKind::Str(StringKind::Unicode));
        let candidates = vec![candidate(1, vec![param(int)])];
        assert_eq!(
            select(&arena, &candidates, &[s]),
            Selection::Unique(DeclId::new(UnitId(2), 1))
        );
        assert_eq!(select(&arena, &candidates, &[s, s]), Selection::NoMatch);
    }

    #[test]
    fn test_incompatible_arguments_exclude_candidate() {
        let mut arena = TypeArena::new();
        let int = arena.intern(TypeKind::Int(IntKind::Integer));
        let s = arena.intern(TypeKind::Str(StringKind::Unicode));
        let candidates = vec![candidate(1, vec![param(int)]), candidate(2, vec![param(s)])];
        assert_eq!(
            select(&arena, &candidates, &[s]),
            Selection::Unique(DeclId::new(UnitId(2), 2))
        );
    }
}
