use thiserror::Error;

/// Errors that can occur while resolving `uses` clauses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    /// Unit is neither analyzed nor listed in the unit map
    #[error("Unit '{name}' is not part of the project")]
    NotFound { name: String },

    /// Interface sections use each other in a cycle
    #[error("Circular unit reference: {}", .cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = UnitError::CircularReference {
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Circular unit reference: A -> B -> A");
        let err = UnitError::NotFound { name: "Vcl.Forms".into() };
        assert_eq!(err.to_string(), "Unit 'Vcl.Forms' is not part of the project");
    }
}
