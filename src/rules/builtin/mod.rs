//! Built-in rules and the table the registry compiles them from.

mod complexity;
mod forbidden;
mod initialization;
mod memory;
mod naming;
mod structure;
mod typing;
mod unused;
mod xpath;

use super::RuleFactory;
use crate::config::RuleProperties;
use crate::errors::ConfigError;
use crate::symbols::NameKey;
use std::sync::Arc;

pub use complexity::CyclomaticComplexity;
pub use forbidden::{ForbiddenKind, ForbiddenReference};
pub use initialization::VariableInitialization;
pub use memory::{AssignedAndFree, FreeAndNilTObject};
pub use naming::{MixedNames, NamingConvention, NamingTarget};
pub use structure::{ClassPerFile, EmptyInterface, EmptyUnit, PublicField};
pub use typing::{PlatformDependentCast, PlatformDependentTruncation, RedundantAssignment, UnicodeToAnsiCast};
pub use unused::{ImportSpecificity, UnusedImport, UnusedLocalVariable};
pub use xpath::XPathRule;

type Build = fn(&RuleProperties) -> Result<RuleFactory, ConfigError>;

/// A rule the registry can instantiate by key.
#[derive(Clone, Copy)]
pub struct RuleDefinition {
    pub key: &'static str,
    pub description: &'static str,
    /// Only usable through `template:` with a rule key of the caller's
    /// choosing.
    pub is_template: bool,
    pub build: Build,
}

impl std::fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("key", &self.key)
            .field("is_template", &self.is_template)
            .finish()
    }
}

/// Factory for a rule without properties.
fn stateless<R: super::Rule + Default + 'static>() -> RuleFactory {
    Arc::new(|| Box::new(R::default()))
}

const fn rule(key: &'static str, description: &'static str, build: Build) -> RuleDefinition {
    RuleDefinition {
        key,
        description,
        is_template: false,
        build,
    }
}

pub const BUILTIN_RULES: &[RuleDefinition] = &[
    rule(
        "AssignedAndFree",
        "Nil check immediately before Free or FreeAndNil",
        |_| Ok(stateless::<AssignedAndFree>()),
    ),
    rule("ClassPerFile", "Too many classes in one file", ClassPerFile::build),
    rule("EmptyUnit", "Unit without declarations or statements", |_| {
        Ok(stateless::<EmptyUnit>())
    }),
    rule("EmptyInterface", "Interface without members", |_| {
        Ok(stateless::<EmptyInterface>())
    }),
    rule("RedundantAssignment", "Variable assigned to itself", |_| {
        Ok(stateless::<RedundantAssignment>())
    }),
    rule("UnusedLocalVariable", "Local variable never read", |_| {
        Ok(stateless::<UnusedLocalVariable>())
    }),
    rule(
        "VariableInitialization",
        "Local variable read before initialization",
        |_| Ok(stateless::<VariableInitialization>()),
    ),
    rule(
        "PlatformDependentCast",
        "Cast between pointer-sized and fixed-width integers",
        |_| Ok(stateless::<PlatformDependentCast>()),
    ),
    rule(
        "PlatformDependentTruncation",
        "Assignment truncating a pointer-sized integer",
        |_| Ok(stateless::<PlatformDependentTruncation>()),
    ),
    rule("UnicodeToAnsiCast", "Unicode data narrowed to Ansi", |_| {
        Ok(stateless::<UnicodeToAnsiCast>())
    }),
    rule("FreeAndNilTObject", "FreeAndNil on a non-object", |_| {
        Ok(stateless::<FreeAndNilTObject>())
    }),
    rule("ForbiddenMethod", "Use of a blacklisted routine", |props| {
        ForbiddenReference::build(ForbiddenKind::Method, props)
    }),
    rule("ForbiddenType", "Use of a blacklisted type", |props| {
        ForbiddenReference::build(ForbiddenKind::Type, props)
    }),
    rule("ForbiddenIdentifier", "Use of a blacklisted declaration", |props| {
        ForbiddenReference::build(ForbiddenKind::Identifier, props)
    }),
    rule(
        "CyclomaticComplexity",
        "Routine with too many decision points",
        CyclomaticComplexity::build,
    ),
    rule("ClassName", "Class naming convention", |props| {
        NamingConvention::build(NamingTarget::Class, props)
    }),
    rule("EnumName", "Enumeration naming convention", |props| {
        NamingConvention::build(NamingTarget::Enum, props)
    }),
    rule("InterfaceName", "Interface naming convention", |props| {
        NamingConvention::build(NamingTarget::Interface, props)
    }),
    rule("FieldName", "Field naming convention", |props| {
        NamingConvention::build(NamingTarget::Field, props)
    }),
    rule("PublicField", "Field declared public or published", |_| {
        Ok(stateless::<PublicField>())
    }),
    rule("MixedNames", "Reference spelled differently from its declaration", |_| {
        Ok(stateless::<MixedNames>())
    }),
    rule("UnusedImport", "Unit imported but never referenced", |_| {
        Ok(stateless::<UnusedImport>())
    }),
    rule(
        "ImportSpecificity",
        "Interface import only used by the implementation",
        |_| Ok(stateless::<ImportSpecificity>()),
    ),
    RuleDefinition {
        key: "XPathTemplate",
        description: "Path query over the syntax tree",
        is_template: true,
        build: XPathRule::build,
    },
];

/// Look up a built-in rule or template by key, ignoring case.
pub fn definition(key: &str) -> Option<&'static RuleDefinition> {
    let key = NameKey::new(key);
    BUILTIN_RULES.iter().find(|d| NameKey::new(d.key) == key)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::RuleSettings;
    use crate::phases::resolution_phase::tests::Project;
    use crate::rules::{run_rules, FileModel, Issue, RuleRegistry};
    use crate::stdlib::BUILTIN_UNITS;
    use crate::symbols::UnitId;
    use indexmap::IndexMap;
    use std::path::Path;

    /// Run one configured rule over the first source; the other sources
    /// are only there to be used.
    pub(crate) fn check_with(key: &str, settings: RuleSettings, sources: &[&str]) -> Vec<Issue> {
        let mut rules = IndexMap::new();
        rules.insert(key.to_string(), settings);
        let (registry, diagnostics) = RuleRegistry::compile(&rules);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let project = Project::new(sources);
        let resolution = project.resolve(0);
        let model = FileModel {
            path: Path::new("src/unit0.pas"),
            unit: UnitId(BUILTIN_UNITS.len() as u32),
            file: project.file(0),
            index: &project.index,
            resolution: &resolution,
        };
        let mut issues = run_rules(&registry, &model);
        issues.sort();
        issues.dedup();
        issues
    }

    pub(crate) fn check(key: &str, source: &str) -> Vec<Issue> {
        check_with(key, RuleSettings::new(), &[source])
    }

    pub(crate) fn lines(issues: &[Issue]) -> Vec<Option<u32>> {
        issues.iter().map(|i| i.start_line).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_keys_are_unique() {
        let mut keys: Vec<_> = BUILTIN_RULES.iter().map(|d| d.key.to_lowercase()).collect();
        keys.sort();
        let before = keys.len();
        keys.dedup();
        assert_eq!(before, keys.len());
    }

    #[test]
    fn test_definition_lookup() {
        assert_eq!(definition("classperfile").map(|d| d.key), Some("ClassPerFile"));
        assert!(definition("XPathTemplate").is_some_and(|d| d.is_template));
        assert!(definition("Nope").is_none());
    }
}
