use crate::errors::ConfigError;
use crate::syntax::directives::DirectiveOptions;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Options that control parsing and the analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerOptions {
    /// Symbols defined for `{$IFDEF}` evaluation
    #[serde(default)]
    pub conditional_defines: Vec<String>,

    /// Value of `CompilerVersion` in `{$IF}` expressions (default: 36.0)
    #[serde(default = "default_compiler_version")]
    pub compiler_version: f64,

    /// Prefixes tried when a `uses` entry is not found as written
    #[serde(default = "default_unit_scope_names")]
    pub unit_scope_names: Vec<String>,

    /// Abort a single file's analysis after this many milliseconds
    #[serde(default)]
    pub file_timeout_ms: Option<u64>,

    /// Analyze files on the rayon thread pool (default: true)
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_true() -> bool {
    true
}

fn default_compiler_version() -> f64 {
    36.0
}

fn default_unit_scope_names() -> Vec<String> {
    ["System", "System.Win", "Winapi", "Vcl", "Data"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            conditional_defines: Vec::new(),
            compiler_version: default_compiler_version(),
            unit_scope_names: default_unit_scope_names(),
            file_timeout_ms: None,
            parallel: true,
        }
    }
}

impl AnalyzerOptions {
    pub fn directive_options(&self) -> DirectiveOptions {
        DirectiveOptions {
            defines: self.conditional_defines.clone(),
            compiler_version: self.compiler_version,
            rtl_version: self.compiler_version,
        }
    }
}

/// Settings of one configured rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSettings {
    #[serde(default = "default_true")]
    pub active: bool,

    /// Built-in template this rule instantiates (e.g. `XPathTemplate`)
    #[serde(default)]
    pub template: Option<String>,

    /// Raw property values, validated when the rule is compiled
    #[serde(default)]
    pub properties: IndexMap<String, String>,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            active: true,
            template: None,
            properties: IndexMap::new(),
        }
    }
}

impl RuleSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Main analyzer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub options: AnalyzerOptions,

    /// Active rules by key. Rules not listed here do not run.
    #[serde(default)]
    pub rules: IndexMap<String, RuleSettings>,
}

impl AnalyzerConfig {
    /// Parse a configuration document. Reading it from disk is up to the
    /// caller.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::InvalidDocument(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::InvalidDocument(e.to_string()))
    }

    /// Enable a rule with default properties
    pub fn enable(self, key: impl Into<String>) -> Self {
        self.with_rule(key, RuleSettings::new())
    }

    pub fn with_rule(mut self, key: impl Into<String>, settings: RuleSettings) -> Self {
        self.rules.insert(key.into(), settings);
        self
    }
}

/// Typed view over a rule's raw property values.
#[derive(Debug, Clone, Copy)]
pub struct RuleProperties<'a> {
    values: &'a IndexMap<String, String>,
}

impl<'a> RuleProperties<'a> {
    pub fn new(values: &'a IndexMap<String, String>) -> Self {
        Self { values }
    }

    /// Raw value; blank values count as absent.
    pub fn string(&self, name: &str) -> Result<Option<&'a str>, ConfigError> {
        Ok(self
            .values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty()))
    }

    pub fn required(&self, name: &str) -> Result<&'a str, ConfigError> {
        self.string(name)?
            .ok_or_else(|| ConfigError::MissingProperty(name.to_string()))
    }

    pub fn regex(&self, name: &str) -> Result<Option<Regex>, ConfigError> {
        self.string(name)?
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                    property: name.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn glob(&self, name: &str) -> Result<Option<Regex>, ConfigError> {
        self.string(name)?
            .map(|pattern| {
                glob_to_regex(pattern).map_err(|message| ConfigError::InvalidGlob {
                    property: name.to_string(),
                    message,
                })
            })
            .transpose()
    }

    /// Comma separated list; entries are trimmed and empty ones dropped.
    pub fn list(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self
            .string(name)?
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn u32(&self, name: &str) -> Result<Option<u32>, ConfigError> {
        self.string(name)?
            .map(|value| {
                value.parse::<u32>().map_err(|_| ConfigError::InvalidInteger {
                    property: name.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        self.string(name)?
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(ConfigError::InvalidBoolean {
                    property: name.to_string(),
                    value: value.to_string(),
                }),
            })
            .transpose()
    }
}

/// Translate a path glob into an anchored regex.
///
/// `**` matches across directories, `*` and `?` stay within one path
/// segment, `[...]` is a character class and `{a,b}` an alternation.
/// Backslashes in patterns are path separators.
pub(crate) fn glob_to_regex(glob: &str) -> Result<Regex, String> {
    let mut out = String::from("^");
    let chars: Vec<char> = glob.replace('\\', "/").chars().collect();
    let mut i = 0;
    let mut in_group = false;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                if chars.get(i + 1) == Some(&'/') {
                    i += 1;
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or_else(|| format!("unclosed '[' in '{}'", glob))?;
                let class: String = chars[i + 1..i + 1 + close].iter().collect();
                if class.is_empty() {
                    return Err(format!("empty character class in '{}'", glob));
                }
                let class = match class.strip_prefix('!') {
                    Some(rest) => format!("^{}", rest),
                    None => class,
                };
                out.push('[');
                out.push_str(&class.replace('\\', "\\\\"));
                out.push(']');
                i += close + 1;
            }
            '{' if !in_group => {
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    if in_group {
        return Err(format!("unclosed '{{' in '{}'", glob));
    }
    out.push('$');
    Regex::new(&out).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert!(config.options.parallel);
        assert_eq!(config.options.compiler_version, 36.0);
        assert!(config.options.unit_scope_names.contains(&"Vcl".to_string()));
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_serialize_config() {
        let config = AnalyzerConfig::default().enable("ClassPerFile");
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("unitScopeNames"));
        assert!(yaml.contains("ClassPerFile"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
options:
  conditionalDefines: [DEBUG, MSWINDOWS]
  fileTimeoutMs: 5000
rules:
  ClassPerFile:
    properties:
      max: "2"
  NoDebugCalls:
    template: XPathTemplate
    active: false
    properties:
      xpath: "//Call"
      message: "No"
"#;
        let config = AnalyzerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.options.conditional_defines, vec!["DEBUG", "MSWINDOWS"]);
        assert_eq!(config.options.file_timeout_ms, Some(5000));
        assert_eq!(config.options.compiler_version, 36.0);
        let class_per_file = &config.rules["ClassPerFile"];
        assert!(class_per_file.active);
        assert_eq!(class_per_file.properties["max"], "2");
        let template = &config.rules["NoDebugCalls"];
        assert!(!template.active);
        assert_eq!(template.template.as_deref(), Some("XPathTemplate"));
    }

    #[test]
    fn test_invalid_document() {
        let err = AnalyzerConfig::from_yaml("rules: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument(_)));
    }

    #[test]
    fn test_typed_properties() {
        let settings = RuleSettings::new()
            .property("max", " 3 ")
            .property("flag", "yes")
            .property("names", "A, ,B ,C")
            .property("pattern", "^T[A-Z]")
            .property("broken", "(")
            .property("count", "three");
        let props = RuleProperties::new(&settings.properties);
        assert_eq!(props.u32("max").unwrap(), Some(3));
        assert_eq!(props.u32("missing").unwrap(), None);
        assert_eq!(props.bool("flag").unwrap(), Some(true));
        assert_eq!(props.list("names").unwrap(), vec!["A", "B", "C"]);
        assert!(props.regex("pattern").unwrap().unwrap().is_match("TFoo"));
        assert!(matches!(props.regex("broken"), Err(ConfigError::InvalidRegex { .. })));
        assert!(matches!(props.u32("count"), Err(ConfigError::InvalidInteger { .. })));
        assert!(matches!(props.required("nothing"), Err(ConfigError::MissingProperty(_))));
    }

    #[test]
    fn test_glob_translation() {
        let glob = glob_to_regex("**/generated/*.pas").unwrap();
        assert!(glob.is_match("src/generated/Foo.pas"));
        assert!(glob.is_match("generated/Foo.pas"));
        assert!(!glob.is_match("src/generated/sub/Foo.pas"));

        let glob = glob_to_regex("src\\Test?.{pas,dpr}").unwrap();
        assert!(glob.is_match("src/Test1.pas"));
        assert!(glob.is_match("src/TestA.dpr"));
        assert!(!glob.is_match("src/Test12.pas"));

        assert!(glob_to_regex("src/[abc.pas").is_err());
        assert!(glob_to_regex("src/{a,b.pas").is_err());
    }
}
