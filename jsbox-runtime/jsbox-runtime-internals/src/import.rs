//! What an [`Instance::import`](../instance/struct.Instance.html#method.import) binds, and how
//! those bindings reach the guest's global scope.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// The bindings an import statement creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportSpec {
    /// `import name from ...`
    Default(String),
    /// `import * as name from ...`
    Namespace(String),
    /// `import { a, b as c } from ...`; each export with an optional local alias.
    Named(Vec<(String, Option<String>)>),
}

impl ImportSpec {
    pub fn named<I, S>(names: I) -> ImportSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ImportSpec::Named(names.into_iter().map(|n| (n.into(), None)).collect())
    }

    /// Exports bound under local aliases, e.g. `("default", "aliasedDefault")`.
    pub fn aliased<I, K, V>(pairs: I) -> ImportSpec
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ImportSpec::Named(
            pairs
                .into_iter()
                .map(|(export, local)| (export.into(), Some(local.into())))
                .collect(),
        )
    }

    /// The text between `import` and `from`.
    pub fn clause(&self) -> String {
        match self {
            ImportSpec::Default(name) => name.clone(),
            ImportSpec::Namespace(name) => format!("* as {}", name),
            ImportSpec::Named(names) => {
                let items: Vec<String> = names
                    .iter()
                    .map(|(export, local)| match local {
                        Some(local) => format!("{} as {}", export, local),
                        None => export.clone(),
                    })
                    .collect();
                format!("{{ {} }}", items.join(", "))
            }
        }
    }

    /// The local names the import statement binds.
    pub fn bindings(&self) -> Vec<&str> {
        match self {
            ImportSpec::Default(name) | ImportSpec::Namespace(name) => vec![name.as_str()],
            ImportSpec::Named(names) => names
                .iter()
                .map(|(export, local)| local.as_deref().unwrap_or(export))
                .collect(),
        }
    }

    /// Code assigning every binding to the guest's global object.
    pub fn default_exposure(&self) -> String {
        self.bindings()
            .iter()
            .map(|name| format!("globalThis.{0} = {0};", name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `"* as name"` is a namespace import; anything else names the default export.
impl From<&str> for ImportSpec {
    fn from(spec: &str) -> ImportSpec {
        let spec = spec.trim();
        match spec.strip_prefix("* as ") {
            Some(name) => ImportSpec::Namespace(name.trim().to_owned()),
            None => ImportSpec::Default(spec.to_owned()),
        }
    }
}

impl From<String> for ImportSpec {
    fn from(spec: String) -> ImportSpec {
        ImportSpec::from(spec.as_str())
    }
}

impl From<Vec<&str>> for ImportSpec {
    fn from(names: Vec<&str>) -> ImportSpec {
        ImportSpec::named(names)
    }
}

impl From<&[&str]> for ImportSpec {
    fn from(names: &[&str]) -> ImportSpec {
        ImportSpec::named(names.iter().copied())
    }
}

/// The glue module that pulls `spec` out of the module named `module_name`.
pub(crate) fn glue_source(spec: &ImportSpec, module_name: &str, code_to_expose: Option<&str>) -> String {
    let exposure = match code_to_expose {
        Some(code) => code.to_owned(),
        None => spec.default_exposure(),
    };
    format!(
        "import {} from '{}';\n{}\n",
        spec.clause(),
        module_name,
        exposure
    )
}

/// A fresh name to declare an imported module under.
pub(crate) fn random_module_name() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_namespace_from_text() {
        assert_eq!(
            ImportSpec::from("Imported"),
            ImportSpec::Default("Imported".to_owned())
        );
        assert_eq!(
            ImportSpec::from("* as all"),
            ImportSpec::Namespace("all".to_owned())
        );
        assert_eq!(ImportSpec::from("* as all").clause(), "* as all");
    }

    #[test]
    fn named_and_aliased_clauses() {
        let named = ImportSpec::from(vec!["defaultMember", "member"]);
        assert_eq!(named.clause(), "{ defaultMember, member }");
        assert_eq!(named.bindings(), vec!["defaultMember", "member"]);

        let aliased = ImportSpec::aliased(vec![
            ("default", "aliasedDefault"),
            ("member", "aliasedMember"),
        ]);
        assert_eq!(
            aliased.clause(),
            "{ default as aliasedDefault, member as aliasedMember }"
        );
        assert_eq!(aliased.bindings(), vec!["aliasedDefault", "aliasedMember"]);
    }

    #[test]
    fn glue_exposes_bindings_globally() {
        let spec = ImportSpec::from("* as all");
        assert_eq!(
            glue_source(&spec, "abcdefghijkl", None),
            "import * as all from 'abcdefghijkl';\nglobalThis.all = all;\n"
        );
        assert_eq!(
            glue_source(&spec, "abcdefghijkl", Some("globalThis.everything = all;")),
            "import * as all from 'abcdefghijkl';\nglobalThis.everything = all;\n"
        );
    }

    #[test]
    fn module_names_are_twelve_alphanumerics() {
        let name = random_module_name();
        assert_eq!(name.len(), 12);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(name, random_module_name());
    }
}
