//! Access scope normalization and comparison.
//!
//! A token's `access` grant can be written many ways in a manifest:
//!
//! ```text
//! "group/project"
//! { name = "group/project" }
//! { name = "group/project", actions = "*" }
//! { type = "repository", name = "/group/project/", actions = ["push", "pull"] }
//! [ "group/a", { name = "group/b", actions = ["pull"] } ]
//! "absent"
//! ```
//!
//! [`normalize`] folds all of these into one canonical list of
//! [`AccessScope`] entries; [`check`] validates without rewriting; and
//! [`compare`] is the order-insensitive equality used for drift detection.

use crate::error::{TokenError, TokenResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Scope type assumed when none is given.
pub const DEFAULT_SCOPE_TYPE: &str = "repository";

/// Marker meaning "no access grant".
const ABSENT: &str = "absent";

static NAME_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*$").expect("scope name pattern is valid")
});

/// Permitted registry actions, ordered the way they sort as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScopeAction {
    #[serde(rename = "*")]
    All,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "pull")]
    Pull,
    #[serde(rename = "push")]
    Push,
}

impl ScopeAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "*" => Some(ScopeAction::All),
            "delete" => Some(ScopeAction::Delete),
            "pull" => Some(ScopeAction::Pull),
            "push" => Some(ScopeAction::Push),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeAction::All => "*",
            ScopeAction::Delete => "delete",
            ScopeAction::Pull => "pull",
            ScopeAction::Push => "push",
        }
    }
}

/// One canonical access grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessScope {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actions: Vec<ScopeAction>,
}

impl AccessScope {
    /// Repository grant with the default `pull,push` actions.
    pub fn repository(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DEFAULT_SCOPE_TYPE.to_string(),
            actions: default_actions(),
        }
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<&str> = self.actions.iter().map(ScopeAction::as_str).collect();
        write!(f, "{}:{}:{}", self.kind, self.name, actions.join(","))
    }
}

/// Raw scope descriptor as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeInput {
    /// Bare repository path, or the `absent` marker
    Path(String),
    /// Several descriptors
    List(Vec<ScopeInput>),
    /// Single descriptor object
    Entry(ScopeEntryInput),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntryInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<ActionsInput>,
}

/// Action list; nested lists are flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionsInput {
    One(String),
    Many(Vec<ActionsInput>),
}

impl ActionsInput {
    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ActionsInput::One(action) => out.push(action),
            ActionsInput::Many(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<&AccessScope> for ScopeInput {
    fn from(scope: &AccessScope) -> Self {
        ScopeInput::Entry(ScopeEntryInput {
            name: Some(scope.name.clone()),
            kind: Some(scope.kind.clone()),
            actions: Some(ActionsInput::Many(
                scope
                    .actions
                    .iter()
                    .map(|a| ActionsInput::One(a.as_str().to_string()))
                    .collect(),
            )),
        })
    }
}

impl From<&[AccessScope]> for ScopeInput {
    fn from(scopes: &[AccessScope]) -> Self {
        ScopeInput::List(scopes.iter().map(ScopeInput::from).collect())
    }
}

fn default_actions() -> Vec<ScopeAction> {
    vec![ScopeAction::Pull, ScopeAction::Push]
}

fn is_absent(value: &str) -> bool {
    value == ABSENT
}

/// Strip leading and trailing path separators.
pub fn normalize_name(name: &str) -> String {
    name.trim_matches('/').to_string()
}

/// Whether `name` satisfies the repository path grammar.
pub fn check_name(name: &str) -> bool {
    let name = normalize_name(name);
    !name.is_empty() && name.split('/').all(|segment| NAME_SEGMENT.is_match(segment))
}

/// Canonicalize a scope descriptor.
///
/// Absent input, the `absent` marker and `["absent"]` all yield an empty list.
pub fn normalize(input: Option<&ScopeInput>) -> Vec<AccessScope> {
    let mut scopes = Vec::new();
    if let Some(input) = input {
        collect(input, &mut scopes);
    }
    scopes
}

fn collect(input: &ScopeInput, out: &mut Vec<AccessScope>) {
    match input {
        ScopeInput::Path(path) if is_absent(path) => {}
        ScopeInput::Path(path) => out.push(AccessScope::repository(normalize_name(path))),
        ScopeInput::List(items) => {
            for item in items {
                collect(item, out);
            }
        }
        ScopeInput::Entry(entry) => out.push(normalize_entry(entry)),
    }
}

fn normalize_entry(entry: &ScopeEntryInput) -> AccessScope {
    let actions = match &entry.actions {
        Some(raw) => {
            let mut names = Vec::new();
            raw.flatten_into(&mut names);

            let mut actions: Vec<ScopeAction> =
                names.into_iter().filter_map(ScopeAction::parse).collect();
            actions.sort();
            actions.dedup();
            actions
        }
        None => default_actions(),
    };

    AccessScope {
        name: normalize_name(entry.name.as_deref().unwrap_or_default()),
        kind: entry
            .kind
            .clone()
            .unwrap_or_else(|| DEFAULT_SCOPE_TYPE.to_string()),
        actions,
    }
}

/// Validate a scope descriptor without rewriting it.
pub fn check(input: Option<&ScopeInput>) -> TokenResult<()> {
    match input {
        None => Ok(()),
        Some(input) => check_input(input),
    }
}

fn check_input(input: &ScopeInput) -> TokenResult<()> {
    match input {
        ScopeInput::Path(path) if is_absent(path) => Ok(()),
        ScopeInput::Path(path) => {
            if check_name(path) {
                Ok(())
            } else {
                Err(TokenError::invalid("access", format!("invalid repository name '{}'", path)))
            }
        }
        ScopeInput::List(items) => items.iter().try_for_each(check_input),
        ScopeInput::Entry(entry) => check_entry(entry),
    }
}

fn check_entry(entry: &ScopeEntryInput) -> TokenResult<()> {
    let name = entry
        .name
        .as_deref()
        .ok_or_else(|| TokenError::invalid("access", "scope entry is missing 'name'"))?;

    if let Some(kind) = &entry.kind {
        if kind != DEFAULT_SCOPE_TYPE {
            return Err(TokenError::invalid(
                "access",
                format!("unsupported scope type '{}'", kind),
            ));
        }
    }

    if let Some(raw) = &entry.actions {
        let mut names = Vec::new();
        raw.flatten_into(&mut names);
        if let Some(bad) = names.iter().find(|a| ScopeAction::parse(a).is_none()) {
            return Err(TokenError::invalid(
                "access",
                format!("unsupported action '{}' (expected *, delete, pull or push)", bad),
            ));
        }
    }

    if !check_name(name) {
        return Err(TokenError::invalid(
            "access",
            format!("invalid repository name '{}'", name),
        ));
    }

    Ok(())
}

/// Order-insensitive equality of two scope lists.
///
/// Entries are not deduplicated: `[a, a]` and `[a]` differ.
pub fn compare(a: &[AccessScope], b: &[AccessScope]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    sorted(a) == sorted(b)
}

fn sorted(scopes: &[AccessScope]) -> Vec<&AccessScope> {
    let mut refs: Vec<&AccessScope> = scopes.iter().collect();
    refs.sort();
    refs
}

/// Operator-facing rendering of a scope list.
pub fn describe(scopes: &[AccessScope]) -> String {
    if scopes.is_empty() {
        return "[]".to_string();
    }
    let parts: Vec<String> = sorted(scopes).iter().map(|s| s.to_string()).collect();
    format!("[{}]", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(p: &str) -> ScopeInput {
        ScopeInput::Path(p.to_string())
    }

    fn entry(name: &str, kind: Option<&str>, actions: Option<Vec<&str>>) -> ScopeInput {
        ScopeInput::Entry(ScopeEntryInput {
            name: Some(name.to_string()),
            kind: kind.map(str::to_string),
            actions: actions.map(|a| {
                ActionsInput::Many(a.into_iter().map(|x| ActionsInput::One(x.into())).collect())
            }),
        })
    }

    #[test]
    fn test_bare_path_gets_defaults() {
        let scopes = normalize(Some(&path("/group/project/")));
        assert_eq!(scopes, vec![AccessScope::repository("group/project")]);
        assert_eq!(scopes[0].actions, vec![ScopeAction::Pull, ScopeAction::Push]);
    }

    #[test]
    fn test_absent_forms_normalize_to_empty() {
        assert!(normalize(None).is_empty());
        assert!(normalize(Some(&path("absent"))).is_empty());
        assert!(normalize(Some(&ScopeInput::List(vec![path("absent")]))).is_empty());
        assert!(compare(
            &normalize(None),
            &normalize(Some(&ScopeInput::List(vec![path("absent")])))
        ));
    }

    #[test]
    fn test_actions_filtered_sorted_and_flattened() {
        let input = ScopeInput::Entry(ScopeEntryInput {
            name: Some("group/app".into()),
            kind: None,
            actions: Some(ActionsInput::Many(vec![
                ActionsInput::One("push".into()),
                ActionsInput::Many(vec![
                    ActionsInput::One("bogus".into()),
                    ActionsInput::One("*".into()),
                ]),
                ActionsInput::One("pull".into()),
            ])),
        });

        let scopes = normalize(Some(&input));
        assert_eq!(
            scopes[0].actions,
            vec![ScopeAction::All, ScopeAction::Pull, ScopeAction::Push]
        );
        assert_eq!(scopes[0].kind, "repository");
    }

    #[test]
    fn test_single_action_string() {
        let input: ScopeInput =
            serde_json::from_str(r#"{"name": "group/app", "actions": "delete"}"#).unwrap();
        assert_eq!(normalize(Some(&input))[0].actions, vec![ScopeAction::Delete]);
    }

    #[test]
    fn test_check_rejects_bad_descriptors() {
        assert!(check(Some(&path("Group/Upper"))).is_err());
        assert!(check(Some(&entry("group/app", Some("registry"), None))).is_err());
        assert!(check(Some(&entry("group/app", None, Some(vec!["pull", "fly"])))).is_err());
        assert!(check(Some(&ScopeInput::Entry(ScopeEntryInput::default()))).is_err());
        assert!(check(Some(&path("//"))).is_err());
    }

    #[test]
    fn test_check_accepts_good_descriptors() {
        assert!(check(None).is_ok());
        assert!(check(Some(&path("absent"))).is_ok());
        assert!(check(Some(&path("group/sub-group/my_app.v2"))).is_ok());
        assert!(check(Some(&entry("group/app", Some("repository"), Some(vec!["*"])))).is_ok());
        assert!(check(Some(&ScopeInput::List(vec![path("a/b"), entry("c", None, None)]))).is_ok());
    }

    #[test]
    fn test_name_grammar() {
        assert!(check_name("group/project"));
        assert!(check_name("a__b/c--d/e.f"));
        assert!(!check_name("group/-project"));
        assert!(!check_name("group/project_"));
        assert!(!check_name(""));
    }

    #[test]
    fn test_compare_is_permutation_insensitive_not_set_equality() {
        let a = normalize(Some(&ScopeInput::List(vec![path("x/a"), path("x/b")])));
        let b = normalize(Some(&ScopeInput::List(vec![path("x/b"), path("x/a")])));
        assert!(compare(&a, &b));

        let dup = normalize(Some(&ScopeInput::List(vec![path("x/a"), path("x/a"), path("x/b")])));
        assert!(!compare(&a, &dup));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(AccessScope::repository("group/app")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "group/app", "type": "repository", "actions": ["pull", "push"]})
        );
    }

    #[test]
    fn test_describe() {
        let scopes = vec![AccessScope::repository("b"), AccessScope::repository("a")];
        assert_eq!(
            describe(&scopes),
            "[repository:a:pull,push repository:b:pull,push]"
        );
    }

    fn arb_name() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z0-9]{1,6}", 1..4).prop_map(|segments| segments.join("/"))
    }

    fn arb_action() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("*".to_string()),
            Just("delete".to_string()),
            Just("pull".to_string()),
            Just("push".to_string()),
            Just("bogus".to_string()),
        ]
    }

    fn arb_input() -> impl Strategy<Value = ScopeInput> {
        let leaf = prop_oneof![
            arb_name().prop_map(|n| ScopeInput::Path(format!("/{}/", n))),
            (arb_name(), prop::option::of(prop::collection::vec(arb_action(), 0..4))).prop_map(
                |(name, actions)| ScopeInput::Entry(ScopeEntryInput {
                    name: Some(name),
                    kind: None,
                    actions: actions
                        .map(|a| ActionsInput::Many(a.into_iter().map(ActionsInput::One).collect())),
                })
            ),
            Just(ScopeInput::Path("absent".to_string())),
        ];
        prop::collection::vec(leaf, 0..6).prop_map(ScopeInput::List)
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(input in arb_input()) {
            let once = normalize(Some(&input));
            let again = normalize(Some(&ScopeInput::from(once.as_slice())));
            prop_assert_eq!(once, again);
        }

        #[test]
        fn prop_compare_ignores_order(input in arb_input(), seed in any::<u64>()) {
            let scopes = normalize(Some(&input));
            let mut shuffled = scopes.clone();
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left((seed as usize) % len);
                shuffled.reverse();
            }
            prop_assert!(compare(&scopes, &shuffled));
        }
    }
}
