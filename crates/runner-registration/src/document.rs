//! Runner config document (`config.toml`).
//!
//! The document is always loaded and saved whole. Only `runners[0]` is
//! managed; global keys and sibling runner entries are carried through
//! untouched. Concurrent manual edits made between load and save are lost.

use crate::error::{RunnerError, RunnerResult};
use converge_core::persist::write_private;
use converge_core::FileOwnership;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use toml::{Table, Value};

/// Parsed runner configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerDocument {
    root: Table,
}

impl RunnerDocument {
    pub fn new(root: Table) -> Self {
        Self { root }
    }

    pub fn parse(content: &str) -> RunnerResult<Self> {
        content
            .parse::<Table>()
            .map(Self::new)
            .map_err(|e| RunnerError::Document(e.to_string()))
    }

    /// Load `path`; missing or unparsable files yield an empty document.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read runner config, starting empty");
                return Self::default();
            }
        };

        Self::parse(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Runner config does not parse, starting empty");
            Self::default()
        })
    }

    /// Default skeleton for a first-time registration.
    pub fn skeleton() -> Self {
        let mut root = Table::new();
        root.insert("concurrent".into(), Value::Integer(1));
        root.insert("check_interval".into(), Value::Integer(0));

        let mut session = Table::new();
        session.insert("session_timeout".into(), Value::Integer(1800));
        root.insert("session_server".into(), Value::Table(session));

        root.insert(
            "runners".into(),
            Value::Array(vec![Value::Table(default_runner())]),
        );
        Self { root }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn root(&self) -> &Table {
        &self.root
    }

    /// Seed the skeleton into an empty document, and a default entry into
    /// an empty `runners` list, so field writes never hit missing structure.
    pub fn seed_defaults(&mut self) {
        if self.is_empty() {
            *self = Self::skeleton();
            return;
        }

        let runners = self
            .root
            .entry("runners")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !runners.is_array() {
            tracing::warn!("Replacing non-array runners entry");
            *runners = Value::Array(Vec::new());
        }
        if let Value::Array(list) = runners {
            if list.first().map_or(true, |first| !first.is_table()) {
                if !list.is_empty() {
                    list.remove(0);
                }
                list.insert(0, Value::Table(default_runner()));
            }
        }
    }

    /// The managed runner entry, if present.
    pub fn managed(&self) -> Option<&Table> {
        self.root
            .get("runners")
            .and_then(Value::as_array)
            .and_then(|runners| runners.first())
            .and_then(Value::as_table)
    }

    /// Edit the managed entry in place, seeding defaults first.
    pub fn update_managed<R>(&mut self, edit: impl FnOnce(&mut Table) -> R) -> R {
        self.seed_defaults();

        let mut runners = match self.root.remove("runners") {
            Some(Value::Array(runners)) => runners,
            _ => Vec::new(),
        };
        let mut entry = if runners.is_empty() {
            default_runner()
        } else {
            match runners.remove(0) {
                Value::Table(entry) => entry,
                _ => default_runner(),
            }
        };

        let result = edit(&mut entry);

        runners.insert(0, Value::Table(entry));
        self.root.insert("runners".into(), Value::Array(runners));
        result
    }

    /// String field of the managed entry.
    pub fn managed_str(&self, key: &str) -> Option<&str> {
        self.managed()
            .and_then(|entry| entry.get(key))
            .and_then(Value::as_str)
    }

    pub fn managed_int(&self, key: &str) -> Option<i64> {
        self.managed()
            .and_then(|entry| entry.get(key))
            .and_then(Value::as_integer)
    }

    pub fn render(&self) -> RunnerResult<String> {
        toml::to_string(&self.root).map_err(|e| RunnerError::Document(e.to_string()))
    }

    /// Overwrite `path` with the whole document, mode 0600.
    pub fn save(&self, path: &Path, owner: Option<FileOwnership>) -> RunnerResult<()> {
        let content = self.render()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_private(path, content.as_bytes(), owner)?;
        tracing::info!(path = %path.display(), "Wrote runner config");
        Ok(())
    }
}

fn default_runner() -> Table {
    let mut cache = Table::new();
    for backend in ["s3", "gcs", "azure"] {
        cache.insert(backend.into(), Value::Table(Table::new()));
    }

    let mut docker = Table::new();
    docker.insert("tls_verify".into(), Value::Boolean(false));
    docker.insert("image".into(), Value::String("centos:7".into()));
    docker.insert("privileged".into(), Value::Boolean(false));
    docker.insert("disable_entrypoint_overwrite".into(), Value::Boolean(false));
    docker.insert("oom_kill_disable".into(), Value::Boolean(false));
    docker.insert("disable_cache".into(), Value::Boolean(false));
    docker.insert(
        "volumes".into(),
        Value::Array(vec![Value::String("/cache".into())]),
    );
    docker.insert("shm_size".into(), Value::Integer(0));

    let mut runner = Table::new();
    runner.insert("executor".into(), Value::String("docker".into()));
    runner.insert("custom_build_dir".into(), Value::Table(Table::new()));
    runner.insert("cache".into(), Value::Table(cache));
    runner.insert("docker".into(), Value::Table(docker));
    runner
}

/// Set a nested table value under `entry`, creating intermediate tables.
pub fn set_path(entry: &mut Table, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut node = entry;
    for key in parents {
        let slot = node
            .entry(key.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if !slot.is_table() {
            *slot = Value::Table(Table::new());
        }
        node = match slot {
            Value::Table(table) => table,
            _ => return,
        };
    }
    node.insert(last.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EXISTING: &str = r#"
concurrent = 4
check_interval = 3

[session_server]
session_timeout = 600

[[runners]]
name = "build-runner"
url = "https://build.domain.com"
token = "7ij2E77cgc65dJHFf6zo"
id = 12
executor = "docker"

[runners.docker]
image = "alpine:3"

[[runners]]
name = "sibling"
url = "https://other.domain.com"
token = "keepme"
executor = "shell"
"#;

    #[test]
    fn test_load_missing_and_garbage_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunnerDocument::load(&dir.path().join("config.toml")).is_empty());

        let path = dir.path().join("broken.toml");
        fs::write(&path, "[[runners\nname = ").unwrap();
        assert!(RunnerDocument::load(&path).is_empty());
    }

    #[test]
    fn test_seed_skeleton() {
        let mut doc = RunnerDocument::default();
        doc.seed_defaults();

        assert_eq!(doc.root()["concurrent"].as_integer(), Some(1));
        assert_eq!(doc.root()["check_interval"].as_integer(), Some(0));
        assert_eq!(
            doc.root()["session_server"]["session_timeout"].as_integer(),
            Some(1800)
        );
        assert_eq!(doc.managed_str("executor"), Some("docker"));
        assert_eq!(
            doc.managed().unwrap()["docker"]["image"].as_str(),
            Some("centos:7")
        );
        assert!(doc.managed().unwrap()["cache"]["s3"].is_table());
    }

    #[test]
    fn test_seed_keeps_existing_document() {
        let mut doc = RunnerDocument::parse(EXISTING).unwrap();
        let before = doc.clone();
        doc.seed_defaults();
        assert_eq!(doc, before);
    }

    #[test]
    fn test_seed_adds_entry_to_document_without_runners() {
        let mut doc = RunnerDocument::parse("concurrent = 2\n").unwrap();
        doc.update_managed(|entry| entry.insert("name".into(), Value::String("r".into())));

        assert_eq!(doc.root()["concurrent"].as_integer(), Some(2));
        assert_eq!(doc.managed_str("name"), Some("r"));
        assert_eq!(doc.managed_str("executor"), Some("docker"));
    }

    #[test]
    fn test_managed_edit_preserves_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, EXISTING).unwrap();

        let mut doc = RunnerDocument::load(&path);
        doc.update_managed(|entry| entry.insert("token".into(), Value::String("newtoken".into())));
        doc.save(&path, None).unwrap();

        let reloaded = RunnerDocument::load(&path);
        assert_eq!(reloaded.managed_str("token"), Some("newtoken"));
        assert_eq!(reloaded.managed_int("id"), Some(12));
        assert_eq!(reloaded.root()["concurrent"].as_integer(), Some(4));

        let sibling = &reloaded.root()["runners"].as_array().unwrap()[1];
        assert_eq!(sibling["token"].as_str(), Some("keepme"));
        assert_eq!(sibling["executor"].as_str(), Some("shell"));
    }

    #[test]
    fn test_set_path_creates_tables() {
        let mut entry = Table::new();
        set_path(&mut entry, &["docker", "image"], Value::String("alpine".into()));
        entry.insert("cache".into(), Value::String("flat".into()));
        set_path(&mut entry, &["cache", "s3"], Value::Table(Table::new()));

        assert_eq!(entry["docker"]["image"].as_str(), Some("alpine"));
        assert!(entry["cache"]["s3"].is_table());
    }

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[a-zA-Z0-9 _./:-]{0,12}".prop_map(Value::String),
            any::<i32>().prop_map(|i| Value::Integer(i64::from(i))),
            any::<bool>().prop_map(Value::Boolean),
            prop::collection::vec("[a-z/]{1,8}".prop_map(Value::String), 0..3).prop_map(Value::Array),
        ]
    }

    fn arb_table(depth: u32) -> BoxedStrategy<Table> {
        let scalars = prop::collection::btree_map("[a-z_]{1,8}", arb_scalar(), 0..5);
        if depth == 0 {
            return scalars.prop_map(|m| m.into_iter().collect()).boxed();
        }
        (
            scalars,
            prop::collection::btree_map("[A-Z][a-z]{1,6}", arb_table(depth - 1), 0..3),
        )
            .prop_map(|(values, tables)| {
                let mut table: Table = values.into_iter().collect();
                for (key, nested) in tables {
                    table.insert(key, Value::Table(nested));
                }
                table
            })
            .boxed()
    }

    fn arb_document() -> impl Strategy<Value = RunnerDocument> {
        (arb_table(1), prop::collection::vec(arb_table(1), 0..3)).prop_map(|(mut root, runners)| {
            if !runners.is_empty() {
                root.insert(
                    "runners".into(),
                    Value::Array(runners.into_iter().map(Value::Table).collect()),
                );
            }
            RunnerDocument::new(root)
        })
    }

    proptest! {
        #[test]
        fn prop_save_load_save_is_stable(doc in arb_document()) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.toml");

            doc.save(&path, None).unwrap();
            let first = fs::read_to_string(&path).unwrap();

            RunnerDocument::load(&path).save(&path, None).unwrap();
            let second = fs::read_to_string(&path).unwrap();

            prop_assert_eq!(first, second);
            prop_assert_eq!(RunnerDocument::load(&path), doc);
        }
    }
}
