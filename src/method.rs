//! Method entries: singleton methods, instance methods, module functions,
//! constants and special variables.

use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::name::{MethodId, MethodKind, MethodSpec};
use crate::store::{Entry, Property, PropertyType, Record, Value};

const METHOD_SCHEMA: &[Property] = &[
    Property::new("names", PropertyType::StringList),
    Property::new("visibility", PropertyType::Symbol).with_default("public"),
    Property::new("kind", PropertyType::Symbol).with_default("defined"),
    Property::new("source", PropertyType::String),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
}

impl Visibility {
    pub fn name(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Protected => "protected",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "protected" => Some(Self::Protected),
            _ => None,
        }
    }
}

/// How a method came to be documented where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// First defined by the owning library.
    #[default]
    Defined,
    /// Defined again by another library, replacing the original.
    Redefined,
    /// Added to a class owned by some other library.
    Added,
}

impl Provenance {
    pub fn name(self) -> &'static str {
        match self {
            Self::Defined => "defined",
            Self::Redefined => "redefined",
            Self::Added => "added",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "defined" => Some(Self::Defined),
            "redefined" => Some(Self::Redefined),
            "added" => Some(Self::Added),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    pub id: MethodId,
    /// Every name the method answers to; the first is the primary one.
    pub names: Vec<String>,
    pub visibility: Visibility,
    pub provenance: Provenance,
    pub source: String,
}

impl MethodEntry {
    pub fn kind(&self) -> MethodKind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.id.name)
    }

    pub fn spec(&self) -> MethodSpec {
        self.id.spec()
    }

    /// One label per alias name, e.g. `Array#size` and `Array#length`.
    pub fn labels(&self) -> Vec<String> {
        let klass = self.id.class.name();
        self.names
            .iter()
            .map(|n| {
                MethodSpec {
                    klass: klass.clone(),
                    kind: self.kind(),
                    method: n.clone(),
                }
                .label()
            })
            .collect()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }
}

impl Entry for MethodEntry {
    type Id = MethodId;
    const SCHEMA: &'static [Property] = METHOD_SCHEMA;

    fn create(id: MethodId) -> Self {
        Self {
            names: vec![id.name.clone()],
            id,
            visibility: Visibility::Public,
            provenance: Provenance::Defined,
            source: String::new(),
        }
    }

    fn id(&self) -> &MethodId {
        &self.id
    }

    fn record_path(id: &MethodId) -> PathBuf {
        id.record_path()
    }

    fn from_record(id: MethodId, record: &Record) -> Result<Self> {
        let path = id.record_path();
        let visibility = record.string("visibility");
        let visibility = Visibility::from_name(&visibility)
            .ok_or_else(|| CatalogError::corrupt(&path, format!("unknown visibility {visibility:?}")))?;
        let provenance = record.string("kind");
        let provenance = Provenance::from_name(&provenance)
            .ok_or_else(|| CatalogError::corrupt(&path, format!("unknown kind {provenance:?}")))?;
        let mut names = record.list("names");
        if names.is_empty() {
            names.push(id.name.clone());
        }
        Ok(Self {
            id,
            names,
            visibility,
            provenance,
            source: record.string("source"),
        })
    }

    fn to_record(&self) -> Record {
        let mut r = Record::new(METHOD_SCHEMA);
        r.set("names", Value::StringList(self.names.clone()));
        r.set("visibility", Value::Symbol(self.visibility.name().to_string()));
        r.set("kind", Value::Symbol(self.provenance.name().to_string()));
        r.set("source", Value::String(self.source.clone()));
        r
    }
}

impl Database {
    /// Create or reset a method entry and list it among its class's entries.
    pub fn open_method(&mut self, id: MethodId) -> Result<Rc<MethodEntry>> {
        self.check_transaction()?;
        let class = id.class.clone();
        if self.class(&class)?.is_none() {
            return Err(CatalogError::ClassNotFound { name: class.name() });
        }
        let entry = self.methods.open(MethodEntry::create(id.clone()));
        self.update_class(&class, |c| {
            if !c.entries.contains(&id) {
                c.entries.push(id.clone());
            }
        })?;
        debug!(method = %id, "opened method");
        Ok(entry)
    }

    pub fn update_method<R>(
        &mut self,
        id: &MethodId,
        f: impl FnOnce(&mut MethodEntry) -> R,
    ) -> Result<R> {
        self.check_transaction()?;
        let result = self
            .methods
            .update(&self.files, id, f)?
            .ok_or_else(|| CatalogError::MethodNotFound {
                pattern: id.spec().to_string(),
                candidates: Vec::new(),
            })?;
        self.invalidate_graph();
        Ok(result)
    }

    pub fn method(&self, id: &MethodId) -> Result<Option<Rc<MethodEntry>>> {
        self.methods.get(&self.files, id)
    }

    /// First own entry of the spec's class that matches kind and name. Never
    /// raises for a missing class or method.
    pub fn get_method(&self, spec: &MethodSpec) -> Result<Option<Rc<MethodEntry>>> {
        let Ok(class) = spec.class_id() else {
            return Ok(None);
        };
        let Some(owner) = self.class(&self.canonical_class(&class)?)? else {
            return Ok(None);
        };
        for id in owner.entries.iter().filter(|m| m.kind == spec.kind) {
            if let Some(entry) = self.method(id)?
                && entry.names.iter().any(|n| *n == spec.method)
            {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub fn fetch_method(&self, spec: &MethodSpec) -> Result<Rc<MethodEntry>> {
        self.get_method(spec)?
            .ok_or_else(|| CatalogError::MethodNotFound {
                pattern: spec.to_string(),
                candidates: Vec::new(),
            })
    }

    /// Every method listed by any class.
    pub fn method_ids(&self) -> Result<Vec<MethodId>> {
        let mut ids = Vec::new();
        for class in self.class_ids()? {
            if let Some(entry) = self.class(&class)? {
                ids.extend(entry.entries.iter().cloned());
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{ClassKind, LibraryId};
    use crate::test_support::{define_class, define_method, temp_prefix};

    #[test]
    fn method_record_persists_names_and_flags() -> Result<()> {
        let prefix = temp_prefix("method_record");
        let mut db = Database::open(&prefix)?;
        let id = db.transaction(|db| {
            let array = define_class(db, "_builtin", "Array", ClassKind::Class, None)?;
            let id = define_method(db, &array, "_builtin", MethodKind::InstanceMethod, &["size", "length"])?;
            db.update_method(&id, |m| {
                m.visibility = Visibility::Protected;
                m.source = "--- size -> Integer\n".to_string();
            })?;
            Ok(id)
        })?;

        let db = Database::open(&prefix)?;
        let entry = db.method(&id)?.unwrap();
        assert_eq!(entry.names, vec!["size", "length"]);
        assert_eq!(entry.visibility, Visibility::Protected);
        assert_eq!(entry.provenance, Provenance::Defined);
        assert_eq!(entry.source, "--- size -> Integer\n");
        assert_eq!(entry.labels(), vec!["Array#size", "Array#length"]);

        let spec = MethodSpec::parse("Array#length")?;
        assert_eq!(db.fetch_method(&spec)?.id, id);
        let _ = std::fs::remove_dir_all(prefix);
        Ok(())
    }

    #[test]
    fn get_method_returns_none_and_fetch_raises() -> Result<()> {
        let db = Database::open(temp_prefix("method_missing"))?;
        let spec = MethodSpec::parse("Nope#nothing")?;
        assert!(db.get_method(&spec)?.is_none());
        assert!(matches!(
            db.fetch_method(&spec),
            Err(CatalogError::MethodNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn opening_method_requires_existing_class() -> Result<()> {
        let mut db = Database::open(temp_prefix("method_orphan"))?;
        db.begin_transaction()?;
        let id = MethodId::new(
            crate::name::ClassId::from_name("Ghost")?,
            MethodKind::InstanceMethod,
            "boo",
            LibraryId::from_name("_builtin")?,
        )?;
        assert!(matches!(
            db.open_method(id),
            Err(CatalogError::ClassNotFound { .. })
        ));
        db.rollback();
        Ok(())
    }

    #[test]
    fn reopening_method_keeps_single_class_entry() -> Result<()> {
        let mut db = Database::open(temp_prefix("method_reopen"))?;
        db.begin_transaction()?;
        let hoge = define_class(&mut db, "_builtin", "Hoge", ClassKind::Class, None)?;
        let id = define_method(&mut db, &hoge, "_builtin", MethodKind::SingletonMethod, &["new"])?;
        db.open_method(id.clone())?;
        assert_eq!(db.class(&hoge)?.unwrap().entries, vec![id]);
        db.commit()?;
        assert_eq!(db.method_ids()?.len(), 1);
        Ok(())
    }
}
