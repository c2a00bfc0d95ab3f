//! Library entries: which classes a library defines, which methods it adds
//! to other libraries' classes, and what it requires.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::class::ClassEntry;
use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::method::MethodEntry;
use crate::name::{ClassId, LibraryId, MethodId, MethodSpec, fsdecode};
use crate::store::{Entry, Property, PropertyType, Record, Value};

const LIBRARY_DIR: &str = "library";

const LIBRARY_SCHEMA: &[Property] = &[
    Property::new("requires", PropertyType::RefList),
    Property::new("classes", PropertyType::RefList),
    Property::new("methods", PropertyType::RefList),
    Property::new("sublibraries", PropertyType::RefList),
    Property::new("is_sublibrary", PropertyType::Bool),
    Property::new("source", PropertyType::String),
];

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    pub id: LibraryId,
    /// Required libraries; closed transitively at commit.
    pub requires: Vec<LibraryId>,
    pub classes: Vec<ClassId>,
    /// Methods this library adds to, or redefines in, classes it does not own.
    pub methods: Vec<MethodId>,
    pub sublibraries: Vec<LibraryId>,
    pub is_sublibrary: bool,
    pub source: String,
}

impl LibraryEntry {
    pub fn name(&self) -> &str {
        self.id.name()
    }
}

impl Entry for LibraryEntry {
    type Id = LibraryId;
    const SCHEMA: &'static [Property] = LIBRARY_SCHEMA;

    fn create(id: LibraryId) -> Self {
        Self {
            id,
            requires: Vec::new(),
            classes: Vec::new(),
            methods: Vec::new(),
            sublibraries: Vec::new(),
            is_sublibrary: false,
            source: String::new(),
        }
    }

    fn id(&self) -> &LibraryId {
        &self.id
    }

    fn record_path(id: &LibraryId) -> PathBuf {
        id.record_path()
    }

    fn from_record(id: LibraryId, record: &Record) -> Result<Self> {
        let libs = |key: &str| -> Result<Vec<LibraryId>> {
            record.list(key).iter().map(|s| LibraryId::from_name(s)).collect()
        };
        Ok(Self {
            requires: libs("requires")?,
            classes: record
                .list("classes")
                .iter()
                .map(|s| ClassId::from_id_string(s))
                .collect::<Result<_>>()?,
            methods: record
                .list("methods")
                .iter()
                .map(|s| MethodId::parse(s))
                .collect::<Result<_>>()?,
            sublibraries: libs("sublibraries")?,
            is_sublibrary: record.bool("is_sublibrary"),
            source: record.string("source"),
            id,
        })
    }

    fn to_record(&self) -> Record {
        let libs = |v: &[LibraryId]| v.iter().map(|l| l.as_str().to_string()).collect();
        let mut r = Record::new(LIBRARY_SCHEMA);
        r.set("requires", Value::RefList(libs(&self.requires)));
        r.set(
            "classes",
            Value::RefList(self.classes.iter().map(|c| c.as_str().to_string()).collect()),
        );
        r.set(
            "methods",
            Value::RefList(self.methods.iter().map(|m| m.to_string()).collect()),
        );
        r.set("sublibraries", Value::RefList(libs(&self.sublibraries)));
        r.set("is_sublibrary", Value::Bool(self.is_sublibrary));
        r.set("source", Value::String(self.source.clone()));
        r
    }
}

impl Database {
    /// Create or reset a library entry.
    pub fn open_library(&mut self, name: &str) -> Result<LibraryId> {
        self.check_transaction()?;
        let id = LibraryId::from_name(name)?;
        self.libraries.open(LibraryEntry::create(id.clone()));
        debug!(library = %id, "opened library");
        Ok(id)
    }

    pub fn update_library<R>(
        &mut self,
        id: &LibraryId,
        f: impl FnOnce(&mut LibraryEntry) -> R,
    ) -> Result<R> {
        self.check_transaction()?;
        self.libraries
            .update(&self.files, id, f)?
            .ok_or_else(|| CatalogError::LibraryNotFound {
                name: id.to_string(),
            })
    }

    pub fn library(&self, id: &LibraryId) -> Result<Option<Rc<LibraryEntry>>> {
        self.libraries.get(&self.files, id)
    }

    pub fn get_library(&self, name: &str) -> Result<Option<Rc<LibraryEntry>>> {
        match LibraryId::from_name(name) {
            Ok(id) => self.library(&id),
            Err(_) => Ok(None),
        }
    }

    pub fn fetch_library(&self, name: &str) -> Result<Rc<LibraryEntry>> {
        self.get_library(name)?
            .ok_or_else(|| CatalogError::LibraryNotFound {
                name: name.to_string(),
            })
    }

    /// Every library on disk or opened in this process.
    pub fn library_ids(&self) -> Result<Vec<LibraryId>> {
        for file in self.files.list(Path::new(LIBRARY_DIR))? {
            self.libraries.register(LibraryId::from_name(&fsdecode(&file)?)?);
        }
        Ok(self.libraries.ids())
    }

    /// Transitive requires in discovery order, without `id` itself.
    pub fn all_requires(&self, id: &LibraryId) -> Result<Vec<LibraryId>> {
        let mut seen = BTreeSet::from([id.clone()]);
        let mut out = Vec::new();
        self.collect_requires(id, &mut seen, &mut out)?;
        Ok(out)
    }

    fn collect_requires(
        &self,
        id: &LibraryId,
        seen: &mut BTreeSet<LibraryId>,
        out: &mut Vec<LibraryId>,
    ) -> Result<()> {
        let Some(lib) = self.library(id)? else {
            return Ok(());
        };
        for req in &lib.requires {
            if seen.insert(req.clone()) {
                out.push(req.clone());
                self.collect_requires(req, seen, out)?;
            }
        }
        Ok(())
    }

    /// Record that `lib` defines `class`. Returns false, leaving the library
    /// clean, if it already did.
    pub fn library_add_class(&mut self, lib: &LibraryId, class: &ClassId) -> Result<bool> {
        self.check_transaction()?;
        let entry = self.library(lib)?.ok_or_else(|| CatalogError::LibraryNotFound {
            name: lib.to_string(),
        })?;
        if entry.classes.contains(class) {
            return Ok(false);
        }
        self.update_library(lib, |l| l.classes.push(class.clone()))?;
        Ok(true)
    }

    /// Record that `lib` adds `method` to a class it does not own.
    pub fn library_add_method(&mut self, lib: &LibraryId, method: &MethodId) -> Result<bool> {
        self.check_transaction()?;
        let entry = self.library(lib)?.ok_or_else(|| CatalogError::LibraryNotFound {
            name: lib.to_string(),
        })?;
        if entry.methods.contains(method) {
            return Ok(false);
        }
        self.update_library(lib, |l| l.methods.push(method.clone()))?;
        Ok(true)
    }

    /// A class defined by `lib`.
    pub fn library_fetch_class(&self, lib: &LibraryId, name: &str) -> Result<Rc<ClassEntry>> {
        let entry = self.library(lib)?.ok_or_else(|| CatalogError::LibraryNotFound {
            name: lib.to_string(),
        })?;
        let not_found = || CatalogError::ClassNotFound {
            name: name.to_string(),
        };
        let id = ClassId::from_name(name).map_err(|_| not_found())?;
        if !entry.classes.contains(&id) {
            return Err(not_found());
        }
        self.class(&id)?.ok_or_else(not_found)
    }

    /// A method of `lib`: owned classes are searched first, then the methods
    /// the library adds elsewhere.
    pub fn library_fetch_method(&self, lib: &LibraryId, spec: &MethodSpec) -> Result<Rc<MethodEntry>> {
        let entry = self.library(lib)?.ok_or_else(|| CatalogError::LibraryNotFound {
            name: lib.to_string(),
        })?;
        if let Ok(class) = spec.class_id()
            && entry.classes.contains(&class)
            && let Some(method) = self.get_method(spec)?
        {
            return Ok(method);
        }
        for id in &entry.methods {
            if id.class.name() != spec.klass || id.kind != spec.kind {
                continue;
            }
            if let Some(method) = self.method(id)?
                && method.names.iter().any(|n| *n == spec.method)
            {
                return Ok(method);
            }
        }
        Err(CatalogError::MethodNotFound {
            pattern: spec.to_string(),
            candidates: Vec::new(),
        })
    }

    /// Close every library's `requires` over its dependencies.
    pub(crate) fn update_requires(&mut self) -> Result<()> {
        for id in self.library_ids()? {
            let closed = self.all_requires(&id)?;
            let current = self.library(&id)?.map(|l| l.requires.clone()).unwrap_or_default();
            if closed != current {
                debug!(library = %id, requires = closed.len(), "requires closed");
                self.libraries.update(&self.files, &id, |l| l.requires = closed)?;
            }
        }
        Ok(())
    }

    /// `a/b` is a sub-library of `a`; record the link on both sides.
    pub(crate) fn update_sublibraries(&mut self) -> Result<()> {
        let ids = self.library_ids()?;
        for parent in &ids {
            let subs: Vec<LibraryId> = ids
                .iter()
                .filter(|child| is_sublibrary_of(child, parent))
                .cloned()
                .collect();
            let current = self.library(parent)?.map(|l| l.sublibraries.clone());
            if current.is_some_and(|c| c != subs) {
                self.libraries
                    .update(&self.files, parent, |l| l.sublibraries = subs)?;
            }
        }
        for child in &ids {
            let flagged = ids.iter().any(|parent| is_sublibrary_of(child, parent));
            let current = self.library(child)?.map(|l| l.is_sublibrary);
            if current.is_some_and(|c| c != flagged) {
                self.libraries
                    .update(&self.files, child, |l| l.is_sublibrary = flagged)?;
            }
        }
        Ok(())
    }
}

fn is_sublibrary_of(child: &LibraryId, parent: &LibraryId) -> bool {
    child
        .name()
        .strip_prefix(parent.name())
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{ClassKind, MethodKind};
    use crate::test_support::{define_class, define_method, temp_prefix};

    #[test]
    fn requires_are_closed_transitively_at_commit() -> Result<()> {
        let prefix = temp_prefix("requires");
        let mut db = Database::open(&prefix)?;
        db.transaction(|db| {
            let a = db.open_library("a")?;
            let b = db.open_library("b")?;
            let c = db.open_library("c")?;
            db.update_library(&a, |l| l.requires.push(b.clone()))?;
            db.update_library(&b, |l| l.requires.push(c.clone()))?;
            // cycle back to the start must not loop
            db.update_library(&c, |l| l.requires.push(a.clone()))?;
            Ok(())
        })?;

        let db = Database::open(&prefix)?;
        let a = db.fetch_library("a")?;
        let names: Vec<&str> = a.requires.iter().map(LibraryId::name).collect();
        assert_eq!(names, vec!["b", "c"]);
        let c = db.fetch_library("c")?;
        let names: Vec<&str> = c.requires.iter().map(LibraryId::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        let _ = std::fs::remove_dir_all(prefix);
        Ok(())
    }

    #[test]
    fn sublibraries_are_linked_both_ways() -> Result<()> {
        let mut db = Database::open(temp_prefix("sublibs"))?;
        db.transaction(|db| {
            db.open_library("net")?;
            db.open_library("net/http")?;
            db.open_library("network")?;
            Ok(())
        })?;
        let net = db.fetch_library("net")?;
        let subs: Vec<&str> = net.sublibraries.iter().map(LibraryId::name).collect();
        assert_eq!(subs, vec!["net/http"]);
        assert!(db.fetch_library("net/http")?.is_sublibrary);
        assert!(!db.fetch_library("network")?.is_sublibrary);
        assert!(!net.is_sublibrary);
        Ok(())
    }

    #[test]
    fn add_class_is_idempotent_and_keeps_library_clean() -> Result<()> {
        let mut db = Database::open(temp_prefix("add_class"))?;
        db.transaction(|db| {
            define_class(db, "_builtin", "Hoge", ClassKind::Class, None)?;
            Ok(())
        })?;
        db.begin_transaction()?;
        let lib = LibraryId::from_name("_builtin")?;
        let hoge = ClassId::from_name("Hoge")?;
        assert!(!db.library_add_class(&lib, &hoge)?);
        assert!(!db.libraries.is_dirty(&lib));
        let other = ClassId::from_name("Other")?;
        assert!(db.library_add_class(&lib, &other)?);
        assert!(db.libraries.is_dirty(&lib));
        db.rollback();
        Ok(())
    }

    #[test]
    fn fetch_method_prefers_owned_classes_then_added_methods() -> Result<()> {
        let mut db = Database::open(temp_prefix("lib_fetch"))?;
        db.transaction(|db| {
            let object = define_class(db, "_builtin", "Object", ClassKind::Class, None)?;
            define_method(db, &object, "_builtin", MethodKind::InstanceMethod, &["dup"])?;
            define_method(db, &object, "json", MethodKind::InstanceMethod, &["to_json"])?;
            Ok(())
        })?;

        let builtin = LibraryId::from_name("_builtin")?;
        let json = LibraryId::from_name("json")?;
        assert_eq!(db.library_fetch_class(&builtin, "Object")?.name(), "Object");
        assert!(matches!(
            db.library_fetch_class(&json, "Object"),
            Err(CatalogError::ClassNotFound { .. })
        ));

        let to_json = MethodSpec::parse("Object#to_json")?;
        assert_eq!(db.library_fetch_method(&json, &to_json)?.id.library, json);
        let dup = MethodSpec::parse("Object#dup")?;
        assert_eq!(db.library_fetch_method(&builtin, &dup)?.name(), "dup");
        assert!(matches!(
            db.library_fetch_method(&json, &dup),
            Err(CatalogError::MethodNotFound { .. })
        ));
        assert!(matches!(
            db.fetch_library("missing"),
            Err(CatalogError::LibraryNotFound { .. })
        ));
        Ok(())
    }
}
