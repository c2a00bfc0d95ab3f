//! The catalog database: entry tables, transaction scope and the commit pipeline.
//!
//! All reads go through `&self` and load records lazily. All mutations go
//! through `&mut self` and fail with [`CatalogError::NotInTransaction`]
//! unless a transaction is open. Only one transaction may be open at a time.
//!
//! Commit order:
//!
//! 1. recompute library `requires` closures and sub-library links
//! 2. validate every class (ancestor kinds, then ancestor cycles); a failure
//!    here aborts before anything is written
//! 3. write dirty records
//! 4. rebuild and write the class index, per-class name maps and the method index
//! 5. write global properties
//!
//! An I/O error during steps 3-5 leaves that commit's files indeterminate.
//! Either way a failed commit closes the transaction and drops every
//! in-memory entry, so later reads see what is on disk.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::class::{ClassEntry, ClassIndex, GraphCache};
use crate::doc::{DocEntry, FunctionEntry};
use crate::error::{CatalogError, Result};
use crate::library::LibraryEntry;
use crate::method::MethodEntry;
use crate::method_index::MethodIndex;
use crate::store::{EntryTable, FileStore};

pub const PROPERTIES_FILE: &str = "properties";
pub const DEFAULT_ENCODING: &str = "utf-8";
pub const FORMAT_VERSION: &str = "1";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CommitSummary {
    pub records_written: usize,
    pub classes_validated: usize,
    pub wide_names: usize,
    pub narrow_names: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DatabaseStats {
    pub prefix: String,
    pub libraries: usize,
    pub classes: usize,
    pub methods: usize,
    pub docs: usize,
    pub functions: usize,
    pub indexed_names: usize,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct Database {
    pub(crate) files: FileStore,
    in_transaction: bool,
    properties: BTreeMap<String, String>,
    properties_dirty: bool,
    pub(crate) libraries: EntryTable<LibraryEntry>,
    pub(crate) classes: EntryTable<ClassEntry>,
    pub(crate) methods: EntryTable<MethodEntry>,
    pub(crate) docs: EntryTable<DocEntry>,
    pub(crate) functions: EntryTable<FunctionEntry>,
    pub(crate) graph: RefCell<GraphCache>,
    pub(crate) class_index: RefCell<Option<Rc<ClassIndex>>>,
    pub(crate) method_index: RefCell<Option<Rc<MethodIndex>>>,
}

impl Database {
    /// Open the database rooted at `prefix`. Nothing but the global
    /// properties file is read; a missing prefix opens as an empty database.
    pub fn open(prefix: impl Into<PathBuf>) -> Result<Self> {
        let files = FileStore::new(prefix.into());
        let properties = load_properties(&files)?;
        Ok(Self {
            files,
            in_transaction: false,
            properties,
            properties_dirty: false,
            libraries: EntryTable::default(),
            classes: EntryTable::default(),
            methods: EntryTable::default(),
            docs: EntryTable::default(),
            functions: EntryTable::default(),
            graph: RefCell::new(GraphCache::default()),
            class_index: RefCell::new(None),
            method_index: RefCell::new(None),
        })
    }

    pub fn prefix(&self) -> &Path {
        self.files.prefix()
    }

    /// Number of record and index files read since the database was opened.
    pub fn files_read(&self) -> usize {
        self.files.reads()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(CatalogError::TransactionAlreadyOpen);
        }
        self.in_transaction = true;
        debug!(prefix = %self.prefix().display(), "transaction opened");
        Ok(())
    }

    pub(crate) fn check_transaction(&self) -> Result<()> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(CatalogError::NotInTransaction)
        }
    }

    /// Run `f` inside a transaction, committing on success and rolling back on error.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    pub fn commit(&mut self) -> Result<CommitSummary> {
        self.check_transaction()?;
        let result = self.flush();
        self.in_transaction = false;
        match result {
            Ok(summary) => {
                info!(
                    records = summary.records_written,
                    classes = summary.classes_validated,
                    wide_names = summary.wide_names,
                    narrow_names = summary.narrow_names,
                    "commit finished"
                );
                Ok(summary)
            }
            Err(err) => {
                warn!(error = %err, "commit failed, discarding uncommitted entries");
                if let Err(reload) = self.discard() {
                    warn!(error = %reload, "could not reload properties after failed commit");
                }
                Err(err)
            }
        }
    }

    /// Close the transaction and drop every uncommitted change.
    pub fn rollback(&mut self) {
        self.in_transaction = false;
        if let Err(err) = self.discard() {
            warn!(error = %err, "could not reload properties after rollback");
        }
    }

    fn discard(&mut self) -> Result<()> {
        self.libraries.reset();
        self.classes.reset();
        self.methods.reset();
        self.docs.reset();
        self.functions.reset();
        self.invalidate();
        self.properties = load_properties(&self.files)?;
        self.properties_dirty = false;
        Ok(())
    }

    /// Drop every derived structure built from the class graph.
    pub(crate) fn invalidate(&self) {
        self.invalidate_graph();
        *self.class_index.borrow_mut() = None;
    }

    /// Drop ancestors, resolution maps and the method index. The class
    /// index is kept; mutations patch it in place.
    pub(crate) fn invalidate_graph(&self) {
        *self.graph.borrow_mut() = GraphCache::default();
        *self.method_index.borrow_mut() = None;
    }

    fn flush(&mut self) -> Result<CommitSummary> {
        let mut summary = CommitSummary::default();
        if self.libraries.has_dirty() {
            self.update_requires()?;
            self.update_sublibraries()?;
        }

        let graph_dirty = self.classes.has_dirty() || self.methods.has_dirty();
        if graph_dirty {
            self.invalidate_graph();
            summary.classes_validated = self.validate_classes()?;
        }

        let touched_classes = self.touched_classes();
        summary.records_written += self.libraries.flush(&self.files)?;
        summary.records_written += self.classes.flush(&self.files)?;
        summary.records_written += self.methods.flush(&self.files)?;
        summary.records_written += self.docs.flush(&self.files)?;
        summary.records_written += self.functions.flush(&self.files)?;

        if graph_dirty {
            self.save_class_index()?;
            for id in &touched_classes {
                self.save_own_method_names(id)?;
            }
            let index = MethodIndex::build(self)?;
            self.save_method_index(&index)?;
            summary.wide_names = index.wide_len();
            summary.narrow_names = index.narrow_len();
            *self.method_index.borrow_mut() = Some(Rc::new(index));
        }

        if self.properties_dirty {
            self.files
                .write(Path::new(PROPERTIES_FILE), &render_properties(&self.properties))?;
            self.properties_dirty = false;
        }

        self.libraries.clear_dirty();
        self.classes.clear_dirty();
        self.methods.clear_dirty();
        self.docs.clear_dirty();
        self.functions.clear_dirty();
        self.forget_dirty_classes();
        Ok(summary)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Set a global property; written at commit.
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_transaction()?;
        let valid_key = !key.is_empty()
            && !key
                .chars()
                .any(|c| c == '=' || c.is_whitespace() || c.is_control());
        if !valid_key || value.contains('\n') {
            return Err(CatalogError::InvalidKey {
                key: key.to_string(),
            });
        }
        self.properties.insert(key.to_string(), value.to_string());
        self.properties_dirty = true;
        Ok(())
    }

    /// Write the default global properties unless they are already present.
    pub fn init(&mut self) -> Result<()> {
        self.transaction(|db| {
            if db.property("encoding").is_none() {
                db.set_property("encoding", DEFAULT_ENCODING)?;
            }
            db.set_property("version", FORMAT_VERSION)?;
            Ok(())
        })
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        let classes = self.class_ids()?;
        let mut methods = 0;
        for id in &classes {
            methods += self.class(id)?.map(|c| c.entries.len()).unwrap_or(0);
        }
        Ok(DatabaseStats {
            prefix: self.prefix().to_string_lossy().to_string(),
            libraries: self.library_ids()?.len(),
            classes: classes.len(),
            methods,
            docs: self.doc_ids()?.len(),
            functions: self.function_ids()?.len(),
            indexed_names: self.method_index()?.narrow_len(),
            properties: self.properties.clone(),
        })
    }
}

fn load_properties(files: &FileStore) -> Result<BTreeMap<String, String>> {
    let mut props = BTreeMap::new();
    let Some(text) = files.read(Path::new(PROPERTIES_FILE))? else {
        return Ok(props);
    };
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let (k, v) = line.split_once('=').ok_or_else(|| {
            CatalogError::corrupt(files.prefix().join(PROPERTIES_FILE), format!("bad line {line:?}"))
        })?;
        props.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(props)
}

fn render_properties(props: &BTreeMap<String, String>) -> String {
    props.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}
