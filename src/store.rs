//! Generic persistent entry store.
//!
//! Every entry kind declares a static property schema. A record on disk is
//! one `key<TAB>value` line per property; the schema's type tag decides how
//! the value is encoded:
//!
//! - `String`: free text with `\\`, `\n`, `\t`, `\r` escaped
//! - `Symbol`: a bare enum name
//! - `Bool`: `true` / `false`
//! - `Ref`: an identifier, empty for none
//! - `StringList` / `RefList`: comma-joined items, commas inside items escaped
//!
//! Entries are held in an [`EntryTable`]: a slot is `Unloaded` until the
//! first property access reads its record, then `Loaded`. Mutations mark the
//! slot dirty; dirty slots are written back by [`EntryTable::flush`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::error::{CatalogError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Symbol,
    Bool,
    Ref,
    StringList,
    RefList,
}

/// One schema slot: key, type tag and the value a freshly created entry starts with.
#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub key: &'static str,
    pub ty: PropertyType,
    pub default: &'static str,
}

impl Property {
    pub const fn new(key: &'static str, ty: PropertyType) -> Self {
        Self { key, ty, default: "" }
    }

    pub const fn with_default(self, default: &'static str) -> Self {
        Self { default, ..self }
    }

    fn initial(&self) -> Value {
        match self.ty {
            PropertyType::String => Value::String(self.default.to_string()),
            PropertyType::Symbol => Value::Symbol(self.default.to_string()),
            PropertyType::Bool => Value::Bool(self.default == "true"),
            PropertyType::Ref if self.default.is_empty() => Value::Ref(None),
            PropertyType::Ref => Value::Ref(Some(self.default.to_string())),
            PropertyType::StringList => Value::StringList(Vec::new()),
            PropertyType::RefList => Value::RefList(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Symbol(String),
    Bool(bool),
    Ref(Option<String>),
    StringList(Vec<String>),
    RefList(Vec<String>),
}

impl Value {
    fn encode(&self) -> String {
        match self {
            Value::String(s) => escape(s, false),
            Value::Symbol(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Ref(r) => r.clone().unwrap_or_default(),
            Value::StringList(items) | Value::RefList(items) => items
                .iter()
                .map(|s| escape(s, true))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn decode(ty: PropertyType, raw: &str) -> std::result::Result<Value, String> {
        Ok(match ty {
            PropertyType::String => Value::String(unescape(raw)?),
            PropertyType::Symbol => Value::Symbol(raw.to_string()),
            PropertyType::Bool => match raw {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => return Err(format!("not a bool: {other:?}")),
            },
            PropertyType::Ref if raw.is_empty() => Value::Ref(None),
            PropertyType::Ref => Value::Ref(Some(raw.to_string())),
            PropertyType::StringList => Value::StringList(split_list(raw)?),
            PropertyType::RefList => Value::RefList(split_list(raw)?),
        })
    }
}

fn escape(s: &str, in_list: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ',' if in_list => out.push_str("\\,"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(',') => out.push(','),
            Some(other) => return Err(format!("unknown escape \\{other}")),
            None => return Err("dangling backslash".to_string()),
        }
    }
    Ok(out)
}

fn split_list(raw: &str) -> std::result::Result<Vec<String>, String> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => items.push(unescape(&std::mem::take(&mut current))?),
            c => current.push(c),
        }
    }
    items.push(unescape(&current)?);
    Ok(items)
}

/// Property values of one entry, interpreted through its schema.
#[derive(Debug, Clone)]
pub struct Record {
    schema: &'static [Property],
    values: HashMap<&'static str, Value>,
}

impl Record {
    pub fn new(schema: &'static [Property]) -> Self {
        Self {
            schema,
            values: HashMap::new(),
        }
    }

    pub fn parse(schema: &'static [Property], text: &str, path: &Path) -> Result<Self> {
        let mut record = Self::new(schema);
        for line in text.lines().filter(|l| !l.is_empty()) {
            let (key, raw) = line
                .split_once('\t')
                .ok_or_else(|| CatalogError::corrupt(path, format!("malformed line {line:?}")))?;
            let prop = schema
                .iter()
                .find(|p| p.key == key)
                .ok_or_else(|| CatalogError::InvalidKey {
                    key: key.to_string(),
                })?;
            let value = Value::decode(prop.ty, raw)
                .map_err(|reason| CatalogError::corrupt(path, format!("{key}: {reason}")))?;
            record.values.insert(prop.key, value);
        }
        Ok(record)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for prop in self.schema {
            out.push_str(prop.key);
            out.push('\t');
            out.push_str(&self.value(prop).encode());
            out.push('\n');
        }
        out
    }

    fn value(&self, prop: &Property) -> Value {
        self.values
            .get(prop.key)
            .cloned()
            .unwrap_or_else(|| prop.initial())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.schema
            .iter()
            .find(|p| p.key == key)
            .map(|p| self.value(p))
    }

    /// Panics in debug builds if `key` is not part of the schema.
    pub fn set(&mut self, key: &'static str, value: Value) {
        debug_assert!(
            self.schema.iter().any(|p| p.key == key),
            "{key} is not in the schema"
        );
        self.values.insert(key, value);
    }

    pub fn string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s) | Value::Symbol(s)) => s,
            _ => String::new(),
        }
    }

    pub fn bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    pub fn reference(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::Ref(r)) => r,
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::StringList(items) | Value::RefList(items)) => items,
            _ => Vec::new(),
        }
    }
}

/// An entry kind the store can persist.
pub trait Entry: Clone + fmt::Debug {
    type Id: Clone + Ord + fmt::Debug + fmt::Display;

    const SCHEMA: &'static [Property];

    /// A new entry holding the schema's initial values.
    fn create(id: Self::Id) -> Self;

    fn id(&self) -> &Self::Id;

    /// Record location relative to the database prefix.
    fn record_path(id: &Self::Id) -> PathBuf;

    fn from_record(id: Self::Id, record: &Record) -> Result<Self>;

    fn to_record(&self) -> Record;
}

/// Synchronous file access below the database prefix.
#[derive(Debug)]
pub struct FileStore {
    prefix: PathBuf,
    reads: Cell<usize>,
    writes: Cell<usize>,
}

impl FileStore {
    pub fn new(prefix: PathBuf) -> Self {
        Self {
            prefix,
            reads: Cell::new(0),
            writes: Cell::new(0),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Number of files read so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn read(&self, rel: &Path) -> Result<Option<String>> {
        let path = self.prefix.join(rel);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                self.reads.set(self.reads.get() + 1);
                Ok(Some(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CatalogError::io(path, e)),
        }
    }

    /// Write a file, creating its parent directory and retrying once if it is missing.
    pub fn write(&self, rel: &Path, content: &str) -> Result<()> {
        let path = self.prefix.join(rel);
        if let Err(e) = std::fs::write(&path, content) {
            if e.kind() != ErrorKind::NotFound {
                return Err(CatalogError::io(path, e));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
            }
            std::fs::write(&path, content).map_err(|e| CatalogError::io(&path, e))?;
        }
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    /// Record file names in a directory, sorted. Index files (`=...`) and
    /// subdirectories are skipped; a missing directory lists as empty.
    pub fn list(&self, rel_dir: &Path) -> Result<Vec<String>> {
        let dir = self.prefix.join(rel_dir);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CatalogError::io(dir, e)),
        };
        let mut names = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| CatalogError::io(&dir, e))?;
            if item.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = item.file_name().to_string_lossy().to_string();
            if !name.starts_with('=') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[derive(Debug)]
enum EntryState<E> {
    Unloaded,
    Loaded(Rc<E>),
}

/// The single in-memory copy of every entry of one kind, keyed by identifier.
#[derive(Debug)]
pub struct EntryTable<E: Entry> {
    slots: RefCell<BTreeMap<E::Id, EntryState<E>>>,
    dirty: RefCell<BTreeSet<E::Id>>,
}

impl<E: Entry> Default for EntryTable<E> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(BTreeMap::new()),
            dirty: RefCell::new(BTreeSet::new()),
        }
    }
}

impl<E: Entry> EntryTable<E> {
    /// Track an identifier known to exist on disk without reading it.
    pub fn register(&self, id: E::Id) {
        self.slots
            .borrow_mut()
            .entry(id)
            .or_insert(EntryState::Unloaded);
    }

    pub fn is_loaded(&self, id: &E::Id) -> bool {
        matches!(self.slots.borrow().get(id), Some(EntryState::Loaded(_)))
    }

    /// All identifiers currently tracked, loaded or not.
    pub fn ids(&self) -> Vec<E::Id> {
        self.slots.borrow().keys().cloned().collect()
    }

    /// Entries already held in memory.
    pub fn loaded(&self) -> Vec<Rc<E>> {
        self.slots
            .borrow()
            .values()
            .filter_map(|s| match s {
                EntryState::Loaded(e) => Some(Rc::clone(e)),
                EntryState::Unloaded => None,
            })
            .collect()
    }

    /// Return the entry, reading its record on first access.
    pub fn get(&self, files: &FileStore, id: &E::Id) -> Result<Option<Rc<E>>> {
        if let Some(EntryState::Loaded(entry)) = self.slots.borrow().get(id) {
            return Ok(Some(Rc::clone(entry)));
        }
        let path = E::record_path(id);
        let Some(text) = files.read(&path)? else {
            return Ok(None);
        };
        let record = Record::parse(E::SCHEMA, &text, &path)?;
        let entry = Rc::new(E::from_record(id.clone(), &record)?);
        debug!(id = %id, path = %path.display(), "loaded entry");
        self.slots
            .borrow_mut()
            .insert(id.clone(), EntryState::Loaded(Rc::clone(&entry)));
        Ok(Some(entry))
    }

    /// Install `entry`, replacing whatever was held for its id, and mark it dirty.
    pub fn open(&self, entry: E) -> Rc<E> {
        let id = entry.id().clone();
        let entry = Rc::new(entry);
        self.slots
            .borrow_mut()
            .insert(id.clone(), EntryState::Loaded(Rc::clone(&entry)));
        self.dirty.borrow_mut().insert(id);
        entry
    }

    /// Apply `f` to the entry and mark it dirty. `None` if the entry does not exist.
    pub fn update<R>(
        &self,
        files: &FileStore,
        id: &E::Id,
        f: impl FnOnce(&mut E) -> R,
    ) -> Result<Option<R>> {
        if self.get(files, id)?.is_none() {
            return Ok(None);
        }
        let mut slots = self.slots.borrow_mut();
        let Some(EntryState::Loaded(entry)) = slots.get_mut(id) else {
            return Ok(None);
        };
        let result = f(Rc::make_mut(entry));
        drop(slots);
        self.dirty.borrow_mut().insert(id.clone());
        Ok(Some(result))
    }

    pub fn is_dirty(&self, id: &E::Id) -> bool {
        self.dirty.borrow().contains(id)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.borrow().is_empty()
    }

    pub fn dirty_ids(&self) -> Vec<E::Id> {
        self.dirty.borrow().iter().cloned().collect()
    }

    /// Write every dirty entry. Returns the number of records written.
    pub fn flush(&self, files: &FileStore) -> Result<usize> {
        let mut written = 0;
        for id in self.dirty_ids() {
            let entry = match self.slots.borrow().get(&id) {
                Some(EntryState::Loaded(e)) => Rc::clone(e),
                _ => continue,
            };
            files.write(&E::record_path(&id), &entry.to_record().render())?;
            debug!(id = %id, "saved entry");
            written += 1;
        }
        Ok(written)
    }

    pub fn clear_dirty(&self) {
        self.dirty.borrow_mut().clear();
    }

    /// Forget everything held in memory, dirty or not.
    pub fn reset(&self) {
        self.slots.borrow_mut().clear();
        self.dirty.borrow_mut().clear();
    }
}
