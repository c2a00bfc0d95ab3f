//! Free-standing entries: documents and C-API functions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::name::{fsdecode, fsencode};
use crate::store::{Entry, Property, PropertyType, Record, Value};

const DOC_DIR: &str = "doc";
const FUNCTION_DIR: &str = "function";

const DOC_SCHEMA: &[Property] = &[
    Property::new("title", PropertyType::String),
    Property::new("source", PropertyType::String),
];

const FUNCTION_SCHEMA: &[Property] = &[
    Property::new("filename", PropertyType::String),
    Property::new("macro", PropertyType::Bool),
    Property::new("private", PropertyType::Bool),
    Property::new("signature", PropertyType::String),
    Property::new("source", PropertyType::String),
];

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CatalogError::invalid_spec(name, "not an entry name"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(String);

impl DocId {
    pub fn from_name(name: &str) -> Result<Self> {
        check_name(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(String);

impl FunctionId {
    pub fn from_name(name: &str) -> Result<Self> {
        check_name(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocEntry {
    pub id: DocId,
    pub title: String,
    pub source: String,
}

impl Entry for DocEntry {
    type Id = DocId;
    const SCHEMA: &'static [Property] = DOC_SCHEMA;

    fn create(id: DocId) -> Self {
        Self {
            id,
            title: String::new(),
            source: String::new(),
        }
    }

    fn id(&self) -> &DocId {
        &self.id
    }

    fn record_path(id: &DocId) -> PathBuf {
        Path::new(DOC_DIR).join(fsencode(id.name()))
    }

    fn from_record(id: DocId, record: &Record) -> Result<Self> {
        Ok(Self {
            id,
            title: record.string("title"),
            source: record.string("source"),
        })
    }

    fn to_record(&self) -> Record {
        let mut r = Record::new(DOC_SCHEMA);
        r.set("title", Value::String(self.title.clone()));
        r.set("source", Value::String(self.source.clone()));
        r
    }
}

/// A documented C function or macro.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    pub id: FunctionId,
    pub filename: String,
    pub is_macro: bool,
    pub is_private: bool,
    pub signature: String,
    pub source: String,
}

impl Entry for FunctionEntry {
    type Id = FunctionId;
    const SCHEMA: &'static [Property] = FUNCTION_SCHEMA;

    fn create(id: FunctionId) -> Self {
        Self {
            id,
            filename: String::new(),
            is_macro: false,
            is_private: false,
            signature: String::new(),
            source: String::new(),
        }
    }

    fn id(&self) -> &FunctionId {
        &self.id
    }

    fn record_path(id: &FunctionId) -> PathBuf {
        Path::new(FUNCTION_DIR).join(fsencode(id.name()))
    }

    fn from_record(id: FunctionId, record: &Record) -> Result<Self> {
        Ok(Self {
            id,
            filename: record.string("filename"),
            is_macro: record.bool("macro"),
            is_private: record.bool("private"),
            signature: record.string("signature"),
            source: record.string("source"),
        })
    }

    fn to_record(&self) -> Record {
        let mut r = Record::new(FUNCTION_SCHEMA);
        r.set("filename", Value::String(self.filename.clone()));
        r.set("macro", Value::Bool(self.is_macro));
        r.set("private", Value::Bool(self.is_private));
        r.set("signature", Value::String(self.signature.clone()));
        r.set("source", Value::String(self.source.clone()));
        r
    }
}

impl Database {
    pub fn open_doc(&mut self, name: &str) -> Result<DocId> {
        self.check_transaction()?;
        let id = DocId::from_name(name)?;
        self.docs.open(DocEntry::create(id.clone()));
        Ok(id)
    }

    pub fn update_doc<R>(&mut self, id: &DocId, f: impl FnOnce(&mut DocEntry) -> R) -> Result<R> {
        self.check_transaction()?;
        self.docs
            .update(&self.files, id, f)?
            .ok_or_else(|| CatalogError::DocNotFound {
                name: id.to_string(),
            })
    }

    pub fn get_doc(&self, name: &str) -> Result<Option<Rc<DocEntry>>> {
        match DocId::from_name(name) {
            Ok(id) => self.docs.get(&self.files, &id),
            Err(_) => Ok(None),
        }
    }

    pub fn fetch_doc(&self, name: &str) -> Result<Rc<DocEntry>> {
        self.get_doc(name)?.ok_or_else(|| CatalogError::DocNotFound {
            name: name.to_string(),
        })
    }

    pub fn doc_ids(&self) -> Result<Vec<DocId>> {
        for file in self.files.list(Path::new(DOC_DIR))? {
            self.docs.register(DocId::from_name(&fsdecode(&file)?)?);
        }
        Ok(self.docs.ids())
    }

    pub fn open_function(&mut self, name: &str) -> Result<FunctionId> {
        self.check_transaction()?;
        let id = FunctionId::from_name(name)?;
        self.functions.open(FunctionEntry::create(id.clone()));
        Ok(id)
    }

    pub fn update_function<R>(
        &mut self,
        id: &FunctionId,
        f: impl FnOnce(&mut FunctionEntry) -> R,
    ) -> Result<R> {
        self.check_transaction()?;
        self.functions
            .update(&self.files, id, f)?
            .ok_or_else(|| CatalogError::FunctionNotFound {
                name: id.to_string(),
            })
    }

    pub fn get_function(&self, name: &str) -> Result<Option<Rc<FunctionEntry>>> {
        match FunctionId::from_name(name) {
            Ok(id) => self.functions.get(&self.files, &id),
            Err(_) => Ok(None),
        }
    }

    pub fn fetch_function(&self, name: &str) -> Result<Rc<FunctionEntry>> {
        self.get_function(name)?
            .ok_or_else(|| CatalogError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    pub fn function_ids(&self) -> Result<Vec<FunctionId>> {
        for file in self.files.list(Path::new(FUNCTION_DIR))? {
            self.functions
                .register(FunctionId::from_name(&fsdecode(&file)?)?);
        }
        Ok(self.functions.ids())
    }
}
