//! JSON manifest describing a catalog, and the loader that populates a
//! database from it in a single transaction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{CommitSummary, Database};
use crate::error::Result;
use crate::method::{Provenance, Visibility};
use crate::name::{ClassId, ClassKind, LibraryId, MethodId, MethodKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub properties: BTreeMap<String, String>,
    pub libraries: Vec<LibrarySpec>,
    pub docs: Vec<DocSpec>,
    pub functions: Vec<FunctionSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySpec {
    pub name: String,
    pub requires: Vec<String>,
    pub source: String,
    pub classes: Vec<ClassSpec>,
    /// Methods added to classes owned by other libraries.
    pub added_methods: Vec<AddedMethodSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    #[serde(default = "default_class_kind")]
    pub kind: ClassKind,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub included: Vec<String>,
    #[serde(default)]
    pub extended: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub methods: Vec<MethodSpecEntry>,
}

fn default_class_kind() -> ClassKind {
    ClassKind::Class
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpecEntry {
    pub kind: MethodKind,
    pub names: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedMethodSpec {
    pub class: String,
    #[serde(default = "default_added")]
    pub provenance: Provenance,
    #[serde(flatten)]
    pub method: MethodSpecEntry,
}

fn default_added() -> Provenance {
    Provenance::Added
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocSpec {
    pub name: String,
    pub title: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionSpec {
    pub name: String,
    pub filename: String,
    #[serde(rename = "macro")]
    pub is_macro: bool,
    #[serde(rename = "private")]
    pub is_private: bool,
    pub signature: String,
    pub source: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub libraries: usize,
    pub classes: usize,
    pub methods: usize,
    pub docs: usize,
    pub functions: usize,
    pub commit: CommitSummary,
}

/// Populate `db` from `manifest` and commit. Nothing is committed on error.
pub fn load(db: &mut Database, manifest: &Manifest) -> Result<LoadSummary> {
    db.begin_transaction()?;
    let mut summary = match populate(db, manifest) {
        Ok(summary) => summary,
        Err(err) => {
            db.rollback();
            return Err(err);
        }
    };
    summary.commit = db.commit()?;
    info!(
        libraries = summary.libraries,
        classes = summary.classes,
        methods = summary.methods,
        "manifest loaded"
    );
    Ok(summary)
}

fn populate(db: &mut Database, manifest: &Manifest) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    for (key, value) in &manifest.properties {
        db.set_property(key, value)?;
    }

    // libraries first so requires and ownership can refer to any of them
    let mut libs = Vec::with_capacity(manifest.libraries.len());
    for spec in &manifest.libraries {
        libs.push(db.open_library(&spec.name)?);
        summary.libraries += 1;
    }
    for (lib, spec) in libs.iter().zip(&manifest.libraries) {
        let requires = spec
            .requires
            .iter()
            .map(|r| LibraryId::from_name(r))
            .collect::<Result<Vec<_>>>()?;
        db.update_library(lib, |l| {
            l.requires = requires;
            l.source = spec.source.clone();
        })?;
        for class in &spec.classes {
            load_class(db, lib, class, &mut summary)?;
        }
    }

    // added methods last: their classes may belong to any library
    for (lib, spec) in libs.iter().zip(&manifest.libraries) {
        for added in &spec.added_methods {
            let class = ClassId::from_name(&added.class)?;
            let id = load_method(db, &class, lib, &added.method)?;
            db.update_method(&id, |m| m.provenance = added.provenance)?;
            db.library_add_method(lib, &id)?;
            summary.methods += 1;
        }
    }

    for doc in &manifest.docs {
        let id = db.open_doc(&doc.name)?;
        db.update_doc(&id, |d| {
            d.title = doc.title.clone();
            d.source = doc.source.clone();
        })?;
        summary.docs += 1;
    }
    for f in &manifest.functions {
        let id = db.open_function(&f.name)?;
        db.update_function(&id, |e| {
            e.filename = f.filename.clone();
            e.is_macro = f.is_macro;
            e.is_private = f.is_private;
            e.signature = f.signature.clone();
            e.source = f.source.clone();
        })?;
        summary.functions += 1;
    }
    Ok(summary)
}

fn load_class(
    db: &mut Database,
    lib: &LibraryId,
    spec: &ClassSpec,
    summary: &mut LoadSummary,
) -> Result<()> {
    let refs = |names: &[String]| -> Result<Vec<ClassId>> {
        names.iter().map(|n| ClassId::from_name(n)).collect()
    };
    let superclass = spec.superclass.as_deref().map(ClassId::from_name).transpose()?;
    let included = refs(&spec.included)?;
    let extended = refs(&spec.extended)?;

    let id = db.open_class(&spec.name, spec.kind)?;
    db.update_class(&id, |c| {
        c.superclass = superclass;
        c.included = included;
        c.extended = extended;
        c.aliases = spec.aliases.clone();
        c.library = Some(lib.clone());
        c.source = spec.source.clone();
    })?;
    db.library_add_class(lib, &id)?;
    summary.classes += 1;

    for method in &spec.methods {
        load_method(db, &id, lib, method)?;
        summary.methods += 1;
    }
    Ok(())
}

fn load_method(
    db: &mut Database,
    class: &ClassId,
    lib: &LibraryId,
    spec: &MethodSpecEntry,
) -> Result<MethodId> {
    let primary = spec.names.first().map(String::as_str).unwrap_or_default();
    let id = MethodId::new(class.clone(), spec.kind, primary, lib.clone())?;
    db.open_method(id.clone())?;
    db.update_method(&id, |m| {
        m.names = spec.names.clone();
        m.visibility = spec.visibility;
        m.source = spec.source.clone();
    })?;
    Ok(id)
}
