//! Fixture helpers shared by the unit tests.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::Database;
use crate::error::Result;
use crate::method::Provenance;
use crate::name::{ClassId, ClassKind, LibraryId, MethodId, MethodKind};

pub fn temp_prefix(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_catalog_test_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn ensure_library(db: &mut Database, name: &str) -> Result<LibraryId> {
    match db.get_library(name)? {
        Some(lib) => Ok(lib.id.clone()),
        None => db.open_library(name),
    }
}

/// Open a class owned by `lib_name`, creating the library on first use.
pub fn define_class(
    db: &mut Database,
    lib_name: &str,
    class_name: &str,
    kind: ClassKind,
    superclass: Option<&str>,
) -> Result<ClassId> {
    let lib = ensure_library(db, lib_name)?;
    let id = db.open_class(class_name, kind)?;
    let superclass = superclass.map(ClassId::from_name).transpose()?;
    db.update_class(&id, |c| {
        c.library = Some(lib.clone());
        c.superclass = superclass;
    })?;
    db.library_add_class(&lib, &id)?;
    Ok(id)
}

/// Open a method named `names[0]` with `names` as its aliases. A method
/// whose library does not own the class is recorded as added by it.
pub fn define_method(
    db: &mut Database,
    class: &ClassId,
    lib_name: &str,
    kind: MethodKind,
    names: &[&str],
) -> Result<MethodId> {
    let lib = ensure_library(db, lib_name)?;
    let id = MethodId::new(class.clone(), kind, names[0], lib.clone())?;
    db.open_method(id.clone())?;
    let owner = db.class(class)?.and_then(|c| c.library.clone());
    let foreign = owner.as_ref() != Some(&lib);
    db.update_method(&id, |m| {
        m.names = names.iter().map(|n| n.to_string()).collect();
        if foreign {
            m.provenance = Provenance::Added;
        }
    })?;
    if foreign {
        db.library_add_method(&lib, &id)?;
    }
    Ok(id)
}
