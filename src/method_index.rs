//! Inverted indices from bare method name to the classes that answer to it.
//!
//! - wide (`method/=index`): built from every class's resolution maps, so a
//!   class appears for every method it inherits
//! - narrow (`method/=sindex`): built from own entries only
//!
//! Both files hold sorted `name<TAB>ref ref ...` lines where a ref is the
//! class id followed by a type char, e.g. `Hoge=Bars`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::class::MapKind;
use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::name::{ClassId, MethodKind};

pub const WIDE_INDEX_PATH: &str = "method/=index";
pub const NARROW_INDEX_PATH: &str = "method/=sindex";

/// A class together with the kind under which it answers to a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef {
    pub class: ClassId,
    pub kind: MethodKind,
}

impl ClassRef {
    fn parse(token: &str, path: &str) -> Result<Self> {
        let bad = || CatalogError::corrupt(path, format!("bad class ref {token:?}"));
        let mut chars = token.chars();
        let tc = chars.next_back().ok_or_else(bad)?;
        let kind = MethodKind::from_type_char(tc).ok_or_else(bad)?;
        Ok(Self {
            class: ClassId::from_id_string(chars.as_str()).map_err(|_| bad())?,
            kind,
        })
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class, self.kind.type_char())
    }
}

type Postings = BTreeMap<String, Vec<ClassRef>>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MethodIndex {
    wide: Postings,
    narrow: Postings,
}

impl MethodIndex {
    pub fn build(db: &Database) -> Result<Self> {
        let mut wide: BTreeMap<String, BTreeSet<ClassRef>> = BTreeMap::new();
        let mut narrow: BTreeMap<String, BTreeSet<ClassRef>> = BTreeMap::new();
        for class in db.class_ids()? {
            for map_kind in MapKind::ALL {
                for (name, method) in db.method_map(&class, map_kind)?.iter() {
                    wide.entry(name.clone()).or_default().insert(ClassRef {
                        class: class.clone(),
                        kind: map_kind.ref_kind(method.kind),
                    });
                }
            }
            for (name, methods) in db.own_method_names(&class)?.iter() {
                for method in methods {
                    let cref = ClassRef {
                        class: class.clone(),
                        kind: method.kind,
                    };
                    if method.kind == MethodKind::SpecialVariable {
                        wide.entry(name.clone()).or_default().insert(cref.clone());
                    }
                    narrow.entry(name.clone()).or_default().insert(cref);
                }
            }
        }
        let collect = |m: BTreeMap<String, BTreeSet<ClassRef>>| -> Postings {
            m.into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect()
        };
        let index = Self {
            wide: collect(wide),
            narrow: collect(narrow),
        };
        debug!(
            wide = index.wide.len(),
            narrow = index.narrow.len(),
            "method index built"
        );
        Ok(index)
    }

    fn parse_postings(text: &str, path: &str) -> Result<Postings> {
        let mut out = Postings::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let (name, refs) = line
                .split_once('\t')
                .ok_or_else(|| CatalogError::corrupt(path, format!("bad line {line:?}")))?;
            let refs = refs
                .split(' ')
                .filter(|r| !r.is_empty())
                .map(|r| ClassRef::parse(r, path))
                .collect::<Result<_>>()?;
            out.insert(name.to_string(), refs);
        }
        Ok(out)
    }

    fn render_postings(postings: &Postings) -> String {
        let mut out = String::new();
        for (name, refs) in postings {
            let refs: Vec<String> = refs.iter().map(ClassRef::to_string).collect();
            out.push_str(&format!("{name}\t{}\n", refs.join(" ")));
        }
        out
    }

    pub fn parse(wide: &str, narrow: &str) -> Result<Self> {
        Ok(Self {
            wide: Self::parse_postings(wide, WIDE_INDEX_PATH)?,
            narrow: Self::parse_postings(narrow, NARROW_INDEX_PATH)?,
        })
    }

    pub fn render_wide(&self) -> String {
        Self::render_postings(&self.wide)
    }

    pub fn render_narrow(&self) -> String {
        Self::render_postings(&self.narrow)
    }

    pub fn wide(&self, name: &str) -> &[ClassRef] {
        self.wide.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn narrow(&self, name: &str) -> &[ClassRef] {
        self.narrow.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every name some class defines itself, sorted.
    pub fn narrow_names(&self) -> impl Iterator<Item = &str> {
        self.narrow.keys().map(String::as_str)
    }

    pub fn wide_len(&self) -> usize {
        self.wide.len()
    }

    pub fn narrow_len(&self) -> usize {
        self.narrow.len()
    }
}

impl Database {
    /// The committed index, or a fresh build while entries are dirty.
    pub fn method_index(&self) -> Result<Rc<MethodIndex>> {
        if let Some(index) = self.method_index.borrow().as_ref() {
            return Ok(Rc::clone(index));
        }
        let clean = !self.classes.has_dirty() && !self.methods.has_dirty();
        let stored = if clean {
            match (
                self.files.read(Path::new(WIDE_INDEX_PATH))?,
                self.files.read(Path::new(NARROW_INDEX_PATH))?,
            ) {
                (Some(wide), Some(narrow)) => Some(MethodIndex::parse(&wide, &narrow)?),
                _ => None,
            }
        } else {
            None
        };
        let index = Rc::new(match stored {
            Some(index) => index,
            None => MethodIndex::build(self)?,
        });
        *self.method_index.borrow_mut() = Some(Rc::clone(&index));
        Ok(index)
    }

    /// Classes reaching `name` through inheritance, aliases of those classes included.
    pub fn mname2crefs_wide(&self, name: &str) -> Result<Vec<ClassRef>> {
        let index = self.method_index()?;
        let classes = self.class_index()?;
        let mut out = Vec::new();
        for cref in index.wide(name) {
            out.push(cref.clone());
            for alias in classes.aliases_of(&cref.class) {
                out.push(ClassRef {
                    class: alias.clone(),
                    kind: cref.kind,
                });
            }
        }
        Ok(out)
    }

    /// Canonical classes defining `name` themselves.
    pub fn mname2crefs_narrow(&self, name: &str) -> Result<Vec<ClassRef>> {
        Ok(self.method_index()?.narrow(name).to_vec())
    }

    pub(crate) fn save_method_index(&self, index: &MethodIndex) -> Result<()> {
        self.files
            .write(Path::new(WIDE_INDEX_PATH), &index.render_wide())?;
        self.files
            .write(Path::new(NARROW_INDEX_PATH), &index.render_narrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::ClassKind;
    use crate::test_support::{define_class, define_method, temp_prefix};

    fn names(refs: &[ClassRef]) -> Vec<String> {
        refs.iter().map(ClassRef::to_string).collect()
    }

    #[test]
    fn wide_index_follows_inheritance_and_narrow_does_not() -> Result<()> {
        let prefix = temp_prefix("mindex");
        let mut db = Database::open(&prefix)?;
        db.transaction(|db| {
            let hoge = define_class(db, "_builtin", "Hoge", ClassKind::Class, None)?;
            define_method(db, &hoge, "_builtin", MethodKind::InstanceMethod, &["hoge"])?;
            define_method(db, &hoge, "_builtin", MethodKind::ModuleFunction, &["util"])?;
            let bar = define_class(db, "_builtin", "Hoge::Bar", ClassKind::Class, Some("Hoge"))?;
            define_method(db, &bar, "_builtin", MethodKind::SingletonMethod, &["bar"])?;
            Ok(())
        })?;

        let db = Database::open(&prefix)?;
        assert_eq!(names(&db.mname2crefs_narrow("hoge")?), vec!["Hogei"]);
        assert_eq!(names(&db.mname2crefs_wide("hoge")?), vec!["Hogei", "Hoge=Bari"]);
        assert_eq!(names(&db.mname2crefs_wide("bar")?), vec!["Hoge=Bars"]);
        // module functions keep their own kind in both maps
        assert_eq!(names(&db.mname2crefs_wide("util")?), vec!["Hogem", "Hoge=Barm"]);
        assert!(db.mname2crefs_wide("nothing")?.is_empty());

        let stored = std::fs::read_to_string(prefix.join(WIDE_INDEX_PATH)).unwrap();
        assert!(stored.starts_with("bar\tHoge=Bars\nhoge\tHogei Hoge=Bari\n"));
        let _ = std::fs::remove_dir_all(prefix);
        Ok(())
    }

    #[test]
    fn wide_lookup_expands_class_aliases() -> Result<()> {
        let mut db = Database::open(temp_prefix("mindex_alias"))?;
        db.transaction(|db| {
            let rb = define_class(db, "rbconfig", "RbConfig", ClassKind::Module, None)?;
            db.update_class(&rb, |c| c.aliases.push("Config".to_string()))?;
            define_method(db, &rb, "rbconfig", MethodKind::ModuleFunction, &["expand"])?;
            Ok(())
        })?;
        assert_eq!(names(&db.mname2crefs_wide("expand")?), vec!["RbConfigm", "Configm"]);
        assert_eq!(names(&db.mname2crefs_narrow("expand")?), vec!["RbConfigm"]);
        Ok(())
    }

    #[test]
    fn special_variables_are_indexed_under_the_root_module() -> Result<()> {
        let mut db = Database::open(temp_prefix("mindex_gvar"))?;
        db.transaction(|db| {
            let kernel = define_class(db, "_builtin", "Kernel", ClassKind::Module, None)?;
            define_method(db, &kernel, "_builtin", MethodKind::SpecialVariable, &["stdout"])?;
            Ok(())
        })?;
        let index = db.method_index()?;
        assert_eq!(names(index.wide("stdout")), vec!["Kernelv"]);
        assert_eq!(names(index.narrow("stdout")), vec!["Kernelv"]);
        Ok(())
    }

    #[test]
    fn class_ref_tokens_parse_back() -> Result<()> {
        let index = MethodIndex::parse("each\tArrayi Hash=Entryi\n", "each\tArrayi\n")?;
        assert_eq!(names(index.wide("each")), vec!["Arrayi", "Hash=Entryi"]);
        assert_eq!(index.wide("each")[1].class.name(), "Hash::Entry");
        assert!(MethodIndex::parse("each\tArrayz\n", "").is_err());
        Ok(())
    }
}
