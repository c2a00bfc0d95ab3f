//! Class graph: class, module and singleton-object entries.
//!
//! Every cross-entry reference is a [`ClassId`] looked up through the
//! database, so a class may cite a superclass or module that has not been
//! created yet. Such a forward reference is a placeholder: it contributes
//! itself to ancestor lists and nothing to resolution maps.
//!
//! Derived structures (ancestor lists, resolution maps, the set of
//! link-validated classes) are cached in [`GraphCache`] and dropped whenever
//! any class or method entry changes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::method::{MethodEntry, Provenance, Visibility};
use crate::name::{ClassId, ClassKind, LibraryId, MethodId, MethodKind, ROOT_MODULE};
use crate::store::{Entry, Property, PropertyType, Record, Value};

pub const CLASS_INDEX_PATH: &str = "class/=index";
const OWN_NAMES_FILE: &str = "=index";

const CLASS_SCHEMA: &[Property] = &[
    Property::new("type", PropertyType::Symbol).with_default("class"),
    Property::new("superclass", PropertyType::Ref),
    Property::new("included", PropertyType::RefList),
    Property::new("extended", PropertyType::RefList),
    Property::new("library", PropertyType::Ref),
    Property::new("aliases", PropertyType::StringList),
    Property::new("entries", PropertyType::RefList),
    Property::new("source", PropertyType::String),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ClassEntry {
    pub id: ClassId,
    pub kind: ClassKind,
    pub superclass: Option<ClassId>,
    pub included: Vec<ClassId>,
    pub extended: Vec<ClassId>,
    pub library: Option<LibraryId>,
    /// Alternative names for this class, e.g. `Config` for `RbConfig`.
    pub aliases: Vec<String>,
    pub entries: Vec<MethodId>,
    pub source: String,
}

impl ClassEntry {
    pub fn name(&self) -> String {
        self.id.name()
    }
}

impl Entry for ClassEntry {
    type Id = ClassId;
    const SCHEMA: &'static [Property] = CLASS_SCHEMA;

    fn create(id: ClassId) -> Self {
        Self {
            id,
            kind: ClassKind::Class,
            superclass: None,
            included: Vec::new(),
            extended: Vec::new(),
            library: None,
            aliases: Vec::new(),
            entries: Vec::new(),
            source: String::new(),
        }
    }

    fn id(&self) -> &ClassId {
        &self.id
    }

    fn record_path(id: &ClassId) -> PathBuf {
        id.record_path()
    }

    fn from_record(id: ClassId, record: &Record) -> Result<Self> {
        let path = id.record_path();
        let kind_name = record.string("type");
        let kind = ClassKind::from_name(&kind_name)
            .ok_or_else(|| CatalogError::corrupt(&path, format!("unknown class type {kind_name:?}")))?;
        let class_refs = |key: &str| -> Result<Vec<ClassId>> {
            record
                .list(key)
                .iter()
                .map(|s| ClassId::from_id_string(s))
                .collect()
        };
        Ok(Self {
            kind,
            superclass: record
                .reference("superclass")
                .map(|s| ClassId::from_id_string(&s))
                .transpose()?,
            included: class_refs("included")?,
            extended: class_refs("extended")?,
            library: record
                .reference("library")
                .map(|s| LibraryId::from_name(&s))
                .transpose()?,
            aliases: record.list("aliases"),
            entries: record
                .list("entries")
                .iter()
                .map(|s| MethodId::parse(s))
                .collect::<Result<_>>()?,
            source: record.string("source"),
            id,
        })
    }

    fn to_record(&self) -> Record {
        let ids = |v: &[ClassId]| v.iter().map(|c| c.as_str().to_string()).collect();
        let mut r = Record::new(CLASS_SCHEMA);
        r.set("type", Value::Symbol(self.kind.name().to_string()));
        r.set(
            "superclass",
            Value::Ref(self.superclass.as_ref().map(|c| c.as_str().to_string())),
        );
        r.set("included", Value::RefList(ids(&self.included)));
        r.set("extended", Value::RefList(ids(&self.extended)));
        r.set(
            "library",
            Value::Ref(self.library.as_ref().map(|l| l.as_str().to_string())),
        );
        r.set("aliases", Value::StringList(self.aliases.clone()));
        r.set(
            "entries",
            Value::RefList(self.entries.iter().map(|m| m.to_string()).collect()),
        );
        r.set("source", Value::String(self.source.clone()));
        r
    }
}

/// Which resolution map: singleton methods, instance methods or constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKind {
    Singleton,
    Instance,
    Constant,
}

impl MapKind {
    pub const ALL: [MapKind; 3] = [MapKind::Singleton, MapKind::Instance, MapKind::Constant];

    /// The map answering lookups of `kind`; special variables have none.
    pub fn for_kind(kind: MethodKind) -> Option<Self> {
        match kind {
            MethodKind::SingletonMethod | MethodKind::ModuleFunction => Some(Self::Singleton),
            MethodKind::InstanceMethod => Some(Self::Instance),
            MethodKind::Constant => Some(Self::Constant),
            MethodKind::SpecialVariable => None,
        }
    }

    /// Own entries folded into this map.
    fn owns(self, kind: MethodKind) -> bool {
        match self {
            Self::Singleton => {
                matches!(kind, MethodKind::SingletonMethod | MethodKind::ModuleFunction)
            }
            Self::Instance => {
                matches!(kind, MethodKind::InstanceMethod | MethodKind::ModuleFunction)
            }
            Self::Constant => kind == MethodKind::Constant,
        }
    }

    /// Kind recorded in the wide index for a name reached through this map.
    pub fn ref_kind(self, entry_kind: MethodKind) -> MethodKind {
        match (self, entry_kind) {
            (_, MethodKind::ModuleFunction) => MethodKind::ModuleFunction,
            (Self::Singleton, _) => MethodKind::SingletonMethod,
            (Self::Instance, _) => MethodKind::InstanceMethod,
            (Self::Constant, _) => MethodKind::Constant,
        }
    }
}

/// Bare name -> resolved method, merged across the ancestry.
pub type MethodMap = BTreeMap<String, MethodId>;

/// Bare name -> the class's own entries carrying that name.
pub type OwnNames = BTreeMap<String, Vec<MethodId>>;

#[derive(Debug, Default)]
pub(crate) struct GraphCache {
    ancestors: HashMap<ClassId, Rc<Vec<ClassId>>>,
    maps: HashMap<(ClassId, MapKind), Rc<MethodMap>>,
    own_names: HashMap<ClassId, Rc<OwnNames>>,
    validated: HashSet<ClassId>,
    dirty_classes: Option<Rc<HashSet<ClassId>>>,
}

/// Contents of `class/=index`: every class's display name plus the alias table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClassIndex {
    names: BTreeMap<ClassId, String>,
    aliases: BTreeMap<ClassId, (String, ClassId)>,
}

impl ClassIndex {
    fn parse(text: &str) -> Result<Self> {
        let mut index = Self::default();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let mut cols = line.split('\t');
            match (cols.next(), cols.next(), cols.next()) {
                (Some(id), Some(name), None) => {
                    index
                        .names
                        .insert(ClassId::from_id_string(id)?, name.to_string());
                }
                (Some(id), Some(name), Some(canonical)) => {
                    index.aliases.insert(
                        ClassId::from_id_string(id)?,
                        (name.to_string(), ClassId::from_id_string(canonical)?),
                    );
                }
                _ => {
                    return Err(CatalogError::corrupt(
                        CLASS_INDEX_PATH,
                        format!("bad line {line:?}"),
                    ));
                }
            }
        }
        Ok(index)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (id, name) in &self.names {
            out.push_str(&format!("{id}\t{name}\n"));
        }
        for (id, (name, canonical)) in &self.aliases {
            out.push_str(&format!("{id}\t{name}\t{canonical}\n"));
        }
        out
    }

    fn overlay(&mut self, entry: &ClassEntry) {
        self.names.insert(entry.id.clone(), entry.name());
        self.aliases.retain(|_, (_, canonical)| *canonical != entry.id);
        for alias in &entry.aliases {
            match ClassId::from_name(alias) {
                Ok(alias_id) => {
                    self.aliases
                        .insert(alias_id, (alias.clone(), entry.id.clone()));
                }
                Err(err) => {
                    warn!(class = %entry.id, alias = %alias, error = %err, "skipping bad class alias");
                }
            }
        }
    }

    pub fn class_ids(&self) -> impl Iterator<Item = &ClassId> {
        self.names.keys()
    }

    /// `(display name, id)` for every class and alias, aliases carrying their own id.
    pub fn names(&self) -> impl Iterator<Item = (&str, &ClassId)> {
        self.names
            .iter()
            .map(|(id, name)| (name.as_str(), id))
            .chain(self.aliases.iter().map(|(id, (name, _))| (name.as_str(), id)))
    }

    pub fn canonical<'a>(&'a self, id: &'a ClassId) -> &'a ClassId {
        self.aliases.get(id).map(|(_, c)| c).unwrap_or(id)
    }

    pub fn aliases_of<'a>(&'a self, id: &'a ClassId) -> impl Iterator<Item = &'a ClassId> {
        self.aliases
            .iter()
            .filter(move |(_, (_, canonical))| canonical == id)
            .map(|(alias, _)| alias)
    }
}

impl Database {
    /// Create or reset a class entry.
    pub fn open_class(&mut self, name: &str, kind: ClassKind) -> Result<ClassId> {
        self.check_transaction()?;
        let id = ClassId::from_name(name)?;
        let mut entry = ClassEntry::create(id.clone());
        entry.kind = kind;
        let entry = self.classes.open(entry);
        self.invalidate_graph();
        self.overlay_class_index(&entry);
        debug!(class = %id, kind = kind.name(), "opened class");
        Ok(id)
    }

    pub fn update_class<R>(
        &mut self,
        id: &ClassId,
        f: impl FnOnce(&mut ClassEntry) -> R,
    ) -> Result<R> {
        self.check_transaction()?;
        let result = self
            .classes
            .update(&self.files, id, f)?
            .ok_or_else(|| CatalogError::ClassNotFound { name: id.name() })?;
        self.invalidate_graph();
        if let Some(entry) = self.class(id)? {
            if let Some(bad) = entry.aliases.iter().find(|a| ClassId::from_name(a).is_err()) {
                return Err(CatalogError::invalid_spec(bad, "class alias is not a class path"));
            }
            self.overlay_class_index(&entry);
        }
        Ok(result)
    }

    /// Fold a changed entry into the cached class index, if one is built.
    fn overlay_class_index(&self, entry: &ClassEntry) {
        if let Some(index) = self.class_index.borrow_mut().as_mut() {
            Rc::make_mut(index).overlay(entry);
        }
    }

    /// The entry for `id`, or `None` for an unresolved placeholder.
    pub fn class(&self, id: &ClassId) -> Result<Option<Rc<ClassEntry>>> {
        self.classes.get(&self.files, id)
    }

    /// Look a class up by display name or alias. Never raises for a missing class.
    pub fn get_class(&self, name: &str) -> Result<Option<Rc<ClassEntry>>> {
        let Ok(id) = ClassId::from_name(name) else {
            return Ok(None);
        };
        let id = self.canonical_class(&id)?;
        self.class(&id)
    }

    pub fn fetch_class(&self, name: &str) -> Result<Rc<ClassEntry>> {
        self.get_class(name)?
            .ok_or_else(|| CatalogError::ClassNotFound {
                name: name.to_string(),
            })
    }

    pub fn class_index(&self) -> Result<Rc<ClassIndex>> {
        if let Some(index) = self.class_index.borrow().as_ref() {
            return Ok(Rc::clone(index));
        }
        let mut index = match self.files.read(Path::new(CLASS_INDEX_PATH))? {
            Some(text) => ClassIndex::parse(&text)?,
            None => ClassIndex::default(),
        };
        for entry in self.classes.loaded() {
            index.overlay(&entry);
        }
        for id in index.class_ids() {
            self.classes.register(id.clone());
        }
        let index = Rc::new(index);
        *self.class_index.borrow_mut() = Some(Rc::clone(&index));
        Ok(index)
    }

    /// Every class id, aliases excluded. Records are not read.
    pub fn class_ids(&self) -> Result<Vec<ClassId>> {
        Ok(self.class_index()?.class_ids().cloned().collect())
    }

    pub fn canonical_class(&self, id: &ClassId) -> Result<ClassId> {
        Ok(self.class_index()?.canonical(id).clone())
    }

    /// `[c] ++ ancestors(included...) ++ ancestors(superclass)`, first occurrence kept.
    pub fn ancestors(&self, id: &ClassId) -> Result<Rc<Vec<ClassId>>> {
        self.ancestors_guarded(id, &mut Vec::new())
    }

    fn ancestors_guarded(&self, id: &ClassId, stack: &mut Vec<ClassId>) -> Result<Rc<Vec<ClassId>>> {
        let id = self.canonical_class(id)?;
        if let Some(hit) = self.graph.borrow().ancestors.get(&id) {
            return Ok(Rc::clone(hit));
        }
        if stack.contains(&id) {
            return Err(link_error(stack, &id));
        }

        let mut list = vec![id.clone()];
        if let Some(entry) = self.class(&id)? {
            stack.push(id.clone());
            for module in &entry.included {
                list.extend(self.ancestors_guarded(module, stack)?.iter().cloned());
            }
            if let Some(superclass) = &entry.superclass {
                list.extend(self.ancestors_guarded(superclass, stack)?.iter().cloned());
            }
            stack.pop();
        }

        let mut seen = HashSet::new();
        list.retain(|c| seen.insert(c.clone()));
        let list = Rc::new(list);
        self.graph
            .borrow_mut()
            .ancestors
            .insert(id, Rc::clone(&list));
        Ok(list)
    }

    /// Superclass must be a class, included/extended modules must be modules.
    /// Placeholders pass.
    pub fn check_ancestor_type(&self, id: &ClassId) -> Result<()> {
        let entry = self
            .class(id)?
            .ok_or_else(|| CatalogError::ClassNotFound { name: id.name() })?;
        if let Some(superclass) = &entry.superclass {
            let superclass = self.canonical_class(superclass)?;
            if let Some(sup) = self.class(&superclass)?
                && sup.kind != ClassKind::Class
            {
                return Err(CatalogError::InvalidAncestor {
                    class: entry.name(),
                    ancestor: sup.name(),
                    reason: format!("superclass is a {}", sup.kind.name()),
                });
            }
        }
        for module in entry.included.iter().chain(&entry.extended) {
            let module = self.canonical_class(module)?;
            if let Some(m) = self.class(&module)?
                && m.kind != ClassKind::Module
            {
                return Err(CatalogError::InvalidAncestor {
                    class: entry.name(),
                    ancestor: m.name(),
                    reason: format!("included or extended {} is not a module", m.kind.name()),
                });
            }
        }
        Ok(())
    }

    /// Depth-first walk over superclass and included modules; a class
    /// reappearing on the current path is a cycle. Validated classes are
    /// remembered until the next change.
    pub fn check_ancestors_link(&self, id: &ClassId) -> Result<()> {
        self.check_link(id, &mut Vec::new())
    }

    fn check_link(&self, id: &ClassId, path: &mut Vec<ClassId>) -> Result<()> {
        let id = self.canonical_class(id)?;
        if self.graph.borrow().validated.contains(&id) {
            return Ok(());
        }
        if path.contains(&id) {
            return Err(link_error(path, &id));
        }
        let Some(entry) = self.class(&id)? else {
            return Ok(());
        };
        path.push(id.clone());
        for next in entry.superclass.iter().chain(&entry.included) {
            self.check_link(next, path)?;
        }
        path.pop();
        self.graph.borrow_mut().validated.insert(id);
        Ok(())
    }

    /// Validate every class; returns how many were checked.
    pub(crate) fn validate_classes(&self) -> Result<usize> {
        let ids = self.class_ids()?;
        for id in &ids {
            self.check_ancestor_type(id)?;
        }
        for id in &ids {
            self.check_ancestors_link(id)?;
        }
        Ok(ids.len())
    }

    /// Resolution map: the superclass's map, then each included (or, for
    /// singleton maps, extended) module's map, then the class's own entries
    /// with `defined` entries applied last.
    pub fn method_map(&self, id: &ClassId, kind: MapKind) -> Result<Rc<MethodMap>> {
        self.map_guarded(id, kind, &mut Vec::new())
    }

    fn map_guarded(
        &self,
        id: &ClassId,
        kind: MapKind,
        stack: &mut Vec<(ClassId, MapKind)>,
    ) -> Result<Rc<MethodMap>> {
        let id = self.canonical_class(id)?;
        let key = (id.clone(), kind);
        if let Some(hit) = self.graph.borrow().maps.get(&key) {
            return Ok(Rc::clone(hit));
        }
        if stack.contains(&key) {
            let path: Vec<ClassId> = stack.iter().map(|(c, _)| c.clone()).collect();
            return Err(link_error(&path, &id));
        }
        let Some(entry) = self.class(&id)? else {
            return Ok(Rc::new(MethodMap::new()));
        };

        stack.push(key.clone());
        let mut map = match &entry.superclass {
            Some(superclass) => (*self.map_guarded(superclass, kind, stack)?).clone(),
            None => MethodMap::new(),
        };
        let (modules, module_kind) = match kind {
            MapKind::Singleton => (&entry.extended, MapKind::Instance),
            MapKind::Instance => (&entry.included, MapKind::Instance),
            MapKind::Constant => (&entry.included, MapKind::Constant),
        };
        for module in modules {
            let module_map = self.map_guarded(module, module_kind, stack)?;
            map.extend(module_map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        stack.pop();

        let own: Vec<Rc<MethodEntry>> = self
            .own_entries(&entry)?
            .into_iter()
            .filter(|m| kind.owns(m.kind()))
            .collect();
        let (defined, other): (Vec<_>, Vec<_>) = own
            .into_iter()
            .partition(|m| m.provenance == Provenance::Defined);
        for method in other.iter().chain(&defined) {
            for name in &method.names {
                map.insert(name.clone(), method.id.clone());
            }
        }

        let map = Rc::new(map);
        self.graph.borrow_mut().maps.insert(key, Rc::clone(&map));
        Ok(map)
    }

    fn own_entries(&self, entry: &ClassEntry) -> Result<Vec<Rc<MethodEntry>>> {
        let mut out = Vec::with_capacity(entry.entries.len());
        for id in &entry.entries {
            match self.method(id)? {
                Some(method) => out.push(method),
                None => warn!(class = %entry.id, method = %id, "class lists a missing method"),
            }
        }
        Ok(out)
    }

    /// Own entries of `id` plus those of the first `level` ancestors after it.
    pub fn entries(&self, id: &ClassId, level: usize) -> Result<Vec<MethodId>> {
        let mut out = Vec::new();
        for class in self.ancestors(id)?.iter().take(level + 1) {
            if let Some(entry) = self.class(class)? {
                out.extend(entry.entries.iter().cloned());
            }
        }
        Ok(out)
    }

    /// Name -> own method ids. Committed classes read `method/<class>/=index`
    /// instead of loading every method record.
    pub fn own_method_names(&self, id: &ClassId) -> Result<Rc<OwnNames>> {
        let id = self.canonical_class(id)?;
        if let Some(hit) = self.graph.borrow().own_names.get(&id) {
            return Ok(Rc::clone(hit));
        }
        let stored = if !self.dirty_classes().contains(&id) {
            self.files
                .read(&id.method_dir().join(OWN_NAMES_FILE))?
                .map(|text| parse_own_names(&id, &text))
                .transpose()?
        } else {
            None
        };
        let names = match stored {
            Some(names) => names,
            None => {
                let mut names = OwnNames::new();
                if let Some(entry) = self.class(&id)? {
                    for method in self.own_entries(&entry)? {
                        for name in &method.names {
                            names
                                .entry(name.clone())
                                .or_default()
                                .push(method.id.clone());
                        }
                    }
                }
                names
            }
        };
        let names = Rc::new(names);
        self.graph
            .borrow_mut()
            .own_names
            .insert(id, Rc::clone(&names));
        Ok(names)
    }

    pub fn has_method(&self, id: &ClassId, kind: MapKind, name: &str, inherit: bool) -> Result<bool> {
        if inherit {
            return Ok(self.method_map(id, kind)?.contains_key(name));
        }
        Ok(self
            .own_method_names(id)?
            .get(name)
            .is_some_and(|ids| ids.iter().any(|m| kind.owns(m.kind))))
    }

    pub fn is_singleton_method(&self, id: &ClassId, name: &str, inherit: bool) -> Result<bool> {
        self.has_method(id, MapKind::Singleton, name, inherit)
    }

    pub fn is_instance_method(&self, id: &ClassId, name: &str, inherit: bool) -> Result<bool> {
        self.has_method(id, MapKind::Instance, name, inherit)
    }

    pub fn is_constant(&self, id: &ClassId, name: &str, inherit: bool) -> Result<bool> {
        self.has_method(id, MapKind::Constant, name, inherit)
    }

    pub fn is_public_instance_method(&self, id: &ClassId, name: &str, inherit: bool) -> Result<bool> {
        Ok(self.visibility_of(id, MapKind::Instance, name, inherit)? == Some(Visibility::Public))
    }

    pub fn is_private_instance_method(&self, id: &ClassId, name: &str, inherit: bool) -> Result<bool> {
        Ok(self.visibility_of(id, MapKind::Instance, name, inherit)? == Some(Visibility::Private))
    }

    pub fn is_public_singleton_method(&self, id: &ClassId, name: &str, inherit: bool) -> Result<bool> {
        Ok(self.visibility_of(id, MapKind::Singleton, name, inherit)? == Some(Visibility::Public))
    }

    pub fn is_private_singleton_method(&self, id: &ClassId, name: &str, inherit: bool) -> Result<bool> {
        Ok(self.visibility_of(id, MapKind::Singleton, name, inherit)? == Some(Visibility::Private))
    }

    fn visibility_of(
        &self,
        id: &ClassId,
        kind: MapKind,
        name: &str,
        inherit: bool,
    ) -> Result<Option<Visibility>> {
        let found = if inherit {
            self.method_map(id, kind)?.get(name).cloned()
        } else {
            self.own_method_names(id)?
                .get(name)
                .and_then(|ids| ids.iter().find(|m| kind.owns(m.kind)).cloned())
        };
        match found {
            Some(method) => Ok(self.method(&method)?.map(|m| m.visibility)),
            None => Ok(None),
        }
    }

    /// Resolve `name` of `kind` as seen from class `id`, inheritance included.
    pub fn class_get_method(&self, id: &ClassId, kind: MethodKind, name: &str) -> Result<Option<MethodId>> {
        self.class_get_method_in(id, MapKind::for_kind(kind), kind, name)
    }

    /// Like [`Database::class_get_method`], looking in an explicit map. A
    /// module function sits in both the instance and the singleton map, so
    /// callers that know which one reached it pass that map here.
    pub fn class_get_method_in(
        &self,
        id: &ClassId,
        map: Option<MapKind>,
        kind: MethodKind,
        name: &str,
    ) -> Result<Option<MethodId>> {
        let found = match map {
            Some(map_kind) => self.method_map(id, map_kind)?.get(name).cloned(),
            None => self
                .own_method_names(id)?
                .get(name)
                .and_then(|ids| ids.iter().find(|m| m.kind == kind).cloned()),
        };
        Ok(found.filter(|m| kind.query_kinds().contains(&m.kind)))
    }

    /// Special variables of the root module.
    pub fn special_variables(&self) -> Result<Vec<Rc<MethodEntry>>> {
        let Some(root) = self.get_class(ROOT_MODULE)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .own_entries(&root)?
            .into_iter()
            .filter(|m| m.kind() == MethodKind::SpecialVariable)
            .collect())
    }

    /// Classes whose own entry set changed in the open transaction.
    pub(crate) fn touched_classes(&self) -> Vec<ClassId> {
        let mut ids: Vec<ClassId> = self.dirty_classes().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Dirty classes plus the classes of dirty methods, computed once per
    /// graph invalidation.
    fn dirty_classes(&self) -> Rc<HashSet<ClassId>> {
        if let Some(hit) = &self.graph.borrow().dirty_classes {
            return Rc::clone(hit);
        }
        let mut ids: HashSet<ClassId> = self.classes.dirty_ids().into_iter().collect();
        ids.extend(self.methods.dirty_ids().into_iter().map(|m| m.class));
        let ids = Rc::new(ids);
        self.graph.borrow_mut().dirty_classes = Some(Rc::clone(&ids));
        ids
    }

    /// Forget the dirty-class set once the dirty entries are written.
    pub(crate) fn forget_dirty_classes(&self) {
        self.graph.borrow_mut().dirty_classes = None;
    }

    pub(crate) fn save_class_index(&self) -> Result<()> {
        let index = self.class_index()?;
        self.files
            .write(Path::new(CLASS_INDEX_PATH), &index.render())
    }

    pub(crate) fn save_own_method_names(&self, id: &ClassId) -> Result<()> {
        if self.class(id)?.is_none() {
            return Ok(());
        }
        let names = self.own_method_names(id)?;
        let mut out = String::new();
        for (name, ids) in names.iter() {
            for method in ids {
                out.push_str(&format!("{name}\t{method}\n"));
            }
        }
        self.files
            .write(&id.method_dir().join(OWN_NAMES_FILE), &out)
    }
}

fn parse_own_names(id: &ClassId, text: &str) -> Result<OwnNames> {
    let mut names = OwnNames::new();
    for line in text.lines().filter(|l| !l.is_empty()) {
        let (name, method) = line.split_once('\t').ok_or_else(|| {
            CatalogError::corrupt(id.method_dir().join(OWN_NAMES_FILE), format!("bad line {line:?}"))
        })?;
        names
            .entry(name.to_string())
            .or_default()
            .push(MethodId::parse(method)?);
    }
    Ok(names)
}

fn link_error(path: &[ClassId], id: &ClassId) -> CatalogError {
    let mut names: Vec<String> = path.iter().map(ClassId::name).collect();
    names.push(id.name());
    CatalogError::InvalidLink {
        class: id.name(),
        path: names,
    }
}
