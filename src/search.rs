//! Pattern resolution over the class graph and the method index.
//!
//! A pattern has an optional class part, an optional type mark and an
//! optional method part. Every fuzzy step uses [`narrow_then_widen`]:
//!
//! 1. keep candidates whose name starts with the query, ignoring case
//! 2. of those, prefer names equal to the query ignoring case
//! 3. of those, prefer names equal to the query exactly
//!
//! A stage that would leave nothing is skipped, and a stage that already
//! leaves one distinct value stops the narrowing.
//!
//! Searching never raises for "no match"; [`Database::search_methods`] and
//! [`Database::search_classes`] turn an empty result into a not-found error.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::class::{ClassEntry, MapKind};
use crate::db::Database;
use crate::error::{CatalogError, Result};
use crate::name::{ClassId, MethodId, MethodKind, ROOT_MODULE, is_class_path, is_ident};

pub const DEFAULT_MAX_COMBINATIONS: usize = 10_000;

/// A parsed search query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPattern {
    pub klass: Option<String>,
    pub kind: Option<MethodKind>,
    pub method: Option<String>,
}

impl SearchPattern {
    /// Accepts `Cls#m`, `Cls.m`, `Cls.#m`, `Cls::C`, `Cls.`, `#m`, `m`, `$v`,
    /// `Kernel$v`, `Cls m` and `Cls mark m`.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Ok(Self::default()),
            [one] => Ok(parse_compact(one)),
            [klass, rest] => {
                if !is_class_path(klass) {
                    return Err(CatalogError::invalid_spec(input, "expected a class name first"));
                }
                let (kind, method) = match split_mark(rest) {
                    Some((kind, method)) => (Some(kind), non_empty(method)),
                    None => (None, Some(rest.to_string())),
                };
                Ok(Self {
                    klass: Some(klass.to_string()),
                    kind,
                    method,
                })
            }
            [klass, mark, method] => {
                if !is_class_path(klass) {
                    return Err(CatalogError::invalid_spec(input, "expected a class name first"));
                }
                let kind = MethodKind::from_mark(mark)
                    .ok_or_else(|| CatalogError::invalid_spec(input, format!("unknown mark {mark:?}")))?;
                Ok(Self {
                    klass: Some(klass.to_string()),
                    kind: Some(kind),
                    method: Some(method.to_string()),
                })
            }
            _ => Err(CatalogError::invalid_spec(input, "too many words")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.klass.is_none() && self.kind.is_none() && self.method.is_none()
    }
}

impl fmt::Display for SearchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let klass = self.klass.as_deref().unwrap_or("");
        let method = self.method.as_deref().unwrap_or("");
        match self.kind {
            Some(kind) => write!(f, "{klass}{}{method}", kind.mark()),
            None if !klass.is_empty() && !method.is_empty() => write!(f, "{klass} {method}"),
            None => write!(f, "{klass}{method}"),
        }
    }
}

impl FromStr for SearchPattern {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Longest leading mark, and what follows it.
fn split_mark(s: &str) -> Option<(MethodKind, &str)> {
    [".#", "::", ".", "#", "$"].into_iter().find_map(|mark| {
        s.strip_prefix(mark)
            .and_then(|rest| MethodKind::from_mark(mark).map(|kind| (kind, rest)))
    })
}

/// Byte length of the leading `Ident(::Ident)*`, 0 if there is none.
fn class_path_len(s: &str) -> usize {
    let ident_len = |from: usize| {
        let tail = &s[from..];
        let len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len());
        if is_ident(&tail[..len]) { len } else { 0 }
    };
    let mut end = ident_len(0);
    if end == 0 {
        return 0;
    }
    while s[end..].starts_with("::") {
        let next = ident_len(end + 2);
        if next == 0 {
            break;
        }
        end += 2 + next;
    }
    end
}

fn parse_compact(s: &str) -> SearchPattern {
    if let Some(rest) = s.strip_prefix('$') {
        return SearchPattern {
            klass: None,
            kind: Some(MethodKind::SpecialVariable),
            method: non_empty(rest),
        };
    }
    let method_only = || SearchPattern {
        method: Some(s.to_string()),
        ..SearchPattern::default()
    };

    let len = class_path_len(s);
    if len == 0 {
        return match split_mark(s) {
            Some((kind, rest)) => SearchPattern {
                klass: None,
                kind: Some(kind),
                method: non_empty(rest),
            },
            None => method_only(),
        };
    }

    let (prefix, rest) = s.split_at(len);
    if rest.is_empty() {
        let class_like = prefix.contains("::") || prefix.starts_with(|c: char| c.is_ascii_uppercase());
        return if class_like {
            SearchPattern {
                klass: Some(prefix.to_string()),
                ..SearchPattern::default()
            }
        } else {
            method_only()
        };
    }
    match split_mark(rest) {
        Some((kind, method)) => SearchPattern {
            klass: Some(prefix.to_string()),
            kind: Some(kind),
            method: non_empty(method),
        },
        None => method_only(),
    }
}

/// Prefix match, then case-insensitive equality, then exact equality.
/// Returned values are distinct and keep candidate order.
pub fn narrow_then_widen<T: Clone + PartialEq>(candidates: &[(String, T)], query: &str) -> Vec<T> {
    let lower = query.to_lowercase();
    let prefixed: Vec<&(String, T)> = candidates
        .iter()
        .filter(|(name, _)| name.to_lowercase().starts_with(&lower))
        .collect();
    let mut stage = prefixed;
    if distinct(&stage).len() > 1 {
        let ci: Vec<&(String, T)> = stage
            .iter()
            .copied()
            .filter(|(name, _)| name.to_lowercase() == lower)
            .collect();
        if !ci.is_empty() {
            stage = ci;
        }
    }
    if distinct(&stage).len() > 1 {
        let cs: Vec<&(String, T)> = stage.iter().copied().filter(|(name, _)| name == query).collect();
        if !cs.is_empty() {
            stage = cs;
        }
    }
    distinct(&stage)
}

fn distinct<T: Clone + PartialEq>(stage: &[&(String, T)]) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for (_, value) in stage {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Upper bound on class x method pairs examined by one query.
    pub max_combinations: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_combinations: DEFAULT_MAX_COMBINATIONS,
        }
    }
}

/// One resolved method with every class it was reached from.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRecord {
    pub method: MethodId,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub pattern: SearchPattern,
    /// Display names of the classes the class part resolved to.
    pub classes: Vec<String>,
    pub records: Vec<SearchRecord>,
    /// Set when the class x method expansion hit the configured cap.
    pub truncated: bool,
}

impl SearchResult {
    fn new(pattern: SearchPattern) -> Self {
        Self {
            pattern,
            ..Self::default()
        }
    }

    pub fn fail(&self) -> bool {
        self.classes.is_empty() && self.records.is_empty()
    }

    pub fn success(&self) -> bool {
        !self.fail()
    }

    /// Exactly one method, or exactly one class when no method was asked for.
    pub fn determined(&self) -> bool {
        self.records.len() == 1 || (self.records.is_empty() && self.classes.len() == 1)
    }

    /// Merge on method identity, collecting origins.
    fn add(&mut self, index: &mut HashMap<MethodId, usize>, method: MethodId, origin: String) {
        match index.get(&method) {
            Some(&i) => {
                let origins = &mut self.records[i].origins;
                if !origins.contains(&origin) {
                    origins.push(origin);
                }
            }
            None => {
                index.insert(method.clone(), self.records.len());
                self.records.push(SearchRecord {
                    method,
                    origins: vec![origin],
                });
            }
        }
    }
}

/// A class reached by the class part: its id (possibly an alias) and the
/// name it was matched under.
type ClassHit = (ClassId, String);

struct Combination {
    class: ClassId,
    origin: String,
    kind: MethodKind,
    map: Option<MapKind>,
    name: String,
}

pub struct SearchEngine<'a> {
    db: &'a Database,
    options: SearchOptions,
}

impl<'a> SearchEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_options(db, SearchOptions::default())
    }

    pub fn with_options(db: &'a Database, options: SearchOptions) -> Self {
        Self { db, options }
    }

    pub fn search(&self, pattern: &SearchPattern) -> Result<SearchResult> {
        let mut result = SearchResult::new(pattern.clone());
        let mut seen = HashMap::new();

        if pattern.is_empty() {
            self.dump(&mut result, &mut seen)?;
        } else if pattern.kind == Some(MethodKind::SpecialVariable) {
            self.special_variables(pattern.method.as_deref(), &mut result, &mut seen)?;
        } else if let Some(klass) = &pattern.klass {
            let classes = self.resolve_classes(klass)?;
            if pattern.kind.is_none() && pattern.method.is_none() {
                if classes.is_empty() && klass.contains("::") {
                    return self.constant_retry(pattern, klass);
                }
                result.classes = classes.into_iter().map(|(_, name)| name).collect();
            } else {
                result.classes = classes.iter().map(|(_, name)| name.clone()).collect();
                self.class_methods(&classes, pattern, &mut result, &mut seen)?;
            }
        } else {
            self.methods_by_name(pattern, &mut result, &mut seen)?;
        }

        debug!(
            pattern = %pattern,
            classes = result.classes.len(),
            records = result.records.len(),
            "search finished"
        );
        Ok(result)
    }

    fn dump(&self, result: &mut SearchResult, seen: &mut HashMap<MethodId, usize>) -> Result<()> {
        for id in self.db.class_ids()? {
            let Some(class) = self.db.class(&id)? else {
                continue;
            };
            result.classes.push(class.name());
            for method in &class.entries {
                result.add(seen, method.clone(), class.name());
            }
        }
        Ok(())
    }

    fn special_variables(
        &self,
        query: Option<&str>,
        result: &mut SearchResult,
        seen: &mut HashMap<MethodId, usize>,
    ) -> Result<()> {
        let candidates: Vec<(String, MethodId)> = self
            .db
            .special_variables()?
            .iter()
            .flat_map(|m| m.names.iter().map(|n| (n.clone(), m.id.clone())))
            .collect();
        let hits = match query {
            Some(q) => narrow_then_widen(&candidates, q),
            None => distinct(&candidates.iter().collect::<Vec<_>>()),
        };
        for method in hits {
            result.add(seen, method, ROOT_MODULE.to_string());
        }
        Ok(())
    }

    /// Class names are matched in full and by every `::`-separated tail, so
    /// `HTTP` reaches `Net::HTTP`. Aliases match under their own name.
    fn resolve_classes(&self, query: &str) -> Result<Vec<ClassHit>> {
        let index = self.db.class_index()?;
        let mut candidates = Vec::new();
        for (name, id) in index.names() {
            let hit: ClassHit = (id.clone(), name.to_string());
            candidates.push((name.to_string(), hit.clone()));
            let mut tail = name;
            while let Some((_, rest)) = tail.split_once("::") {
                candidates.push((rest.to_string(), hit.clone()));
                tail = rest;
            }
        }
        Ok(narrow_then_widen(&candidates, query))
    }

    /// `A::B` that names no class is looked up as constant `B` of `A`.
    fn constant_retry(&self, pattern: &SearchPattern, klass: &str) -> Result<SearchResult> {
        let Some((outer, constant)) = klass.rsplit_once("::") else {
            return Ok(SearchResult::new(pattern.clone()));
        };
        let retry = SearchPattern {
            klass: Some(outer.to_string()),
            kind: Some(MethodKind::Constant),
            method: Some(constant.to_string()),
        };
        debug!(pattern = %pattern, retry = %retry, "retrying as constant");
        let mut result = self.search(&retry)?;
        result.pattern = pattern.clone();
        Ok(result)
    }

    fn class_methods(
        &self,
        classes: &[ClassHit],
        pattern: &SearchPattern,
        result: &mut SearchResult,
        seen: &mut HashMap<MethodId, usize>,
    ) -> Result<()> {
        let query = pattern.method.as_deref();
        for group in kind_groups(pattern.kind, query) {
            let map_kinds: BTreeSet<MapKind> =
                group.iter().filter_map(|k| MapKind::for_kind(*k)).collect();
            let mut names = BTreeSet::new();
            for (class, _) in classes {
                for map_kind in &map_kinds {
                    names.extend(self.db.method_map(class, *map_kind)?.keys().cloned());
                }
            }
            let candidates: Vec<(String, String)> =
                names.into_iter().map(|n| (n.clone(), n)).collect();
            let chosen = match query {
                Some(q) => narrow_then_widen(&candidates, q),
                None => candidates.into_iter().map(|(n, _)| n).collect(),
            };
            if chosen.is_empty() {
                continue;
            }

            let (combinations, truncated) = self.make_cm_combination(&chosen, classes, &group)?;
            result.truncated |= truncated;
            for c in combinations {
                if let Some(method) = self.db.class_get_method_in(&c.class, c.map, c.kind, &c.name)? {
                    result.add(seen, method, c.origin);
                }
            }
            if !result.records.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Every (class, kind, name) triple where one of `classes` reaches `name`
    /// under an allowed kind. Stops at the configured cap.
    fn make_cm_combination(
        &self,
        names: &[String],
        classes: &[ClassHit],
        kinds: &[MethodKind],
    ) -> Result<(Vec<Combination>, bool)> {
        let origins: HashMap<&ClassId, &str> =
            classes.iter().map(|(id, name)| (id, name.as_str())).collect();
        let mut out = Vec::new();
        for name in names {
            for cref in self.db.mname2crefs_wide(name)? {
                if !kinds.contains(&cref.kind) {
                    continue;
                }
                let Some(origin) = origins.get(&cref.class) else {
                    continue;
                };
                for map in maps_reaching(cref.kind, kinds) {
                    if out.len() >= self.options.max_combinations {
                        warn!(
                            limit = self.options.max_combinations,
                            names = names.len(),
                            classes = classes.len(),
                            "class x method expansion truncated"
                        );
                        return Ok((out, true));
                    }
                    out.push(Combination {
                        origin: origin.to_string(),
                        class: cref.class.clone(),
                        kind: cref.kind,
                        map,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok((out, false))
    }

    fn methods_by_name(
        &self,
        pattern: &SearchPattern,
        result: &mut SearchResult,
        seen: &mut HashMap<MethodId, usize>,
    ) -> Result<()> {
        let index = self.db.method_index()?;
        let query = pattern.method.as_deref();
        let candidates: Vec<(String, String)> = index
            .narrow_names()
            .map(|n| (n.to_string(), n.to_string()))
            .collect();
        let names = match query {
            Some(q) => narrow_then_widen(&candidates, q),
            None => candidates.into_iter().map(|(n, _)| n).collect(),
        };

        let mut examined = 0;
        for group in kind_groups(pattern.kind, query) {
            'names: for name in &names {
                for cref in index.narrow(name) {
                    if !group.contains(&cref.kind) {
                        continue;
                    }
                    if examined >= self.options.max_combinations {
                        warn!(limit = self.options.max_combinations, "method lookup truncated");
                        result.truncated = true;
                        break 'names;
                    }
                    examined += 1;
                    let own = self.db.own_method_names(&cref.class)?;
                    for method in own.get(name).into_iter().flatten() {
                        if method.kind == cref.kind {
                            result.add(seen, method.clone(), cref.class.name());
                        }
                    }
                }
            }
            if !result.records.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

/// Kind groups to try in order; the first group producing results wins.
/// Without a mark, a capitalized method part tries constants first.
/// Maps a ref of `kind` may have come from, narrowed by the queried kinds.
/// A module function is both an instance and a singleton method, so `#`
/// looks in the instance map, `.` in the singleton map, anything else in both.
fn maps_reaching(kind: MethodKind, queried: &[MethodKind]) -> Vec<Option<MapKind>> {
    if kind != MethodKind::ModuleFunction {
        return vec![MapKind::for_kind(kind)];
    }
    let singleton = queried.contains(&MethodKind::SingletonMethod);
    let instance = queried.contains(&MethodKind::InstanceMethod);
    let mut maps = Vec::with_capacity(2);
    if singleton || !instance {
        maps.push(Some(MapKind::Singleton));
    }
    if instance || !singleton {
        maps.push(Some(MapKind::Instance));
    }
    maps
}

fn kind_groups(kind: Option<MethodKind>, method: Option<&str>) -> Vec<Vec<MethodKind>> {
    if let Some(kind) = kind {
        return vec![kind.query_kinds().to_vec()];
    }
    let methods = vec![
        MethodKind::SingletonMethod,
        MethodKind::InstanceMethod,
        MethodKind::ModuleFunction,
    ];
    let constants = vec![MethodKind::Constant];
    if method.is_some_and(|m| m.starts_with(|c: char| c.is_ascii_uppercase())) {
        vec![constants, methods]
    } else {
        vec![methods, constants]
    }
}

impl Database {
    /// Resolve `pattern` to at least one method.
    pub fn search_methods(&self, pattern: &str, options: SearchOptions) -> Result<SearchResult> {
        let parsed = SearchPattern::parse(pattern)?;
        let result = SearchEngine::with_options(self, options).search(&parsed)?;
        if result.records.is_empty() {
            return Err(CatalogError::MethodNotFound {
                pattern: pattern.to_string(),
                candidates: result.classes,
            });
        }
        Ok(result)
    }

    /// Resolve a class name pattern to at least one class.
    pub fn search_classes(&self, pattern: &str) -> Result<Vec<Rc<ClassEntry>>> {
        let engine = SearchEngine::new(self);
        let mut out: Vec<Rc<ClassEntry>> = Vec::new();
        for (id, _) in engine.resolve_classes(pattern)? {
            let id = self.canonical_class(&id)?;
            if let Some(class) = self.class(&id)?
                && !out.iter().any(|c| c.id == class.id)
            {
                out.push(class);
            }
        }
        if out.is_empty() {
            return Err(CatalogError::ClassNotFound {
                name: pattern.to_string(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::ClassKind;
    use crate::test_support::{define_class, define_method, temp_prefix};

    fn pattern(klass: Option<&str>, kind: Option<MethodKind>, method: Option<&str>) -> SearchPattern {
        SearchPattern {
            klass: klass.map(str::to_string),
            kind,
            method: method.map(str::to_string),
        }
    }

    fn labels(result: &SearchResult) -> Vec<String> {
        result.records.iter().map(|r| r.method.spec().to_string()).collect()
    }

    #[test]
    fn parses_every_pattern_form() -> Result<()> {
        use MethodKind::*;
        let cases = [
            ("Array#each", pattern(Some("Array"), Some(InstanceMethod), Some("each"))),
            ("File.open", pattern(Some("File"), Some(SingletonMethod), Some("open"))),
            ("Math.#sqrt", pattern(Some("Math"), Some(ModuleFunction), Some("sqrt"))),
            ("File::SEPARATOR", pattern(Some("File::SEPARATOR"), None, None)),
            ("Net::HTTP.", pattern(Some("Net::HTTP"), Some(SingletonMethod), None)),
            ("Hoge::", pattern(Some("Hoge"), Some(Constant), None)),
            ("#each", pattern(None, Some(InstanceMethod), Some("each"))),
            ("each", pattern(None, None, Some("each"))),
            ("empty?", pattern(None, None, Some("empty?"))),
            ("[]=", pattern(None, None, Some("[]="))),
            ("$stdout", pattern(None, Some(SpecialVariable), Some("stdout"))),
            ("Kernel$stdout", pattern(Some("Kernel"), Some(SpecialVariable), Some("stdout"))),
            ("Ho", pattern(Some("Ho"), None, None)),
            ("Array each", pattern(Some("Array"), None, Some("each"))),
            ("Array #each", pattern(Some("Array"), Some(InstanceMethod), Some("each"))),
            ("Array # each", pattern(Some("Array"), Some(InstanceMethod), Some("each"))),
            ("", SearchPattern::default()),
        ];
        for (input, expected) in cases {
            assert_eq!(SearchPattern::parse(input)?, expected, "{input}");
        }
        assert!(SearchPattern::parse("Array ! each").is_err());
        assert!(SearchPattern::parse("a b c d").is_err());
        Ok(())
    }

    #[test]
    fn narrow_then_widen_stages() {
        let c = |names: &[&str]| -> Vec<(String, String)> {
            names.iter().map(|n| (n.to_string(), n.to_string())).collect()
        };
        assert_eq!(narrow_then_widen(&c(&["Hoge"]), "Ho"), vec!["Hoge"]);
        assert!(narrow_then_widen(&c(&["Hoge"]), "x").is_empty());
        assert_eq!(
            narrow_then_widen(&c(&["String", "StringIO"]), "str"),
            vec!["String", "StringIO"]
        );
        assert_eq!(narrow_then_widen(&c(&["String", "StringIO"]), "string"), vec!["String"]);
        assert_eq!(narrow_then_widen(&c(&["foo", "FOO", "foobar"]), "FOO"), vec!["FOO"]);
        assert_eq!(narrow_then_widen(&c(&["foo", "FOO", "foobar"]), "Foo"), vec!["foo", "FOO"]);
    }

    fn fixture(name: &str) -> Result<Database> {
        let mut db = Database::open(temp_prefix(name))?;
        db.transaction(|db| {
            let kernel = define_class(db, "_builtin", "Kernel", ClassKind::Module, None)?;
            define_method(db, &kernel, "_builtin", MethodKind::SpecialVariable, &["spespe"])?;
            let hoge = define_class(db, "_builtin", "Hoge", ClassKind::Class, None)?;
            define_method(db, &hoge, "_builtin", MethodKind::InstanceMethod, &["hoge"])?;
            define_method(db, &hoge, "_builtin", MethodKind::InstanceMethod, &["to_s"])?;
            define_method(db, &hoge, "_builtin", MethodKind::Constant, &["VERSION"])?;
            let bar = define_class(db, "_builtin", "Hoge::Bar", ClassKind::Class, Some("Hoge"))?;
            define_method(db, &bar, "_builtin", MethodKind::SingletonMethod, &["bar"])?;
            define_method(db, &bar, "_builtin", MethodKind::InstanceMethod, &["to_s"])?;
            Ok(())
        })?;
        Ok(db)
    }

    #[test]
    fn class_prefix_resolves_single_class() -> Result<()> {
        let mut db = Database::open(temp_prefix("search_class"))?;
        db.transaction(|db| {
            let hoge = define_class(db, "_builtin", "Hoge", ClassKind::Class, None)?;
            define_method(db, &hoge, "_builtin", MethodKind::InstanceMethod, &["hoge"])?;
            Ok(())
        })?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("Ho")?)?;
        assert_eq!(result.classes, vec!["Hoge"]);
        assert!(result.records.is_empty());
        assert!(result.determined());

        // with a nested class both match the prefix
        let db = fixture("search_class_nested")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("Ho")?)?;
        assert_eq!(result.classes, vec!["Hoge", "Hoge::Bar"]);
        assert!(!result.determined());
        Ok(())
    }

    #[test]
    fn special_variable_prefix() -> Result<()> {
        let db = fixture("search_gvar")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("$sp")?)?;
        assert_eq!(labels(&result), vec!["Kernel$spespe"]);
        assert_eq!(result.records[0].origins, vec!["Kernel"]);
        Ok(())
    }

    #[test]
    fn class_tail_and_method_prefix() -> Result<()> {
        let db = fixture("search_cm")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("B.b")?)?;
        assert_eq!(labels(&result), vec!["Hoge::Bar.bar"]);
        assert_eq!(result.classes, vec!["Hoge::Bar"]);
        assert!(result.determined());
        Ok(())
    }

    #[test]
    fn own_definition_shadows_inherited_one() -> Result<()> {
        let db = fixture("search_shadow")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("Hoge::Bar#to_s")?)?;
        assert_eq!(labels(&result), vec!["Hoge::Bar#to_s"]);

        let inherited = SearchEngine::new(&db).search(&SearchPattern::parse("Hoge::Bar#hoge")?)?;
        assert_eq!(labels(&inherited), vec!["Hoge#hoge"]);
        assert_eq!(inherited.records[0].origins, vec!["Hoge::Bar"]);
        Ok(())
    }

    #[test]
    fn method_only_uses_narrow_names() -> Result<()> {
        let db = fixture("search_narrow")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("to_")?)?;
        assert_eq!(labels(&result), vec!["Hoge#to_s", "Hoge::Bar#to_s"]);
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("#hog")?)?;
        assert_eq!(labels(&result), vec!["Hoge#hoge"]);
        Ok(())
    }

    #[test]
    fn constants_are_tried_first_for_capitalized_names() -> Result<()> {
        let db = fixture("search_const")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("Hoge VER")?)?;
        assert_eq!(labels(&result), vec!["Hoge::VERSION"]);
        // falls back to a constant lookup when no class is called that
        let retry = SearchEngine::new(&db).search(&SearchPattern::parse("Hoge::VERSION")?)?;
        assert_eq!(labels(&retry), vec!["Hoge::VERSION"]);
        Ok(())
    }

    #[test]
    fn included_module_function_resolves_from_includer() -> Result<()> {
        let mut db = Database::open(temp_prefix("search_included_mf"))?;
        db.transaction(|db| {
            let kernel = define_class(db, "_builtin", "Kernel", ClassKind::Module, None)?;
            define_method(db, &kernel, "_builtin", MethodKind::ModuleFunction, &["puts"])?;
            let object = define_class(db, "_builtin", "Object", ClassKind::Class, None)?;
            db.update_class(&object, |c| c.included.push(kernel.clone()))?;
            Ok(())
        })?;

        for query in ["Object#puts", "Object puts", "Kernel#puts", "Kernel.puts"] {
            let result = SearchEngine::new(&db).search(&SearchPattern::parse(query)?)?;
            assert_eq!(labels(&result), vec!["Kernel.#puts"], "{query}");
        }
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("Object#puts")?)?;
        assert_eq!(result.records[0].origins, vec!["Object"]);

        // included, not extended: no singleton method on the includer
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("Object.puts")?)?;
        assert!(result.records.is_empty());
        Ok(())
    }

    #[test]
    fn module_function_maps_follow_the_queried_mark() {
        use MethodKind::*;
        assert_eq!(
            maps_reaching(ModuleFunction, InstanceMethod.query_kinds()),
            vec![Some(MapKind::Instance)]
        );
        assert_eq!(
            maps_reaching(ModuleFunction, SingletonMethod.query_kinds()),
            vec![Some(MapKind::Singleton)]
        );
        assert_eq!(
            maps_reaching(ModuleFunction, ModuleFunction.query_kinds()),
            vec![Some(MapKind::Singleton), Some(MapKind::Instance)]
        );
        assert_eq!(maps_reaching(Constant, &[Constant]), vec![Some(MapKind::Constant)]);
    }

    #[test]
    fn inherited_results_merge_origins() -> Result<()> {
        let db = fixture("search_merge")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("Hoge#hoge")?)?;
        // `Hoge` matches both Hoge and Hoge::Bar by prefix; exact match wins
        assert_eq!(result.classes, vec!["Hoge"]);
        let result = SearchEngine::new(&db).search(&SearchPattern::parse("H#hoge")?)?;
        assert_eq!(labels(&result), vec!["Hoge#hoge"]);
        assert_eq!(result.records[0].origins, vec!["Hoge", "Hoge::Bar"]);
        Ok(())
    }

    #[test]
    fn repeated_queries_are_stable() -> Result<()> {
        let db = fixture("search_stable")?;
        let engine = SearchEngine::new(&db);
        let p = SearchPattern::parse("H#")?;
        assert_eq!(engine.search(&p)?, engine.search(&p)?);
        Ok(())
    }

    #[test]
    fn expansion_is_capped() -> Result<()> {
        let db = fixture("search_cap")?;
        let engine = SearchEngine::with_options(&db, SearchOptions { max_combinations: 1 });
        let result = engine.search(&SearchPattern::parse("Hoge#")?)?;
        assert!(result.truncated);
        assert_eq!(result.records.len(), 1);
        Ok(())
    }

    #[test]
    fn empty_pattern_on_empty_store_is_empty() -> Result<()> {
        let db = Database::open(temp_prefix("search_empty"))?;
        let result = SearchEngine::new(&db).search(&SearchPattern::default())?;
        assert!(result.fail());
        assert!(result.records.is_empty());
        Ok(())
    }

    #[test]
    fn empty_pattern_dumps_everything() -> Result<()> {
        let db = fixture("search_dump")?;
        let result = SearchEngine::new(&db).search(&SearchPattern::default())?;
        assert_eq!(result.classes, vec!["Hoge", "Hoge::Bar", "Kernel"]);
        assert_eq!(result.records.len(), 6);
        Ok(())
    }

    #[test]
    fn raising_wrappers() -> Result<()> {
        let db = fixture("search_raise")?;
        let err = db.search_methods("Hoge#nothing", SearchOptions::default()).unwrap_err();
        assert!(matches!(
            &err,
            CatalogError::MethodNotFound { candidates, .. } if candidates == &["Hoge"]
        ));
        assert_eq!(err.to_string(), "no such method in Hoge: Hoge#nothing");
        assert_eq!(db.search_methods("B.bar", SearchOptions::default())?.records.len(), 1);

        assert_eq!(db.search_classes("Ba")?[0].name(), "Hoge::Bar");
        assert!(matches!(
            db.search_classes("Zzz"),
            Err(CatalogError::ClassNotFound { .. })
        ));
        Ok(())
    }
}
