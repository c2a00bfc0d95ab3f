//! Name codec: identifiers, type tables and the method-spec grammar.
//!
//! Display names (`Net::HTTP`, `net/http`, `[]=`) are mapped onto identifiers
//! that are safe to use as file names, and back. The mapping is exact:
//! `fsdecode(fsencode(s)) == s` for every string.
//!
//! Method specs are the external identifier for a method:
//!
//! ```text
//! spec       := special | class-path mark name
//! special    := ("Kernel")? "$" name
//! class-path := ident ("::" ident)*
//! mark       := ".#" | "." | "#" | "::" | "$"
//! ```
//!
//! `A::B` with nothing after the last segment reads as constant `B` of `A`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CatalogError, Result};

/// The universal root module; owner of all special variables.
pub const ROOT_MODULE: &str = "Kernel";

/// Replace every byte outside `[A-Za-z0-9_]` with `=` and two lowercase hex digits.
pub fn fsencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' {
            out.push(b as char);
        } else {
            out.push('=');
            out.push_str(&format!("{b:02x}"));
        }
    }
    out
}

/// Inverse of [`fsencode`].
pub fn fsdecode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            let hex = s
                .get(i + 1..i + 3)
                .ok_or_else(|| CatalogError::invalid_spec(s, "truncated escape"))?;
            let b = u8::from_str_radix(hex, 16)
                .map_err(|_| CatalogError::invalid_spec(s, format!("bad escape ={hex}")))?;
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| CatalogError::invalid_spec(s, "decodes to invalid UTF-8"))
}

pub(crate) fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True for `Ident(::Ident)*`.
pub fn is_class_path(s: &str) -> bool {
    !s.is_empty() && s.split("::").all(is_ident)
}

fn is_method_name(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// What a method entry is. Each kind has a type mark (used in specs), a type
/// char (used in identifiers and index refs) and a type name (used in records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    SingletonMethod,
    InstanceMethod,
    ModuleFunction,
    Constant,
    SpecialVariable,
}

impl MethodKind {
    pub const ALL: [MethodKind; 5] = [
        MethodKind::SingletonMethod,
        MethodKind::InstanceMethod,
        MethodKind::ModuleFunction,
        MethodKind::Constant,
        MethodKind::SpecialVariable,
    ];

    pub fn mark(self) -> &'static str {
        match self {
            Self::SingletonMethod => ".",
            Self::InstanceMethod => "#",
            Self::ModuleFunction => ".#",
            Self::Constant => "::",
            Self::SpecialVariable => "$",
        }
    }

    pub fn from_mark(mark: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.mark() == mark)
    }

    pub fn type_char(self) -> char {
        match self {
            Self::SingletonMethod => 's',
            Self::InstanceMethod => 'i',
            Self::ModuleFunction => 'm',
            Self::Constant => 'c',
            Self::SpecialVariable => 'v',
        }
    }

    pub fn from_type_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_char() == c)
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::SingletonMethod => "singleton_method",
            Self::InstanceMethod => "instance_method",
            Self::ModuleFunction => "module_function",
            Self::Constant => "constant",
            Self::SpecialVariable => "special_variable",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }

    /// Kinds a query with this mark may match. A module function answers to
    /// both the singleton and the instance mark.
    pub fn query_kinds(self) -> &'static [MethodKind] {
        match self {
            Self::SingletonMethod => &[Self::SingletonMethod, Self::ModuleFunction],
            Self::InstanceMethod => &[Self::InstanceMethod, Self::ModuleFunction],
            Self::ModuleFunction => &[Self::ModuleFunction],
            Self::Constant => &[Self::Constant],
            Self::SpecialVariable => &[Self::SpecialVariable],
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Class-like entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Class,
    Module,
    /// A singleton object such as `main` or `ENV`.
    Object,
}

impl ClassKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Module => "module",
            Self::Object => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "class" => Some(Self::Class),
            "module" => Some(Self::Module),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

/// Class identifier: the class path with `::` replaced by `=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(String);

impl ClassId {
    pub fn from_name(name: &str) -> Result<Self> {
        if !is_class_path(name) {
            return Err(CatalogError::invalid_spec(name, "not a class path"));
        }
        Ok(Self(name.replace("::", "=")))
    }

    pub(crate) fn from_id_string(id: &str) -> Result<Self> {
        Self::from_name(&id.replace('=', "::"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> String {
        self.0.replace('=', "::")
    }

    pub(crate) fn record_path(&self) -> PathBuf {
        PathBuf::from("class").join(fsencode(&self.0))
    }

    pub(crate) fn method_dir(&self) -> PathBuf {
        PathBuf::from("method").join(fsencode(&self.0))
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Library identifier. Library names (`net/http`) are used verbatim and
/// only encoded when they become file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryId(String);

impl LibraryId {
    pub fn from_name(name: &str) -> Result<Self> {
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ',') {
            return Err(CatalogError::invalid_spec(name, "not a library name"));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub(crate) fn record_path(&self) -> PathBuf {
        PathBuf::from("library").join(fsencode(&self.0))
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Method identifier: owning class, kind, name and owning library.
///
/// String form: `<class-id>/<type-char>.<fsencode(name)>.<fsencode(library)>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    pub class: ClassId,
    pub kind: MethodKind,
    pub name: String,
    pub library: LibraryId,
}

impl MethodId {
    pub fn new(class: ClassId, kind: MethodKind, name: &str, library: LibraryId) -> Result<Self> {
        if !is_method_name(name) {
            return Err(CatalogError::invalid_spec(name, "not a method name"));
        }
        Ok(Self {
            class,
            kind,
            name: name.to_string(),
            library,
        })
    }

    pub fn parse(id: &str) -> Result<Self> {
        let (class, rest) = id
            .split_once('/')
            .ok_or_else(|| CatalogError::invalid_spec(id, "missing class part"))?;
        let mut parts = rest.split('.');
        let (Some(tc), Some(name), Some(lib), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CatalogError::invalid_spec(id, "expected <type>.<name>.<library>"));
        };
        let mut tc_chars = tc.chars();
        let kind = match (tc_chars.next(), tc_chars.next()) {
            (Some(c), None) => MethodKind::from_type_char(c),
            _ => None,
        }
        .ok_or_else(|| CatalogError::invalid_spec(id, format!("unknown type char {tc:?}")))?;
        Self::new(
            ClassId::from_id_string(class)?,
            kind,
            &fsdecode(name)?,
            LibraryId::from_name(&fsdecode(lib)?)?,
        )
    }

    pub fn spec(&self) -> MethodSpec {
        MethodSpec {
            klass: self.class.name(),
            kind: self.kind,
            method: self.name.clone(),
        }
    }

    pub(crate) fn record_path(&self) -> PathBuf {
        self.class.method_dir().join(self.file_name())
    }

    fn file_name(&self) -> String {
        format!(
            "{}.{}.{}",
            self.kind.type_char(),
            fsencode(&self.name),
            fsencode(self.library.as_str())
        )
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class, self.file_name())
    }
}

/// A parsed method spec such as `Array#each`, `File::SEPARATOR` or `$stdout`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSpec {
    pub klass: String,
    pub kind: MethodKind,
    pub method: String,
}

impl MethodSpec {
    pub fn parse(input: &str) -> Result<Self> {
        SpecParser { input, pos: 0 }.parse()
    }

    pub fn class_id(&self) -> Result<ClassId> {
        ClassId::from_name(&self.klass)
    }

    /// Short form for display: special variables drop the root module.
    pub fn label(&self) -> String {
        if self.kind == MethodKind::SpecialVariable {
            format!("${}", self.method)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.klass, self.kind.mark(), self.method)
    }
}

impl FromStr for MethodSpec {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

struct SpecParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SpecParser<'a> {
    fn parse(mut self) -> Result<MethodSpec> {
        if self.eat("$") {
            return self.finish(ROOT_MODULE.to_string(), MethodKind::SpecialVariable);
        }

        let mut segments = vec![self.ident().ok_or_else(|| self.error("expected class name"))?];
        while self.rest().starts_with("::") {
            let save = self.pos;
            self.pos += 2;
            match self.ident() {
                Some(seg) if self.rest().is_empty() => {
                    return Ok(MethodSpec {
                        klass: segments.join("::"),
                        kind: MethodKind::Constant,
                        method: seg.to_string(),
                    });
                }
                Some(seg) => segments.push(seg),
                None => {
                    self.pos = save;
                    break;
                }
            }
        }

        let kind = self
            .mark()
            .ok_or_else(|| self.error("expected one of . # .# :: $"))?;
        self.finish(segments.join("::"), kind)
    }

    fn finish(&self, klass: String, kind: MethodKind) -> Result<MethodSpec> {
        let method = self.rest();
        if !is_method_name(method) {
            return Err(self.error("expected method name"));
        }
        Ok(MethodSpec {
            klass,
            kind,
            method: method.to_string(),
        })
    }

    fn mark(&mut self) -> Option<MethodKind> {
        // ".#" must be tried before "."
        for mark in [".#", ".", "#", "::", "$"] {
            if self.eat(mark) {
                return MethodKind::from_mark(mark);
            }
        }
        None
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = &self.input[self.pos..];
        let len = rest
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_ascii_alphanumeric() || c == '_') || (i == 0 && c.is_ascii_digit())
            })
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, reason: &str) -> CatalogError {
        CatalogError::invalid_spec(self.input, format!("{reason} at offset {}", self.pos))
    }
}
