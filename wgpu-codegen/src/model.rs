//! Intermediate model: the catalog both descriptor parsers produce.
//!
//! Names are stored with the descriptor's namespace prefix (`GPU` in the IDL,
//! `WGPU` in the header) already removed, so entries from the two catalogs can
//! be compared by name directly.

use std::fmt;

/// Everything extracted from one descriptor file.
///
/// Entries keep the order they were declared in. Parsers append; everything
/// downstream only reads.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    pub flags: Vec<FlagSet>,
    pub enums: Vec<EnumDef>,
    pub structs: Vec<StructDef>,
    pub functions: Vec<FunctionDef>,
}

impl Catalog {
    pub fn flag(&self, name: &str) -> Option<&FlagSet> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn function(&self, id: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn has_function(&self, id: &str) -> bool {
        self.function(id).is_some()
    }

    /// Return the flag set called `name`, creating an empty one at the end if
    /// it does not exist yet (partial declarations extend an existing set).
    pub(crate) fn flag_mut(&mut self, name: &str) -> &mut FlagSet {
        let idx = match self.flags.iter().position(|f| f.name == name) {
            Some(idx) => idx,
            None => {
                self.flags.push(FlagSet {
                    name: name.to_string(),
                    members: Vec::new(),
                });
                self.flags.len() - 1
            }
        };
        &mut self.flags[idx]
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// A named set of bit flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSet {
    pub name: String,
    pub members: Vec<FlagMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlagMember {
    pub name: String,
    pub value: u64,
}

impl FlagSet {
    /// Members sorted by name, for order-insensitive comparison.
    pub fn sorted_members(&self) -> Vec<&FlagMember> {
        let mut members: Vec<_> = self.members.iter().collect();
        members.sort();
        members
    }

    /// `NAME:value, ...` in declaration order.
    pub fn describe(&self) -> String {
        self.members
            .iter()
            .map(|m| format!("{}:{}", m.name, m.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// An enumeration. IDL enums carry string values; header enums carry integer
/// codes.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub value: EnumValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumValue {
    Str(String),
    Int(i64),
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumValue::Str(s) => f.write_str(s),
            EnumValue::Int(v) => write!(f, "{v}"),
        }
    }
}

impl EnumDef {
    pub fn variant(&self, name: &str) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.name == name)
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// A struct (header) or dictionary (IDL).
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDef {
    pub name: String,
    /// Declared type. For header fields this is the bare type token with
    /// qualifiers and pointer/array decoration removed.
    pub ty: String,
    /// Default value, already rendered as a Python literal.
    pub default: Option<String>,
    pub required: bool,
}

impl FieldDef {
    /// Render the field as a Python keyword argument: `name=default`, or the
    /// bare name when the field has no default.
    pub fn py_arg(&self) -> String {
        match &self.default {
            Some(default) => format!("{}={}", self.name, default),
            None => self.name.clone(),
        }
    }

    /// A string-typed field with no default.
    pub fn is_bare_string(&self) -> bool {
        self.default.is_none()
            && matches!(
                self.ty.trim_end_matches('?'),
                "USVString" | "DOMString" | "ByteString"
            )
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// An operation declared on an IDL interface.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Lookup key: lower-cased interface name (prefix removed) followed by the
    /// operation name, e.g. `devicecreatebuffer`.
    pub id: String,
    pub interface: String,
    pub name: String,
    pub params: Vec<ParamDef>,
    /// The declaration as written, collapsed onto one line.
    pub declaration: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: String,
    pub optional: bool,
    pub default: Option<String>,
}

// ---------------------------------------------------------------------------
// Translation table
// ---------------------------------------------------------------------------

/// `"<Enum>.<idl-value>"` → native integer code, in discovery order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TranslationTable {
    pub entries: Vec<(String, i64)>,
}

impl TranslationTable {
    pub fn insert(&mut self, key: String, code: i64) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = code,
            None => self.entries.push((key, code)),
        }
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
