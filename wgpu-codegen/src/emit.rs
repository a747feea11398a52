//! Render the generated Python modules: `flags.py`, `enums.py` and
//! `_mappings.py`.
//!
//! The functions here only build source text. Formatting and writing happen
//! in the pipeline.

use crate::model::*;

const FLAGS_PREAMBLE: &str = r#""""
THIS CODE IS AUTOGENERATED - DO NOT EDIT

All wgpu flags. Also available in the root wgpu namespace.
"""


class Flags:

    def __init__(self, name, **kwargs):
        self._name = name
        for key, val in kwargs.items():
            setattr(self, key, val)

    def __iter__(self):
        return iter([key for key in dir(self) if not key.startswith("_")])

    def __repr__(self):
        options = ", ".join(self)
        return f"<{self.__class__.__name__} {self._name}: {options}>"
"#;

const ENUMS_PREAMBLE: &str = r#""""
THIS CODE IS AUTOGENERATED - DO NOT EDIT

All wgpu enums. Also available in the root wgpu namespace.
"""


class Enum:

    def __init__(self, name, **kwargs):
        self._name = name
        for key, val in kwargs.items():
            setattr(self, key, val)

    def __iter__(self):
        return iter(
            [getattr(self, key) for key in dir(self) if not key.startswith("_")]
        )

    def __repr__(self):
        options = ", ".join(f"'{x}'" for x in self)
        return f"<{self.__class__.__name__} {self._name}: {options}>"
"#;

const MAPPINGS_PREAMBLE: &str = r#""""
THIS CODE IS AUTOGENERATED - DO NOT EDIT

Mappings that help automate some things in the implementations.
"""
# flake8: noqa
"#;

/// One `Name = Flags("Name", KEY=value, ...)` bag per IDL flag set.
pub fn flags_module(idl: &Catalog) -> String {
    let mut lines = vec![FLAGS_PREAMBLE.to_string()];
    lines.push(format!("# %% flags ({})\n", idl.flags.len()));
    for flags in &idl.flags {
        lines.push(format!("{0} = Flags(\n    \"{0}\",", flags.name));
        for member in &flags.members {
            lines.push(format!("    {}={},", member.name, member.value));
        }
        lines.push(")\n".to_string());
    }
    lines.join("\n")
}

/// One `Name = Enum("Name", key="value", ...)` bag per IDL enum.
pub fn enums_module(idl: &Catalog) -> String {
    let mut lines = vec![ENUMS_PREAMBLE.to_string()];
    lines.push(format!("# %% Enums ({})\n", idl.enums.len()));
    for en in &idl.enums {
        lines.push(format!("{0} = Enum(\n    \"{0}\",", en.name));
        for variant in &en.variants {
            lines.push(format!("    {}=\"{}\",", variant.name, variant.value));
        }
        lines.push(")\n".to_string());
    }
    lines.join("\n")
}

/// `enummap` (the translation table) and `cstructfield2enum`: every header
/// struct field whose type is an enum the IDL also declares.
pub fn mappings_module(
    table: &TranslationTable,
    native: &Catalog,
    idl: &Catalog,
    native_prefix: &str,
) -> String {
    let mut lines = vec![MAPPINGS_PREAMBLE.to_string()];

    lines.push("enummap = {".to_string());
    for (key, code) in &table.entries {
        lines.push(format!("    \"{key}\": {code},"));
    }
    lines.push("}\n".to_string());

    lines.push("cstructfield2enum = {".to_string());
    for (key, enum_name) in struct_field_enums(native, idl, native_prefix) {
        lines.push(format!("    \"{key}\": \"{enum_name}\","));
    }
    lines.push("}\n".to_string());

    lines.join("\n")
}

/// `("<Struct>.<field>", "<Enum>")` for header fields typed with an enum
/// that exists in the IDL catalog.
pub fn struct_field_enums<'a>(
    native: &'a Catalog,
    idl: &'a Catalog,
    native_prefix: &'a str,
) -> impl Iterator<Item = (String, &'a str)> {
    native.structs.iter().flat_map(move |st| {
        st.fields.iter().filter_map(move |field| {
            let enum_name = field.ty.strip_prefix(native_prefix)?;
            idl.enum_def(enum_name)
                .map(|en| (format!("{}.{}", st.name, field.name), en.name.as_str()))
        })
    })
}
