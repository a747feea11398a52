//! Cross-check the header catalog against the IDL catalog.
//!
//! Differences are diagnostics, not failures: they go to the report and the
//! run carries on. The one product is the [`TranslationTable`] from IDL enum
//! strings to native integer codes.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::info;

use crate::config::ReconcileConfig;
use crate::model::*;
use crate::report::Report;

/// Compare flags, enums and structs of both catalogs and build the enum
/// translation table.
///
/// Missing entries are reported header-first, then IDL-first, as in the
/// catalogs' declaration order.
pub fn reconcile(
    native: &Catalog,
    idl: &Catalog,
    cfg: &ReconcileConfig,
    report: &mut Report,
) -> Result<TranslationTable> {
    report.heading(2, "Comparing webgpu.idl with wgpu.h")?;

    compare_flags(native, idl, report)?;
    let table = compare_enums(native, idl, report)?;
    compare_structs(native, idl, cfg, report)?;

    info!(entries = table.len(), "built enum translation table");
    Ok(table)
}

fn compare_flags(native: &Catalog, idl: &Catalog, report: &mut Report) -> Result<()> {
    report.heading(3, "Comparing flags")?;
    for name in missing(&native.flags, |f| &f.name, |n| idl.flag(n).is_some()) {
        report.line(format!("{name} flag missing in .idl"))?;
    }
    for name in missing(&idl.flags, |f| &f.name, |n| native.flag(n).is_some()) {
        report.line(format!("{name} flag missing in .h"))?;
    }
    for native_flags in &native.flags {
        let Some(idl_flags) = idl.flag(&native_flags.name) else {
            continue;
        };
        if native_flags.sorted_members() != idl_flags.sorted_members() {
            report.line(&native_flags.name)?;
            report.line(format!("c: {}", native_flags.describe()))?;
            report.line(format!("i: {}", idl_flags.describe()))?;
        }
    }
    Ok(())
}

fn compare_enums(native: &Catalog, idl: &Catalog, report: &mut Report) -> Result<TranslationTable> {
    report.heading(3, "Comparing enums")?;
    for name in missing(&native.enums, |e| &e.name, |n| idl.enum_def(n).is_some()) {
        report.line(format!("{name} enum missing in .idl"))?;
    }
    for name in missing(&idl.enums, |e| &e.name, |n| native.enum_def(n).is_some()) {
        report.line(format!("{name} enum missing in .h"))?;
    }

    let mut table = TranslationTable::default();
    for native_enum in &native.enums {
        let Some(idl_enum) = idl.enum_def(&native_enum.name) else {
            continue;
        };

        let expected: BTreeSet<String> = idl_enum
            .variants
            .iter()
            .map(|v| native_member_name(&v.value.to_string()))
            .collect();
        let actual: BTreeSet<String> =
            native_enum.variants.iter().map(|v| v.name.clone()).collect();
        if expected != actual {
            report.line(&native_enum.name)?;
            report.line(format!("c: {}", describe_variants(native_enum)))?;
            report.line(format!("i: {}", describe_variants(idl_enum)))?;
        }

        for variant in &idl_enum.variants {
            let value = variant.value.to_string();
            let key = format!("{}.{}", native_enum.name, value);
            match native_enum
                .variant(&native_member_name(&value))
                .map(|v| &v.value)
            {
                Some(EnumValue::Int(code)) => table.insert(key, *code),
                _ => report.line(format!("{key} is missing"))?,
            }
        }
    }
    Ok(table)
}

fn compare_structs(
    native: &Catalog,
    idl: &Catalog,
    cfg: &ReconcileConfig,
    report: &mut Report,
) -> Result<()> {
    report.heading(3, "Comparing structs")?;
    for name in missing(&native.structs, |s| &s.name, |n| idl.struct_def(n).is_some()) {
        report.line(format!("{name} struct missing in .idl"))?;
    }
    for name in missing(&idl.structs, |s| &s.name, |n| native.struct_def(n).is_some()) {
        report.line(format!("{name} struct missing in .h"))?;
    }
    for native_struct in &native.structs {
        let Some(idl_struct) = idl.struct_def(&native_struct.name) else {
            continue;
        };
        let native_keys: BTreeSet<String> = native_struct
            .fields
            .iter()
            .map(|f| normalize_native_field(&f.name, &cfg.length_suffix))
            .filter(|k| !cfg.native_ignored_fields.contains(k))
            .collect();
        let idl_keys: BTreeSet<String> = idl_struct
            .fields
            .iter()
            .map(|f| f.name.to_lowercase())
            .filter(|k| !cfg.idl_ignored_fields.contains(k))
            .collect();
        if native_keys != idl_keys {
            report.line(&native_struct.name)?;
            report.line(format!("c: {}", py_list(&native_struct.fields)))?;
            report.line(format!("i: {}", py_list(&idl_struct.fields)))?;
        }
    }
    Ok(())
}

/// Names of `items` for which `present` is false, in order.
fn missing<'a, T>(
    items: &'a [T],
    name: impl Fn(&'a T) -> &'a String,
    present: impl Fn(&str) -> bool,
) -> impl Iterator<Item = &'a String> {
    items.iter().map(name).filter(move |n| !present(n))
}

/// Map an IDL enum string onto the header's member naming: dimension markers
/// `1d`/`2d`/`3d` become `D1`/`D2`/`D3`, and hyphenated words are joined in
/// title case. `"high-performance"` → `HighPerformance`.
pub fn native_member_name(value: &str) -> String {
    let value = value
        .replace("1d", "D1")
        .replace("2d", "D2")
        .replace("3d", "D3")
        .replace('-', " ");
    title_case(&value).replace(' ', "")
}

/// Upper-case every letter that follows a non-letter and lower-case the
/// rest, so `rgba8unorm srgb` becomes `Rgba8Unorm Srgb`.
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Header field name in comparable form: lower case, without the length
/// suffix of `(pointer, length)` pairs and without underscores.
fn normalize_native_field(name: &str, length_suffix: &str) -> String {
    let lower = name.to_lowercase();
    let lower = if length_suffix.is_empty() {
        lower
    } else {
        lower.replace(&length_suffix.to_lowercase(), "")
    };
    lower.replace('_', "")
}

fn describe_variants(en: &EnumDef) -> String {
    en.variants
        .iter()
        .map(|v| format!("{}:{}", v.name, v.value))
        .collect::<Vec<_>>()
        .join(", ")
}

fn py_list(fields: &[FieldDef]) -> String {
    let names: Vec<_> = fields.iter().map(|f| format!("'{}'", f.name)).collect();
    format!("[{}]", names.join(", "))
}
