//! WebIDL extraction of enums, flag namespaces, dictionaries and interface
//! operations into a [`Catalog`].
//!
//! The grammar lives in `webidl.pest`. It models the constructs the binding
//! cares about; everything else (typedefs, `includes` statements, callbacks,
//! attributes, constructors) parses as a `skipped` declaration.

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser as PestParser;
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::model::*;
use crate::scan::collapse_whitespace;

#[derive(PestParser)]
#[grammar = "webidl.pest"]
struct IdlParser;

/// Parse the text of an IDL document.
///
/// `file` is only used in error messages. `prefix` (usually `GPU`) is removed
/// from every definition name.
pub fn parse(src: &str, file: &str, prefix: &str) -> Result<Catalog, ParseError> {
    let root = IdlParser::parse(Rule::idl, src)
        .map_err(|err| syntax_error(file, err))?
        .next();
    let mut catalog = Catalog::default();
    let mut dictionaries: Vec<(StructDef, Option<String>)> = Vec::new();

    for def in root.into_iter().flat_map(Pair::into_inner) {
        let line = def.as_span().start_pos().line_col().0;
        match def.as_rule() {
            Rule::enum_def => {
                let en = build_enum(def, prefix);
                debug!(line, name = %en.name, variants = en.variants.len(), "parsed enum");
                catalog.enums.push(en);
            }
            Rule::dictionary => {
                let (dict, base, partial) = build_dictionary(def, prefix);
                debug!(
                    line,
                    name = %dict.name,
                    fields = dict.fields.len(),
                    base = ?base,
                    partial,
                    "parsed dictionary"
                );
                // partial declarations extend the dictionary seen first
                match dictionaries.iter_mut().find(|(d, _)| d.name == dict.name) {
                    Some((existing, existing_base)) => {
                        existing.fields.extend(dict.fields);
                        if existing_base.is_none() {
                            *existing_base = base;
                        }
                    }
                    None => dictionaries.push((dict, base)),
                }
            }
            Rule::interface_def => build_interface(&mut catalog, def, prefix),
            Rule::skipped => {
                debug!(line, head = %definition_head(def.as_str()), "skipping definition");
            }
            _ => {}
        }
    }

    catalog.structs = resolve_inheritance(&dictionaries);

    info!(
        file,
        flags = catalog.flags.len(),
        enums = catalog.enums.len(),
        structs = catalog.structs.len(),
        functions = catalog.functions.len(),
        "idl extraction complete"
    );

    Ok(catalog)
}

fn strip<'a>(name: &'a str, prefix: &str) -> &'a str {
    name.strip_prefix(prefix).unwrap_or(name)
}

fn syntax_error(file: &str, err: pest::error::Error<Rule>) -> ParseError {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
    };
    ParseError::Syntax {
        file: file.to_string(),
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

/// The text of a definition up to its body, for log lines.
fn definition_head(text: &str) -> String {
    collapse_whitespace(text.split('{').next().unwrap_or(text).trim_end_matches(';'))
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

fn build_enum(pair: Pair<Rule>, prefix: &str) -> EnumDef {
    let mut en = EnumDef {
        name: String::new(),
        variants: Vec::new(),
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => en.name = strip(inner.as_str(), prefix).to_string(),
            Rule::string => {
                let value = inner.as_str().trim_matches('"').to_string();
                en.variants.push(EnumVariant {
                    name: enum_key(&value),
                    value: EnumValue::Str(value),
                });
            }
            _ => {}
        }
    }
    en
}

/// Turn an IDL enum string into a Python identifier: `-` becomes `_`, and a
/// leading dimension like `2d` becomes `d2`.
pub fn enum_key(value: &str) -> String {
    let key = value.replace('-', "_");
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(digit), Some('d')) if digit.is_ascii_digit() => format!("d{}{}", digit, &key[2..]),
        (Some(first), _) if first.is_ascii_digit() => format!("_{key}"),
        _ => key,
    }
}

// ---------------------------------------------------------------------------
// Dictionaries
// ---------------------------------------------------------------------------

/// Returns the dictionary, its base (prefix removed) and whether it was
/// declared `partial`.
fn build_dictionary(pair: Pair<Rule>, prefix: &str) -> (StructDef, Option<String>, bool) {
    let mut dict = StructDef {
        name: String::new(),
        fields: Vec::new(),
    };
    let mut base = None;
    let mut partial = false;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_partial => partial = true,
            Rule::ident => dict.name = strip(inner.as_str(), prefix).to_string(),
            Rule::inheritance => {
                base = inner
                    .into_inner()
                    .next()
                    .map(|b| strip(b.as_str(), prefix).to_string());
            }
            Rule::dict_member => dict.fields.push(build_field(inner)),
            Rule::skipped => warn!(
                dictionary = %dict.name,
                member = %collapse_whitespace(inner.as_str()),
                "skipping malformed dictionary member"
            ),
            _ => {}
        }
    }
    (dict, base, partial)
}

fn build_field(pair: Pair<Rule>) -> FieldDef {
    let mut field = FieldDef::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_required => field.required = true,
            Rule::type_ref => field.ty = type_text(inner),
            Rule::ident => field.name = inner.as_str().to_string(),
            Rule::default_value => field.default = default_text(inner),
            _ => {}
        }
    }
    field
}

/// Prepend inherited fields. Bases may be declared after the dictionaries
/// that extend them, so this runs once everything has been parsed.
fn resolve_inheritance(dictionaries: &[(StructDef, Option<String>)]) -> Vec<StructDef> {
    fn inherited(
        base: Option<&str>,
        dictionaries: &[(StructDef, Option<String>)],
        depth: usize,
    ) -> Vec<FieldDef> {
        let Some(base) = base else {
            return Vec::new();
        };
        if depth > 16 {
            warn!(base, "dictionary inheritance too deep, ignoring base");
            return Vec::new();
        }
        match dictionaries.iter().find(|(d, _)| d.name == base) {
            Some((d, next)) => {
                let mut fields = inherited(next.as_deref(), dictionaries, depth + 1);
                fields.extend(d.fields.iter().cloned());
                fields
            }
            None => {
                debug!(base, "base dictionary not declared, ignoring");
                Vec::new()
            }
        }
    }

    dictionaries
        .iter()
        .map(|(dict, base)| {
            let mut fields = inherited(base.as_deref(), dictionaries, 0);
            fields.extend(dict.fields.iter().cloned());
            StructDef {
                name: dict.name.clone(),
                fields,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Interfaces and namespaces
// ---------------------------------------------------------------------------

fn build_interface(catalog: &mut Catalog, pair: Pair<Rule>, prefix: &str) {
    let mut members = pair.into_inner();
    let Some(name) = members.find(|p| p.as_rule() == Rule::ident) else {
        return;
    };
    let name = strip(name.as_str(), prefix).to_string();
    let mut operations = 0usize;
    let mut constants = 0usize;

    for member in members {
        match member.as_rule() {
            Rule::const_member => {
                let text = collapse_whitespace(member.as_str());
                match build_constant(member) {
                    Some(flag) => {
                        catalog.flag_mut(&name).members.push(flag);
                        constants += 1;
                    }
                    None => warn!(
                        interface = %name,
                        member = %text,
                        "skipping constant with unparsable value"
                    ),
                }
            }
            Rule::operation => {
                let function = build_operation(&name, member);
                if catalog.has_function(&function.id) {
                    debug!(id = %function.id, "ignoring overload");
                    continue;
                }
                debug!(id = %function.id, params = function.params.len(), "parsed operation");
                catalog.functions.push(function);
                operations += 1;
            }
            _ => {}
        }
    }

    debug!(interface = %name, operations, constants, "parsed interface");
}

fn build_constant(pair: Pair<Rule>) -> Option<FlagMember> {
    let mut name = None;
    let mut value = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = Some(inner.as_str().to_string()),
            Rule::value => value = parse_uint(inner.as_str()),
            _ => {}
        }
    }
    Some(FlagMember {
        name: name?,
        value: value?,
    })
}

fn build_operation(interface: &str, pair: Pair<Rule>) -> FunctionDef {
    let declaration = collapse_whitespace(pair.as_str());
    let mut name = String::new();
    let mut params = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::arguments => params = inner.into_inner().map(build_param).collect(),
            _ => {}
        }
    }
    FunctionDef {
        id: format!("{interface}{name}").to_lowercase(),
        interface: interface.to_string(),
        name,
        params,
        declaration,
    }
}

fn build_param(pair: Pair<Rule>) -> ParamDef {
    let mut param = ParamDef::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_optional => param.optional = true,
            Rule::type_ref => param.ty = type_text(inner),
            Rule::ident => param.name = inner.as_str().to_string(),
            Rule::default_value => param.default = default_text(inner),
            _ => {}
        }
    }
    param
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// The type as written, without extended attributes.
fn type_text(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::type_core)
        .map(|p| collapse_whitespace(p.as_str()))
        .unwrap_or_default()
}

fn default_text(pair: Pair<Rule>) -> Option<String> {
    pair.into_inner().next().map(|v| py_literal(v.as_str()))
}

/// Render an IDL default value as a Python literal.
fn py_literal(value: &str) -> String {
    match value {
        "true" => "True".to_string(),
        "false" => "False".to_string(),
        "null" => "None".to_string(),
        other => other.to_string(),
    }
}

fn parse_uint(value: &str) -> Option<u64> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDL: &str = r#"
// Flags
typedef [EnforceRange] unsigned long GPUBufferUsageFlags;
[Exposed=(Window, DedicatedWorker)]
namespace GPUBufferUsage {
    const GPUFlagsConstant MAP_READ = 0x0001;
    const GPUFlagsConstant MAP_WRITE = 0x0002;
};

enum GPUPowerPreference {
    "low-power",
    "high-performance"
};

enum GPUTextureViewDimension { "1d", "2d", "2d-array", "3d" };

/* descriptors */
dictionary GPUBufferDescriptor : GPUObjectDescriptorBase {
    required GPUSize64 size;
    required GPUBufferUsageFlags usage;
    boolean mappedAtCreation = false;
};

dictionary GPUObjectDescriptorBase {
    USVString label;
};

interface GPUDevice : EventTarget {
    [SameObject] readonly attribute GPUSupportedFeatures features;
    [NewObject] GPUBuffer createBuffer(GPUBufferDescriptor descriptor);
    GPUTexture createTexture(GPUTextureDescriptor descriptor);
    undefined destroy();
};

interface GPU {
    Promise<GPUAdapter?> requestAdapter(optional GPURequestAdapterOptions options = {});
};

GPUDevice includes GPUObjectBase;
"#;

    #[test]
    fn flags_come_from_constant_namespaces() {
        let cat = parse(IDL, "test.idl", "GPU").unwrap();
        let flags = cat.flag("BufferUsage").expect("BufferUsage flags");
        assert_eq!(flags.describe(), "MAP_READ:1, MAP_WRITE:2");
        assert_eq!(cat.flags.len(), 1);
    }

    #[test]
    fn enums_keep_declaration_order_and_values() {
        let cat = parse(IDL, "test.idl", "GPU").unwrap();
        let en = cat.enum_def("PowerPreference").unwrap();
        let names: Vec<_> = en.variants.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["low_power", "high_performance"]);
        assert_eq!(en.variants[0].value, EnumValue::Str("low-power".into()));

        let dims = cat.enum_def("TextureViewDimension").unwrap();
        let names: Vec<_> = dims.variants.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["d1", "d2", "d2_array", "d3"]);
    }

    #[test]
    fn dictionaries_inherit_fields_from_later_bases() {
        let cat = parse(IDL, "test.idl", "GPU").unwrap();
        let desc = cat.struct_def("BufferDescriptor").unwrap();
        let args: Vec<_> = desc.fields.iter().map(FieldDef::py_arg).collect();
        assert_eq!(args, ["label", "size", "usage", "mappedAtCreation=False"]);
        assert!(desc.fields[1].required);
        assert!(desc.fields[0].is_bare_string());
    }

    #[test]
    fn operations_are_keyed_by_interface_and_name() {
        let cat = parse(IDL, "test.idl", "GPU").unwrap();
        let ids: Vec<_> = cat.functions.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            ids,
            ["devicecreatebuffer", "devicecreatetexture", "devicedestroy", "requestadapter"]
        );

        let create = cat.function("devicecreatebuffer").unwrap();
        assert_eq!(
            create.declaration,
            "[NewObject] GPUBuffer createBuffer(GPUBufferDescriptor descriptor);"
        );
        assert_eq!(create.params[0].ty, "GPUBufferDescriptor");
        assert_eq!(create.params[0].name, "descriptor");

        let request = cat.function("requestadapter").unwrap();
        assert!(request.params[0].optional);
        assert_eq!(request.params[0].default.as_deref(), Some("{}"));
    }

    #[test]
    fn unterminated_block_is_fatal() {
        let err = parse("enum GPUX {\n \"a\",\n", "broken.idl", "GPU").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }), "{err}");
        assert!(err.to_string().starts_with("broken.idl:"), "{err}");
    }

    #[test]
    fn missing_semicolon_is_fatal() {
        let err = parse("typedef long GPUIndex32", "broken.idl", "GPU").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }), "{err}");
    }

    #[test]
    fn unmodelled_members_are_skipped() {
        let src = r#"
callback GPUErrorCallback = undefined (GPUError error);
interface mixin GPUObjectBase {
    attribute USVString label;
};
[Exposed=Window]
interface GPUQueue {
    constructor(optional GPUQueueDescriptor descriptor = {});
    getter GPUAdapter (unsigned long index);
    iterable<GPUAdapter>;
    static GPUQueue fromId(unsigned long long id, DOMString... tags);
    undefined writeBuffer(GPUBuffer buffer, (GPUBufferSource or sequence<long>) data);
};
partial dictionary GPUQueueDescriptor {
    [Clamp] unsigned short priority = 0;
};
dictionary GPUQueueDescriptor {
    DOMString? name = null; // trailing { comment
};
"#;
        let cat = parse(src, "test.idl", "GPU").unwrap();
        let ids: Vec<_> = cat.functions.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["queuefromid", "queuewritebuffer"]);

        let from_id = cat.function("queuefromid").unwrap();
        assert_eq!(from_id.params[0].ty, "unsigned long long");
        assert_eq!(from_id.params[1].ty, "DOMString");
        assert_eq!(from_id.params[1].name, "tags");
        let write = cat.function("queuewritebuffer").unwrap();
        assert_eq!(write.params[1].ty, "(GPUBufferSource or sequence<long>)");

        let desc = cat.struct_def("QueueDescriptor").unwrap();
        let args: Vec<_> = desc.fields.iter().map(FieldDef::py_arg).collect();
        assert_eq!(args, ["priority=0", "name=None"]);
        assert_eq!(desc.fields[1].ty, "DOMString?");
        assert_eq!(cat.structs.len(), 1);
    }

    #[test]
    fn enum_keys_are_python_identifiers() {
        assert_eq!(enum_key("bgra8unorm-srgb"), "bgra8unorm_srgb");
        assert_eq!(enum_key("3d"), "d3");
        assert_eq!(enum_key("8x"), "_8x");
    }
}
