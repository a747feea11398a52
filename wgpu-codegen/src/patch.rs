//! Check hand-written API modules against the IDL and refresh them in place.
//!
//! Every public function or method is paired with an IDL operation by name.
//! Paired functions get their parameter list rewritten from the IDL and one
//! or two marker comments injected above the signature. Markers from the
//! previous run are dropped first, so they never pile up.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::format::{Formatter, Layout};
use crate::model::{Catalog, FunctionDef};
use crate::report::Report;
use crate::scan::{matching_close, triple_quoted};

/// Marker line echoing the IDL declaration.
pub const IDL_MARKER: &str = "# IDL: ";
/// Marker line cross-referencing the IDL names involved.
pub const HELP_MARKER: &str = "# wgpu.help(";

/// How a Python function id may be rewritten to find its IDL operation.
///
/// Sync and async flavours of one operation (`requestAdapter` /
/// `requestAdapterAsync`) map onto the same IDL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRule {
    Exact,
    StripAsync,
    AppendAsync,
}

/// Tried in order; the first candidate that exists wins.
pub const MATCH_RULES: &[NameRule] =
    &[NameRule::Exact, NameRule::StripAsync, NameRule::AppendAsync];

impl NameRule {
    pub fn apply(self, id: &str) -> String {
        match self {
            NameRule::Exact => id.to_string(),
            NameRule::StripAsync => id.replace("async", ""),
            NameRule::AppendAsync => format!("{id}async"),
        }
    }
}

/// First candidate for `id` under [`MATCH_RULES`] for which `exists` holds.
pub fn find_match(id: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
    MATCH_RULES
        .iter()
        .map(|rule| rule.apply(id))
        .find(|candidate| exists(candidate))
}

/// A public function found in a hand-written module. Only valid for the
/// line list it was scanned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    /// Lower-cased qualified name without dots and without the class prefix,
    /// e.g. `devicecreatebuffer` for `GPUDevice.createBuffer`.
    pub id: String,
    /// Qualified name as written, e.g. `GPUDevice.createBuffer`.
    pub name: String,
    pub line: usize,
    /// Byte length of the leading whitespace of the `def` line.
    pub indent: usize,
    pub class: Option<String>,
}

impl FunctionRecord {
    fn is_method(&self) -> bool {
        self.class.is_some()
    }
}

pub struct Patcher<'a> {
    pub idl: &'a Catalog,
    pub formatter: &'a dyn Formatter,
    /// Prefix of Python class names, stripped when building ids (`GPU`).
    pub prefix: &'a str,
    pub line_width: usize,
}

impl Patcher<'_> {
    /// Patch the file at `path` in place. `label` names it in the report.
    pub fn patch_file(
        &self,
        path: &Path,
        label: &str,
        echo_idl: bool,
        report: &mut Report,
    ) -> Result<()> {
        report.heading(3, &format!("Check functions in {label}"))?;
        let code = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let patched = self
            .patch_source(&code, echo_idl, report)
            .with_context(|| format!("patching {}", path.display()))?;
        std::fs::write(path, &patched).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), size = patched.len(), "patched source");
        report.line(format!("Injected IDL lines into {label}"))?;
        Ok(())
    }

    /// Return the patched text of one module.
    pub fn patch_source(&self, code: &str, echo_idl: bool, report: &mut Report) -> Result<String> {
        let mut lines = self.single_line(code)?;
        let functions = scan_functions(&lines, self.prefix);
        debug!(count = functions.len(), "found public functions");

        let mut count = 0;
        for record in functions.iter().rev() {
            let Some(matched) = find_match(&record.id, |c| self.idl.has_function(c)) else {
                continue;
            };
            let Some(func) = self.idl.function(&matched) else {
                continue;
            };
            count += 1;

            // markers copy the indentation of the `def` line, tabs included
            let indent = lines[record.line][..record.indent].to_string();
            let (args, refs) = self.py_params(func, record);
            lines[record.line] = rewrite_signature(&lines[record.line], &args);

            if echo_idl {
                lines.insert(record.line, format!("{indent}{IDL_MARKER}{}", func.declaration));
            }
            let refs: Vec<String> = std::iter::once(matched)
                .chain(refs)
                .map(|r| format!("'{r}'"))
                .collect();
            lines.insert(
                record.line,
                format!("{indent}{HELP_MARKER}{}, dev=True)", refs.join(", ")),
            );
        }

        report.line(format!("Found {count} functions already implemented"))?;
        for func in &self.idl.functions {
            if find_match(&func.id, |c| functions.iter().any(|r| r.id == c)).is_none() {
                report.line(format!("Not implemented: {}", func.declaration))?;
            }
        }
        for record in &functions {
            if find_match(&record.id, |c| self.idl.has_function(c)).is_none() {
                report.line(format!("Found unknown function {}", record.name))?;
            }
        }

        let code = self.formatter.format(
            &lines.join("\n"),
            Layout::Standard {
                line_width: self.line_width,
            },
        )?;
        Ok(code)
    }

    /// Lint suppressions and old markers removed, every signature on one line.
    /// Lines touching a triple-quoted string are kept as they are.
    fn single_line(&self, code: &str) -> Result<Vec<String>> {
        let raw: Vec<&str> = code.lines().collect();
        let without_noqa = raw
            .iter()
            .zip(triple_quoted(&raw))
            .map(|(line, state)| {
                if state.starts_inside || state.ends_inside {
                    return *line;
                }
                line.split("# noqa:").next().unwrap_or(*line).trim_end()
            })
            .collect::<Vec<_>>()
            .join("\n");

        let formatted = self.formatter.format(&without_noqa, Layout::SingleLine)?;
        let raw: Vec<&str> = formatted.lines().collect();
        let mut lines: Vec<String> = raw
            .iter()
            .zip(triple_quoted(&raw))
            .filter(|(line, state)| state.starts_inside || !is_marker(line))
            .map(|(line, state)| {
                if state.ends_inside {
                    line.to_string()
                } else {
                    line.trim_end().to_string()
                }
            })
            .collect();
        lines.push(String::new());
        Ok(lines)
    }

    /// New parameter list for `record`, plus the IDL names it references.
    ///
    /// A lone `...Descriptor`/`...Options` argument is expanded into keyword
    /// arguments, one per dictionary field.
    fn py_params(
        &self,
        func: &FunctionDef,
        record: &FunctionRecord,
    ) -> (Vec<String>, Vec<String>) {
        let refs: Vec<String> = func
            .params
            .iter()
            .filter_map(|p| p.ty.trim_end_matches('?').strip_prefix(self.prefix))
            .map(str::to_string)
            .collect();

        let mut args = Vec::new();
        if record.is_method() {
            args.push("self".to_string());
        }

        if let [param] = func.params.as_slice()
            && (param.ty.ends_with("Options") || param.ty.ends_with("Descriptor"))
        {
            let struct_name = param.ty.strip_prefix(self.prefix).unwrap_or(&param.ty);
            match self.idl.struct_def(struct_name) {
                Some(st) => {
                    let mut fields: Vec<String> = st.fields.iter().map(|f| f.py_arg()).collect();
                    if let Some(first) = st.fields.first()
                        && first.name == "label"
                        && first.is_bare_string()
                    {
                        fields[0] = "label=\"\"".to_string();
                    }
                    if !fields.is_empty() {
                        args.push("*".to_string());
                    }
                    args.extend(fields);
                    return (args, refs);
                }
                None => warn!(
                    function = %record.name,
                    dictionary = struct_name,
                    "argument dictionary not in IDL"
                ),
            }
        }

        args.extend(func.params.iter().map(|p| p.name.clone()));
        (args, refs)
    }
}

fn is_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(IDL_MARKER) || trimmed.starts_with(HELP_MARKER)
}

/// Find public functions and methods.
///
/// Methods are qualified with their class. A class's methods sit at the
/// indentation of its first body line, whatever width that is; anything
/// deeper is a nested function and skipped, as are private (`_`-prefixed)
/// functions, properties and lines inside triple-quoted strings.
///
/// When two definitions share an id the later one wins, as it does when
/// Python binds the name, and the earlier one is dropped. Records stay in
/// line order.
pub fn scan_functions(lines: &[String], prefix: &str) -> Vec<FunctionRecord> {
    let mut records: Vec<FunctionRecord> = Vec::new();
    let mut current_class: Option<String> = None;
    let mut method_indent: Option<usize> = None;

    for ((i, line), state) in lines.iter().enumerate().zip(triple_quoted(lines)) {
        let trimmed = line.trim_start();
        if state.starts_inside || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();
        if indent == 0 {
            current_class = line.strip_prefix("class ").and_then(|rest| {
                rest.split([':', '('])
                    .next()
                    .and_then(|s| s.split_whitespace().last())
                    .map(str::to_string)
            });
            method_indent = None;
        } else if current_class.is_some() && method_indent.is_none() {
            method_indent = Some(indent);
        }

        let Some(sig) = trimmed
            .strip_prefix("def ")
            .or_else(|| trimmed.strip_prefix("async def "))
        else {
            continue;
        };
        let name = sig.split('(').next().unwrap_or_default().trim();
        if name.is_empty() || name.starts_with('_') {
            continue;
        }
        if i > 0 && is_property_decorator(&lines[i - 1]) {
            continue;
        }

        let (qualified, class) = match &current_class {
            _ if indent == 0 => (name.to_string(), None),
            Some(class) if method_indent == Some(indent) => {
                (format!("{class}.{name}"), Some(class.clone()))
            }
            _ => continue,
        };
        let id = qualified
            .strip_prefix(prefix)
            .unwrap_or(&qualified)
            .replace('.', "")
            .to_lowercase();

        let record = FunctionRecord {
            id,
            name: qualified,
            line: i,
            indent,
            class,
        };
        if let Some(pos) = records.iter().position(|r| r.id == record.id) {
            debug!(name = %record.name, line = i, "function redefined, keeping the later one");
            records.remove(pos);
        }
        records.push(record);
    }
    records
}

fn is_property_decorator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("@property") || (trimmed.starts_with('@') && trimmed.ends_with(".setter"))
}

/// Replace the parameter list of a single-line signature, keeping the name
/// and any return annotation.
fn rewrite_signature(line: &str, args: &[String]) -> String {
    let Some(open) = line.find('(') else {
        return line.to_string();
    };
    let Some(close) = matching_close(line, open) else {
        warn!(line, "signature parentheses do not balance, leaving it alone");
        return line.to_string();
    };
    format!("{}({}){}", &line[..open], args.join(", "), &line[close + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Builtin;

    const IDL: &str = r#"
dictionary GPUObjectDescriptorBase {
    USVString label;
};

dictionary GPUBufferDescriptor : GPUObjectDescriptorBase {
    required GPUSize64 size;
};

dictionary GPURequestAdapterOptions {
    GPUPowerPreference powerPreference;
};

interface GPU {
    Promise<GPUAdapter?> requestAdapter(optional GPURequestAdapterOptions options = {});
};

interface GPUDevice {
    GPUBuffer createBuffer(GPUBufferDescriptor descriptor);
    undefined destroy();
};

interface GPUBuffer {
    Promise<undefined> mapAsync(GPUMapModeFlags mode, optional GPUSize64 offset = 0);
};
"#;

    fn catalog() -> Catalog {
        crate::idl::parse(IDL, "test.idl", "GPU").unwrap()
    }

    fn patch(code: &str, echo_idl: bool) -> (String, Vec<String>) {
        let idl = catalog();
        let patcher = Patcher {
            idl: &idl,
            formatter: &Builtin,
            prefix: "GPU",
            line_width: 88,
        };
        let mut report = Report::capture();
        let out = patcher.patch_source(code, echo_idl, &mut report).unwrap();
        (out, report.lines().to_vec())
    }

    #[test]
    fn descriptor_argument_expands_into_keywords() {
        let code = "class GPUDevice:\n    def createBuffer(self, descriptor):\n        raise NotImplementedError()\n";
        let (out, _) = patch(code, true);
        assert_eq!(
            out,
            "class GPUDevice:\n    \
             # wgpu.help('devicecreatebuffer', 'BufferDescriptor', dev=True)\n    \
             # IDL: GPUBuffer createBuffer(GPUBufferDescriptor descriptor);\n    \
             def createBuffer(self, *, label=\"\", size):\n        \
             raise NotImplementedError()\n"
        );
    }

    #[test]
    fn bare_function_gets_keyword_marker_and_async_pairs_match() {
        let code = "def requestAdapter(powerPreference):\n    pass\n\n\nasync def requestAdapterAsync(powerPreference):\n    pass\n";
        let (out, report) = patch(code, false);
        assert!(out.contains(
            "# wgpu.help('requestadapter', 'RequestAdapterOptions', dev=True)\ndef requestAdapter(*, powerPreference):"
        ));
        assert!(out.contains(
            "# wgpu.help('requestadapter', 'RequestAdapterOptions', dev=True)\nasync def requestAdapterAsync(*, powerPreference):"
        ));
        assert!(!out.contains(IDL_MARKER));
        assert!(report.contains(&"* Found 2 functions already implemented".to_string()));
    }

    #[test]
    fn plain_arguments_are_copied_by_name() {
        let code = "class GPUBuffer:\n    async def mapAsync(self, mode, offset=0, size=None):\n        pass\n\n    def map(self, mode):\n        pass\n";
        let (out, _) = patch(code, false);
        assert!(out.contains("    async def mapAsync(self, mode, offset):\n"));
        // `map` pairs with `mapAsync` through the append-async rule
        assert!(out.contains("    # wgpu.help('buffermapasync', 'MapModeFlags', 'Size64', dev=True)\n    def map(self, mode, offset):\n"));
    }

    #[test]
    fn unknown_functions_are_reported_and_left_alone() {
        let code = "class GPUDevice:\n    def fooBar(self, x):\n        return x\n\n    def _private(self):\n        pass\n\n    @property\n    def limits(self):\n        return {}\n";
        let (out, report) = patch(code, true);
        assert_eq!(out, code);
        assert!(report.contains(&"* Found unknown function GPUDevice.fooBar".to_string()));
        assert!(!report.iter().any(|l| l.contains("_private") || l.contains("limits")));
        assert!(report.contains(
            &"* Not implemented: GPUBuffer createBuffer(GPUBufferDescriptor descriptor);".to_string()
        ));
    }

    #[test]
    fn patching_is_idempotent_and_keeps_bodies() {
        let code = "# noqa: E501 ignored header\nclass GPUDevice:\n    def createBuffer(  # noqa: N802\n        self, descriptor\n    ):\n        x = 1  # keep\n        return x\n\n    def destroy(self):\n        pass\n";
        let (once, _) = patch(code, true);
        let (twice, _) = patch(&once, true);
        assert_eq!(once, twice);

        let body = |src: &str| -> Vec<String> {
            src.lines()
                .map(str::trim)
                .filter(|l| !l.starts_with('#') && !l.starts_with("def ") && !l.is_empty())
                .map(str::to_string)
                .collect()
        };
        assert_eq!(body(&once), ["class GPUDevice:", "x = 1  # keep", "return x", "pass"]);
        assert!(once.contains("    # wgpu.help('devicedestroy', dev=True)\n    # IDL: undefined destroy();\n    def destroy(self):\n"));
    }

    #[test]
    fn match_rules_are_tried_in_order() {
        let known = ["requestadapter", "buffermapasync"];
        let exists = |c: &str| known.contains(&c);
        assert_eq!(find_match("requestadapter", exists).as_deref(), Some("requestadapter"));
        assert_eq!(find_match("requestadapterasync", exists).as_deref(), Some("requestadapter"));
        assert_eq!(find_match("buffermap", exists).as_deref(), Some("buffermapasync"));
        assert_eq!(find_match("devicefoo", exists), None);
    }

    #[test]
    fn scan_qualifies_methods_and_skips_nested_functions() {
        let lines: Vec<String> = [
            "def top():",
            "    def nested():",
            "        pass",
            "class GPUCanvasContext(Base):",
            "    def configure(self):",
            "        def inner():",
            "            pass",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let records = scan_functions(&lines, "GPU");
        let ids: Vec<_> = records
            .iter()
            .map(|r| (r.id.as_str(), r.name.as_str(), r.line))
            .collect();
        assert_eq!(
            ids,
            [("top", "top", 0), ("canvascontextconfigure", "GPUCanvasContext.configure", 4)]
        );
    }

    #[test]
    fn later_definitions_replace_earlier_ones() {
        let lines: Vec<String> = [
            "class GPUDevice:",
            "    def destroy(self):",
            "        pass",
            "    def createBuffer(self):",
            "        pass",
            "    def destroy(self):",
            "        return 1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let records = scan_functions(&lines, "GPU");
        let ids: Vec<_> = records.iter().map(|r| (r.id.as_str(), r.line)).collect();
        assert_eq!(ids, [("devicecreatebuffer", 3), ("devicedestroy", 5)]);

        let code = "class GPUDevice:\n    def destroy(self):\n        pass\n\n    def destroy(self):\n        return 1\n";
        let (out, _) = patch(code, false);
        assert_eq!(out.matches("wgpu.help('devicedestroy'").count(), 1);
        assert!(out.contains(
            "        pass\n\n    # wgpu.help('devicedestroy', dev=True)\n    def destroy(self):\n        return 1\n"
        ));
    }

    #[test]
    fn classes_indented_by_two_spaces_or_tabs_are_scanned() {
        let code = "class GPUDevice:\n  def destroy(self):\n    pass\n\n  def fooBar(self):\n    def inner():\n      pass\n";
        let (out, report) = patch(code, false);
        assert!(out.contains("  # wgpu.help('devicedestroy', dev=True)\n  def destroy(self):\n"));
        assert!(report.contains(&"* Found 1 functions already implemented".to_string()));
        assert!(report.contains(&"* Found unknown function GPUDevice.fooBar".to_string()));
        assert!(!report.iter().any(|l| l.contains("inner")));

        let code = "class GPUDevice:\n\tdef destroy(self):\n\t\tpass\n";
        let (out, _) = patch(code, false);
        assert_eq!(
            out,
            "class GPUDevice:\n\t# wgpu.help('devicedestroy', dev=True)\n\tdef destroy(self):\n\t\tpass\n"
        );
    }

    #[test]
    fn docstrings_are_left_verbatim() {
        let code = "class GPUDevice:\n    def destroy(self):\n        \"\"\"Drop it.   \n\n\n\n    def notAMethod(self):\n        # noqa: E501\n        \"\"\"\n        pass\n";
        let (out, report) = patch(code, false);
        assert_eq!(
            out,
            "class GPUDevice:\n    # wgpu.help('devicedestroy', dev=True)\n    def destroy(self):\n        \"\"\"Drop it.   \n\n\n\n    def notAMethod(self):\n        # noqa: E501\n        \"\"\"\n        pass\n"
        );
        assert!(!report.iter().any(|l| l.contains("notAMethod")));
    }
}
