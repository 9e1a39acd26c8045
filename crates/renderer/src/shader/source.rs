//! Line-level rewriting of user GLSL so it can be fed to naga's Vulkan-flavoured
//! GLSL frontend.
//!
//! Desktop demo shaders are usually written against `#version 330 core`: loose
//! `uniform float timeValue;` declarations and `in`/`out` varyings matched by
//! name. naga wants `#version 450`, explicit locations, and uniforms inside a
//! block. [`StageSource`] scans the global declarations once and can re-emit the
//! source with any location assignment, which lets the linker line fragment
//! inputs up with vertex outputs by name.
//!
//! Rewrites never add or remove lines (except a `#version` line prepended to
//! files without one), so diagnostics still point at the author's line numbers.
//! The uniform block takes the place of the first loose uniform, so every
//! function after it sees all of the stage's uniforms. Struct types declared
//! between the first and last loose uniform are joined onto that same line
//! ahead of the block.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use super::ShaderStage;

const VERSION_DIRECTIVE: &str = "#version 450 core";

const OPAQUE_TYPE_PREFIXES: &[&str] = &[
    "sampler",
    "isampler",
    "usampler",
    "texture",
    "itexture",
    "utexture",
    "image",
    "iimage",
    "uimage",
    "subpassInput",
    "atomic_uint",
];

const INTERPOLATION_QUALIFIERS: &[&str] = &[
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "sample",
    "invariant",
];

const PRECISION_QUALIFIERS: &[&str] = &["highp", "mediump", "lowp"];

/// Upper bound on the interface locations one stage may occupy.
pub(crate) const MAX_LOCATIONS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    In,
    Out,
    Uniform,
}

/// A single `in`/`out` variable declared at global scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Varying {
    pub line: usize,
    pub name: String,
    pub array: Option<String>,
    pub ty: String,
    pub qualifiers: Vec<String>,
    pub location: Option<u32>,
}

impl Varying {
    /// Type as written plus any array suffix, used for cross-stage comparisons.
    pub fn signature(&self) -> String {
        match &self.array {
            Some(array) => format!("{}{}", self.ty, array),
            None => self.ty.clone(),
        }
    }

    /// Number of consecutive locations the variable occupies.
    fn location_span(&self) -> u32 {
        let columns = matrix_columns(&self.ty).unwrap_or(1);
        let elements = self
            .array
            .as_deref()
            .and_then(|suffix| suffix.trim_start_matches('[').trim_end_matches(']').parse().ok())
            .unwrap_or(1u32);
        columns.saturating_mul(elements.max(1))
    }

    fn render(&self, storage: &str, location: u32) -> String {
        let mut out = format!("layout(location = {location}) ");
        for qualifier in &self.qualifiers {
            out.push_str(qualifier);
            out.push(' ');
        }
        out.push_str(storage);
        out.push(' ');
        out.push_str(&self.ty);
        out.push(' ');
        out.push_str(&self.name);
        if let Some(array) = &self.array {
            out.push_str(array);
        }
        out.push(';');
        out
    }
}

/// A loose non-opaque `uniform` that gets folded into the stage's uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformDecl {
    pub line: usize,
    pub ty: String,
    pub name: String,
}

impl UniformDecl {
    pub fn base_name(&self) -> &str {
        self.name.split('[').next().unwrap_or(&self.name)
    }
}

/// A global `struct` type definition, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StructDef {
    first_line: usize,
    last_line: usize,
    code: String,
}

/// Scanned view of one shader stage's source text.
#[derive(Debug, Clone)]
pub(crate) struct StageSource {
    stage: ShaderStage,
    lines: Vec<String>,
    version_line: Option<usize>,
    structs: Vec<StructDef>,
    pub inputs: Vec<Varying>,
    pub outputs: Vec<Varying>,
    pub uniforms: Vec<UniformDecl>,
}

impl StageSource {
    pub fn parse(stage: ShaderStage, text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(str::to_owned).collect();
        let mut version_line = None;
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut uniforms = Vec::new();
        let mut structs = Vec::new();
        let mut open_struct: Option<StructDef> = None;
        let mut in_block_comment = false;
        let mut depth: i64 = 0;

        for (index, line) in lines.iter().enumerate() {
            let code = strip_comments(line, &mut in_block_comment);
            let trimmed = code.trim();
            let at_global_scope = depth == 0;
            depth += brace_delta(trimmed);

            if let Some(mut def) = open_struct.take() {
                if !trimmed.is_empty() {
                    def.code.push(' ');
                    def.code.push_str(trimmed);
                }
                def.last_line = index;
                if depth == 0 && def.code.ends_with(';') {
                    structs.push(def);
                } else {
                    open_struct = Some(def);
                }
                continue;
            }

            if trimmed.is_empty() || !at_global_scope {
                continue;
            }
            if is_struct_start(trimmed) {
                let def = StructDef {
                    first_line: index,
                    last_line: index,
                    code: trimmed.to_string(),
                };
                if depth == 0 && trimmed.ends_with(';') {
                    structs.push(def);
                } else {
                    open_struct = Some(def);
                }
                continue;
            }
            if trimmed.starts_with('#') {
                if version_line.is_none() && trimmed.starts_with("#version") {
                    version_line = Some(index);
                }
                continue;
            }

            let Some(declaration) = parse_declaration(trimmed) else {
                continue;
            };

            match declaration.storage {
                Storage::Uniform => {
                    if is_opaque_type(&declaration.ty) {
                        continue;
                    }
                    for name in declaration.names {
                        uniforms.push(UniformDecl {
                            line: index,
                            ty: declaration.ty.clone(),
                            name,
                        });
                    }
                }
                Storage::In | Storage::Out => {
                    // Multiple names sharing one explicit location cannot be split apart.
                    if declaration.location.is_some() && declaration.names.len() > 1 {
                        continue;
                    }
                    let target = if declaration.storage == Storage::In {
                        &mut inputs
                    } else {
                        &mut outputs
                    };
                    for name in declaration.names {
                        let (base, array) = split_array(&name);
                        target.push(Varying {
                            line: index,
                            name: base,
                            array,
                            ty: declaration.ty.clone(),
                            qualifiers: declaration.qualifiers.clone(),
                            location: declaration.location,
                        });
                    }
                }
            }
        }

        Self {
            stage,
            lines,
            version_line,
            structs,
            inputs,
            outputs,
            uniforms,
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Locations for the stage's inputs when no other stage constrains them.
    pub fn default_input_locations(&self) -> Result<Vec<u32>, String> {
        sequential_locations(&self.inputs)
    }

    pub fn default_output_locations(&self) -> Result<Vec<u32>, String> {
        sequential_locations(&self.outputs)
    }

    /// Produces naga-ready GLSL using the given locations (one per varying, in
    /// declaration order).
    pub fn emit(&self, input_locations: &[u32], output_locations: &[u32]) -> String {
        debug_assert_eq!(input_locations.len(), self.inputs.len());
        debug_assert_eq!(output_locations.len(), self.outputs.len());

        let mut rewritten: Vec<Cow<'_, str>> =
            self.lines.iter().map(|line| Cow::Borrowed(line.as_str())).collect();

        let mut varyings_by_line: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (varying, location) in self.inputs.iter().zip(input_locations) {
            varyings_by_line
                .entry(varying.line)
                .or_default()
                .push(varying.render("in", *location));
        }
        for (varying, location) in self.outputs.iter().zip(output_locations) {
            varyings_by_line
                .entry(varying.line)
                .or_default()
                .push(varying.render("out", *location));
        }
        for (line, declarations) in varyings_by_line {
            rewritten[line] = Cow::Owned(declarations.join(" "));
        }

        if let (Some(first), Some(last)) = (self.uniforms.first(), self.uniforms.last()) {
            for uniform in &self.uniforms {
                rewritten[uniform.line] = Cow::Borrowed("");
            }
            let mut block_line = String::new();
            for def in self
                .structs
                .iter()
                .filter(|def| def.first_line > first.line && def.first_line < last.line)
            {
                for line in def.first_line..=def.last_line {
                    rewritten[line] = Cow::Borrowed("");
                }
                block_line.push_str(&def.code);
                block_line.push(' ');
            }
            block_line.push_str(&self.uniform_block());
            rewritten[first.line] = Cow::Owned(block_line);
        }

        let mut out = String::new();
        match self.version_line {
            Some(line) => rewritten[line] = Cow::Borrowed(VERSION_DIRECTIVE),
            None => {
                out.push_str(VERSION_DIRECTIVE);
                out.push('\n');
            }
        }

        for line in rewritten {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    fn uniform_block(&self) -> String {
        let mut block = format!(
            "layout(std140, set = 0, binding = {binding}) uniform {name} {{",
            binding = self.stage.uniform_binding(),
            name = self.stage.uniform_block_name(),
        );
        for uniform in &self.uniforms {
            block.push(' ');
            block.push_str(&uniform.ty);
            block.push(' ');
            block.push_str(&uniform.name);
            block.push(';');
        }
        block.push_str(" };");
        block
    }
}

/// Assigns explicit locations first, then packs the remaining varyings into the
/// lowest free slots in declaration order.
///
/// Every slot must fall below [`MAX_LOCATIONS`]; the error names the offending
/// variable.
pub(crate) fn sequential_locations(varyings: &[Varying]) -> Result<Vec<u32>, String> {
    let mut used = BTreeSet::new();
    for varying in varyings {
        if let Some(location) = varying.location {
            let span = varying.location_span();
            let end = location
                .checked_add(span)
                .filter(|end| *end <= MAX_LOCATIONS)
                .ok_or_else(|| {
                    format!(
                        "'{}' at location {location} spans {span} location(s), beyond the limit of {MAX_LOCATIONS}",
                        varying.name
                    )
                })?;
            used.extend(location..end);
        }
    }

    let mut next = 0u32;
    let mut locations = Vec::with_capacity(varyings.len());
    for varying in varyings {
        if let Some(location) = varying.location {
            locations.push(location);
            continue;
        }
        let span = varying.location_span();
        loop {
            if span > MAX_LOCATIONS || next > MAX_LOCATIONS - span {
                return Err(format!(
                    "no room for '{}' ({span} location(s)) below the limit of {MAX_LOCATIONS}",
                    varying.name
                ));
            }
            if !(next..next + span).any(|slot| used.contains(&slot)) {
                break;
            }
            next += 1;
        }
        used.extend(next..next + span);
        locations.push(next);
        next += span;
    }
    Ok(locations)
}

struct RawDeclaration {
    storage: Storage,
    location: Option<u32>,
    qualifiers: Vec<String>,
    ty: String,
    names: Vec<String>,
}

fn parse_declaration(code: &str) -> Option<RawDeclaration> {
    let body = code.strip_suffix(';')?.trim();

    let (location, body) = match body.strip_prefix("layout") {
        Some(after) => {
            let inner = after.trim_start().strip_prefix('(')?;
            let close = inner.find(')')?;
            let location = parse_location_layout(&inner[..close])?;
            (Some(location), inner[close + 1..].trim())
        }
        None => (None, body),
    };

    if body.contains(['(', ')', '=', '{', '}', ';']) {
        return None;
    }

    let mut tokens = body.split_whitespace().peekable();
    let mut qualifiers = Vec::new();
    let mut storage = None;
    while let Some(token) = tokens.peek().copied() {
        match token {
            "in" | "out" | "uniform" if storage.is_none() => {
                storage = Some(match token {
                    "in" => Storage::In,
                    "out" => Storage::Out,
                    _ => Storage::Uniform,
                });
            }
            _ if INTERPOLATION_QUALIFIERS.contains(&token)
                || PRECISION_QUALIFIERS.contains(&token) =>
            {
                qualifiers.push(token.to_string());
            }
            _ => break,
        }
        tokens.next();
    }

    let storage = storage?;
    if location.is_some() && storage == Storage::Uniform {
        return None;
    }
    let ty = tokens.next()?.to_string();
    let remainder: Vec<&str> = tokens.collect();
    let names: Vec<String> = remainder
        .join(" ")
        .split(',')
        .map(|name| name.split_whitespace().collect::<String>())
        .collect();

    if names.is_empty() || !names.iter().all(|name| is_declarator(name)) {
        return None;
    }
    if names.iter().any(|name| name.starts_with("gl_")) {
        return None;
    }

    if storage == Storage::Uniform {
        qualifiers.retain(|qualifier| !PRECISION_QUALIFIERS.contains(&qualifier.as_str()));
    }

    Some(RawDeclaration {
        storage,
        location,
        qualifiers,
        ty,
        names,
    })
}

/// Accepts only `location = N`; any other layout qualifier leaves the line alone.
fn parse_location_layout(layout: &str) -> Option<u32> {
    let mut location = None;
    for entry in layout.split(',') {
        let (key, value) = entry.split_once('=')?;
        if key.trim() != "location" {
            return None;
        }
        location = Some(value.trim().parse().ok()?);
    }
    location
}

fn is_declarator(name: &str) -> bool {
    let (base, array) = split_array(name);
    let base_ok = base
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
        && base.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    let array_ok = array.map_or(true, |suffix| {
        suffix.starts_with('[')
            && suffix.ends_with(']')
            && suffix[1..suffix.len() - 1]
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    });
    base_ok && array_ok
}

fn split_array(name: &str) -> (String, Option<String>) {
    match name.find('[') {
        Some(index) => (name[..index].to_string(), Some(name[index..].to_string())),
        None => (name.to_string(), None),
    }
}

fn is_struct_start(code: &str) -> bool {
    code.strip_prefix("struct")
        .is_some_and(|rest| rest.starts_with(|ch: char| ch.is_whitespace() || ch == '{'))
}

fn is_opaque_type(ty: &str) -> bool {
    OPAQUE_TYPE_PREFIXES
        .iter()
        .any(|prefix| ty.starts_with(prefix))
}

fn matrix_columns(ty: &str) -> Option<u32> {
    let rest = ty.strip_prefix("dmat").or_else(|| ty.strip_prefix("mat"))?;
    rest.chars().next()?.to_digit(10)
}

fn brace_delta(code: &str) -> i64 {
    code.chars().fold(0, |delta, ch| match ch {
        '{' => delta + 1,
        '}' => delta - 1,
        _ => delta,
    })
}

fn strip_comments(line: &str, in_block_comment: &mut bool) -> String {
    let mut code = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        if *in_block_comment {
            match rest.find("*/") {
                Some(end) => {
                    *in_block_comment = false;
                    rest = &rest[end + 2..];
                }
                None => return code,
            }
        }

        let line_comment = rest.find("//");
        let block_comment = rest.find("/*");
        match (line_comment, block_comment) {
            (Some(line_at), Some(block_at)) if line_at < block_at => {
                code.push_str(&rest[..line_at]);
                return code;
            }
            (Some(line_at), None) => {
                code.push_str(&rest[..line_at]);
                return code;
            }
            (_, Some(block_at)) => {
                code.push_str(&rest[..block_at]);
                code.push(' ');
                *in_block_comment = true;
                rest = &rest[block_at + 2..];
            }
            (None, None) => {
                code.push_str(rest);
                return code;
            }
        }
    }
}
