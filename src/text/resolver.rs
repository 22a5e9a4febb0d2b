//! Name resolution and sugar expansion.
//!
//! Resolution runs in two passes over a parsed [`TextModule`]:
//!
//! 1. **Binding.** Module items are walked in source order; every item binds
//!    its index (and optional `$name`) in its index space. Inline
//!    import/export sugar and inline element/data segments are expanded into
//!    full top-level fields here, so the second pass sees only desugared
//!    items. Explicit types are recorded in the [`FunctionTypeMap`].
//!
//! 2. **Rewriting.** Every [`Var`] holding a name is replaced by its index;
//!    numeric vars are range checked against the final size of their space.
//!    Anonymous function signatures are deduplicated against the type space
//!    or deferred, and the deferred types are appended as trailing `(type)`
//!    fields when the module ends.
//!
//! Errors are collected and reported together; a failed item does not stop
//! the walk.

use super::ast::{
    DataKindField, ElemField, ElemItemsField, ElemKindField, ExportField, ImportDescField,
    ImportField, Instr, InstrKind, ModuleField, TextModule, TypeField, TypeUse, Var, VarKind,
};
use super::names::{FunctionTypeMap, NameMap};
use super::token::Span;
use crate::binary::encoding::PAGE_SIZE;
use crate::binary::instruction::Instruction;
use crate::binary::module::ExternalKind;
use crate::binary::types::{Limits, TableType};
use crate::error::{Error, ErrorKind};

/// Resolves names, expands sugar, and synthesises implicit types, in place.
pub fn resolve(module: &mut TextModule) -> Result<(), Vec<Error>> {
    let mut cx = ResolveContext::new();
    cx.bind_and_desugar(module);
    cx.rewrite(module);

    for ty in cx.typemap.end_module() {
        let param_count = ty.params.len();
        module.fields.push(ModuleField::Type(TypeField {
            span: module.span,
            name: None,
            ty,
            param_names: vec![None; param_count],
        }));
    }

    if cx.errors.is_empty() {
        Ok(())
    } else {
        Err(cx.errors)
    }
}

struct ResolveContext {
    types: NameMap,
    funcs: NameMap,
    tables: NameMap,
    memories: NameMap,
    globals: NameMap,
    tags: NameMap,
    elems: NameMap,
    datas: NameMap,
    typemap: FunctionTypeMap,
    errors: Vec<Error>,
    has_definition: bool,
    seen_start: bool,
}

impl ResolveContext {
    fn new() -> Self {
        ResolveContext {
            types: NameMap::new("type"),
            funcs: NameMap::new("function"),
            tables: NameMap::new("table"),
            memories: NameMap::new("memory"),
            globals: NameMap::new("global"),
            tags: NameMap::new("tag"),
            elems: NameMap::new("element segment"),
            datas: NameMap::new("data segment"),
            typemap: FunctionTypeMap::new(),
            errors: Vec::new(),
            has_definition: false,
            seen_start: false,
        }
    }

    fn bind(&mut self, space: Space, name: Option<&str>, span: Span) -> u32 {
        let map = self.map_mut(space);
        match map.bind(name, span) {
            Ok(index) => index,
            Err(e) => {
                self.errors.push(e);
                // The index was still assigned; recompute it.
                self.map_mut(space).len() - 1
            }
        }
    }

    fn map(&self, space: Space) -> &NameMap {
        match space {
            Space::Type => &self.types,
            Space::Func => &self.funcs,
            Space::Table => &self.tables,
            Space::Memory => &self.memories,
            Space::Global => &self.globals,
            Space::Tag => &self.tags,
            Space::Elem => &self.elems,
            Space::Data => &self.datas,
        }
    }

    fn map_mut(&mut self, space: Space) -> &mut NameMap {
        match space {
            Space::Type => &mut self.types,
            Space::Func => &mut self.funcs,
            Space::Table => &mut self.tables,
            Space::Memory => &mut self.memories,
            Space::Global => &mut self.globals,
            Space::Tag => &mut self.tags,
            Space::Elem => &mut self.elems,
            Space::Data => &mut self.datas,
        }
    }

    /// Replaces a name var with its index, or records an error.
    fn resolve_var(&mut self, var: &mut Var, space: Space) {
        match self.map(space).resolve(var) {
            Ok(index) => *var = Var::index(var.span, index),
            Err(e) => self.errors.push(e),
        }
    }

    fn resolve_opt_var(&mut self, var: &mut Option<Var>, space: Space) {
        if let Some(var) = var {
            self.resolve_var(var, space);
        }
    }

    fn note_import(&mut self, span: Span) {
        if self.has_definition {
            self.errors
                .push(Error::new(span.start, ErrorKind::ImportAfterNonImport));
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Space {
    Type,
    Func,
    Table,
    Memory,
    Global,
    Tag,
    Elem,
    Data,
}

// ===========================================================================
// Pass 1: binding and desugaring
// ===========================================================================

impl ResolveContext {
    fn bind_and_desugar(&mut self, module: &mut TextModule) {
        let fields = std::mem::take(&mut module.fields);
        let mut out = Vec::with_capacity(fields.len());

        for field in fields {
            match field {
                ModuleField::Type(ty) => {
                    self.bind(Space::Type, ty.name.as_deref(), ty.span);
                    self.typemap.push_explicit(ty.ty.clone());
                    out.push(ModuleField::Type(ty));
                }
                ModuleField::Import(import) => {
                    self.note_import(import.span);
                    let (space, name) = match &import.desc {
                        ImportDescField::Func { name, .. } => (Space::Func, name.clone()),
                        ImportDescField::Table { name, .. } => (Space::Table, name.clone()),
                        ImportDescField::Memory { name, .. } => (Space::Memory, name.clone()),
                        ImportDescField::Global { name, .. } => (Space::Global, name.clone()),
                        ImportDescField::Tag { name, .. } => (Space::Tag, name.clone()),
                    };
                    self.bind(space, name.as_deref(), import.span);
                    out.push(ModuleField::Import(import));
                }
                ModuleField::Func(mut func) => {
                    let index = self.bind(Space::Func, func.name.as_deref(), func.span);
                    let exports = std::mem::take(&mut func.exports);
                    if let Some((module_name, field_name)) = func.import.take() {
                        self.note_import(func.span);
                        out.push(ModuleField::Import(ImportField {
                            span: func.span,
                            module: module_name,
                            field: field_name,
                            desc: ImportDescField::Func {
                                name: func.name.clone(),
                                ty: func.ty,
                            },
                        }));
                    } else {
                        self.has_definition = true;
                        out.push(ModuleField::Func(func));
                    }
                    self.push_exports(&mut out, exports, ExternalKind::Func, index);
                }
                ModuleField::Table(mut table) => {
                    let index = self.bind(Space::Table, table.name.as_deref(), table.span);
                    let exports = std::mem::take(&mut table.exports);
                    if let Some((module_name, field_name)) = table.import.take() {
                        self.note_import(table.span);
                        let limits = match table.limits {
                            Some(limits) => limits,
                            None => {
                                self.errors.push(Error::syntax(
                                    table.span.start,
                                    "imported table requires explicit limits",
                                ));
                                Limits::new(0, None)
                            }
                        };
                        out.push(ModuleField::Import(ImportField {
                            span: table.span,
                            module: module_name,
                            field: field_name,
                            desc: ImportDescField::Table {
                                name: table.name.clone(),
                                ty: TableType {
                                    ref_type: table.ref_type,
                                    limits,
                                },
                            },
                        }));
                    } else {
                        self.has_definition = true;
                        if let Some(items) = table.inline_elem.take() {
                            // (table reftype (elem ...)) is a table sized to
                            // the item count plus an active segment at 0.
                            table.limits = Some(Limits::exact(items.len() as u32));
                            let span = table.span;
                            let ref_type = table.ref_type;
                            out.push(ModuleField::Table(table));
                            self.bind(Space::Elem, None, span);
                            out.push(ModuleField::Elem(ElemField {
                                span,
                                name: None,
                                kind: ElemKindField::Active {
                                    table: Some(Var::index(span, index)),
                                    offset: vec![Instr {
                                        span,
                                        kind: InstrKind::Plain(Instruction::I32Const { value: 0 }),
                                    }],
                                },
                                ref_type,
                                items,
                            }));
                        } else {
                            out.push(ModuleField::Table(table));
                        }
                    }
                    self.push_exports(&mut out, exports, ExternalKind::Table, index);
                }
                ModuleField::Memory(mut memory) => {
                    let index = self.bind(Space::Memory, memory.name.as_deref(), memory.span);
                    let exports = std::mem::take(&mut memory.exports);
                    if let Some((module_name, field_name)) = memory.import.take() {
                        self.note_import(memory.span);
                        let limits = match memory.limits {
                            Some(limits) => limits,
                            None => {
                                self.errors.push(Error::syntax(
                                    memory.span.start,
                                    "imported memory requires explicit limits",
                                ));
                                Limits::new(0, None)
                            }
                        };
                        out.push(ModuleField::Import(ImportField {
                            span: memory.span,
                            module: module_name,
                            field: field_name,
                            desc: ImportDescField::Memory {
                                name: memory.name.clone(),
                                limits,
                            },
                        }));
                    } else {
                        self.has_definition = true;
                        if let Some(data) = memory.inline_data.take() {
                            // (memory (data ...)) sizes the memory to the
                            // payload, rounded up to whole pages.
                            let pages = (data.len() as u32).div_ceil(PAGE_SIZE);
                            memory.limits = Some(Limits::exact(pages));
                            let span = memory.span;
                            out.push(ModuleField::Memory(memory));
                            self.bind(Space::Data, None, span);
                            out.push(ModuleField::Data(super::ast::DataField {
                                span,
                                name: None,
                                kind: DataKindField::Active {
                                    memory: Some(Var::index(span, index)),
                                    offset: vec![Instr {
                                        span,
                                        kind: InstrKind::Plain(Instruction::I32Const { value: 0 }),
                                    }],
                                },
                                data,
                            }));
                        } else {
                            out.push(ModuleField::Memory(memory));
                        }
                    }
                    self.push_exports(&mut out, exports, ExternalKind::Memory, index);
                }
                ModuleField::Global(mut global) => {
                    let index = self.bind(Space::Global, global.name.as_deref(), global.span);
                    let exports = std::mem::take(&mut global.exports);
                    if let Some((module_name, field_name)) = global.import.take() {
                        self.note_import(global.span);
                        out.push(ModuleField::Import(ImportField {
                            span: global.span,
                            module: module_name,
                            field: field_name,
                            desc: ImportDescField::Global {
                                name: global.name.clone(),
                                ty: global.ty,
                            },
                        }));
                    } else {
                        self.has_definition = true;
                        out.push(ModuleField::Global(global));
                    }
                    self.push_exports(&mut out, exports, ExternalKind::Global, index);
                }
                ModuleField::Tag(mut tag) => {
                    let index = self.bind(Space::Tag, tag.name.as_deref(), tag.span);
                    let exports = std::mem::take(&mut tag.exports);
                    if let Some((module_name, field_name)) = tag.import.take() {
                        self.note_import(tag.span);
                        out.push(ModuleField::Import(ImportField {
                            span: tag.span,
                            module: module_name,
                            field: field_name,
                            desc: ImportDescField::Tag {
                                name: tag.name.clone(),
                                ty: tag.ty,
                            },
                        }));
                    } else {
                        self.has_definition = true;
                        out.push(ModuleField::Tag(tag));
                    }
                    self.push_exports(&mut out, exports, ExternalKind::Tag, index);
                }
                ModuleField::Export(export) => out.push(ModuleField::Export(export)),
                ModuleField::Start(start) => {
                    if self.seen_start {
                        self.errors
                            .push(Error::new(start.span.start, ErrorKind::MultipleStart));
                    }
                    self.seen_start = true;
                    out.push(ModuleField::Start(start));
                }
                ModuleField::Elem(elem) => {
                    self.bind(Space::Elem, elem.name.as_deref(), elem.span);
                    out.push(ModuleField::Elem(elem));
                }
                ModuleField::Data(data) => {
                    self.bind(Space::Data, data.name.as_deref(), data.span);
                    out.push(ModuleField::Data(data));
                }
            }
        }

        module.fields = out;
    }

    fn push_exports(
        &mut self,
        out: &mut Vec<ModuleField>,
        exports: Vec<String>,
        kind: ExternalKind,
        index: u32,
    ) {
        for name in exports {
            out.push(ModuleField::Export(ExportField {
                span: Span::ZERO,
                name,
                kind,
                item: Var::index(Span::ZERO, index),
            }));
        }
    }
}

// ===========================================================================
// Pass 2: rewriting
// ===========================================================================

impl ResolveContext {
    fn rewrite(&mut self, module: &mut TextModule) {
        let mut fields = std::mem::take(&mut module.fields);
        for field in &mut fields {
            match field {
                ModuleField::Type(_) => {}
                ModuleField::Import(import) => match &mut import.desc {
                    ImportDescField::Func { ty, .. } | ImportDescField::Tag { ty, .. } => {
                        self.resolve_func_typeuse(ty);
                    }
                    _ => {}
                },
                ModuleField::Func(func) => {
                    self.resolve_func_typeuse(&mut func.ty);
                    let locals = self.function_locals(func);
                    self.resolve_instrs(&mut func.body, &locals);
                }
                ModuleField::Table(_) | ModuleField::Memory(_) => {}
                ModuleField::Global(global) => {
                    let locals = NameMap::new("local");
                    self.resolve_instrs(&mut global.init, &locals);
                }
                ModuleField::Tag(tag) => self.resolve_func_typeuse(&mut tag.ty),
                ModuleField::Export(export) => {
                    let space = match export.kind {
                        ExternalKind::Func => Space::Func,
                        ExternalKind::Table => Space::Table,
                        ExternalKind::Memory => Space::Memory,
                        ExternalKind::Global => Space::Global,
                        ExternalKind::Tag => Space::Tag,
                    };
                    self.resolve_var(&mut export.item, space);
                }
                ModuleField::Start(start) => self.resolve_var(&mut start.func, Space::Func),
                ModuleField::Elem(elem) => {
                    if let ElemKindField::Active { table, offset } = &mut elem.kind {
                        self.resolve_opt_var(table, Space::Table);
                        let locals = NameMap::new("local");
                        self.resolve_instrs(offset, &locals);
                    }
                    match &mut elem.items {
                        ElemItemsField::Funcs(funcs) => {
                            for var in funcs {
                                self.resolve_var(var, Space::Func);
                            }
                        }
                        ElemItemsField::Exprs(exprs) => {
                            for expr in exprs {
                                let locals = NameMap::new("local");
                                self.resolve_instrs(expr, &locals);
                            }
                        }
                    }
                }
                ModuleField::Data(data) => {
                    if let DataKindField::Active { memory, offset } = &mut data.kind {
                        self.resolve_opt_var(memory, Space::Memory);
                        let locals = NameMap::new("local");
                        self.resolve_instrs(offset, &locals);
                    }
                }
            }
        }
        module.fields = fields;
    }

    /// Resolves a function-position type use: explicit index, structural
    /// reuse, or a deferred implicit type.
    fn resolve_func_typeuse(&mut self, ty: &mut TypeUse) {
        if let Some(var) = &mut ty.idx {
            match self.types.resolve(var) {
                Ok(index) => {
                    *var = Var::index(var.span, index);
                    ty.resolved = Some(index);
                }
                Err(e) => self.errors.push(e),
            }
        } else {
            ty.resolved = Some(self.typemap.get_or_defer(ty.signature()));
        }
    }

    /// Resolves a block-position type use: only multi-value shapes need a
    /// type index; empty and single-result blocks are encoded directly.
    fn resolve_block_typeuse(&mut self, ty: &mut TypeUse) {
        if let Some(var) = &mut ty.idx {
            match self.types.resolve(var) {
                Ok(index) => {
                    *var = Var::index(var.span, index);
                    ty.resolved = Some(index);
                }
                Err(e) => self.errors.push(e),
            }
        } else if !ty.params.is_empty() || ty.results.len() > 1 {
            ty.resolved = Some(self.typemap.get_or_defer(ty.signature()));
        }
    }

    /// Parameters and locals share one scope.
    fn function_locals(&mut self, func: &super::ast::FuncField) -> NameMap {
        let mut locals = NameMap::new("local");
        if func.ty.params.is_empty() {
            // An explicit (type $t) without inline params still contributes
            // that type's parameters to the local index space, unnamed.
            if let Some(type_idx) = func.ty.resolved {
                if let Some(ty) = self.typemap.get(type_idx) {
                    for _ in 0..ty.params.len() {
                        let _ = locals.bind(None, func.span);
                    }
                }
            }
        } else {
            for (name, _) in &func.ty.params {
                if let Err(e) = locals.bind(name.as_deref(), func.span) {
                    self.errors.push(e);
                }
            }
        }
        for (name, _) in &func.locals {
            if let Err(e) = locals.bind(name.as_deref(), func.span) {
                self.errors.push(e);
            }
        }
        locals
    }

    fn resolve_instrs(&mut self, instrs: &mut Vec<Instr>, locals: &NameMap) {
        let mut labels: Vec<Option<String>> = Vec::new();

        for instr in instrs {
            match &mut instr.kind {
                InstrKind::Block { label, ty }
                | InstrKind::Loop { label, ty }
                | InstrKind::If { label, ty }
                | InstrKind::Try { label, ty } => {
                    self.resolve_block_typeuse(ty);
                    labels.push(label.clone());
                }
                InstrKind::Plain(Instruction::End) => {
                    labels.pop();
                }
                InstrKind::Plain(_) => {}
                InstrKind::Br(var) | InstrKind::BrIf(var) | InstrKind::Rethrow(var) => {
                    self.resolve_label(var, &labels);
                }
                InstrKind::BrTable { targets, default } => {
                    for var in targets.iter_mut() {
                        self.resolve_label(var, &labels);
                    }
                    self.resolve_label(default, &labels);
                }
                InstrKind::Delegate(var) => {
                    // delegate closes its try; the target label counts from
                    // outside the closed block.
                    labels.pop();
                    self.resolve_label(var, &labels);
                }
                InstrKind::Call(var) | InstrKind::ReturnCall(var) | InstrKind::RefFunc(var) => {
                    self.resolve_var(var, Space::Func);
                }
                InstrKind::CallIndirect { table, ty }
                | InstrKind::ReturnCallIndirect { table, ty } => {
                    self.resolve_opt_var(table, Space::Table);
                    self.resolve_func_typeuse(ty);
                }
                InstrKind::LocalGet(var) | InstrKind::LocalSet(var) | InstrKind::LocalTee(var) => {
                    match locals.resolve(var) {
                        Ok(index) => *var = Var::index(var.span, index),
                        Err(e) => self.errors.push(e),
                    }
                }
                InstrKind::GlobalGet(var) | InstrKind::GlobalSet(var) => {
                    self.resolve_var(var, Space::Global);
                }
                InstrKind::TableGet(var)
                | InstrKind::TableSet(var)
                | InstrKind::TableSize(var)
                | InstrKind::TableGrow(var)
                | InstrKind::TableFill(var) => {
                    self.resolve_var(var, Space::Table);
                }
                InstrKind::TableCopy { dst, src } => {
                    self.resolve_var(dst, Space::Table);
                    self.resolve_var(src, Space::Table);
                }
                InstrKind::TableInit { elem, table } => {
                    self.resolve_var(elem, Space::Elem);
                    self.resolve_opt_var(table, Space::Table);
                }
                InstrKind::ElemDrop(var) => self.resolve_var(var, Space::Elem),
                InstrKind::MemorySize(var)
                | InstrKind::MemoryGrow(var)
                | InstrKind::MemoryFill(var) => {
                    self.resolve_opt_var(var, Space::Memory);
                }
                InstrKind::MemoryCopy { dst, src } => {
                    self.resolve_opt_var(dst, Space::Memory);
                    self.resolve_opt_var(src, Space::Memory);
                }
                InstrKind::MemoryInit { data, memory } => {
                    self.resolve_var(data, Space::Data);
                    self.resolve_opt_var(memory, Space::Memory);
                }
                InstrKind::DataDrop(var) => self.resolve_var(var, Space::Data),
                InstrKind::Throw(var) | InstrKind::Catch(var) => {
                    self.resolve_var(var, Space::Tag);
                }
            }
        }
    }

    /// Labels resolve to relative depths; inner labels shadow outer ones.
    fn resolve_label(&mut self, var: &mut Var, labels: &[Option<String>]) {
        match &var.kind {
            VarKind::Index(index) => {
                if *index as usize >= labels.len() {
                    self.errors.push(Error::new(
                        var.span.start,
                        ErrorKind::IndexOutOfRange {
                            space: "label",
                            index: *index,
                            max: (labels.len() as u32).saturating_sub(1),
                        },
                    ));
                }
            }
            VarKind::Name(name) => {
                let depth = labels
                    .iter()
                    .rev()
                    .position(|label| label.as_deref() == Some(name));
                match depth {
                    Some(depth) => *var = Var::index(var.span, depth as u32),
                    None => self.errors.push(Error::new(
                        var.span.start,
                        ErrorKind::UnknownName(name.clone()),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use crate::binary::types::{FunctionType, ValueType};

    fn resolved(source: &str) -> TextModule {
        let mut module = parse(source).expect("parse failed");
        resolve(&mut module).expect("resolve failed");
        module
    }

    fn resolve_err(source: &str) -> Vec<Error> {
        let mut module = parse(source).expect("parse failed");
        resolve(&mut module).expect_err("expected resolution errors")
    }

    fn func_bodies(module: &TextModule) -> Vec<&[Instr]> {
        module
            .fields
            .iter()
            .filter_map(|f| match f {
                ModuleField::Func(func) => Some(func.body.as_slice()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn names_become_indices() {
        let module = resolved(
            "(module
                (func $a)
                (func $b (call $a) (call $b)))",
        );
        let bodies = func_bodies(&module);
        let InstrKind::Call(first) = &bodies[1][0].kind else {
            panic!("expected call");
        };
        assert_eq!(first.as_index(), Some(0));
        let InstrKind::Call(second) = &bodies[1][1].kind else {
            panic!("expected call");
        };
        assert_eq!(second.as_index(), Some(1));
    }

    #[test]
    fn unknown_name_reported() {
        let errors = resolve_err("(module (func (call $missing)))");
        assert_eq!(errors[0].kind, ErrorKind::UnknownName("missing".to_string()));
    }

    #[test]
    fn numeric_index_range_checked() {
        let errors = resolve_err("(module (func (call 3)))");
        assert!(matches!(
            errors[0].kind,
            ErrorKind::IndexOutOfRange {
                space: "function",
                index: 3,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_function_name() {
        let errors = resolve_err("(module (func $f) (func $f))");
        assert_eq!(errors[0].kind, ErrorKind::DuplicateName("f".to_string()));
    }

    #[test]
    fn params_and_locals_share_scope() {
        let module = resolved(
            "(module (func $f (param $x i32) (local $y i64)
                local.get $x
                local.get $y))",
        );
        let bodies = func_bodies(&module);
        let InstrKind::LocalGet(x) = &bodies[0][0].kind else {
            panic!()
        };
        assert_eq!(x.as_index(), Some(0));
        let InstrKind::LocalGet(y) = &bodies[0][1].kind else {
            panic!()
        };
        assert_eq!(y.as_index(), Some(1));
    }

    #[test]
    fn labels_resolve_to_relative_depth() {
        let module = resolved(
            "(module (func
                block $outer
                    block $inner
                        br $outer
                        br $inner
                    end
                end))",
        );
        let bodies = func_bodies(&module);
        let body = bodies[0];
        let InstrKind::Br(outer) = &body[2].kind else {
            panic!()
        };
        assert_eq!(outer.as_index(), Some(1));
        let InstrKind::Br(inner) = &body[3].kind else {
            panic!()
        };
        assert_eq!(inner.as_index(), Some(0));
    }

    #[test]
    fn inner_label_shadows_outer() {
        let module = resolved(
            "(module (func
                block $l
                    block $l
                        br $l
                    end
                end))",
        );
        let bodies = func_bodies(&module);
        let InstrKind::Br(var) = &bodies[0][2].kind else {
            panic!()
        };
        // The inner $l wins.
        assert_eq!(var.as_index(), Some(0));
    }

    #[test]
    fn implicit_types_deduplicated() {
        let module = resolved("(module (func (param i32)) (func (param i32)))");
        let type_count = module
            .fields
            .iter()
            .filter(|f| matches!(f, ModuleField::Type(_)))
            .count();
        assert_eq!(type_count, 1);

        let ModuleField::Type(ty) = module
            .fields
            .iter()
            .find(|f| matches!(f, ModuleField::Type(_)))
            .unwrap()
        else {
            panic!()
        };
        assert_eq!(ty.ty, FunctionType::new(vec![ValueType::I32], vec![]));
    }

    #[test]
    fn implicit_type_reuses_explicit() {
        let module = resolved("(module (type (func (param i32))) (func (param i32)))");
        let type_count = module
            .fields
            .iter()
            .filter(|f| matches!(f, ModuleField::Type(_)))
            .count();
        assert_eq!(type_count, 1);
        let ModuleField::Func(func) = module
            .fields
            .iter()
            .find(|f| matches!(f, ModuleField::Func(_)))
            .unwrap()
        else {
            panic!()
        };
        assert_eq!(func.ty.resolved, Some(0));
    }

    #[test]
    fn inline_export_expands() {
        let module = resolved(r#"(module (func $f (export "n")))"#);
        let export = module
            .fields
            .iter()
            .find_map(|f| match f {
                ModuleField::Export(e) => Some(e),
                _ => None,
            })
            .expect("expected synthesised export");
        assert_eq!(export.name, "n");
        assert_eq!(export.kind, ExternalKind::Func);
        assert_eq!(export.item.as_index(), Some(0));
    }

    #[test]
    fn inline_import_expands() {
        let module = resolved(r#"(module (func $f (import "m" "n") (param i32)))"#);
        assert!(matches!(
            &module.fields[0],
            ModuleField::Import(ImportField {
                desc: ImportDescField::Func { .. },
                ..
            })
        ));
        // No bare func field remains.
        assert!(!module.fields.iter().any(|f| matches!(f, ModuleField::Func(_))));
    }

    #[test]
    fn inline_table_elem_expands() {
        let module = resolved("(module (func $f) (table funcref (elem $f $f $f)))");
        let table = module
            .fields
            .iter()
            .find_map(|f| match f {
                ModuleField::Table(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(table.limits, Some(Limits::exact(3)));
        assert!(table.inline_elem.is_none());

        let elem = module
            .fields
            .iter()
            .find_map(|f| match f {
                ModuleField::Elem(e) => Some(e),
                _ => None,
            })
            .unwrap();
        match &elem.kind {
            ElemKindField::Active { table, offset } => {
                assert_eq!(table.as_ref().and_then(|v| v.as_index()), Some(0));
                assert_eq!(
                    offset[0].kind,
                    InstrKind::Plain(Instruction::I32Const { value: 0 })
                );
            }
            other => panic!("expected active elem, got {:?}", other),
        }
        match &elem.items {
            ElemItemsField::Funcs(funcs) => {
                assert!(funcs.iter().all(|v| v.as_index() == Some(0)));
            }
            other => panic!("expected funcs, got {:?}", other),
        }
    }

    #[test]
    fn inline_memory_data_expands() {
        let module = resolved(r#"(module (memory $m (data "hello")))"#);
        let memory = module
            .fields
            .iter()
            .find_map(|f| match f {
                ModuleField::Memory(m) => Some(m),
                _ => None,
            })
            .unwrap();
        assert_eq!(memory.limits, Some(Limits::exact(1)));

        let data = module
            .fields
            .iter()
            .find_map(|f| match f {
                ModuleField::Data(d) => Some(d),
                _ => None,
            })
            .unwrap();
        assert_eq!(data.data, b"hello".to_vec());
        assert!(matches!(data.kind, DataKindField::Active { .. }));
    }

    #[test]
    fn import_after_definition_rejected() {
        let errors = resolve_err(r#"(module (func) (func (import "m" "n")))"#);
        assert!(errors
            .iter()
            .any(|e| e.kind == ErrorKind::ImportAfterNonImport));
    }

    #[test]
    fn multiple_start_rejected() {
        let errors = resolve_err("(module (func $f) (start $f) (start $f))");
        assert!(errors.iter().any(|e| e.kind == ErrorKind::MultipleStart));
    }

    #[test]
    fn resolution_is_deterministic() {
        let source = "(module
            (func $a (param i32))
            (func $b (call $a))
            (table funcref (elem $a $b)))";
        let first = resolved(source);
        let second = resolved(source);
        assert_eq!(first, second);
    }
}
