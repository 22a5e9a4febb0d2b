//! Structural validation of binary modules.
//!
//! This pass checks everything that can be decided without running the full
//! typing algorithm: every index is in range for its space, constant
//! initialisers stay inside the constant-expression subgrammar, statically
//! resolvable segment offsets fit their declared limits, and the single
//! table/memory rules hold at the requested feature level. Errors go into
//! the same channel the readers use.

use crate::binary::encoding::PAGE_SIZE;
use crate::binary::instruction::{BlockType, Instruction};
use crate::binary::module::{
    DataKind, ElementItems, ElementKind, ExternalKind, ImportDesc, Module,
};
use crate::binary::types::{Limits, TableType, ValueType};
use crate::error::{Error, ErrorKind};
use crate::features::{Feature, Features};
use std::collections::HashSet;

/// Validates a module against a feature set.
pub fn validate(module: &Module, features: &Features) -> Result<(), Vec<Error>> {
    let mut v = Validator {
        features,
        errors: Vec::new(),
    };
    v.run(module);
    if v.errors.is_empty() {
        Ok(())
    } else {
        Err(v.errors)
    }
}

struct Validator<'a> {
    features: &'a Features,
    errors: Vec<Error>,
}

impl<'a> Validator<'a> {
    fn error(&mut self, kind: ErrorKind) {
        self.errors.push(Error::new(0, kind));
    }

    fn check_index(&mut self, space: &'static str, index: u32, count: u32) {
        if index >= count {
            self.error(ErrorKind::IndexOutOfRange {
                space,
                index,
                max: count.saturating_sub(1),
            });
        }
    }

    fn run(&mut self, module: &Module) {
        self.check_types(module);
        self.check_imports(module);
        self.check_functions(module);
        self.check_tables_and_memories(module);
        self.check_globals(module);
        self.check_tags(module);
        self.check_exports(module);
        self.check_start(module);
        self.check_elements(module);
        self.check_data(module);
        self.check_code(module);
    }

    fn check_types(&mut self, module: &Module) {
        if !self.features.multi_value {
            for ty in &module.types {
                if ty.results.len() > 1 {
                    self.error(ErrorKind::FeatureDisabled(Feature::MultiValue));
                }
            }
        }
    }

    fn check_imports(&mut self, module: &Module) {
        let type_count = module.types.len() as u32;
        for import in &module.imports {
            match &import.desc {
                ImportDesc::Func(type_idx) => self.check_index("type", *type_idx, type_count),
                ImportDesc::Global(gt) => {
                    if gt.mutable && !self.features.mutable_globals {
                        self.error(ErrorKind::FeatureDisabled(Feature::MutableGlobals));
                    }
                }
                ImportDesc::Table(tt) => self.check_limits(&tt.limits, "table"),
                ImportDesc::Memory(mt) => self.check_limits(&mt.limits, "memory"),
                ImportDesc::Tag(tag) => self.check_index("type", tag.type_idx, type_count),
            }
        }
    }

    fn check_limits(&mut self, limits: &Limits, context: &'static str) {
        if let Some(max) = limits.max {
            if limits.min > max {
                self.error(ErrorKind::Validation(format!(
                    "{} limits minimum {} exceeds maximum {}",
                    context, limits.min, max
                )));
            }
        }
        if limits.shared && limits.max.is_none() {
            self.error(ErrorKind::Validation(format!(
                "shared {} requires a maximum",
                context
            )));
        }
    }

    fn check_functions(&mut self, module: &Module) {
        let type_count = module.types.len() as u32;
        for type_idx in &module.functions {
            self.check_index("type", *type_idx, type_count);
        }
        if module.functions.len() != module.code.len() {
            self.error(ErrorKind::Validation(format!(
                "function count mismatch, expected {}, got {}",
                module.functions.len(),
                module.code.len()
            )));
        }
    }

    fn check_tables_and_memories(&mut self, module: &Module) {
        if module.num_tables() > 1 && !self.features.reference_types {
            self.error(ErrorKind::FeatureDisabled(Feature::ReferenceTypes));
        }
        if module.num_memories() > 1 && !self.features.multi_memory {
            self.error(ErrorKind::FeatureDisabled(Feature::MultiMemory));
        }
        for table in &module.tables {
            self.check_limits(&table.limits, "table");
        }
        for memory in &module.memories {
            self.check_limits(&memory.limits, "memory");
        }
    }

    fn check_globals(&mut self, module: &Module) {
        // Constant initialisers may only refer to imported globals.
        let imported_globals = module
            .imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Global(_)))
            .count() as u32;
        for global in &module.globals {
            self.check_const_expr(
                module,
                &global.init,
                Some(global.ty.value_type),
                imported_globals,
            );
        }
    }

    fn check_tags(&mut self, module: &Module) {
        let type_count = module.types.len() as u32;
        for tag in &module.tags {
            self.check_index("type", tag.type_idx, type_count);
            if let Some(ty) = module.types.get(tag.type_idx as usize) {
                if !ty.results.is_empty() {
                    self.error(ErrorKind::Validation(
                        "tag type must not have results".to_string(),
                    ));
                }
            }
        }
    }

    fn check_exports(&mut self, module: &Module) {
        let mut seen = HashSet::new();
        for export in &module.exports {
            if !seen.insert(export.name.as_str()) {
                self.error(ErrorKind::Validation(format!(
                    "duplicate export name: {}",
                    export.name
                )));
            }
            let (space, count) = match export.kind {
                ExternalKind::Func => ("function", module.num_funcs()),
                ExternalKind::Table => ("table", module.num_tables()),
                ExternalKind::Memory => ("memory", module.num_memories()),
                ExternalKind::Global => ("global", module.num_globals()),
                ExternalKind::Tag => ("tag", module.num_tags()),
            };
            self.check_index(space, export.index, count);
        }
    }

    fn check_start(&mut self, module: &Module) {
        let Some(start) = module.start else { return };
        self.check_index("function", start, module.num_funcs());
        if let Some(ty) = module.func_type(start) {
            if !ty.params.is_empty() || !ty.results.is_empty() {
                self.error(ErrorKind::Validation(
                    "start function must have type () -> ()".to_string(),
                ));
            }
        }
    }

    fn check_elements(&mut self, module: &Module) {
        let func_count = module.num_funcs();
        let table_count = module.num_tables();
        for segment in &module.elements {
            if let ElementKind::Active { table, offset } = &segment.kind {
                self.check_index("table", *table, table_count);
                self.check_const_expr(module, offset, Some(ValueType::I32), u32::MAX);
                // Statically resolvable offsets must fit the table minimum.
                if let (Some(base), Some(table_type)) =
                    (const_i32_offset(offset), table_type(module, *table))
                {
                    let end = u64::from(base) + segment.items.len() as u64;
                    if end > u64::from(table_type.limits.min) {
                        self.error(ErrorKind::Validation(format!(
                            "element segment [{}..{}) does not fit table of size {}",
                            base, end, table_type.limits.min
                        )));
                    }
                }
            }
            match &segment.items {
                ElementItems::Functions(funcs) => {
                    for func_idx in funcs {
                        self.check_index("function", *func_idx, func_count);
                    }
                }
                ElementItems::Expressions(exprs) => {
                    for expr in exprs {
                        self.check_const_expr(
                            module,
                            expr,
                            Some(segment.ref_type.to_value_type()),
                            u32::MAX,
                        );
                    }
                }
            }
        }
    }

    fn check_data(&mut self, module: &Module) {
        let memory_count = module.num_memories();
        for segment in &module.data {
            if let DataKind::Active { memory, offset } = &segment.kind {
                self.check_index("memory", *memory, memory_count);
                self.check_const_expr(module, offset, Some(ValueType::I32), u32::MAX);
                if let (Some(base), Some(limits)) =
                    (const_i32_offset(offset), memory_limits(module, *memory))
                {
                    let end = u64::from(base) + segment.init.len() as u64;
                    if end > u64::from(limits.min) * u64::from(PAGE_SIZE) {
                        self.error(ErrorKind::Validation(format!(
                            "data segment [{}..{}) does not fit memory of {} pages",
                            base, end, limits.min
                        )));
                    }
                }
            }
        }
        if let Some(count) = module.data_count {
            if count as usize != module.data.len() {
                self.error(ErrorKind::Validation(format!(
                    "data count section says {}, data section has {}",
                    count,
                    module.data.len()
                )));
            }
        }
    }

    /// The constant-expression subgrammar: constants, `global.get` of an
    /// imported global, and `ref.null`/`ref.func`.
    fn check_const_expr(
        &mut self,
        module: &Module,
        expr: &[Instruction],
        expected: Option<ValueType>,
        allowed_globals: u32,
    ) {
        for instr in expr {
            if !instr.is_const() {
                self.error(ErrorKind::Validation(format!(
                    "non-constant instruction in constant expression: {:?}",
                    instr
                )));
                return;
            }
            if let Instruction::GlobalGet { global_idx } = instr {
                self.check_index("global", *global_idx, allowed_globals.min(module.num_globals()));
            }
            if let Instruction::RefFunc { func_idx } = instr {
                self.check_index("function", *func_idx, module.num_funcs());
            }
        }
        // A single-instruction expression must produce the expected type.
        if let (Some(expected), [only]) = (expected, expr) {
            let produced = match only {
                Instruction::I32Const { .. } => Some(ValueType::I32),
                Instruction::I64Const { .. } => Some(ValueType::I64),
                Instruction::F32Const { .. } => Some(ValueType::F32),
                Instruction::F64Const { .. } => Some(ValueType::F64),
                Instruction::RefNull { ref_type } => Some(*ref_type),
                Instruction::RefFunc { .. } => Some(ValueType::FuncRef),
                _ => None,
            };
            if let Some(produced) = produced {
                if produced != expected {
                    self.error(ErrorKind::Validation(format!(
                        "constant expression has type {}, expected {}",
                        produced, expected
                    )));
                }
            }
        }
    }

    /// Walks every function body checking index immediates against their
    /// spaces. Full type checking is the published validation algorithm and
    /// lives outside this pass.
    fn check_code(&mut self, module: &Module) {
        let func_count = module.num_funcs();
        let table_count = module.num_tables();
        let memory_count = module.num_memories();
        let global_count = module.num_globals();
        let tag_count = module.num_tags();
        let type_count = module.types.len() as u32;
        let elem_count = module.elements.len() as u32;
        let data_count = module.data.len() as u32;

        let uses_data_ops = module.code.iter().any(|body| {
            body.body.iter().any(|instr| {
                matches!(
                    instr,
                    Instruction::MemoryInit { .. } | Instruction::DataDrop { .. }
                )
            })
        });
        if uses_data_ops && module.data_count.is_none() {
            self.error(ErrorKind::Validation(
                "memory.init and data.drop require a data count section".to_string(),
            ));
        }

        for (func_offset, body) in module.code.iter().enumerate() {
            let params = module
                .functions
                .get(func_offset)
                .and_then(|idx| module.types.get(*idx as usize))
                .map(|ty| ty.params.len() as u32)
                .unwrap_or(0);
            let local_count = params + body.local_count();

            for instr in &body.body {
                match instr {
                    Instruction::Call { func_idx }
                    | Instruction::ReturnCall { func_idx }
                    | Instruction::RefFunc { func_idx } => {
                        self.check_index("function", *func_idx, func_count)
                    }
                    Instruction::CallIndirect { type_idx, table_idx }
                    | Instruction::ReturnCallIndirect { type_idx, table_idx } => {
                        self.check_index("type", *type_idx, type_count);
                        self.check_index("table", *table_idx, table_count);
                    }
                    Instruction::LocalGet { local_idx }
                    | Instruction::LocalSet { local_idx }
                    | Instruction::LocalTee { local_idx } => {
                        self.check_index("local", *local_idx, local_count)
                    }
                    Instruction::GlobalGet { global_idx }
                    | Instruction::GlobalSet { global_idx } => {
                        self.check_index("global", *global_idx, global_count)
                    }
                    Instruction::TableGet { table_idx }
                    | Instruction::TableSet { table_idx }
                    | Instruction::TableSize { table_idx }
                    | Instruction::TableGrow { table_idx }
                    | Instruction::TableFill { table_idx } => {
                        self.check_index("table", *table_idx, table_count)
                    }
                    Instruction::TableCopy { dst_table, src_table } => {
                        self.check_index("table", *dst_table, table_count);
                        self.check_index("table", *src_table, table_count);
                    }
                    Instruction::TableInit { elem_idx, table_idx } => {
                        self.check_index("element segment", *elem_idx, elem_count);
                        self.check_index("table", *table_idx, table_count);
                    }
                    Instruction::ElemDrop { elem_idx } => {
                        self.check_index("element segment", *elem_idx, elem_count)
                    }
                    Instruction::MemoryInit { data_idx, mem_idx } => {
                        self.check_index("data segment", *data_idx, data_count);
                        self.check_index("memory", *mem_idx, memory_count);
                    }
                    Instruction::DataDrop { data_idx } => {
                        self.check_index("data segment", *data_idx, data_count)
                    }
                    Instruction::MemorySize { mem_idx }
                    | Instruction::MemoryGrow { mem_idx }
                    | Instruction::MemoryFill { mem_idx } => {
                        self.check_index("memory", *mem_idx, memory_count)
                    }
                    Instruction::MemoryCopy { dst_mem, src_mem } => {
                        self.check_index("memory", *dst_mem, memory_count);
                        self.check_index("memory", *src_mem, memory_count);
                    }
                    Instruction::Throw { tag_idx } | Instruction::Catch { tag_idx } => {
                        self.check_index("tag", *tag_idx, tag_count)
                    }
                    Instruction::Block { block_type }
                    | Instruction::Loop { block_type }
                    | Instruction::If { block_type }
                    | Instruction::Try { block_type } => {
                        if let BlockType::Func(idx) = block_type {
                            self.check_index("type", *idx, type_count);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// The table in the full index space, imports first.
fn table_type(module: &Module, index: u32) -> Option<TableType> {
    let mut remaining = index;
    for import in &module.imports {
        if let ImportDesc::Table(tt) = &import.desc {
            if remaining == 0 {
                return Some(*tt);
            }
            remaining -= 1;
        }
    }
    module.tables.get(remaining as usize).copied()
}

/// The memory limits in the full index space, imports first.
fn memory_limits(module: &Module, index: u32) -> Option<Limits> {
    let mut remaining = index;
    for import in &module.imports {
        if let ImportDesc::Memory(mt) = &import.desc {
            if remaining == 0 {
                return Some(mt.limits);
            }
            remaining -= 1;
        }
    }
    module.memories.get(remaining as usize).map(|m| m.limits)
}

/// Extracts the base of a statically resolvable `i32.const` offset.
fn const_i32_offset(expr: &[Instruction]) -> Option<u32> {
    match expr {
        [Instruction::I32Const { value }] => Some(*value as u32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text;

    fn validate_text(source: &str, features: &Features) -> Result<(), Vec<Error>> {
        let module = text::to_binary(source).expect("pipeline failed");
        validate(&module, features)
    }

    #[test]
    fn valid_module_passes() {
        validate_text(
            r#"(module
                (memory 1)
                (func (export "f") (result i32) i32.const 1))"#,
            &Features::mvp(),
        )
        .unwrap();
    }

    #[test]
    fn zero_page_memory_accepted() {
        validate_text("(module (memory 0))", &Features::mvp()).unwrap();
    }

    #[test]
    fn limits_min_above_max_rejected() {
        let errors = validate_text("(module (memory 2 1))", &Features::mvp()).unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));
    }

    #[test]
    fn two_memories_require_multi_memory() {
        let errors =
            validate_text("(module (memory 1) (memory 1))", &Features::mvp()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ErrorKind::FeatureDisabled(Feature::MultiMemory)));
        validate_text(
            "(module (memory 1) (memory 1))",
            &Features::mvp().enable_multi_memory(),
        )
        .unwrap();
    }

    #[test]
    fn duplicate_export_names_rejected() {
        let errors = validate_text(
            r#"(module (func) (export "f" (func 0)) (export "f" (func 0)))"#,
            &Features::mvp(),
        )
        .unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));
    }

    #[test]
    fn start_signature_checked() {
        let errors = validate_text(
            "(module (func $s (result i32) i32.const 1) (start $s))",
            &Features::mvp(),
        )
        .unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));
    }

    #[test]
    fn data_segment_must_fit_memory() {
        let errors = validate_text(
            r#"(module (memory 1) (data (i32.const 65535) "too long"))"#,
            &Features::mvp(),
        )
        .unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));

        validate_text(
            r#"(module (memory 1) (data (i32.const 65528) "8 bytes!"))"#,
            &Features::mvp(),
        )
        .unwrap();
    }

    #[test]
    fn element_segment_must_fit_table() {
        let errors = validate_text(
            "(module (func $f) (table 1 funcref) (elem (i32.const 0) func $f $f))",
            &Features::mvp(),
        )
        .unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));
    }

    #[test]
    fn non_constant_initialiser_rejected() {
        let errors = validate_text(
            "(module (global i32 (i32.add (i32.const 1) (i32.const 2))))",
            &Features::mvp(),
        )
        .unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));
    }

    #[test]
    fn global_initialiser_type_checked() {
        let errors =
            validate_text("(module (global i32 (i64.const 1)))", &Features::mvp()).unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));
    }

    #[test]
    fn out_of_range_call_rejected() {
        // Build the module directly; the resolver would catch this in text.
        let mut module = text::to_binary("(module (func))").unwrap();
        module.code[0].body = vec![Instruction::Call { func_idx: 9 }];
        let errors = validate(&module, &Features::mvp()).unwrap_err();
        assert!(matches!(
            errors[0].kind,
            ErrorKind::IndexOutOfRange {
                space: "function",
                index: 9,
                ..
            }
        ));
    }

    #[test]
    fn local_indices_include_params() {
        let mut module = text::to_binary("(module (func (param i32) (local i64)))").unwrap();
        module.code[0].body = vec![Instruction::LocalGet { local_idx: 1 }];
        validate(&module, &Features::mvp()).unwrap();
        module.code[0].body = vec![Instruction::LocalGet { local_idx: 2 }];
        assert!(validate(&module, &Features::mvp()).is_err());
    }
}
