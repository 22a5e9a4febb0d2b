//! Lowering of a resolved text module to the binary data model.
//!
//! A structural translation: module items keep their order, grouped by kind
//! into sections, and instructions translate one-to-one. Every var must have
//! been resolved to an index first; a leftover name is reported rather than
//! silently dropped.

use super::ast::{
    DataKindField, ElemItemsField, ElemKindField, ImportDescField, Instr, InstrKind, ModuleField,
    TextModule, TypeUse, Var,
};
use crate::binary::instruction::{BlockType, Instruction};
use crate::binary::module::{
    DataKind, DataSegment, ElementItems, ElementKind, ElementSegment, Export, FunctionBody, Global,
    Import, ImportDesc, Module,
};
use crate::binary::types::{MemoryType, TableType, TagType, ValueType};
use crate::error::{Error, ErrorKind};

/// Converts a resolved text module into a binary [`Module`].
pub fn convert(text: &TextModule) -> Result<Module, Vec<Error>> {
    let mut cx = Converter {
        module: Module::new(),
        errors: Vec::new(),
    };
    cx.run(text);
    if cx.errors.is_empty() {
        Ok(cx.module)
    } else {
        Err(cx.errors)
    }
}

struct Converter {
    module: Module,
    errors: Vec<Error>,
}

impl Converter {
    fn run(&mut self, text: &TextModule) {
        for field in &text.fields {
            match field {
                ModuleField::Type(ty) => self.module.types.push(ty.ty.clone()),
                ModuleField::Import(import) => {
                    let desc = match &import.desc {
                        ImportDescField::Func { ty, .. } => ImportDesc::Func(self.type_index(ty)),
                        ImportDescField::Table { ty, .. } => ImportDesc::Table(*ty),
                        ImportDescField::Memory { limits, .. } => {
                            ImportDesc::Memory(MemoryType { limits: *limits })
                        }
                        ImportDescField::Global { ty, .. } => ImportDesc::Global(*ty),
                        ImportDescField::Tag { ty, .. } => ImportDesc::Tag(TagType {
                            type_idx: self.type_index(ty),
                        }),
                    };
                    self.module.imports.push(Import {
                        module: import.module.clone(),
                        name: import.field.clone(),
                        desc,
                    });
                }
                ModuleField::Func(func) => {
                    let type_idx = self.type_index(&func.ty);
                    self.module.functions.push(type_idx);
                    let locals = compress_locals(&func.locals);
                    let body = self.lower_instrs(&func.body);
                    self.module.code.push(FunctionBody { locals, body });
                }
                ModuleField::Table(table) => {
                    let limits = match table.limits {
                        Some(limits) => limits,
                        None => {
                            self.errors.push(Error::syntax(
                                table.span.start,
                                "table has no limits after resolution",
                            ));
                            continue;
                        }
                    };
                    self.module.tables.push(TableType {
                        ref_type: table.ref_type,
                        limits,
                    });
                }
                ModuleField::Memory(memory) => {
                    let limits = match memory.limits {
                        Some(limits) => limits,
                        None => {
                            self.errors.push(Error::syntax(
                                memory.span.start,
                                "memory has no limits after resolution",
                            ));
                            continue;
                        }
                    };
                    self.module.memories.push(MemoryType { limits });
                }
                ModuleField::Global(global) => {
                    let init = self.lower_instrs(&global.init);
                    self.module.globals.push(Global {
                        ty: global.ty,
                        init,
                    });
                }
                ModuleField::Tag(tag) => {
                    let type_idx = self.type_index(&tag.ty);
                    self.module.tags.push(TagType { type_idx });
                }
                ModuleField::Export(export) => {
                    let index = self.var_index(&export.item);
                    self.module.exports.push(Export {
                        name: export.name.clone(),
                        kind: export.kind,
                        index,
                    });
                }
                ModuleField::Start(start) => {
                    self.module.start = Some(self.var_index(&start.func));
                }
                ModuleField::Elem(elem) => {
                    let kind = match &elem.kind {
                        ElemKindField::Active { table, offset } => ElementKind::Active {
                            table: self.opt_var_index(table),
                            offset: self.lower_instrs(offset),
                        },
                        ElemKindField::Passive => ElementKind::Passive,
                        ElemKindField::Declared => ElementKind::Declared,
                    };
                    let items = match &elem.items {
                        ElemItemsField::Funcs(funcs) => ElementItems::Functions(
                            funcs.iter().map(|var| self.var_index(var)).collect(),
                        ),
                        ElemItemsField::Exprs(exprs) => ElementItems::Expressions(
                            exprs.iter().map(|expr| self.lower_instrs(expr)).collect(),
                        ),
                    };
                    self.module.elements.push(ElementSegment {
                        kind,
                        ref_type: elem.ref_type,
                        items,
                    });
                }
                ModuleField::Data(data) => {
                    let kind = match &data.kind {
                        DataKindField::Active { memory, offset } => DataKind::Active {
                            memory: self.opt_var_index(memory),
                            offset: self.lower_instrs(offset),
                        },
                        DataKindField::Passive => DataKind::Passive,
                    };
                    self.module.data.push(DataSegment {
                        kind,
                        init: data.data.clone(),
                    });
                }
            }
        }

        self.module.customs = text.customs.clone();

        // The data count section is required exactly when the code section
        // uses the bulk data instructions.
        let uses_data_ops = self.module.code.iter().any(|body| {
            body.body.iter().any(|instr| {
                matches!(
                    instr,
                    Instruction::MemoryInit { .. } | Instruction::DataDrop { .. }
                )
            })
        });
        if uses_data_ops {
            self.module.data_count = Some(self.module.data.len() as u32);
        }
    }

    /// The resolved type index of a type use.
    fn type_index(&mut self, ty: &TypeUse) -> u32 {
        match ty.resolved {
            Some(index) => index,
            None => {
                self.errors.push(Error::syntax(0, "unresolved type use"));
                0
            }
        }
    }

    fn var_index(&mut self, var: &Var) -> u32 {
        match var.as_index() {
            Some(index) => index,
            None => {
                self.errors.push(Error::new(
                    var.span.start,
                    ErrorKind::UnknownName(format!("{:?}", var.kind)),
                ));
                0
            }
        }
    }

    fn opt_var_index(&mut self, var: &Option<Var>) -> u32 {
        var.as_ref().map(|v| self.var_index(v)).unwrap_or(0)
    }

    fn lower_instrs(&mut self, instrs: &[Instr]) -> Vec<Instruction> {
        instrs.iter().map(|instr| self.lower_instr(instr)).collect()
    }

    fn lower_instr(&mut self, instr: &Instr) -> Instruction {
        use InstrKind::*;
        match &instr.kind {
            Plain(i) => i.clone(),
            Block { ty, .. } => Instruction::Block {
                block_type: self.block_type(ty),
            },
            Loop { ty, .. } => Instruction::Loop {
                block_type: self.block_type(ty),
            },
            If { ty, .. } => Instruction::If {
                block_type: self.block_type(ty),
            },
            Try { ty, .. } => Instruction::Try {
                block_type: self.block_type(ty),
            },
            Br(var) => Instruction::Br {
                label_idx: self.var_index(var),
            },
            BrIf(var) => Instruction::BrIf {
                label_idx: self.var_index(var),
            },
            BrTable { targets, default } => Instruction::BrTable {
                labels: targets.iter().map(|v| self.var_index(v)).collect(),
                default: self.var_index(default),
            },
            Call(var) => Instruction::Call {
                func_idx: self.var_index(var),
            },
            ReturnCall(var) => Instruction::ReturnCall {
                func_idx: self.var_index(var),
            },
            CallIndirect { table, ty } => Instruction::CallIndirect {
                type_idx: self.type_index(ty),
                table_idx: self.opt_var_index(table),
            },
            ReturnCallIndirect { table, ty } => Instruction::ReturnCallIndirect {
                type_idx: self.type_index(ty),
                table_idx: self.opt_var_index(table),
            },
            RefFunc(var) => Instruction::RefFunc {
                func_idx: self.var_index(var),
            },
            LocalGet(var) => Instruction::LocalGet {
                local_idx: self.var_index(var),
            },
            LocalSet(var) => Instruction::LocalSet {
                local_idx: self.var_index(var),
            },
            LocalTee(var) => Instruction::LocalTee {
                local_idx: self.var_index(var),
            },
            GlobalGet(var) => Instruction::GlobalGet {
                global_idx: self.var_index(var),
            },
            GlobalSet(var) => Instruction::GlobalSet {
                global_idx: self.var_index(var),
            },
            TableGet(var) => Instruction::TableGet {
                table_idx: self.var_index(var),
            },
            TableSet(var) => Instruction::TableSet {
                table_idx: self.var_index(var),
            },
            TableSize(var) => Instruction::TableSize {
                table_idx: self.var_index(var),
            },
            TableGrow(var) => Instruction::TableGrow {
                table_idx: self.var_index(var),
            },
            TableFill(var) => Instruction::TableFill {
                table_idx: self.var_index(var),
            },
            TableCopy { dst, src } => Instruction::TableCopy {
                dst_table: self.var_index(dst),
                src_table: self.var_index(src),
            },
            TableInit { elem, table } => Instruction::TableInit {
                elem_idx: self.var_index(elem),
                table_idx: self.opt_var_index(table),
            },
            ElemDrop(var) => Instruction::ElemDrop {
                elem_idx: self.var_index(var),
            },
            MemorySize(var) => Instruction::MemorySize {
                mem_idx: self.opt_var_index(var),
            },
            MemoryGrow(var) => Instruction::MemoryGrow {
                mem_idx: self.opt_var_index(var),
            },
            MemoryFill(var) => Instruction::MemoryFill {
                mem_idx: self.opt_var_index(var),
            },
            MemoryCopy { dst, src } => Instruction::MemoryCopy {
                dst_mem: self.opt_var_index(dst),
                src_mem: self.opt_var_index(src),
            },
            MemoryInit { data, memory } => Instruction::MemoryInit {
                data_idx: self.var_index(data),
                mem_idx: self.opt_var_index(memory),
            },
            DataDrop(var) => Instruction::DataDrop {
                data_idx: self.var_index(var),
            },
            Throw(var) => Instruction::Throw {
                tag_idx: self.var_index(var),
            },
            Rethrow(var) => Instruction::Rethrow {
                depth: self.var_index(var),
            },
            Catch(var) => Instruction::Catch {
                tag_idx: self.var_index(var),
            },
            Delegate(var) => Instruction::Delegate {
                depth: self.var_index(var),
            },
        }
    }

    fn block_type(&mut self, ty: &TypeUse) -> BlockType {
        if let Some(index) = ty.resolved {
            BlockType::Func(index)
        } else if let [result] = ty.results.as_slice() {
            BlockType::Value(*result)
        } else {
            BlockType::Empty
        }
    }
}

/// Compresses a local list into the binary `(count, type)` run-length form.
fn compress_locals(locals: &[(Option<String>, ValueType)]) -> Vec<(u32, ValueType)> {
    let mut compressed: Vec<(u32, ValueType)> = Vec::new();
    for (_, vt) in locals {
        match compressed.last_mut() {
            Some((count, last)) if last == vt => *count += 1,
            _ => compressed.push((1, *vt)),
        }
    }
    compressed
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::super::resolver::resolve;
    use super::*;
    use crate::binary::types::{FunctionType, Limits, RefType};

    fn compile(source: &str) -> Module {
        let mut text = parse(source).expect("parse failed");
        resolve(&mut text).expect("resolve failed");
        convert(&text).expect("convert failed")
    }

    #[test]
    fn minimal_function() {
        let module = compile("(module (func (result i32) i32.const 42))");
        assert_eq!(module.types, vec![FunctionType::new(vec![], vec![ValueType::I32])]);
        assert_eq!(module.functions, vec![0]);
        assert_eq!(
            module.code[0].body,
            vec![Instruction::I32Const { value: 42 }]
        );
    }

    #[test]
    fn locals_are_compressed() {
        let module = compile(
            "(module (func (local i32) (local i32) (local i64) (local i32)))",
        );
        assert_eq!(
            module.code[0].locals,
            vec![
                (2, ValueType::I32),
                (1, ValueType::I64),
                (1, ValueType::I32)
            ]
        );
    }

    #[test]
    fn imports_and_exports() {
        let module = compile(
            r#"(module
                (import "env" "f" (func $f (param i32)))
                (func $g (export "g") (call $f (i32.const 1))))"#,
        );
        assert_eq!(module.imports.len(), 1);
        assert_eq!(module.imports[0].module, "env");
        assert!(matches!(module.imports[0].desc, ImportDesc::Func(0)));
        assert_eq!(module.exports.len(), 1);
        assert_eq!(module.exports[0].name, "g");
        assert_eq!(module.exports[0].index, 1);
        // call $f resolved through the import-inclusive function space
        assert_eq!(
            module.code[0].body[1],
            Instruction::Call { func_idx: 0 }
        );
    }

    #[test]
    fn inline_table_element_expansion() {
        let module = compile("(module (func $f) (table funcref (elem $f $f $f)))");
        assert_eq!(
            module.tables[0],
            TableType {
                ref_type: RefType::Func,
                limits: Limits::exact(3)
            }
        );
        assert_eq!(module.elements.len(), 1);
        assert_eq!(
            module.elements[0].kind,
            ElementKind::Active {
                table: 0,
                offset: vec![Instruction::I32Const { value: 0 }]
            }
        );
        assert_eq!(module.elements[0].items, ElementItems::Functions(vec![0, 0, 0]));
    }

    #[test]
    fn block_types() {
        let module = compile(
            "(module (func
                (block (result i32) (i32.const 1))
                drop
                (block nop)))",
        );
        let body = &module.code[0].body;
        assert_eq!(
            body[0],
            Instruction::Block {
                block_type: BlockType::Value(ValueType::I32)
            }
        );
        assert!(matches!(
            body[4],
            Instruction::Block {
                block_type: BlockType::Empty
            }
        ));
    }

    #[test]
    fn multi_value_block_gets_type_index() {
        let module = compile(
            "(module (func
                (block (param) (result i32 i32)
                    (i32.const 1) (i32.const 2))
                drop drop))",
        );
        let body = &module.code[0].body;
        assert!(matches!(
            body[0],
            Instruction::Block {
                block_type: BlockType::Func(_)
            }
        ));
        // The implicit block type was appended to the type section.
        assert!(module
            .types
            .iter()
            .any(|ty| ty.results == vec![ValueType::I32, ValueType::I32]));
    }

    #[test]
    fn data_count_emitted_for_bulk_data_ops() {
        let module = compile(
            r#"(module
                (memory 1)
                (data $d "xyz")
                (func (memory.init $d (i32.const 0) (i32.const 0) (i32.const 3))))"#,
        );
        assert_eq!(module.data_count, Some(1));

        let plain = compile("(module (memory 1) (data (i32.const 0) \"xyz\"))");
        assert_eq!(plain.data_count, None);
    }

    #[test]
    fn start_function() {
        let module = compile("(module (func $main) (start $main))");
        assert_eq!(module.start, Some(0));
    }
}
