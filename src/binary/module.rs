//! The binary module data model.
//!
//! A [`Module`] holds fully decoded section payloads in canonical order. It is
//! produced immutably by the binary reader or the text converter and consumed
//! by the validator and the writer.

use super::instruction::Instruction;
use super::types::{FunctionType, GlobalType, MemoryType, TableType, TagType, ValueType};
use std::fmt;

/// What kind of entity an export or import descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Func,
    Table,
    Memory,
    Global,
    Tag,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExternalKind::Func => "func",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
            ExternalKind::Tag => "tag",
        };
        write!(f, "{}", name)
    }
}

/// The typed payload of an import.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
    Tag(TagType),
}

impl ImportDesc {
    pub fn kind(&self) -> ExternalKind {
        match self {
            ImportDesc::Func(_) => ExternalKind::Func,
            ImportDesc::Table(_) => ExternalKind::Table,
            ImportDesc::Memory(_) => ExternalKind::Memory,
            ImportDesc::Global(_) => ExternalKind::Global,
            ImportDesc::Tag(_) => ExternalKind::Tag,
        }
    }
}

/// An imported entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} ({})", self.module, self.name, self.desc.kind())
    }
}

/// An exported entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub index: u32,
}

/// A global definition: its type and constant initialiser.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: Vec<Instruction>,
}

/// A function body: compressed local declarations plus the instruction
/// sequence, stored without the trailing `end` byte.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionBody {
    pub locals: Vec<(u32, ValueType)>,
    pub body: Vec<Instruction>,
}

impl FunctionBody {
    /// Total number of locals, not counting parameters.
    pub fn local_count(&self) -> u32 {
        self.locals.iter().map(|(n, _)| n).sum()
    }
}

/// How an element segment is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// Copied into `table` at `offset` during instantiation.
    Active { table: u32, offset: Vec<Instruction> },
    /// Available to `table.init` only.
    Passive,
    /// Declares functions for `ref.func` without materialising them.
    Declared,
}

/// Element segment initialisers: plain function indices or full expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementItems {
    Functions(Vec<u32>),
    Expressions(Vec<Vec<Instruction>>),
}

impl ElementItems {
    pub fn len(&self) -> usize {
        match self {
            ElementItems::Functions(items) => items.len(),
            ElementItems::Expressions(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A table initialisation segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSegment {
    pub kind: ElementKind,
    pub ref_type: super::types::RefType,
    pub items: ElementItems,
}

/// How a data segment is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum DataKind {
    Active { memory: u32, offset: Vec<Instruction> },
    Passive,
}

/// A memory initialisation segment.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub kind: DataKind,
    pub init: Vec<u8>,
}

/// Anchors a custom section relative to the standard sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomAnchor {
    First,
    Type,
    Import,
    Func,
    Table,
    Memory,
    Tag,
    Global,
    Export,
    Start,
    Elem,
    DataCount,
    Code,
    Data,
    Last,
}

/// Whether a custom section sits before or after its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOrder {
    Before,
    After,
}

/// A full placement hint for a custom section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomPlace {
    pub order: PlaceOrder,
    pub anchor: CustomAnchor,
}

impl Default for CustomPlace {
    fn default() -> Self {
        CustomPlace {
            order: PlaceOrder::After,
            anchor: CustomAnchor::Last,
        }
    }
}

/// A custom section: name, raw payload, and where it goes in the binary.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
    pub place: CustomPlace,
}

/// A fully decoded module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    /// Type index of each defined function, parallel to `code`.
    pub functions: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub tags: Vec<TagType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    /// Present when the data count section was read or must be written.
    pub data_count: Option<u32>,
    pub code: Vec<FunctionBody>,
    pub data: Vec<DataSegment>,
    pub customs: Vec<CustomSection>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    fn import_count(&self, kind: ExternalKind) -> u32 {
        self.imports.iter().filter(|i| i.desc.kind() == kind).count() as u32
    }

    /// Total functions in the index space, imports included.
    pub fn num_funcs(&self) -> u32 {
        self.import_count(ExternalKind::Func) + self.functions.len() as u32
    }

    /// Total tables in the index space, imports included.
    pub fn num_tables(&self) -> u32 {
        self.import_count(ExternalKind::Table) + self.tables.len() as u32
    }

    /// Total memories in the index space, imports included.
    pub fn num_memories(&self) -> u32 {
        self.import_count(ExternalKind::Memory) + self.memories.len() as u32
    }

    /// Total globals in the index space, imports included.
    pub fn num_globals(&self) -> u32 {
        self.import_count(ExternalKind::Global) + self.globals.len() as u32
    }

    /// Total tags in the index space, imports included.
    pub fn num_tags(&self) -> u32 {
        self.import_count(ExternalKind::Tag) + self.tags.len() as u32
    }

    /// The signature of a function in the full index space, if resolvable.
    pub fn func_type(&self, func_idx: u32) -> Option<&FunctionType> {
        let mut remaining = func_idx;
        for import in &self.imports {
            if let ImportDesc::Func(type_idx) = import.desc {
                if remaining == 0 {
                    return self.types.get(type_idx as usize);
                }
                remaining -= 1;
            }
        }
        let type_idx = *self.functions.get(remaining as usize)?;
        self.types.get(type_idx as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::types::Limits;

    #[test]
    fn index_spaces_include_imports() {
        let mut module = Module::new();
        module.imports.push(Import {
            module: "env".to_string(),
            name: "f".to_string(),
            desc: ImportDesc::Func(0),
        });
        module.imports.push(Import {
            module: "env".to_string(),
            name: "m".to_string(),
            desc: ImportDesc::Memory(MemoryType {
                limits: Limits::new(1, None),
            }),
        });
        module.functions.push(0);
        assert_eq!(module.num_funcs(), 2);
        assert_eq!(module.num_memories(), 1);
        assert_eq!(module.num_tables(), 0);
    }

    #[test]
    fn func_type_spans_imports_and_definitions() {
        let mut module = Module::new();
        module.types.push(FunctionType::new(vec![ValueType::I32], vec![]));
        module.types.push(FunctionType::new(vec![], vec![ValueType::I64]));
        module.imports.push(Import {
            module: "env".to_string(),
            name: "f".to_string(),
            desc: ImportDesc::Func(1),
        });
        module.functions.push(0);
        let imported = FunctionType::new(vec![], vec![ValueType::I64]);
        let defined = FunctionType::new(vec![ValueType::I32], vec![]);
        assert_eq!(module.func_type(0), Some(&imported));
        assert_eq!(module.func_type(1), Some(&defined));
        assert_eq!(module.func_type(2), None);
    }

    #[test]
    fn default_custom_place_is_after_last() {
        let place = CustomPlace::default();
        assert_eq!(place.order, PlaceOrder::After);
        assert_eq!(place.anchor, CustomAnchor::Last);
    }
}
