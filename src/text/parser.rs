//! Recursive-descent parser for the text format.
//!
//! Each non-terminal reads its opening token, its payload, and a closing
//! parenthesis, with spans running from the opener to the closer. Folded
//! expressions are flattened on the fly: `(i32.add (a) (b))` emits the
//! operands first and the head instruction last, and `(if c (then t)
//! (else e))` emits `c; if; t; else; e; end`.
//!
//! The parser checks structural properties it can see locally, such as
//! `end`/`else` labels matching their opening label. Everything involving
//! index spaces is left to the resolver.

use super::ast::{
    DataField, DataKindField, ElemField, ElemItemsField, ElemKindField, ExportField, FuncField,
    GlobalField, ImportDescField, ImportField, Instr, InstrKind, MemoryField, ModuleField,
    StartField, TableField, TagField, TextModule, TypeField, TypeUse, Var,
};
use super::token::{IntLit, Span, Token, TokenKind};
use super::tokenizer::{Annotation, Tokenizer};
use crate::binary::instruction::{Instruction, MemArg};
use crate::binary::module::{
    CustomAnchor, CustomPlace, CustomSection, ExternalKind, PlaceOrder,
};
use crate::binary::simd::{simd_op_by_mnemonic, SimdImm, SimdImmKind, SimdOp};
use crate::binary::atomics::atomic_op_by_mnemonic;
use crate::binary::types::{GlobalType, Limits, RefType, TableType, ValueType};
use crate::error::{Error, ErrorKind};

/// Parses text source into a [`TextModule`].
///
/// Accepts both the `(module ...)` form and a bare sequence of fields.
pub fn parse(source: &str) -> Result<TextModule, Error> {
    Parser::new(source).parse_module()
}

struct Parser<'a> {
    tok: Tokenizer<'a>,
    /// Labels of open block instructions, innermost last.
    open_labels: Vec<Option<String>>,
    /// Span of the most recent `offset=`/`align=` keyword, for diagnostics.
    last_memarg_span: Span,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Parser {
            tok: Tokenizer::new(source),
            open_labels: Vec::new(),
            last_memarg_span: Span::ZERO,
        }
    }

    fn err(&self, span: Span, message: impl Into<String>) -> Error {
        Error::syntax(span.start, message)
    }

    fn expect_lparen(&mut self) -> Result<Span, Error> {
        match self.tok.match_lparen()? {
            Some(span) => Ok(span),
            None => {
                let token = self.tok.read()?;
                Err(self.err(token.span, format!("expected '(', found {}", token.kind)))
            }
        }
    }

    fn expect_rparen(&mut self) -> Result<Span, Error> {
        match self.tok.match_rparen()? {
            Some(span) => Ok(span),
            None => {
                let token = self.tok.read()?;
                Err(self.err(token.span, format!("expected ')', found {}", token.kind)))
            }
        }
    }

    fn expect_keyword(&mut self) -> Result<(String, Span), Error> {
        let token = self.tok.read()?;
        match token.kind {
            TokenKind::Keyword(name) => Ok((name, token.span)),
            other => Err(self.err(token.span, format!("expected keyword, found {}", other))),
        }
    }

    fn expect_string(&mut self) -> Result<(Vec<u8>, Span), Error> {
        let token = self.tok.read()?;
        match token.kind {
            TokenKind::String(bytes) => Ok((bytes, token.span)),
            other => Err(self.err(token.span, format!("expected string, found {}", other))),
        }
    }

    fn expect_utf8_string(&mut self) -> Result<(String, Span), Error> {
        let (bytes, span) = self.expect_string()?;
        String::from_utf8(bytes)
            .map(|s| (s, span))
            .map_err(|_| self.err(span, "string is not valid UTF-8"))
    }

    fn expect_u32(&mut self) -> Result<(u32, Span), Error> {
        let token = self.tok.read()?;
        match token.kind {
            TokenKind::Integer(lit) => lit
                .to_u32()
                .map(|v| (v, token.span))
                .ok_or_else(|| self.err(token.span, "integer out of range")),
            other => Err(self.err(token.span, format!("expected integer, found {}", other))),
        }
    }

    fn peek_is_var(&mut self) -> Result<bool, Error> {
        Ok(matches!(
            self.tok.peek(0)?.kind,
            TokenKind::Integer(_) | TokenKind::Id(_)
        ))
    }

    fn parse_var(&mut self) -> Result<Var, Error> {
        let token = self.tok.read()?;
        match token.kind {
            TokenKind::Integer(lit) => lit
                .to_u32()
                .map(|v| Var::index(token.span, v))
                .ok_or_else(|| self.err(token.span, "index out of range")),
            TokenKind::Id(name) => Ok(Var::name(token.span, name)),
            other => Err(self.err(token.span, format!("expected index or name, found {}", other))),
        }
    }

    fn parse_opt_var(&mut self) -> Result<Option<Var>, Error> {
        if self.peek_is_var()? {
            Ok(Some(self.parse_var()?))
        } else {
            Ok(None)
        }
    }
}

// ===========================================================================
// Module and fields
// ===========================================================================

impl<'a> Parser<'a> {
    fn parse_module(&mut self) -> Result<TextModule, Error> {
        let mut module = TextModule::default();

        if let Some(span) = self.tok.match_lpar("module")? {
            module.span = span;
            module.name = self.tok.match_id()?.map(|(name, _)| name);
            while self.tok.match_rparen()?.is_none() {
                let field = self.parse_field()?;
                module.fields.push(field);
            }
            if !self.tok.at_eof()? {
                let token = self.tok.read()?;
                return Err(self.err(token.span, "unexpected token after module"));
            }
        } else {
            while !self.tok.at_eof()? {
                let field = self.parse_field()?;
                module.fields.push(field);
            }
        }

        for annotation in self.tok.take_annotations() {
            if annotation.name == "custom" {
                module.customs.push(parse_custom_annotation(&annotation)?);
            }
        }

        Ok(module)
    }

    fn parse_field(&mut self) -> Result<ModuleField, Error> {
        let span = self.expect_lparen()?;
        let (keyword, kw_span) = self.expect_keyword()?;
        match keyword.as_str() {
            "type" => self.parse_type_field(span),
            "import" => self.parse_import_field(span),
            "func" => self.parse_func_field(span),
            "table" => self.parse_table_field(span),
            "memory" => self.parse_memory_field(span),
            "global" => self.parse_global_field(span),
            "tag" => self.parse_tag_field(span),
            "export" => self.parse_export_field(span),
            "start" => self.parse_start_field(span),
            "elem" => self.parse_elem_field(span),
            "data" => self.parse_data_field(span),
            other => Err(self.err(kw_span, format!("unknown module field: {}", other))),
        }
    }

    fn parse_type_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);
        if self.tok.match_lpar("func")?.is_none() {
            let token = self.tok.read()?;
            return Err(self.err(token.span, format!("expected (func ...), found {}", token.kind)));
        }
        let mut params = Vec::new();
        let mut results = Vec::new();
        self.parse_params(&mut params)?;
        self.parse_results(&mut results)?;
        self.expect_rparen()?; // closes (func
        let end = self.expect_rparen()?; // closes (type

        let param_names = params.iter().map(|(name, _)| name.clone()).collect();
        Ok(ModuleField::Type(TypeField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            ty: crate::binary::types::FunctionType::new(
                params.into_iter().map(|(_, vt)| vt).collect(),
                results,
            ),
            param_names,
        }))
    }

    fn parse_params(&mut self, params: &mut Vec<(Option<String>, ValueType)>) -> Result<(), Error> {
        while self.tok.match_lpar("param")?.is_some() {
            if let Some((name, _)) = self.tok.match_id()? {
                let vt = self.parse_value_type()?;
                params.push((Some(name), vt));
            } else {
                while self.tok.match_rparen()?.is_none() {
                    let vt = self.parse_value_type()?;
                    params.push((None, vt));
                }
                continue;
            }
            self.expect_rparen()?;
        }
        Ok(())
    }

    fn parse_results(&mut self, results: &mut Vec<ValueType>) -> Result<(), Error> {
        while self.tok.match_lpar("result")?.is_some() {
            while self.tok.match_rparen()?.is_none() {
                results.push(self.parse_value_type()?);
            }
        }
        Ok(())
    }

    fn parse_value_type(&mut self) -> Result<ValueType, Error> {
        let (keyword, span) = self.expect_keyword()?;
        value_type_from_keyword(&keyword)
            .ok_or_else(|| self.err(span, format!("unknown value type: {}", keyword)))
    }

    fn parse_typeuse(&mut self) -> Result<TypeUse, Error> {
        let mut ty = TypeUse::default();
        if self.tok.match_lpar("type")?.is_some() {
            ty.idx = Some(self.parse_var()?);
            self.expect_rparen()?;
        }
        self.parse_params(&mut ty.params)?;
        self.parse_results(&mut ty.results)?;
        Ok(ty)
    }

    /// Parses `(export "n")*` and an optional `(import "m" "n")` prefix on a
    /// definition field. The desugarer turns these into top-level fields.
    fn parse_inline_exports_and_import(
        &mut self,
    ) -> Result<(Vec<String>, Option<(String, String)>), Error> {
        let mut exports = Vec::new();
        let mut import = None;
        loop {
            if self.tok.match_lpar("export")?.is_some() {
                let (name, _) = self.expect_utf8_string()?;
                self.expect_rparen()?;
                exports.push(name);
            } else if import.is_none() && self.tok.peek(0)?.kind == TokenKind::LeftParen
                && self.tok.peek(1)?.keyword() == Some("import")
            {
                self.tok.match_lpar("import")?;
                let (module, _) = self.expect_utf8_string()?;
                let (field, _) = self.expect_utf8_string()?;
                self.expect_rparen()?;
                import = Some((module, field));
            } else {
                break;
            }
        }
        Ok((exports, import))
    }

    fn parse_import_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let (module, _) = self.expect_utf8_string()?;
        let (field, _) = self.expect_utf8_string()?;
        self.expect_lparen()?;
        let (keyword, kw_span) = self.expect_keyword()?;
        let name = self.tok.match_id()?.map(|(name, _)| name);
        let desc = match keyword.as_str() {
            "func" => ImportDescField::Func {
                name,
                ty: self.parse_typeuse()?,
            },
            "table" => ImportDescField::Table {
                name,
                ty: self.parse_table_type()?,
            },
            "memory" => ImportDescField::Memory {
                name,
                limits: self.parse_limits()?,
            },
            "global" => ImportDescField::Global {
                name,
                ty: self.parse_global_type()?,
            },
            "tag" => ImportDescField::Tag {
                name,
                ty: self.parse_typeuse()?,
            },
            other => return Err(self.err(kw_span, format!("unknown import kind: {}", other))),
        };
        self.expect_rparen()?; // closes the descriptor
        let end = self.expect_rparen()?; // closes (import
        Ok(ModuleField::Import(ImportField {
            span: Span::new(span.start, end.end, span.line, span.column),
            module,
            field,
            desc,
        }))
    }

    fn parse_limits(&mut self) -> Result<Limits, Error> {
        let (min, _) = self.expect_u32()?;
        let max = if matches!(self.tok.peek(0)?.kind, TokenKind::Integer(_)) {
            Some(self.expect_u32()?.0)
        } else {
            None
        };
        let shared = self.tok.match_keyword("shared")?.is_some();
        Ok(Limits { min, max, shared })
    }

    fn parse_ref_type(&mut self) -> Result<RefType, Error> {
        let (keyword, span) = self.expect_keyword()?;
        match keyword.as_str() {
            "funcref" => Ok(RefType::Func),
            "externref" => Ok(RefType::Extern),
            other => Err(self.err(span, format!("unknown reference type: {}", other))),
        }
    }

    fn parse_table_type(&mut self) -> Result<TableType, Error> {
        let limits = self.parse_limits()?;
        let ref_type = self.parse_ref_type()?;
        Ok(TableType { ref_type, limits })
    }

    fn parse_global_type(&mut self) -> Result<GlobalType, Error> {
        if self.tok.match_lpar("mut")?.is_some() {
            let value_type = self.parse_value_type()?;
            self.expect_rparen()?;
            Ok(GlobalType {
                value_type,
                mutable: true,
            })
        } else {
            Ok(GlobalType {
                value_type: self.parse_value_type()?,
                mutable: false,
            })
        }
    }

    fn parse_func_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);
        let (exports, import) = self.parse_inline_exports_and_import()?;
        let ty = self.parse_typeuse()?;

        let mut locals = Vec::new();
        let mut body = Vec::new();
        if import.is_none() {
            while self.tok.match_lpar("local")?.is_some() {
                if let Some((local_name, _)) = self.tok.match_id()? {
                    let vt = self.parse_value_type()?;
                    locals.push((Some(local_name), vt));
                    self.expect_rparen()?;
                } else {
                    while self.tok.match_rparen()?.is_none() {
                        locals.push((None, self.parse_value_type()?));
                    }
                }
            }
            self.parse_instrs_until_rparen(&mut body)?;
        }
        let end = self.expect_rparen()?;

        Ok(ModuleField::Func(FuncField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            exports,
            import,
            ty,
            locals,
            body,
        }))
    }

    fn parse_table_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);
        let (exports, import) = self.parse_inline_exports_and_import()?;

        let (limits, ref_type, inline_elem) =
            if matches!(self.tok.peek(0)?.kind, TokenKind::Integer(_)) {
                let limits = self.parse_limits()?;
                (Some(limits), self.parse_ref_type()?, None)
            } else {
                // (table reftype (elem ...)): size comes from the item count.
                let ref_type = self.parse_ref_type()?;
                if self.tok.match_lpar("elem")?.is_none() {
                    let token = self.tok.read()?;
                    return Err(
                        self.err(token.span, format!("expected (elem ...), found {}", token.kind))
                    );
                }
                let items = self.parse_elem_items()?;
                self.expect_rparen()?;
                (None, ref_type, Some(items))
            };

        let end = self.expect_rparen()?;
        Ok(ModuleField::Table(TableField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            exports,
            import,
            limits,
            ref_type,
            inline_elem,
        }))
    }

    fn parse_memory_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);
        let (exports, import) = self.parse_inline_exports_and_import()?;

        let (limits, inline_data) = if self.tok.match_lpar("data")?.is_some() {
            let mut data = Vec::new();
            while matches!(self.tok.peek(0)?.kind, TokenKind::String(_)) {
                let (bytes, _) = self.expect_string()?;
                data.extend_from_slice(&bytes);
            }
            self.expect_rparen()?;
            (None, Some(data))
        } else {
            (Some(self.parse_limits()?), None)
        };

        let end = self.expect_rparen()?;
        Ok(ModuleField::Memory(MemoryField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            exports,
            import,
            limits,
            inline_data,
        }))
    }

    fn parse_global_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);
        let (exports, import) = self.parse_inline_exports_and_import()?;
        let ty = self.parse_global_type()?;
        let mut init = Vec::new();
        if import.is_none() {
            self.parse_instrs_until_rparen(&mut init)?;
        }
        let end = self.expect_rparen()?;
        Ok(ModuleField::Global(GlobalField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            exports,
            import,
            ty,
            init,
        }))
    }

    fn parse_tag_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);
        let (exports, import) = self.parse_inline_exports_and_import()?;
        let ty = self.parse_typeuse()?;
        let end = self.expect_rparen()?;
        Ok(ModuleField::Tag(TagField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            exports,
            import,
            ty,
        }))
    }

    fn parse_export_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let (name, _) = self.expect_utf8_string()?;
        self.expect_lparen()?;
        let (keyword, kw_span) = self.expect_keyword()?;
        let kind = match keyword.as_str() {
            "func" => ExternalKind::Func,
            "table" => ExternalKind::Table,
            "memory" => ExternalKind::Memory,
            "global" => ExternalKind::Global,
            "tag" => ExternalKind::Tag,
            other => return Err(self.err(kw_span, format!("unknown export kind: {}", other))),
        };
        let item = self.parse_var()?;
        self.expect_rparen()?;
        let end = self.expect_rparen()?;
        Ok(ModuleField::Export(ExportField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            kind,
            item,
        }))
    }

    fn parse_start_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let func = self.parse_var()?;
        let end = self.expect_rparen()?;
        Ok(ModuleField::Start(StartField {
            span: Span::new(span.start, end.end, span.line, span.column),
            func,
        }))
    }

    fn parse_elem_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);

        let kind = if self.tok.match_keyword("declare")?.is_some() {
            ElemKindField::Declared
        } else if self.tok.match_lpar("table")?.is_some() {
            let table = self.parse_var()?;
            self.expect_rparen()?;
            let offset = self.parse_offset()?;
            ElemKindField::Active {
                table: Some(table),
                offset,
            }
        } else if self.peek_is_var()? && self.tok.peek(1)?.kind == TokenKind::LeftParen {
            // Legacy form: a bare table index before the offset.
            let table = self.parse_var()?;
            let offset = self.parse_offset()?;
            ElemKindField::Active {
                table: Some(table),
                offset,
            }
        } else if self.tok.peek(0)?.kind == TokenKind::LeftParen {
            let offset = self.parse_offset()?;
            ElemKindField::Active {
                table: None,
                offset,
            }
        } else {
            ElemKindField::Passive
        };

        let (ref_type, items) = self.parse_elem_list()?;
        let end = self.expect_rparen()?;
        Ok(ModuleField::Elem(ElemField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            kind,
            ref_type,
            items,
        }))
    }

    /// `(offset instr*)` or a single folded instruction.
    fn parse_offset(&mut self) -> Result<Vec<Instr>, Error> {
        let mut offset = Vec::new();
        if self.tok.match_lpar("offset")?.is_some() {
            self.parse_instrs_until_rparen(&mut offset)?;
            self.expect_rparen()?;
        } else {
            self.parse_folded_instr(&mut offset)?;
        }
        Ok(offset)
    }

    /// The element list: `func idx*`, `funcref (item ...)*`, or the legacy
    /// bare list of function indices.
    fn parse_elem_list(&mut self) -> Result<(RefType, ElemItemsField), Error> {
        if self.tok.match_keyword("func")?.is_some() {
            let mut funcs = Vec::new();
            while self.peek_is_var()? {
                funcs.push(self.parse_var()?);
            }
            return Ok((RefType::Func, ElemItemsField::Funcs(funcs)));
        }
        if self.tok.peek(0)?.keyword() == Some("funcref")
            || self.tok.peek(0)?.keyword() == Some("externref")
        {
            let ref_type = self.parse_ref_type()?;
            return Ok((ref_type, self.parse_elem_items()?));
        }
        // Legacy: bare function indices.
        let mut funcs = Vec::new();
        while self.peek_is_var()? {
            funcs.push(self.parse_var()?);
        }
        Ok((RefType::Func, ElemItemsField::Funcs(funcs)))
    }

    /// Expression items after a reftype: `(item instr*)` or folded
    /// instructions, or bare function vars inside an inline table segment.
    fn parse_elem_items(&mut self) -> Result<ElemItemsField, Error> {
        if self.peek_is_var()? {
            let mut funcs = Vec::new();
            while self.peek_is_var()? {
                funcs.push(self.parse_var()?);
            }
            return Ok(ElemItemsField::Funcs(funcs));
        }
        let mut exprs = Vec::new();
        while self.tok.peek(0)?.kind == TokenKind::LeftParen {
            let mut expr = Vec::new();
            if self.tok.match_lpar("item")?.is_some() {
                self.parse_instrs_until_rparen(&mut expr)?;
                self.expect_rparen()?;
            } else {
                self.parse_folded_instr(&mut expr)?;
            }
            exprs.push(expr);
        }
        Ok(ElemItemsField::Exprs(exprs))
    }

    fn parse_data_field(&mut self, span: Span) -> Result<ModuleField, Error> {
        let name = self.tok.match_id()?.map(|(name, _)| name);

        let kind = if self.tok.match_lpar("memory")?.is_some() {
            let memory = self.parse_var()?;
            self.expect_rparen()?;
            let offset = self.parse_offset()?;
            DataKindField::Active {
                memory: Some(memory),
                offset,
            }
        } else if self.peek_is_var()? && self.tok.peek(1)?.kind == TokenKind::LeftParen {
            let memory = self.parse_var()?;
            let offset = self.parse_offset()?;
            DataKindField::Active {
                memory: Some(memory),
                offset,
            }
        } else if self.tok.peek(0)?.kind == TokenKind::LeftParen {
            let offset = self.parse_offset()?;
            DataKindField::Active {
                memory: None,
                offset,
            }
        } else {
            DataKindField::Passive
        };

        let mut data = Vec::new();
        while matches!(self.tok.peek(0)?.kind, TokenKind::String(_)) {
            let (bytes, _) = self.expect_string()?;
            data.extend_from_slice(&bytes);
        }
        let end = self.expect_rparen()?;
        Ok(ModuleField::Data(DataField {
            span: Span::new(span.start, end.end, span.line, span.column),
            name,
            kind,
            data,
        }))
    }
}

// ===========================================================================
// Instructions
// ===========================================================================

impl<'a> Parser<'a> {
    /// Parses instructions until the closing `)` of the surrounding form,
    /// which is left unconsumed.
    fn parse_instrs_until_rparen(&mut self, out: &mut Vec<Instr>) -> Result<(), Error> {
        loop {
            let (kind_is_rparen, kind_is_eof, span) = {
                let next = self.tok.peek(0)?;
                (
                    next.kind == TokenKind::RightParen,
                    next.kind == TokenKind::Eof,
                    next.span,
                )
            };
            if kind_is_rparen {
                return Ok(());
            }
            if kind_is_eof {
                return Err(self.err(span, "unexpected end of input"));
            }
            self.parse_instr(out)?;
        }
    }

    fn parse_instr(&mut self, out: &mut Vec<Instr>) -> Result<(), Error> {
        if self.tok.peek(0)?.kind == TokenKind::LeftParen {
            self.parse_folded_instr(out)
        } else {
            self.parse_plain_instr(out)
        }
    }

    /// A linear-form instruction; block instructions recurse over their body
    /// up to the matching `end`.
    fn parse_plain_instr(&mut self, out: &mut Vec<Instr>) -> Result<(), Error> {
        let (keyword, span) = self.expect_keyword()?;
        match keyword.as_str() {
            "block" | "loop" | "if" | "try" => self.parse_linear_block(&keyword, span, out),
            "else" | "end" | "catch" | "catch_all" | "delegate" => {
                Err(self.err(span, format!("unexpected {}", keyword)))
            }
            _ => {
                let kind = self.parse_instr_kw(&keyword, span)?;
                out.push(Instr { span, kind });
                Ok(())
            }
        }
    }

    fn block_head(&self, keyword: &str, label: Option<String>, ty: TypeUse) -> InstrKind {
        match keyword {
            "block" => InstrKind::Block { label, ty },
            "loop" => InstrKind::Loop { label, ty },
            "if" => InstrKind::If { label, ty },
            _ => InstrKind::Try { label, ty },
        }
    }

    /// Checks the optional label after `end`, `else`, `catch` or `delegate`
    /// against the opening label.
    fn check_block_label(&mut self) -> Result<(), Error> {
        if let Some((found, span)) = self.tok.match_id()? {
            let expected = self
                .open_labels
                .last()
                .cloned()
                .flatten()
                .unwrap_or_default();
            if expected != found {
                return Err(Error::new(
                    span.start,
                    ErrorKind::LabelMismatch { expected, found },
                ));
            }
        }
        Ok(())
    }

    fn parse_linear_block(
        &mut self,
        keyword: &str,
        span: Span,
        out: &mut Vec<Instr>,
    ) -> Result<(), Error> {
        let label = self.tok.match_id()?.map(|(name, _)| name);
        let ty = self.parse_typeuse()?;
        self.open_labels.push(label.clone());
        out.push(Instr {
            span,
            kind: self.block_head(keyword, label, ty),
        });

        loop {
            let (next_kw, next_span, next_is_eof) = {
                let next = self.tok.peek(0)?;
                (
                    next.keyword().map(str::to_string),
                    next.span,
                    next.kind == TokenKind::Eof,
                )
            };
            match next_kw.as_deref() {
                Some("end") => {
                    self.tok.read()?;
                    self.check_block_label()?;
                    out.push(Instr {
                        span: next_span,
                        kind: InstrKind::Plain(Instruction::End),
                    });
                    self.open_labels.pop();
                    return Ok(());
                }
                Some("else") if keyword == "if" => {
                    self.tok.read()?;
                    self.check_block_label()?;
                    out.push(Instr {
                        span: next_span,
                        kind: InstrKind::Plain(Instruction::Else),
                    });
                }
                Some("catch") if keyword == "try" => {
                    self.tok.read()?;
                    self.check_block_label()?;
                    let tag = self.parse_var()?;
                    out.push(Instr {
                        span: next_span,
                        kind: InstrKind::Catch(tag),
                    });
                }
                Some("catch_all") if keyword == "try" => {
                    self.tok.read()?;
                    self.check_block_label()?;
                    out.push(Instr {
                        span: next_span,
                        kind: InstrKind::Plain(Instruction::CatchAll),
                    });
                }
                Some("delegate") if keyword == "try" => {
                    self.tok.read()?;
                    let target = self.parse_var()?;
                    out.push(Instr {
                        span: next_span,
                        kind: InstrKind::Delegate(target),
                    });
                    self.open_labels.pop();
                    return Ok(());
                }
                _ => {
                    if next_is_eof {
                        return Err(self.err(next_span, "unexpected end of input in block"));
                    }
                    self.parse_instr(out)?;
                }
            }
        }
    }

    /// A folded instruction: operands first, head last.
    fn parse_folded_instr(&mut self, out: &mut Vec<Instr>) -> Result<(), Error> {
        let span = self.expect_lparen()?;
        let (keyword, kw_span) = self.expect_keyword()?;
        match keyword.as_str() {
            "block" | "loop" => {
                let label = self.tok.match_id()?.map(|(name, _)| name);
                let ty = self.parse_typeuse()?;
                self.open_labels.push(label.clone());
                out.push(Instr {
                    span,
                    kind: self.block_head(&keyword, label, ty),
                });
                self.parse_instrs_until_rparen(out)?;
                let end = self.expect_rparen()?;
                out.push(Instr {
                    span: end,
                    kind: InstrKind::Plain(Instruction::End),
                });
                self.open_labels.pop();
                Ok(())
            }
            "if" => self.parse_folded_if(span, out),
            "try" => self.parse_folded_try(span, out),
            _ => {
                let kind = self.parse_instr_kw(&keyword, kw_span)?;
                while self.tok.peek(0)?.kind == TokenKind::LeftParen {
                    self.parse_folded_instr(out)?;
                }
                self.expect_rparen()?;
                out.push(Instr { span, kind });
                Ok(())
            }
        }
    }

    /// `(if label? typeuse cond* (then ...) (else ...)?)` flattens to
    /// `cond*; if; then-body; else; else-body; end`.
    fn parse_folded_if(&mut self, span: Span, out: &mut Vec<Instr>) -> Result<(), Error> {
        let label = self.tok.match_id()?.map(|(name, _)| name);
        let ty = self.parse_typeuse()?;

        // Condition operands come before `then` and are emitted first.
        while self.tok.peek(0)?.kind == TokenKind::LeftParen
            && self.tok.peek(1)?.keyword() != Some("then")
            && self.tok.peek(1)?.keyword() != Some("else")
        {
            self.parse_folded_instr(out)?;
        }

        self.open_labels.push(label.clone());
        out.push(Instr {
            span,
            kind: InstrKind::If { label, ty },
        });

        if self.tok.match_lpar("then")?.is_none() {
            let token = self.tok.read()?;
            return Err(self.err(token.span, format!("expected (then ...), found {}", token.kind)));
        }
        self.parse_instrs_until_rparen(out)?;
        self.expect_rparen()?;

        if let Some(else_span) = self.tok.match_lpar("else")? {
            out.push(Instr {
                span: else_span,
                kind: InstrKind::Plain(Instruction::Else),
            });
            self.parse_instrs_until_rparen(out)?;
            self.expect_rparen()?;
        }

        let end = self.expect_rparen()?;
        out.push(Instr {
            span: end,
            kind: InstrKind::Plain(Instruction::End),
        });
        self.open_labels.pop();
        Ok(())
    }

    /// `(try label? typeuse (do ...) (catch tag ...)* (catch_all ...)?
    /// (delegate l)?)`.
    fn parse_folded_try(&mut self, span: Span, out: &mut Vec<Instr>) -> Result<(), Error> {
        let label = self.tok.match_id()?.map(|(name, _)| name);
        let ty = self.parse_typeuse()?;
        self.open_labels.push(label.clone());
        out.push(Instr {
            span,
            kind: InstrKind::Try { label, ty },
        });

        if self.tok.match_lpar("do")?.is_none() {
            let token = self.tok.read()?;
            return Err(self.err(token.span, format!("expected (do ...), found {}", token.kind)));
        }
        self.parse_instrs_until_rparen(out)?;
        self.expect_rparen()?;

        let mut delegated = false;
        loop {
            if let Some(catch_span) = self.tok.match_lpar("catch")? {
                let tag = self.parse_var()?;
                out.push(Instr {
                    span: catch_span,
                    kind: InstrKind::Catch(tag),
                });
                self.parse_instrs_until_rparen(out)?;
                self.expect_rparen()?;
            } else if let Some(catch_all_span) = self.tok.match_lpar("catch_all")? {
                out.push(Instr {
                    span: catch_all_span,
                    kind: InstrKind::Plain(Instruction::CatchAll),
                });
                self.parse_instrs_until_rparen(out)?;
                self.expect_rparen()?;
            } else if let Some(delegate_span) = self.tok.match_lpar("delegate")? {
                let target = self.parse_var()?;
                self.expect_rparen()?;
                out.push(Instr {
                    span: delegate_span,
                    kind: InstrKind::Delegate(target),
                });
                delegated = true;
                break;
            } else {
                break;
            }
        }

        let end = self.expect_rparen()?;
        if !delegated {
            out.push(Instr {
                span: end,
                kind: InstrKind::Plain(Instruction::End),
            });
        }
        self.open_labels.pop();
        Ok(())
    }

    /// A non-block instruction keyword plus its immediates.
    fn parse_instr_kw(&mut self, keyword: &str, span: Span) -> Result<InstrKind, Error> {
        use InstrKind::*;

        Ok(match keyword {
            "br" => Br(self.parse_var()?),
            "br_if" => BrIf(self.parse_var()?),
            "br_table" => {
                let mut targets = Vec::new();
                while self.peek_is_var()? {
                    targets.push(self.parse_var()?);
                }
                let default = targets
                    .pop()
                    .ok_or_else(|| self.err(span, "br_table needs at least one label"))?;
                BrTable { targets, default }
            }
            "call" => Call(self.parse_var()?),
            "return_call" => ReturnCall(self.parse_var()?),
            "call_indirect" => {
                let table = self.parse_opt_var()?;
                let ty = self.parse_typeuse()?;
                CallIndirect { table, ty }
            }
            "return_call_indirect" => {
                let table = self.parse_opt_var()?;
                let ty = self.parse_typeuse()?;
                ReturnCallIndirect { table, ty }
            }
            "ref.func" => RefFunc(self.parse_var()?),
            "ref.null" => {
                let (heap, heap_span) = self.expect_keyword()?;
                let ref_type = match heap.as_str() {
                    "func" | "funcref" => ValueType::FuncRef,
                    "extern" | "externref" => ValueType::ExternRef,
                    other => {
                        return Err(
                            self.err(heap_span, format!("unknown heap type: {}", other))
                        )
                    }
                };
                Plain(Instruction::RefNull { ref_type })
            }
            "local.get" => LocalGet(self.parse_var()?),
            "local.set" => LocalSet(self.parse_var()?),
            "local.tee" => LocalTee(self.parse_var()?),
            "global.get" => GlobalGet(self.parse_var()?),
            "global.set" => GlobalSet(self.parse_var()?),
            "table.get" => TableGet(self.default_table_var(span)?),
            "table.set" => TableSet(self.default_table_var(span)?),
            "table.size" => TableSize(self.default_table_var(span)?),
            "table.grow" => TableGrow(self.default_table_var(span)?),
            "table.fill" => TableFill(self.default_table_var(span)?),
            "table.copy" => {
                let dst = self.parse_opt_var()?;
                match dst {
                    Some(dst) => TableCopy {
                        dst,
                        src: self.parse_var()?,
                    },
                    None => TableCopy {
                        dst: Var::index(span, 0),
                        src: Var::index(span, 0),
                    },
                }
            }
            "table.init" => {
                let first = self.parse_var()?;
                match self.parse_opt_var()? {
                    Some(elem) => TableInit {
                        elem,
                        table: Some(first),
                    },
                    None => TableInit {
                        elem: first,
                        table: None,
                    },
                }
            }
            "elem.drop" => ElemDrop(self.parse_var()?),
            "memory.size" => MemorySize(self.parse_opt_var()?),
            "memory.grow" => MemoryGrow(self.parse_opt_var()?),
            "memory.fill" => MemoryFill(self.parse_opt_var()?),
            "memory.copy" => {
                let dst = self.parse_opt_var()?;
                let src = if dst.is_some() {
                    self.parse_opt_var()?
                } else {
                    None
                };
                MemoryCopy { dst, src }
            }
            "memory.init" => {
                let first = self.parse_var()?;
                match self.parse_opt_var()? {
                    Some(data) => MemoryInit {
                        data,
                        memory: Some(first),
                    },
                    None => MemoryInit {
                        data: first,
                        memory: None,
                    },
                }
            }
            "data.drop" => DataDrop(self.parse_var()?),
            "throw" => Throw(self.parse_var()?),
            "rethrow" => Rethrow(self.parse_var()?),
            "i32.const" => {
                let token = self.tok.read()?;
                let value = match token.kind {
                    TokenKind::Integer(lit) => lit.to_i32_const(),
                    _ => None,
                };
                Plain(Instruction::I32Const {
                    value: value.ok_or_else(|| self.err(token.span, "constant out of range"))?,
                })
            }
            "i64.const" => {
                let token = self.tok.read()?;
                let value = match token.kind {
                    TokenKind::Integer(lit) => lit.to_i64_const(),
                    _ => None,
                };
                Plain(Instruction::I64Const {
                    value: value.ok_or_else(|| self.err(token.span, "constant out of range"))?,
                })
            }
            "f32.const" => Plain(Instruction::F32Const {
                value: self.parse_f32_literal()?,
            }),
            "f64.const" => Plain(Instruction::F64Const {
                value: self.parse_f64_literal()?,
            }),
            "v128.const" => {
                let bytes = self.parse_v128_const()?;
                Plain(Instruction::Simd {
                    op: SimdOp::V128Const,
                    imm: SimdImm::Bytes(bytes),
                })
            }
            "select" => {
                if self.tok.peek(0)?.kind == TokenKind::LeftParen
                    && self.tok.peek(1)?.keyword() == Some("result")
                {
                    let mut results = Vec::new();
                    self.parse_results(&mut results)?;
                    Plain(Instruction::SelectTyped { val_types: results })
                } else {
                    Plain(Instruction::Select)
                }
            }
            _ => {
                if let Some((build, natural)) = memarg_instr(keyword) {
                    let memarg = self.parse_memarg(natural)?;
                    Plain(build(memarg))
                } else if let Some(op) = simd_op_by_mnemonic(keyword) {
                    self.parse_simd_instr(op, span)?
                } else if let Some(op) = atomic_op_by_mnemonic(keyword) {
                    let memarg = if op.has_memarg() {
                        Some(self.parse_memarg(op.natural_align())?)
                    } else {
                        None
                    };
                    Plain(Instruction::Atomic { op, memarg })
                } else if let Some(instr) = crate::binary::instruction::plain_by_mnemonic(keyword) {
                    Plain(instr)
                } else {
                    return Err(self.err(span, format!("unknown operator: {}", keyword)));
                }
            }
        })
    }

    fn default_table_var(&mut self, span: Span) -> Result<Var, Error> {
        Ok(self.parse_opt_var()?.unwrap_or_else(|| Var::index(span, 0)))
    }

    fn parse_simd_instr(&mut self, op: SimdOp, span: Span) -> Result<InstrKind, Error> {
        let imm = match op.imm_kind() {
            SimdImmKind::None => SimdImm::None,
            SimdImmKind::MemArg => SimdImm::MemArg(self.parse_memarg(op.natural_align())?),
            SimdImmKind::MemArgLane => {
                let memarg = self.parse_memarg(op.natural_align())?;
                let lane = self.parse_lane(op.lane_count())?;
                SimdImm::MemArgLane { memarg, lane }
            }
            SimdImmKind::Lane => SimdImm::Lane(self.parse_lane(op.lane_count())?),
            SimdImmKind::Bytes => {
                // v128.const is handled before the generic dispatch.
                return Err(self.err(span, "v128.const requires a shape"));
            }
            SimdImmKind::Lanes => {
                let mut lanes = [0u8; 16];
                for lane in &mut lanes {
                    *lane = self.parse_lane(32)?;
                }
                SimdImm::Lanes(lanes)
            }
        };
        Ok(InstrKind::Plain(Instruction::Simd { op, imm }))
    }

    fn parse_lane(&mut self, count: u8) -> Result<u8, Error> {
        let (value, span) = self.expect_u32()?;
        if value >= u32::from(count) {
            return Err(Error::new(
                span.start,
                ErrorKind::IndexOutOfRange {
                    space: "lane",
                    index: value,
                    max: u32::from(count) - 1,
                },
            ));
        }
        Ok(value as u8)
    }

    /// `offset=N`? `align=N`? with the instruction's natural alignment as
    /// the default. `align` is given in bytes and must be a power of two.
    fn parse_memarg(&mut self, natural_align: u32) -> Result<MemArg, Error> {
        let mut offset = 0u32;
        let mut align = natural_align;

        if let Some(value) = self.match_prefixed_int("offset=")? {
            offset = value;
        }
        if let Some(value) = self.match_prefixed_int("align=")? {
            let span = self.last_memarg_span;
            if value == 0 || !value.is_power_of_two() {
                return Err(Error::new(
                    span.start,
                    ErrorKind::AlignmentNotPowerOfTwo(value),
                ));
            }
            align = value.trailing_zeros();
        }

        Ok(MemArg { align, offset })
    }

    /// Consumes a keyword of the form `prefixN` and parses N, recording the
    /// token span for alignment diagnostics.
    fn match_prefixed_int(&mut self, prefix: &str) -> Result<Option<u32>, Error> {
        let (digits, span) = {
            let token = self.tok.peek(0)?;
            match token.keyword() {
                Some(text) if text.starts_with(prefix) => {
                    (text[prefix.len()..].to_string(), token.span)
                }
                _ => return Ok(None),
            }
        };
        self.tok.read()?;
        self.last_memarg_span = span;

        let clean: String = digits.chars().filter(|&c| c != '_').collect();
        let value = if let Some(hex) = clean.strip_prefix("0x") {
            u32::from_str_radix(hex, 16).ok()
        } else {
            clean.parse().ok()
        };
        match value {
            Some(value) => Ok(Some(value)),
            None => Err(self.err(span, format!("invalid {}value", prefix))),
        }
    }

    fn parse_f32_literal(&mut self) -> Result<f32, Error> {
        let token = self.tok.read()?;
        match &token.kind {
            TokenKind::Float(lit) => lit
                .to_f32()
                .ok_or_else(|| self.err(token.span, "constant out of range")),
            TokenKind::Integer(lit) => {
                let v = if lit.negative {
                    -(lit.value as f64)
                } else {
                    lit.value as f64
                };
                Ok(v as f32)
            }
            other => Err(self.err(token.span, format!("expected f32, found {}", other))),
        }
    }

    fn parse_f64_literal(&mut self) -> Result<f64, Error> {
        let token = self.tok.read()?;
        match &token.kind {
            TokenKind::Float(lit) => lit
                .to_f64()
                .ok_or_else(|| self.err(token.span, "constant out of range")),
            TokenKind::Integer(lit) => {
                let v = if lit.negative {
                    -(lit.value as f64)
                } else {
                    lit.value as f64
                };
                Ok(v)
            }
            other => Err(self.err(token.span, format!("expected f64, found {}", other))),
        }
    }

    /// `v128.const <shape> lane*` assembled into 16 little-endian bytes.
    fn parse_v128_const(&mut self) -> Result<[u8; 16], Error> {
        let (shape, span) = self.expect_keyword()?;
        let mut bytes = [0u8; 16];
        match shape.as_str() {
            "i8x16" => {
                for i in 0..16 {
                    let lane = self.parse_int_lit()?;
                    bytes[i] = lane_to_int(lane, span)? as u8;
                }
            }
            "i16x8" => {
                for i in 0..8 {
                    let lane = self.parse_int_lit()?;
                    let v = lane_to_int(lane, span)? as u16;
                    bytes[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
                }
            }
            "i32x4" => {
                for i in 0..4 {
                    let (lane, lane_span) = self.parse_int_token()?;
                    let v = lane
                        .to_i32_const()
                        .ok_or_else(|| self.err(lane_span, "constant out of range"))?;
                    bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
                }
            }
            "i64x2" => {
                for i in 0..2 {
                    let (lane, lane_span) = self.parse_int_token()?;
                    let v = lane
                        .to_i64_const()
                        .ok_or_else(|| self.err(lane_span, "constant out of range"))?;
                    bytes[i * 8..i * 8 + 8].copy_from_slice(&v.to_le_bytes());
                }
            }
            "f32x4" => {
                for i in 0..4 {
                    let v = self.parse_f32_literal()?;
                    bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_bits().to_le_bytes());
                }
            }
            "f64x2" => {
                for i in 0..2 {
                    let v = self.parse_f64_literal()?;
                    bytes[i * 8..i * 8 + 8].copy_from_slice(&v.to_bits().to_le_bytes());
                }
            }
            other => return Err(self.err(span, format!("unknown v128 shape: {}", other))),
        }
        Ok(bytes)
    }

    fn parse_int_token(&mut self) -> Result<(IntLit, Span), Error> {
        let token = self.tok.read()?;
        match token.kind {
            TokenKind::Integer(lit) => Ok((lit, token.span)),
            other => Err(self.err(token.span, format!("expected integer, found {}", other))),
        }
    }

    fn parse_int_lit(&mut self) -> Result<IntLit, Error> {
        Ok(self.parse_int_token()?.0)
    }
}

fn lane_to_int(lit: IntLit, span: Span) -> Result<i64, Error> {
    lit.to_i64_const()
        .ok_or_else(|| Error::syntax(span.start, "lane value out of range"))
}

fn value_type_from_keyword(keyword: &str) -> Option<ValueType> {
    match keyword {
        "i32" => Some(ValueType::I32),
        "i64" => Some(ValueType::I64),
        "f32" => Some(ValueType::F32),
        "f64" => Some(ValueType::F64),
        "v128" => Some(ValueType::V128),
        "funcref" => Some(ValueType::FuncRef),
        "externref" => Some(ValueType::ExternRef),
        "exnref" => Some(ValueType::ExnRef),
        _ => None,
    }
}

/// The memarg-carrying scalar loads and stores, with their natural
/// alignments (log2 of access width in bytes).
fn memarg_instr(keyword: &str) -> Option<(fn(MemArg) -> Instruction, u32)> {
    Some(match keyword {
        "i32.load" => (|m| Instruction::I32Load { memarg: m }, 2),
        "i64.load" => (|m| Instruction::I64Load { memarg: m }, 3),
        "f32.load" => (|m| Instruction::F32Load { memarg: m }, 2),
        "f64.load" => (|m| Instruction::F64Load { memarg: m }, 3),
        "i32.load8_s" => (|m| Instruction::I32Load8S { memarg: m }, 0),
        "i32.load8_u" => (|m| Instruction::I32Load8U { memarg: m }, 0),
        "i32.load16_s" => (|m| Instruction::I32Load16S { memarg: m }, 1),
        "i32.load16_u" => (|m| Instruction::I32Load16U { memarg: m }, 1),
        "i64.load8_s" => (|m| Instruction::I64Load8S { memarg: m }, 0),
        "i64.load8_u" => (|m| Instruction::I64Load8U { memarg: m }, 0),
        "i64.load16_s" => (|m| Instruction::I64Load16S { memarg: m }, 1),
        "i64.load16_u" => (|m| Instruction::I64Load16U { memarg: m }, 1),
        "i64.load32_s" => (|m| Instruction::I64Load32S { memarg: m }, 2),
        "i64.load32_u" => (|m| Instruction::I64Load32U { memarg: m }, 2),
        "i32.store" => (|m| Instruction::I32Store { memarg: m }, 2),
        "i64.store" => (|m| Instruction::I64Store { memarg: m }, 3),
        "f32.store" => (|m| Instruction::F32Store { memarg: m }, 2),
        "f64.store" => (|m| Instruction::F64Store { memarg: m }, 3),
        "i32.store8" => (|m| Instruction::I32Store8 { memarg: m }, 0),
        "i32.store16" => (|m| Instruction::I32Store16 { memarg: m }, 1),
        "i64.store8" => (|m| Instruction::I64Store8 { memarg: m }, 0),
        "i64.store16" => (|m| Instruction::I64Store16 { memarg: m }, 1),
        "i64.store32" => (|m| Instruction::I64Store32 { memarg: m }, 2),
        _ => return None,
    })
}

// ===========================================================================
// Custom section annotations
// ===========================================================================

/// Parses `(@custom "name" (<before|after> <anchor>)? "bytes"*)`.
///
/// A missing placement means `after last`.
fn parse_custom_annotation(annotation: &Annotation) -> Result<CustomSection, Error> {
    let mut tokens = annotation.tokens.iter().peekable();
    let offset = annotation.span.start;

    let name = match tokens.next() {
        Some(Token {
            kind: TokenKind::String(bytes),
            span,
        }) => String::from_utf8(bytes.clone())
            .map_err(|_| Error::syntax(span.start, "custom section name is not valid UTF-8"))?,
        _ => return Err(Error::syntax(offset, "expected custom section name")),
    };

    let mut place = CustomPlace::default();
    if matches!(
        tokens.peek(),
        Some(Token {
            kind: TokenKind::LeftParen,
            ..
        })
    ) {
        tokens.next();
        let order = match tokens.next() {
            Some(token) if token.keyword() == Some("before") => PlaceOrder::Before,
            Some(token) if token.keyword() == Some("after") => PlaceOrder::After,
            Some(token) => return Err(Error::new(token.span.start, ErrorKind::CustomPlacement)),
            None => return Err(Error::new(offset, ErrorKind::CustomPlacement)),
        };
        let anchor = match tokens.next().and_then(|t| t.keyword()) {
            Some("first") => CustomAnchor::First,
            Some("type") => CustomAnchor::Type,
            Some("import") => CustomAnchor::Import,
            Some("func") => CustomAnchor::Func,
            Some("table") => CustomAnchor::Table,
            Some("memory") => CustomAnchor::Memory,
            Some("global") => CustomAnchor::Global,
            Some("export") => CustomAnchor::Export,
            Some("start") => CustomAnchor::Start,
            Some("elem") => CustomAnchor::Elem,
            Some("code") => CustomAnchor::Code,
            Some("data") => CustomAnchor::Data,
            Some("datacount") => CustomAnchor::DataCount,
            Some("last") => CustomAnchor::Last,
            _ => return Err(Error::new(offset, ErrorKind::CustomPlacement)),
        };
        match tokens.next() {
            Some(Token {
                kind: TokenKind::RightParen,
                ..
            }) => {}
            _ => return Err(Error::new(offset, ErrorKind::CustomPlacement)),
        }
        place = CustomPlace { order, anchor };
    }

    let mut data = Vec::new();
    for token in tokens {
        match &token.kind {
            TokenKind::String(bytes) => data.extend_from_slice(bytes),
            _ => {
                return Err(Error::syntax(
                    token.span.start,
                    "expected string in custom section contents",
                ))
            }
        }
    }

    Ok(CustomSection { name, data, place })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(module: &TextModule) -> &[Instr] {
        for field in &module.fields {
            if let ModuleField::Func(func) = field {
                return &func.body;
            }
        }
        panic!("no function field");
    }

    fn kinds(body: &[Instr]) -> Vec<&InstrKind> {
        body.iter().map(|i| &i.kind).collect()
    }

    #[test]
    fn parse_empty_module() {
        let module = parse("(module)").unwrap();
        assert!(module.fields.is_empty());
        assert_eq!(module.name, None);

        let named = parse("(module $m)").unwrap();
        assert_eq!(named.name, Some("m".to_string()));
    }

    #[test]
    fn parse_bare_fields() {
        let module = parse("(func) (memory 1)").unwrap();
        assert_eq!(module.fields.len(), 2);
    }

    #[test]
    fn parse_func_with_signature() {
        let module = parse("(module (func $add (param $a i32) (param i32) (result i32) local.get $a))")
            .unwrap();
        let ModuleField::Func(func) = &module.fields[0] else {
            panic!("expected func");
        };
        assert_eq!(func.name, Some("add".to_string()));
        assert_eq!(
            func.ty.params,
            vec![
                (Some("a".to_string()), ValueType::I32),
                (None, ValueType::I32)
            ]
        );
        assert_eq!(func.ty.results, vec![ValueType::I32]);
        assert_eq!(func.body.len(), 1);
        assert!(matches!(&func.body[0].kind, InstrKind::LocalGet(_)));
    }

    #[test]
    fn folded_expression_flattening() {
        let module =
            parse("(module (func (result i32) (i32.add (i32.const 1) (i32.const 2))))").unwrap();
        let body = body_of(&module);
        assert_eq!(
            kinds(body),
            vec![
                &InstrKind::Plain(Instruction::I32Const { value: 1 }),
                &InstrKind::Plain(Instruction::I32Const { value: 2 }),
                &InstrKind::Plain(Instruction::I32Add),
            ]
        );
    }

    #[test]
    fn folded_if_flattening() {
        let module = parse(
            "(module (func (result i32)
                (if (result i32) (i32.const 1)
                    (then (i32.const 2))
                    (else (i32.const 3)))))",
        )
        .unwrap();
        let body = body_of(&module);
        let got = kinds(body);
        assert!(matches!(got[0], InstrKind::Plain(Instruction::I32Const { value: 1 })));
        assert!(matches!(got[1], InstrKind::If { .. }));
        assert!(matches!(got[2], InstrKind::Plain(Instruction::I32Const { value: 2 })));
        assert!(matches!(got[3], InstrKind::Plain(Instruction::Else)));
        assert!(matches!(got[4], InstrKind::Plain(Instruction::I32Const { value: 3 })));
        assert!(matches!(got[5], InstrKind::Plain(Instruction::End)));
        assert_eq!(got.len(), 6);
    }

    #[test]
    fn linear_block_with_matching_label() {
        let module = parse("(module (func block $a nop end $a))").unwrap();
        let body = body_of(&module);
        assert_eq!(body.len(), 3);
        assert!(matches!(
            &body[0].kind,
            InstrKind::Block { label: Some(l), .. } if l == "a"
        ));
    }

    #[test]
    fn block_label_mismatch() {
        let err = parse("(module (func block $a nop end $b))").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::LabelMismatch {
                expected: "a".to_string(),
                found: "b".to_string()
            }
        );
    }

    #[test]
    fn else_outside_if_rejected() {
        let err = parse("(module (func block else end))").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn memarg_parsing() {
        let module = parse("(module (func (i32.load offset=8 align=2 (i32.const 0)) drop))").unwrap();
        let body = body_of(&module);
        assert_eq!(
            body[1].kind,
            InstrKind::Plain(Instruction::I32Load {
                memarg: MemArg {
                    align: 1,
                    offset: 8
                }
            })
        );
    }

    #[test]
    fn memarg_alignment_must_be_power_of_two() {
        let err = parse("(module (func i32.load align=3))").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlignmentNotPowerOfTwo(3));
    }

    #[test]
    fn natural_alignment_is_default() {
        let module = parse("(module (func i64.load drop))").unwrap();
        let body = body_of(&module);
        assert_eq!(
            body[0].kind,
            InstrKind::Plain(Instruction::I64Load {
                memarg: MemArg {
                    align: 3,
                    offset: 0
                }
            })
        );
    }

    #[test]
    fn inline_export_and_import() {
        let module = parse(r#"(module (func $f (export "a") (export "b") (import "m" "n") (param i32)))"#)
            .unwrap();
        let ModuleField::Func(func) = &module.fields[0] else {
            panic!("expected func");
        };
        assert_eq!(func.exports, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(func.import, Some(("m".to_string(), "n".to_string())));
        assert!(func.body.is_empty());
    }

    #[test]
    fn table_with_inline_elem() {
        let module = parse("(module (table funcref (elem 0 1 2)))").unwrap();
        let ModuleField::Table(table) = &module.fields[0] else {
            panic!("expected table");
        };
        assert_eq!(table.limits, None);
        assert_eq!(table.ref_type, RefType::Func);
        match &table.inline_elem {
            Some(ElemItemsField::Funcs(funcs)) => assert_eq!(funcs.len(), 3),
            other => panic!("expected funcs, got {:?}", other),
        }
    }

    #[test]
    fn memory_with_inline_data() {
        let module = parse(r#"(module (memory (data "ab" "cd")))"#).unwrap();
        let ModuleField::Memory(memory) = &module.fields[0] else {
            panic!("expected memory");
        };
        assert_eq!(memory.limits, None);
        assert_eq!(memory.inline_data, Some(b"abcd".to_vec()));
    }

    #[test]
    fn elem_with_offset_abbreviation() {
        let module = parse("(module (elem (i32.const 0) func 0))").unwrap();
        let ModuleField::Elem(elem) = &module.fields[0] else {
            panic!("expected elem");
        };
        match &elem.kind {
            ElemKindField::Active { table, offset } => {
                assert!(table.is_none());
                assert_eq!(offset.len(), 1);
            }
            other => panic!("expected active, got {:?}", other),
        }
    }

    #[test]
    fn passive_and_declared_elem() {
        let module = parse("(module (elem func 0) (elem declare func 0))").unwrap();
        let ModuleField::Elem(passive) = &module.fields[0] else {
            panic!()
        };
        assert_eq!(passive.kind, ElemKindField::Passive);
        let ModuleField::Elem(declared) = &module.fields[1] else {
            panic!()
        };
        assert_eq!(declared.kind, ElemKindField::Declared);
    }

    #[test]
    fn data_field_forms() {
        let module = parse(r#"(module (data (i32.const 0) "x") (data "passive"))"#).unwrap();
        let ModuleField::Data(active) = &module.fields[0] else {
            panic!()
        };
        assert!(matches!(active.kind, DataKindField::Active { .. }));
        assert_eq!(active.data, b"x".to_vec());
        let ModuleField::Data(passive) = &module.fields[1] else {
            panic!()
        };
        assert_eq!(passive.kind, DataKindField::Passive);
    }

    #[test]
    fn export_and_start_fields() {
        let module = parse(r#"(module (export "f" (func $main)) (start $main))"#).unwrap();
        assert!(matches!(
            &module.fields[0],
            ModuleField::Export(ExportField {
                kind: ExternalKind::Func,
                ..
            })
        ));
        assert!(matches!(&module.fields[1], ModuleField::Start(_)));
    }

    #[test]
    fn custom_annotation_with_placement() {
        let module =
            parse(r#"(module (@custom "x" (before func) "\00\01"))"#).unwrap();
        assert_eq!(module.customs.len(), 1);
        let custom = &module.customs[0];
        assert_eq!(custom.name, "x");
        assert_eq!(custom.data, vec![0x00, 0x01]);
        assert_eq!(custom.place.order, PlaceOrder::Before);
        assert_eq!(custom.place.anchor, CustomAnchor::Func);
    }

    #[test]
    fn custom_annotation_default_placement() {
        let module = parse(r#"(module (@custom "meta" "payload"))"#).unwrap();
        let custom = &module.customs[0];
        assert_eq!(custom.place, CustomPlace::default());
        assert_eq!(custom.data, b"payload".to_vec());
    }

    #[test]
    fn custom_annotation_bad_anchor() {
        let err = parse(r#"(module (@custom "x" (before bogus) ""))"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CustomPlacement);
    }

    #[test]
    fn v128_const_shapes() {
        let module = parse("(module (func (v128.const i32x4 1 2 3 4) drop))").unwrap();
        let body = body_of(&module);
        let InstrKind::Plain(Instruction::Simd {
            op: SimdOp::V128Const,
            imm: SimdImm::Bytes(bytes),
        }) = &body[0].kind
        else {
            panic!("expected v128.const");
        };
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[4, 0, 0, 0]);
    }

    #[test]
    fn simd_lane_instruction() {
        let module = parse("(module (func (i8x16.extract_lane_s 15 (v128.const i64x2 0 0)) drop))")
            .unwrap();
        let body = body_of(&module);
        assert!(matches!(
            &body[1].kind,
            InstrKind::Plain(Instruction::Simd {
                op: SimdOp::I8x16ExtractLaneS,
                imm: SimdImm::Lane(15),
            })
        ));

        let err = parse("(module (func i8x16.extract_lane_s 16))").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IndexOutOfRange { .. }));
    }

    #[test]
    fn br_table_targets() {
        let module = parse("(module (func block br_table 0 0 0 end))").unwrap();
        let body = body_of(&module);
        let InstrKind::BrTable { targets, .. } = &body[1].kind else {
            panic!("expected br_table");
        };
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn unknown_operator() {
        let err = parse("(module (func i32.bogus))").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn call_indirect_with_typeuse() {
        let module = parse("(module (func call_indirect (type 0) (param i32)))").unwrap();
        let body = body_of(&module);
        let InstrKind::CallIndirect { table, ty } = &body[0].kind else {
            panic!("expected call_indirect");
        };
        assert!(table.is_none());
        assert!(ty.idx.is_some());
        assert_eq!(ty.params.len(), 1);
    }
}
