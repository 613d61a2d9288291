use super::{
    lexer::{Source, Symbol},
    statement::variable_declaration,
    Parse, ParseRes, Parser,
};
use crate::ast::{Program, StaticDecl, StructDecl, TypeName};

impl<'source> Parse<'source> for Program<'source> {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        let mut program = Program::default();
        while parser.peek_token()?.is_some() {
            if parser.peek_keyword("struct")? {
                program.structs.push(parser.parse()?);
            } else if parser.peek_keyword("func")? {
                program.functions.push(parser.parse()?);
            } else if parser.peek_keyword("static")? {
                parser.accept_current();
                let (ty, name, init, _) = variable_declaration(parser)
                    .map_err(|e| e.add_context("parsing static declaration"))?;
                program.statics.push(StaticDecl { ty, name, init });
            } else {
                program.body.push(parser.parse()?);
            }
        }
        Ok(program)
    }
}

/// `struct Name { <type> field; func ... }`
impl<'source> Parse<'source> for StructDecl<'source> {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        parser.with_context("parsing struct declaration", |parser| {
            parser.keyword("struct")?;
            let name: Source = parser.parse()?;
            // fields and methods may refer to the struct itself
            parser.declare_type(name.source);
            parser.accept_symbol(Symbol::OpenBrace)?;

            let mut fields = Vec::new();
            let mut methods = Vec::new();
            while !parser.peek_symbol(Symbol::CloseBrace)? {
                if parser.peek_keyword("func")? {
                    methods.push(parser.parse()?);
                } else {
                    let ty: TypeName = parser.parse()?;
                    let field: Source = parser.parse()?;
                    parser.accept_symbol(Symbol::Semicolon)?;
                    fields.push((ty, field));
                }
            }
            parser.accept_symbol(Symbol::CloseBrace)?;

            Ok(Self {
                name,
                fields,
                methods,
            })
        })
    }
}
