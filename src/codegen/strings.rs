use std::collections::HashMap;

use crate::assembly::Label;
use crate::ast::{Block, Expr, Program, Statement};
use crate::error::Span;

/// Every distinct string literal of a program, each stored once in static memory.
#[derive(Debug, Default)]
pub struct StringPool<'source> {
    strings: Vec<&'source str>,
    labels: HashMap<&'source str, Label>,
}

impl<'source> StringPool<'source> {
    pub fn collect(program: &Program<'source>) -> Self {
        let mut pool = Self::default();
        for decl in &program.statics {
            if let Some((init, _)) = &decl.init {
                pool.expr(init);
            }
        }
        for function in &program.functions {
            pool.block(&function.body);
        }
        for method in program.structs.iter().flat_map(|decl| &decl.methods) {
            pool.block(&method.body);
        }
        pool.statements(&program.body);
        pool
    }

    fn add(&mut self, string: &'source str) {
        if !self.labels.contains_key(string) {
            self.labels.insert(string, Label::string(self.strings.len()));
            self.strings.push(string);
        }
    }

    pub fn label(&self, string: &str) -> Option<&Label> {
        self.labels.get(string)
    }

    /// Strings in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&Label, &'source str)> + '_ {
        self.strings
            .iter()
            .filter_map(move |string| self.labels.get(string).map(|label| (label, *string)))
    }

    /// Static words needed: a length word plus one word per character, per string.
    pub fn words(&self) -> usize {
        self.strings.iter().map(|s| 1 + s.chars().count()).sum()
    }

    fn block(&mut self, block: &Block<'source>) {
        self.statements(&block.statements);
    }

    fn statements(&mut self, statements: &[(Statement<'source>, Span)]) {
        for (statement, _) in statements {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Statement<'source>) {
        match statement {
            Statement::Return(None) | Statement::DeclareVar { init: None, .. } => {}
            Statement::Return(Some((expr, _)))
            | Statement::SingleExpr((expr, _))
            | Statement::DeclareVar {
                init: Some((expr, _)),
                ..
            } => self.expr(expr),
            Statement::Block(statements) => self.statements(statements),
            Statement::If {
                condition,
                true_branch,
                false_branch,
            } => {
                self.expr(&condition.0);
                self.statement(&true_branch.0);
                if let Some((false_branch, _)) = false_branch {
                    self.statement(false_branch);
                }
            }
            Statement::While { condition, body } => {
                self.expr(&condition.0);
                self.statement(&body.0);
            }
        }
    }

    fn expr(&mut self, expr: &Expr<'source>) {
        match expr {
            Expr::String(string) => self.add(*string),
            Expr::Integer(_) | Expr::Float(_) | Expr::Variable(_) => {}
            Expr::Call { function, args } => {
                self.expr(&function.0);
                for (arg, _) in args {
                    self.expr(arg);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(&lhs.0);
                self.expr(&rhs.0);
            }
            Expr::Assign {
                destination, value, ..
            } => {
                self.expr(&destination.0);
                self.expr(&value.0);
            }
            Expr::Field { base: inner, .. }
            | Expr::Unary { expr: inner, .. }
            | Expr::AddressOf(inner)
            | Expr::Dereference(inner)
            | Expr::SizeOf(inner) => self.expr(&inner.0),
        }
    }
}
