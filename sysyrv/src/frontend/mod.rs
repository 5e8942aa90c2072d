pub mod ir;
pub mod ir2string;
pub mod irgen;
pub mod lalrpop;
pub mod symboltable;

use crate::error::Result;
use ir::program::Program;
use irgen::Analyzer;
use lalrpop::ast::CompUnit;

/// AST -> IR
pub fn irgen(ast: &CompUnit) -> Result<Program> {
    let program = Analyzer::new().get_ir_program(ast)?;
    Ok(program)
}
