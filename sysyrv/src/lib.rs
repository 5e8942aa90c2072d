pub mod backend;
pub mod error;
pub mod frontend;

use error::{CompileError, Result};
use frontend::ir::program::Program;
use frontend::lalrpop::ast::CompUnit;

/// 预处理并解析源程序，得到AST
pub fn parse(src: &str) -> Result<CompUnit> {
    let src = frontend::lalrpop::macro_replace::replace_macros(src);
    frontend::lalrpop::sysy::CompUnitParser::new()
        .parse(&src)
        .map_err(|e| CompileError::Parse(e.to_string()))
}

/// 源程序 -> IR
pub fn compile_to_ir(src: &str) -> Result<Program> {
    let ast = parse(src)?;
    frontend::irgen(&ast)
}

/// 源程序 -> RISC-V 汇编
pub fn compile(src: &str) -> Result<String> {
    let program = compile_to_ir(src)?;
    let asm = backend::codegen::Generator::new(&program).gen()?;
    Ok(asm)
}
