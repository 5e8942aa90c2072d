pub mod ast;
pub mod macro_replace;

use lalrpop_util::lalrpop_mod;

//指定生成的代码的位置
lalrpop_mod!(#[allow(clippy::all)] pub sysy, "/frontend/lalrpop/sysy.rs");
