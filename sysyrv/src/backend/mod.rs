pub mod asm2string;
pub mod codegen;
pub mod frame;
pub mod regs;
pub mod rv_inst;
