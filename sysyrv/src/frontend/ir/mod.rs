pub mod executor;
pub mod function;
pub mod instruction;
pub mod operand;
pub mod program;
