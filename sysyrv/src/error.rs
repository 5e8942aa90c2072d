use thiserror::Error;

/// 源程序中的语义错误，由分析器发现
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("use of undeclared identifier `{0}`")]
    Undeclared(String),

    #[error("redefinition of `{0}` in the same scope")]
    Redefinition(String),

    #[error("call to `{callee}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("expression is not a compile-time constant: {0}")]
    NonConstant(String),

    #[error("array `{0}` has a non-positive dimension")]
    InvalidDimension(String),

    #[error("cannot assign to constant `{0}`")]
    AssignToConst(String),

    #[error("`{0}` outside of a loop")]
    LoopControlOutsideLoop(&'static str),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("too many initializers for `{0}`")]
    TooManyInitializers(String),
}

/// 后端契约错误：出现即说明分析器与生成器之间的约定被破坏
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("operand `{0}` has no stack slot in `{1}`")]
    MissingFrameSlot(String, String),

    #[error("temporary register pool exhausted")]
    RegisterExhausted,

    #[error("no label for instruction index {0}")]
    MissingLabel(usize),

    #[error("cannot generate `{0}`")]
    Contract(String),
}

/// 解释执行 IR 时的运行时错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("division by zero in `{0}`")]
    DivisionByZero(String),

    #[error("out-of-bounds access through `{0}` at index {1}")]
    OutOfBounds(String, i64),

    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("read of undefined variable `{0}`")]
    Undefined(String),

    #[error("call to unknown function `{0}`")]
    UnknownFunction(String),

    #[error("goto at `{0}`:{1} jumps outside the function")]
    JumpOutOfRange(String, usize),

    #[error("input exhausted in `{0}`")]
    InputExhausted(&'static str),
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Parse(String),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error("internal compiler error: {0}")]
    Codegen(#[from] CodegenError),

    #[error("runtime error: {0}")]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// 是否为编译器自身的缺陷（而不是用户源程序的问题）
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Codegen(_))
    }
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;
