use super::operand::Operand;

/// `Instruction::Op` 的操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // dest = op1（op1为字面量 / 变量）
    Def,
    FDef,
    Mov,
    FMov,
    // dest = (float)op1 / (int)op1
    CvtI2F,
    CvtF2I,
    // dest = op1 <op> op2
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    FAdd,
    FSub,
    FMul,
    FDiv,
    // 比较结果均为Int
    Lss,
    Leq,
    Gtr,
    Geq,
    Eq,
    Neq,
    FLss,
    FLeq,
    FGtr,
    FGeq,
    FEq,
    FNeq,
    // dest = !op1
    Not,
    And,
    Or,
    // dest = op1[op2]
    Load,
    // op1[op2] = dest
    Store,
    // dest = &op1[op2]
    GetPtr,
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Def => "def",
            Operator::FDef => "fdef",
            Operator::Mov => "mov",
            Operator::FMov => "fmov",
            Operator::CvtI2F => "cvt_i2f",
            Operator::CvtF2I => "cvt_f2i",
            Operator::Add => "add",
            Operator::Sub => "sub",
            Operator::Mul => "mul",
            Operator::Div => "div",
            Operator::Mod => "mod",
            Operator::FAdd => "fadd",
            Operator::FSub => "fsub",
            Operator::FMul => "fmul",
            Operator::FDiv => "fdiv",
            Operator::Lss => "lss",
            Operator::Leq => "leq",
            Operator::Gtr => "gtr",
            Operator::Geq => "geq",
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::FLss => "flss",
            Operator::FLeq => "fleq",
            Operator::FGtr => "fgtr",
            Operator::FGeq => "fgeq",
            Operator::FEq => "feq",
            Operator::FNeq => "fneq",
            Operator::Not => "not",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Load => "load",
            Operator::Store => "store",
            Operator::GetPtr => "getptr",
        }
    }
}

/// break / continue 的占位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopJump {
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Op {
        op: Operator,
        op1: Operand,
        op2: Operand,
        dest: Operand,
    },
    /// 在栈上为 dest 预留 size 个字
    Alloc { size: usize, dest: Operand },
    /// dest 为 Null 表示无返回值
    Call {
        callee: String,
        args: Vec<Operand>,
        dest: Operand,
    },
    /// cond 为 Null 时无条件跳转，目标为 当前下标 + offset
    Goto { cond: Operand, offset: i32 },
    Return { value: Operand },
    /// 等待所在循环回填的 break / continue
    Unresolved(LoopJump),
}

impl Instruction {
    pub fn op(op: Operator, op1: Operand, op2: Operand, dest: Operand) -> Self {
        Instruction::Op { op, op1, op2, dest }
    }

    pub fn unary(op: Operator, op1: Operand, dest: Operand) -> Self {
        Instruction::Op {
            op,
            op1,
            op2: Operand::null(),
            dest,
        }
    }

    pub fn goto(offset: i32) -> Self {
        Instruction::Goto {
            cond: Operand::null(),
            offset,
        }
    }

    pub fn branch(cond: Operand, offset: i32) -> Self {
        Instruction::Goto { cond, offset }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instruction::Return { .. })
    }

    /// 跳转目标下标；非跳转指令返回 None
    pub fn jump_target(&self, index: usize) -> Option<usize> {
        match self {
            Instruction::Goto { offset, .. } => {
                let target = index as i64 + *offset as i64;
                usize::try_from(target).ok()
            }
            _ => None,
        }
    }

    /// 指令引用的所有操作数（含被写入的 dest）
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instruction::Op { op1, op2, dest, .. } => vec![dest, op1, op2],
            Instruction::Alloc { dest, .. } => vec![dest],
            Instruction::Call { args, dest, .. } => {
                let mut v = vec![dest];
                v.extend(args.iter());
                v
            }
            Instruction::Goto { cond, .. } => vec![cond],
            Instruction::Return { value } => vec![value],
            Instruction::Unresolved(_) => vec![],
        }
    }
}
