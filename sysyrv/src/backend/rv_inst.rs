use super::regs::PReg;

/// 寄存器-立即数运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IOp {
    Addi,
    Slti,
    Xori,
    Slli,
}

/// 寄存器-寄存器运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ROp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Slt,
    And,
    Or,
    Xor,
}

/// 与零比较
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Seqz,
    Snez,
}

/// 单精度浮点运算；比较指令的 rd 为整数寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    Flt,
    Fle,
    Feq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RvInst {
    Label(String),
    Li { rd: PReg, imm: i32 },
    La { rd: PReg, sym: String },
    /// 按 rd 所属寄存器文件选择 lw / flw
    Load { rd: PReg, base: PReg, offset: i32 },
    /// 按 rs 所属寄存器文件选择 sw / fsw
    Store { rs: PReg, base: PReg, offset: i32 },
    IType { op: IOp, rd: PReg, rs1: PReg, imm: i32 },
    RType { op: ROp, rd: PReg, rs1: PReg, rs2: PReg },
    Set { op: SetOp, rd: PReg, rs: PReg },
    FRType { op: FOp, rd: PReg, rs1: PReg, rs2: PReg },
    /// int -> float
    FcvtSW { rd: PReg, rs: PReg },
    /// float -> int，向零舍入
    FcvtWS { rd: PReg, rs: PReg },
    FmvWX { rd: PReg, rs: PReg },
    Beqz { rs: PReg, label: String },
    J { label: String },
    Call { func: String },
    Ret,
}

impl RvInst {
    pub fn addi(rd: PReg, rs1: PReg, imm: i32) -> Self {
        RvInst::IType { op: IOp::Addi, rd, rs1, imm }
    }

    pub fn rtype(op: ROp, rd: PReg, rs1: PReg, rs2: PReg) -> Self {
        RvInst::RType { op, rd, rs1, rs2 }
    }
}

/// 全局变量，放在 .data 段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmData {
    pub name: String,
    /// 以字为单位
    pub words: usize,
    pub is_array: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmFunction {
    pub name: String,
    pub insts: Vec<RvInst>,
}

/// 一个编译单元生成的全部汇编
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsmModule {
    pub data: Vec<AsmData>,
    pub funcs: Vec<AsmFunction>,
}
