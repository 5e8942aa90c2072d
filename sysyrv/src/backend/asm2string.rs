use std::fmt;

use super::{
    regs::{abi_name, PReg},
    rv_inst::{AsmModule, FOp, IOp, ROp, RvInst, SetOp},
};

impl fmt::Display for PReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", abi_name(*self))
    }
}

impl IOp {
    fn mnemonic(&self) -> &'static str {
        match self {
            IOp::Addi => "addi",
            IOp::Slti => "slti",
            IOp::Xori => "xori",
            IOp::Slli => "slli",
        }
    }
}

impl ROp {
    fn mnemonic(&self) -> &'static str {
        match self {
            ROp::Add => "add",
            ROp::Sub => "sub",
            ROp::Mul => "mul",
            ROp::Div => "div",
            ROp::Rem => "rem",
            ROp::Slt => "slt",
            ROp::And => "and",
            ROp::Or => "or",
            ROp::Xor => "xor",
        }
    }
}

impl FOp {
    fn mnemonic(&self) -> &'static str {
        match self {
            FOp::FAdd => "fadd.s",
            FOp::FSub => "fsub.s",
            FOp::FMul => "fmul.s",
            FOp::FDiv => "fdiv.s",
            FOp::Flt => "flt.s",
            FOp::Fle => "fle.s",
            FOp::Feq => "feq.s",
        }
    }
}

impl fmt::Display for RvInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RvInst::Label(label) => write!(f, "{}:", label),
            RvInst::Li { rd, imm } => write!(f, "li {}, {}", rd, imm),
            RvInst::La { rd, sym } => write!(f, "la {}, {}", rd, sym),
            RvInst::Load { rd, base, offset } => {
                let op = if rd.is_float() { "flw" } else { "lw" };
                write!(f, "{} {}, {}({})", op, rd, offset, base)
            }
            RvInst::Store { rs, base, offset } => {
                let op = if rs.is_float() { "fsw" } else { "sw" };
                write!(f, "{} {}, {}({})", op, rs, offset, base)
            }
            RvInst::IType { op, rd, rs1, imm } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), rd, rs1, imm)
            }
            RvInst::RType { op, rd, rs1, rs2 } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), rd, rs1, rs2)
            }
            RvInst::Set { op, rd, rs } => {
                let op = match op {
                    SetOp::Seqz => "seqz",
                    SetOp::Snez => "snez",
                };
                write!(f, "{} {}, {}", op, rd, rs)
            }
            RvInst::FRType { op, rd, rs1, rs2 } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), rd, rs1, rs2)
            }
            RvInst::FcvtSW { rd, rs } => write!(f, "fcvt.s.w {}, {}", rd, rs),
            RvInst::FcvtWS { rd, rs } => write!(f, "fcvt.w.s {}, {}, rtz", rd, rs),
            RvInst::FmvWX { rd, rs } => write!(f, "fmv.w.x {}, {}", rd, rs),
            RvInst::Beqz { rs, label } => write!(f, "beqz {}, {}", rs, label),
            RvInst::J { label } => write!(f, "j {}", label),
            RvInst::Call { func } => write!(f, "call {}", func),
            RvInst::Ret => write!(f, "ret"),
        }
    }
}

impl AsmModule {
    pub fn get_asm(&self) -> String {
        let mut asm = String::new();
        for data in self.data.iter() {
            asm += "\t.data\n";
            asm += "\t.align 2\n";
            asm += format!("\t.global {}\n", data.name).as_str();
            asm += format!("\t.type {}, @object\n", data.name).as_str();
            asm += format!("\t.size {}, {}\n", data.name, 4 * data.words).as_str();
            asm += format!("{}:\n", data.name).as_str();
            if data.is_array {
                asm += format!("\t.space {}\n", 4 * data.words).as_str();
            } else {
                asm += "\t.word 0\n";
            }
        }
        if !self.data.is_empty() {
            asm += "\n";
        }

        asm += "\t.text\n";
        for func in self.funcs.iter() {
            asm += format!("\t.global {}\n", func.name).as_str();
            asm += format!("\t.type {}, @function\n", func.name).as_str();
            asm += format!("{}:\n", func.name).as_str();
            for inst in func.insts.iter() {
                match inst {
                    // 标签顶格输出
                    RvInst::Label(_) => asm += format!("{}\n", inst).as_str(),
                    _ => asm += format!("\t{}\n", inst).as_str(),
                }
            }
            asm += format!("\t.size {}, .-{}\n", func.name, func.name).as_str();
            asm += "\n";
        }
        asm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::regs::*;
    use crate::backend::rv_inst::{AsmData, AsmFunction};

    #[test]
    fn instruction_text() {
        assert_eq!(RvInst::Load { rd: ft0(), base: sp(), offset: 8 }.to_string(), "flw ft0, 8(sp)");
        assert_eq!(RvInst::Store { rs: t0(), base: t3(), offset: 0 }.to_string(), "sw t0, 0(t3)");
        assert_eq!(RvInst::addi(sp(), sp(), -16).to_string(), "addi sp, sp, -16");
        assert_eq!(RvInst::FcvtWS { rd: t2(), rs: ft0() }.to_string(), "fcvt.w.s t2, ft0, rtz");
        assert_eq!(
            RvInst::FRType { op: FOp::Flt, rd: t2(), rs1: ft0(), rs2: ft1() }.to_string(),
            "flt.s t2, ft0, ft1"
        );
    }

    #[test]
    fn module_layout() {
        let module = AsmModule {
            data: vec![
                AsmData { name: "n.1".into(), words: 1, is_array: false },
                AsmData { name: "buf.1".into(), words: 10, is_array: true },
            ],
            funcs: vec![AsmFunction {
                name: "main".into(),
                insts: vec![RvInst::Label(".L0".into()), RvInst::Ret],
            }],
        };
        let asm = module.get_asm();
        assert!(asm.contains("\t.size n.1, 4\nn.1:\n\t.word 0\n"));
        assert!(asm.contains("buf.1:\n\t.space 40\n"));
        assert!(asm.contains("\t.type main, @function\nmain:\n.L0:\n\tret\n\t.size main, .-main\n"));
    }
}
