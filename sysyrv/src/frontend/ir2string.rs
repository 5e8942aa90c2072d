use std::fmt;

use super::ir::{
    function::Function,
    instruction::{Instruction, LoopJump, Operator},
    operand::{Operand, OperandType},
    program::{GlobalVal, Program},
};

impl Program {
    pub fn get_ir_string(&self) -> String {
        let mut ir = String::new();
        for global in self.global_vals.iter() {
            ir += &format!("{}\n", global);
        }
        if !self.global_vals.is_empty() {
            ir += "\n";
        }
        for func in self.functions.iter() {
            ir += &format!("{}\n", func);
        }
        ir
    }
}

impl fmt::Display for OperandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperandType::Int | OperandType::IntLiteral => "int",
            OperandType::Float | OperandType::FloatLiteral => "float",
            OperandType::IntPtr => "int*",
            OperandType::FloatPtr => "float*",
            OperandType::Null => "void",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for GlobalVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.array_len {
            Some(len) => write!(f, "global {}: {}[{}]", self.operand, self.operand.typ, len),
            None => write!(f, "global {}: {}", self.operand, self.operand.typ),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Op { op, op1, op2, dest } => match op {
                Operator::Store => write!(f, "store {}[{}], {}", op1, op2, dest),
                Operator::Load => write!(f, "{} = load {}[{}]", dest, op1, op2),
                Operator::GetPtr => write!(f, "{} = getptr {}[{}]", dest, op1, op2),
                _ if op2.is_null() => write!(f, "{} = {} {}", dest, op, op1),
                _ => write!(f, "{} = {} {}, {}", dest, op, op1, op2),
            },
            Instruction::Alloc { size, dest } => write!(f, "{} = alloc {}", dest, size),
            Instruction::Call { callee, args, dest } => {
                let args = args
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                if dest.is_null() {
                    write!(f, "call {}({})", callee, args)
                } else {
                    write!(f, "{} = call {}({})", dest, callee, args)
                }
            }
            Instruction::Goto { cond, offset } => {
                if cond.is_null() {
                    write!(f, "goto {:+}", offset)
                } else {
                    write!(f, "goto {}, {:+}", cond, offset)
                }
            }
            Instruction::Return { value } => {
                if value.is_null() {
                    write!(f, "return")
                } else {
                    write!(f, "return {}", value)
                }
            }
            Instruction::Unresolved(LoopJump::Break) => write!(f, "<break>"),
            Instruction::Unresolved(LoopJump::Continue) => write!(f, "<continue>"),
        }
    }
}

// 指令前带下标，便于核对相对跳转
impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p, p.typ))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "fn {}({}) -> {} {{", self.name, params, self.return_type)?;
        for (i, inst) in self.body.iter().enumerate() {
            writeln!(f, "{:>4}: {}", i, inst)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_display() {
        let a = Operand::new("a.3", OperandType::IntPtr);
        let t = Operand::new("temp_0", OperandType::Int);
        assert_eq!(
            Instruction::op(Operator::Add, t.clone(), Operand::int_literal(1), t.clone()).to_string(),
            "temp_0 = add temp_0, 1"
        );
        assert_eq!(
            Instruction::op(Operator::Store, a.clone(), Operand::int_literal(2), t.clone()).to_string(),
            "store a.3[2], temp_0"
        );
        assert_eq!(Instruction::goto(-3).to_string(), "goto -3");
        assert_eq!(Instruction::branch(t.clone(), 2).to_string(), "goto temp_0, +2");
        assert_eq!(
            Instruction::Call {
                callee: "putint".into(),
                args: vec![t],
                dest: Operand::null()
            }
            .to_string(),
            "call putint(temp_0)"
        );
        assert_eq!(
            Instruction::unary(Operator::CvtI2F, Operand::new("x.2", OperandType::Int), Operand::new("temp_1", OperandType::Float)).to_string(),
            "temp_1 = cvt_i2f x.2"
        );
    }

    #[test]
    fn function_listing_has_indices() {
        let mut func = Function::new("f", vec![Operand::new("n.2", OperandType::Int)], OperandType::Int);
        func.add_inst(Instruction::Return {
            value: Operand::new("n.2", OperandType::Int),
        });
        assert_eq!(func.to_string(), "fn f(n.2: int) -> int {\n   0: return n.2\n}");
    }
}
