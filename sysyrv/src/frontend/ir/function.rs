use super::instruction::Instruction;
use super::operand::{Operand, OperandType};

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// Int / Float / Null(void)
    pub return_type: OperandType,
    pub parameters: Vec<Operand>,
    pub body: Vec<Instruction>,
}

impl Function {
    /// 创建一个新的函数
    pub fn new(name: impl Into<String>, parameters: Vec<Operand>, return_type: OperandType) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameters,
            body: Vec::new(),
        }
    }

    pub fn add_inst(&mut self, inst: Instruction) {
        self.body.push(inst);
    }

    pub fn is_void(&self) -> bool {
        self.return_type == OperandType::Null
    }

    /// 是否存在跳转到 body 末尾之后的 goto
    pub fn jumps_past_end(&self) -> bool {
        let end = self.body.len();
        self.body
            .iter()
            .enumerate()
            .any(|(i, inst)| inst.jump_target(i) == Some(end))
    }
}
