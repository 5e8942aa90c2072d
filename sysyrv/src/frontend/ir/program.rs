use rustc_hash::FxHashSet as HashSet;

use super::function::Function;
use super::operand::Operand;

/// 全局变量；array_len 为 None 表示标量
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVal {
    pub operand: Operand,
    pub array_len: Option<usize>,
}

impl GlobalVal {
    pub fn new(operand: Operand, array_len: Option<usize>) -> Self {
        Self { operand, array_len }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub global_vals: Vec<GlobalVal>,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn add_function(&mut self, func: Function) {
        self.functions.push(func);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global_names(&self) -> HashSet<String> {
        self.global_vals
            .iter()
            .map(|g| g.operand.name.clone())
            .collect()
    }
}
