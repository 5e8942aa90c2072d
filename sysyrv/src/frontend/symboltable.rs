use rustc_hash::FxHashMap as HashMap;

use super::ir::operand::{Operand, OperandType};
use super::lalrpop::ast::ComptimeValue;
use crate::error::SemanticError;

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub operand: Operand,
    /// 为空表示标量；数组形参的第一维为 -1
    pub dimension: Vec<i32>,
    /// const 数组展开后的常量值
    pub values: Option<Vec<ComptimeValue>>,
}

impl SymbolEntry {
    pub fn scalar(operand: Operand) -> Self {
        Self {
            operand,
            dimension: vec![],
            values: None,
        }
    }

    pub fn array(operand: Operand, dimension: Vec<i32>) -> Self {
        Self {
            operand,
            dimension,
            values: None,
        }
    }

    pub fn is_array(&self) -> bool {
        !self.dimension.is_empty()
    }

    /// const 标量以字面量形式保存
    pub fn is_const(&self) -> bool {
        self.operand.is_literal() || self.values.is_some()
    }
}

/// 函数签名
#[derive(Debug, Clone, PartialEq)]
pub struct FuncSignature {
    pub name: String,
    pub return_type: OperandType,
    pub params: Vec<Operand>,
}

impl FuncSignature {
    pub fn new(name: &str, params: Vec<Operand>, return_type: OperandType) -> Self {
        Self {
            name: name.to_string(),
            return_type,
            params,
        }
    }
}

/// SysY 运行时库函数表，每次编译单独构造
#[derive(Debug, Clone)]
pub struct LibraryRegistry {
    funcs: HashMap<String, FuncSignature>,
}

impl LibraryRegistry {
    pub fn sysy() -> Self {
        use OperandType::*;
        let p = |name: &str, typ| Operand::new(name, typ);
        let sigs = [
            FuncSignature::new("getint", vec![], Int),
            FuncSignature::new("getch", vec![], Int),
            FuncSignature::new("getfloat", vec![], Float),
            FuncSignature::new("getarray", vec![p("arr", IntPtr)], Int),
            FuncSignature::new("getfarray", vec![p("arr", FloatPtr)], Int),
            FuncSignature::new("putint", vec![p("i", Int)], Null),
            FuncSignature::new("putch", vec![p("i", Int)], Null),
            FuncSignature::new("putfloat", vec![p("f", Float)], Null),
            FuncSignature::new("putarray", vec![p("n", Int), p("arr", IntPtr)], Null),
            FuncSignature::new("putfarray", vec![p("n", Int), p("arr", FloatPtr)], Null),
            FuncSignature::new("_sysy_starttime", vec![p("lineno", Int)], Null),
            FuncSignature::new("_sysy_stoptime", vec![p("lineno", Int)], Null),
        ];
        let funcs = sigs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { funcs }
    }

    pub fn get(&self, name: &str) -> Option<&FuncSignature> {
        self.funcs.get(name)
    }
}

pub struct SymbolTable {
    stack: Vec<HashMap<String, SymbolEntry>>,
    functions: HashMap<String, FuncSignature>,
    library: LibraryRegistry,
}

impl SymbolTable {
    pub fn new(library: LibraryRegistry) -> Self {
        Self {
            stack: vec![],
            functions: HashMap::default(),
            library,
        }
    }

    pub fn push_scope(&mut self) {
        self.stack.push(HashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.stack.pop();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// 声明时使用的名字：标识符加上当前作用域深度
    pub fn scoped_name(&self, id: &str) -> String {
        format!("{}.{}", id, self.depth())
    }

    pub fn declare(&mut self, id: &str, entry: SymbolEntry) -> Result<(), SemanticError> {
        if self.stack.is_empty() {
            self.push_scope();
        }
        let depth = self.stack.len();
        let scope = &mut self.stack[depth - 1];
        if scope.contains_key(id) {
            return Err(SemanticError::Redefinition(id.to_string()));
        }
        scope.insert(id.to_string(), entry);
        Ok(())
    }

    /// 由内向外查找，内层同名声明遮蔽外层
    pub fn resolve(&self, id: &str) -> Result<&SymbolEntry, SemanticError> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(id))
            .ok_or_else(|| SemanticError::Undeclared(id.to_string()))
    }

    pub fn declare_function(&mut self, sig: FuncSignature) -> Result<(), SemanticError> {
        if self.functions.contains_key(&sig.name) {
            return Err(SemanticError::Redefinition(sig.name));
        }
        self.functions.insert(sig.name.clone(), sig);
        Ok(())
    }

    /// 用户定义优先，其次是库函数
    pub fn function(&self, name: &str) -> Result<&FuncSignature, SemanticError> {
        self.functions
            .get(name)
            .or_else(|| self.library.get(name))
            .ok_or_else(|| SemanticError::Undeclared(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str) -> SymbolEntry {
        SymbolEntry::scalar(Operand::new(name, OperandType::Int))
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new(LibraryRegistry::sysy());
        table.push_scope();
        table.declare("a", int("a.1")).unwrap();
        table.push_scope();
        table.declare("a", int("a.2")).unwrap();
        assert_eq!(table.resolve("a").unwrap().operand.name, "a.2");
        table.pop_scope();
        assert_eq!(table.resolve("a").unwrap().operand.name, "a.1");
    }

    #[test]
    fn scoped_name_follows_depth() {
        let mut table = SymbolTable::new(LibraryRegistry::sysy());
        table.push_scope();
        assert_eq!(table.scoped_name("x"), "x.1");
        table.push_scope();
        table.push_scope();
        assert_eq!(table.scoped_name("x"), "x.3");
    }

    #[test]
    fn undeclared_and_redefined_names_are_errors() {
        let mut table = SymbolTable::new(LibraryRegistry::sysy());
        table.push_scope();
        assert_eq!(
            table.resolve("nope").unwrap_err(),
            SemanticError::Undeclared("nope".into())
        );
        table.declare("b", int("b.1")).unwrap();
        assert!(matches!(
            table.declare("b", int("b.1")),
            Err(SemanticError::Redefinition(_))
        ));
    }

    #[test]
    fn user_functions_shadow_library() {
        let mut table = SymbolTable::new(LibraryRegistry::sysy());
        assert_eq!(table.function("getint").unwrap().return_type, OperandType::Int);
        table
            .declare_function(FuncSignature::new("putint", vec![], OperandType::Float))
            .unwrap();
        assert_eq!(table.function("putint").unwrap().return_type, OperandType::Float);
        assert!(table.function("missing").is_err());
    }
}
