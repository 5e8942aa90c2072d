use hexponent::FloatLiteral;
use std::fmt;

/// Parse a hexadecimal float literal such as `0x1.8p3` into an f32.
pub fn parse_hexadecimal_float(s: &str) -> Result<f32, &'static str> {
    let float_literal: FloatLiteral = s.parse().map_err(|_| "malformed hexadecimal float")?;
    // 先转换为f64再截断，保证精度
    let result = float_literal.convert::<f64>();
    Ok(result.inner() as f32)
}

// CompUnit -> [CompUnit](Decl|FuncDef)
#[derive(Debug)]
pub struct CompUnit {
    pub items: Vec<GlobalItem>,
}

#[derive(Debug)]
pub enum GlobalItem {
    Decl(Decl),
    FuncDef(FuncDef),
}

/// 基本类型；`Void` 只出现在函数返回值处
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BType {
    Int,
    Float,
    Void,
}

impl fmt::Display for BType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BType::Int => write!(f, "int"),
            BType::Float => write!(f, "float"),
            BType::Void => write!(f, "void"),
        }
    }
}

// Decl -> ConstDecl|VarDecl
#[derive(Debug)]
pub enum Decl {
    ConstDecl(ConstDecl),
    VarDecl(VarDecl),
}

// ConstDecl -> "const" BType ConstDef{"," ConstDef}
#[derive(Debug)]
pub struct ConstDecl {
    pub typ: BType,
    pub defs: Vec<ConstDef>,
}

// ConstDef -> Ident{'['ConstExp']'} '=' ConstInitVal
#[derive(Debug)]
pub struct ConstDef {
    pub id: String,
    pub dimensions: Vec<Exp>,
    pub init: InitVal,
}

// VarDecl -> Btype VarDef{',' VarDef}';'
#[derive(Debug)]
pub struct VarDecl {
    pub typ: BType,
    pub defs: Vec<VarDef>,
}

// VarDef -> Ident{'['ConstExp']'} | Ident{'['ConstExp']'}' '=' InitVal
#[derive(Debug)]
pub struct VarDef {
    pub id: String,
    pub dimensions: Vec<Exp>,
    pub init: Option<InitVal>,
}

// InitVal -> Exp | '{'[InitVal{','InitVal}]'}'
// ConstInitVal 与 InitVal 结构相同，共用一个类型
#[derive(Debug, Clone)]
pub enum InitVal {
    Exp(Exp),
    List(Vec<InitVal>),
}

// FuncDef -> FuncType Ident '(' [FuncFParams] ')' Block
#[derive(Debug)]
pub struct FuncDef {
    pub typ: BType,
    pub id: String,
    pub params: Vec<FuncFParam>,
    pub block: Block,
}

// FuncFParam -> BType Ident ['[' ']' {'[' Exp ']'}]
// dimensions 为 None 表示标量参数；Some 中不含被省略的第一维
#[derive(Debug)]
pub struct FuncFParam {
    pub typ: BType,
    pub id: String,
    pub dimensions: Option<Vec<Exp>>,
}

// Block -> '{'{BlockItem}'}'
#[derive(Debug)]
pub struct Block {
    pub items: Vec<BlockItem>,
}

// BlockItem -> Decl | Stmt
#[derive(Debug)]
pub enum BlockItem {
    Decl(Decl),
    Stmt(Stmt),
}

/* Stmt ->   LVal '=' Exp';'
           | [Exp]';'
           | Block
           | 'if'(Cond) Stmt ['else' Stmt]
           | 'while'(Cond) Stmt
           | 'break';'
           | 'continue';'
           | 'return' [Exp]';'
*/
#[derive(Debug)]
pub enum Stmt {
    Assign(Assign),
    ExpStmt(ExpStmt),
    Block(Block),
    If(Box<If>),
    While(Box<While>),
    Break(Break),
    Continue(Continue),
    Return(Return),
}

#[derive(Debug)]
pub struct Assign {
    pub lval: LVal,
    pub exp: Exp,
}

#[derive(Debug)]
pub struct ExpStmt {
    pub exp: Option<Exp>,
}

#[derive(Debug)]
pub struct If {
    pub cond: Exp,
    pub then: Stmt,
    pub else_then: Option<Stmt>,
}

#[derive(Debug)]
pub struct While {
    pub cond: Exp,
    pub block: Stmt,
}

#[derive(Debug)]
pub struct Break;

#[derive(Debug)]
pub struct Continue;

#[derive(Debug)]
pub struct Return {
    pub exp: Option<Exp>,
}

#[derive(Debug, Clone)]
pub enum Exp {
    Const(ComptimeValue),
    Binary(BinaryOp, Box<Exp>, Box<Exp>),
    Unary(UnaryOp, Box<Exp>),
    FuncCall(FuncCall),
    LVal(LVal),
}

impl Exp {
    pub fn const_(val: ComptimeValue) -> Self {
        Exp::Const(val)
    }

    pub fn binary(op: BinaryOp, lhs: Exp, rhs: Exp) -> Self {
        Exp::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn unary(op: UnaryOp, expr: Exp) -> Self {
        Exp::Unary(op, Box::new(expr))
    }

    pub fn func_call(id: String, args: Vec<Exp>) -> Self {
        Exp::FuncCall(FuncCall { id, args })
    }

    pub fn lval(lval: LVal) -> Self {
        Exp::LVal(lval)
    }
}

#[derive(Debug, Clone)]
pub struct LVal {
    pub id: String,
    pub dimensions: Vec<Exp>,
}

#[derive(Debug, Clone)]
pub struct FuncCall {
    pub id: String,
    pub args: Vec<Exp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, //add
    Sub, //substraction
    Mul, //multiplication
    Div, //division
    Mod, //modulus
    Lt,  //less than
    Gt,  //greater than
    Le,  //less than or equal to
    Ge,  //greater than or equal to
    Eq,  //equal to
    Ne,  //not equal to
    And, //logical and
    Or,  //logical or
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Pos, //unary plus
    Neg, //negation
    Not, //logical not
}

/// 编译期常量，用于常量折叠
#[derive(Debug, Clone, Copy)]
pub enum ComptimeValue {
    Int(i32),
    Float(f32),
}

impl ComptimeValue {
    pub fn int(i: i32) -> Self {
        ComptimeValue::Int(i)
    }

    pub fn float(f: f32) -> Self {
        ComptimeValue::Float(f)
    }

    pub fn bool(b: bool) -> Self {
        ComptimeValue::Int(b as i32)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ComptimeValue::Float(_))
    }

    /// 转为int，float截断
    pub fn to_int(self) -> i32 {
        match self {
            ComptimeValue::Int(i) => i,
            ComptimeValue::Float(f) => f as i32,
        }
    }

    pub fn to_float(self) -> f32 {
        match self {
            ComptimeValue::Int(i) => i as f32,
            ComptimeValue::Float(f) => f,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            ComptimeValue::Int(i) => *i == 0,
            ComptimeValue::Float(f) => *f == 0.0,
        }
    }

    /// 两个操作数中有一个为float时，结果提升为float
    fn promote(self, other: Self) -> (Self, Self) {
        if self.is_float() || other.is_float() {
            (
                ComptimeValue::Float(self.to_float()),
                ComptimeValue::Float(other.to_float()),
            )
        } else {
            (self, other)
        }
    }

    /// 整数除零不折叠，返回None
    pub fn checked_div(self, other: Self) -> Option<Self> {
        match self.promote(other) {
            (ComptimeValue::Int(_), ComptimeValue::Int(0)) => None,
            (ComptimeValue::Int(x), ComptimeValue::Int(y)) => Some(ComptimeValue::Int(x.wrapping_div(y))),
            (x, y) => Some(ComptimeValue::Float(x.to_float() / y.to_float())),
        }
    }

    /// 仅对int有定义
    pub fn checked_rem(self, other: Self) -> Option<Self> {
        match (self, other) {
            (ComptimeValue::Int(_), ComptimeValue::Int(0)) => None,
            (ComptimeValue::Int(x), ComptimeValue::Int(y)) => Some(ComptimeValue::Int(x.wrapping_rem(y))),
            _ => None,
        }
    }

    pub fn compare(self, op: BinaryOp, other: Self) -> Self {
        let result = match self.promote(other) {
            (ComptimeValue::Int(x), ComptimeValue::Int(y)) => match op {
                BinaryOp::Lt => x < y,
                BinaryOp::Gt => x > y,
                BinaryOp::Le => x <= y,
                BinaryOp::Ge => x >= y,
                BinaryOp::Eq => x == y,
                BinaryOp::Ne => x != y,
                _ => unreachable!("not a comparison: {:?}", op),
            },
            (x, y) => {
                let (x, y) = (x.to_float(), y.to_float());
                match op {
                    BinaryOp::Lt => x < y,
                    BinaryOp::Gt => x > y,
                    BinaryOp::Le => x <= y,
                    BinaryOp::Ge => x >= y,
                    BinaryOp::Eq => x == y,
                    BinaryOp::Ne => x != y,
                    _ => unreachable!("not a comparison: {:?}", op),
                }
            }
        };
        ComptimeValue::bool(result)
    }

    pub fn logical_and(self, other: Self) -> Self {
        ComptimeValue::bool(!self.is_zero() && !other.is_zero())
    }

    pub fn logical_or(self, other: Self) -> Self {
        ComptimeValue::bool(!self.is_zero() || !other.is_zero())
    }
}

impl fmt::Display for ComptimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComptimeValue::Int(i) => write!(f, "{}", i),
            ComptimeValue::Float(x) => write!(f, "{}", x),
        }
    }
}

/* Start: ComptimeValue的运算符重载 包含：-、!、+、-、* */
impl std::ops::Neg for ComptimeValue {
    type Output = Self;

    fn neg(self) -> Self {
        match self {
            ComptimeValue::Int(x) => ComptimeValue::Int(x.wrapping_neg()),
            ComptimeValue::Float(x) => ComptimeValue::Float(-x),
        }
    }
}

impl std::ops::Not for ComptimeValue {
    type Output = Self;

    fn not(self) -> Self {
        ComptimeValue::bool(self.is_zero())
    }
}

impl std::ops::Add for ComptimeValue {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        match self.promote(other) {
            (ComptimeValue::Int(x), ComptimeValue::Int(y)) => ComptimeValue::Int(x.wrapping_add(y)),
            (x, y) => ComptimeValue::Float(x.to_float() + y.to_float()),
        }
    }
}

impl std::ops::Sub for ComptimeValue {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        match self.promote(other) {
            (ComptimeValue::Int(x), ComptimeValue::Int(y)) => ComptimeValue::Int(x.wrapping_sub(y)),
            (x, y) => ComptimeValue::Float(x.to_float() - y.to_float()),
        }
    }
}

impl std::ops::Mul for ComptimeValue {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        match self.promote(other) {
            (ComptimeValue::Int(x), ComptimeValue::Int(y)) => ComptimeValue::Int(x.wrapping_mul(y)),
            (x, y) => ComptimeValue::Float(x.to_float() * y.to_float()),
        }
    }
}
/* End: ComptimeValue的运算符重载 */

impl PartialEq for ComptimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ComptimeValue::Int(x), ComptimeValue::Int(y)) => x == y,
            (ComptimeValue::Float(x), ComptimeValue::Float(y)) => x == y,
            // Int -> Float
            (ComptimeValue::Int(x), ComptimeValue::Float(y)) => *x as f32 == *y,
            (ComptimeValue::Float(x), ComptimeValue::Int(y)) => *x == *y as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic_wraps() {
        let max = ComptimeValue::int(i32::MAX);
        assert_eq!(max + ComptimeValue::int(1), ComptimeValue::int(i32::MIN));
        assert_eq!(-ComptimeValue::int(i32::MIN), ComptimeValue::int(i32::MIN));
        assert_eq!(
            ComptimeValue::int(i32::MIN).checked_div(ComptimeValue::int(-1)),
            Some(ComptimeValue::int(i32::MIN))
        );
    }

    #[test]
    fn mixed_operands_promote_to_float() {
        let v = ComptimeValue::int(3) * ComptimeValue::float(0.5);
        assert!(v.is_float());
        assert_eq!(v.to_float(), 1.5);
        assert_eq!(
            ComptimeValue::int(7).checked_div(ComptimeValue::float(2.0)),
            Some(ComptimeValue::float(3.5))
        );
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        assert_eq!(ComptimeValue::int(1).checked_div(ComptimeValue::int(0)), None);
        assert_eq!(ComptimeValue::int(1).checked_rem(ComptimeValue::int(0)), None);
        assert_eq!(ComptimeValue::float(1.0).checked_rem(ComptimeValue::float(2.0)), None);
    }

    #[test]
    fn comparisons_yield_int() {
        let lt = ComptimeValue::float(1.5).compare(BinaryOp::Lt, ComptimeValue::int(2));
        assert!(matches!(lt, ComptimeValue::Int(1)));
        let ne = ComptimeValue::int(4).compare(BinaryOp::Ne, ComptimeValue::int(4));
        assert!(matches!(ne, ComptimeValue::Int(0)));
        assert!(matches!(!ComptimeValue::float(0.0), ComptimeValue::Int(1)));
    }

    #[test]
    fn hex_float_literal() {
        assert_eq!(parse_hexadecimal_float("0x1.8p1"), Ok(3.0));
        assert_eq!(parse_hexadecimal_float("0x1p-2"), Ok(0.25));
    }
}
