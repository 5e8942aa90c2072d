use tracing::debug;

use super::{
    ir::{
        function::Function,
        instruction::{Instruction, LoopJump, Operator},
        operand::{Operand, OperandType},
        program::{GlobalVal, Program},
    },
    lalrpop::ast::{
        Assign, BType, BinaryOp, Block, BlockItem, CompUnit, ComptimeValue, ConstDecl, ConstDef,
        Decl, Exp, ExpStmt, FuncCall, FuncDef, GlobalItem, If, InitVal, LVal, Return, Stmt,
        UnaryOp, VarDecl, VarDef, While,
    },
    symboltable::{FuncSignature, LibraryRegistry, SymbolEntry, SymbolTable},
};
use crate::error::SemanticError;

type Result<T> = std::result::Result<T, SemanticError>;

/// 元素个数超过该值的局部数组用循环清零，否则逐个 store
const ZERO_FILL_THRESHOLD: usize = 16;

/// 全局初始化函数名
pub const GLOBAL_INIT_FUNC: &str = "_global";

/// AST 节点到 IR 的翻译；buffer 为当前写入的指令序列
pub trait IrGen {
    type Output;
    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<Self::Output>;
}

pub struct Analyzer {
    /// 符号表
    symboltable: SymbolTable,
    /// 临时变量计数器
    tmp_cnt: usize,
    global_vals: Vec<GlobalVal>,
    // 当前函数的返回类型
    cur_ret_type: OperandType,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn literal(v: ComptimeValue) -> Operand {
    match v {
        ComptimeValue::Int(i) => Operand::int_literal(i),
        ComptimeValue::Float(f) => Operand::float_literal(f),
    }
}

fn comptime(op: &Operand) -> Option<ComptimeValue> {
    match op.typ {
        OperandType::IntLiteral => op.as_int().map(ComptimeValue::Int),
        OperandType::FloatLiteral => op.as_float().map(ComptimeValue::Float),
        _ => None,
    }
}

fn zero_of(typ: OperandType) -> Operand {
    match typ {
        OperandType::Float | OperandType::FloatLiteral => Operand::float_literal(0.0),
        _ => Operand::int_literal(0),
    }
}

fn is_zero_literal(op: &Operand) -> bool {
    comptime(op).map_or(false, |v| v.is_zero())
}

fn value_type(typ: BType) -> OperandType {
    match typ {
        BType::Int => OperandType::Int,
        BType::Float => OperandType::Float,
        BType::Void => OperandType::Null,
    }
}

fn ptr_type(typ: BType) -> OperandType {
    match typ {
        BType::Float => OperandType::FloatPtr,
        _ => OperandType::IntPtr,
    }
}

fn product(dims: &[usize]) -> usize {
    dims.iter().product()
}

fn expect_scalar(op: &Operand) -> Result<()> {
    if op.is_ptr() {
        Err(SemanticError::TypeMismatch(format!(
            "array `{}` used as a scalar value",
            op.name
        )))
    } else if op.is_null() {
        Err(SemanticError::TypeMismatch(
            "void value used in an expression".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// 无副作用且不会访存出错的表达式，可以不做短路求值
fn is_pure(exp: &Exp) -> bool {
    match exp {
        Exp::Const(_) => true,
        Exp::LVal(lval) => lval.dimensions.is_empty(),
        Exp::Unary(_, e) => is_pure(e),
        Exp::Binary(op, l, r) => {
            !matches!(op, BinaryOp::Div | BinaryOp::Mod) && is_pure(l) && is_pure(r)
        }
        Exp::FuncCall(_) => false,
    }
}

/// 按 C 的花括号省略规则，把初始化列表展开到 out（长度为 dims 之积）
fn flatten_init<'a>(
    id: &str,
    init: &'a InitVal,
    dims: &[usize],
    out: &mut [Option<&'a Exp>],
) -> Result<()> {
    let items = match init {
        InitVal::List(items) => items,
        InitVal::Exp(_) => {
            return Err(SemanticError::TypeMismatch(format!(
                "array `{}` needs a braced initializer",
                id
            )))
        }
    };

    let mut pos = 0;
    for item in items {
        match item {
            InitVal::Exp(e) => {
                if pos >= out.len() {
                    return Err(SemanticError::TooManyInitializers(id.to_string()));
                }
                out[pos] = Some(e);
                pos += 1;
            }
            InitVal::List(_) => {
                // 对齐到当前位置能整除的最大子数组
                let mut k = 1;
                while k < dims.len() && pos % product(&dims[k..]) != 0 {
                    k += 1;
                }
                let sub = &dims[k.min(dims.len())..];
                let size = product(sub);
                if pos + size > out.len() {
                    return Err(SemanticError::TooManyInitializers(id.to_string()));
                }
                flatten_init(id, item, sub, &mut out[pos..pos + size])?;
                pos += size;
            }
        }
    }
    Ok(())
}

/// 标量允许 `int a = {1};` 的写法
fn scalar_init<'a>(id: &str, init: &'a InitVal) -> Result<&'a Exp> {
    match init {
        InitVal::Exp(e) => Ok(e),
        InitVal::List(items) => match items.as_slice() {
            [single] => scalar_init(id, single),
            _ => Err(SemanticError::TypeMismatch(format!(
                "scalar `{}` initialized with a list",
                id
            ))),
        },
    }
}

impl Analyzer {
    pub fn new() -> Self {
        let mut symboltable = SymbolTable::new(LibraryRegistry::sysy());
        // 全局作用域
        symboltable.push_scope();
        Self {
            symboltable,
            tmp_cnt: 0,
            global_vals: vec![],
            cur_ret_type: OperandType::Null,
        }
    }

    /// AST -> Program
    ///
    /// 全局初始化指令收集到 `_global` 中，并在 main 的第一条指令处调用它。
    pub fn get_ir_program(mut self, root: &CompUnit) -> Result<Program> {
        let mut g_init_inst = vec![];
        let mut functions = vec![];

        for item in root.items.iter() {
            match item {
                GlobalItem::Decl(decl) => {
                    let mark = self.tmp_cnt;
                    decl.irgen(&mut self, &mut g_init_inst)?;
                    self.tmp_cnt = mark;
                }
                GlobalItem::FuncDef(func) => {
                    functions.push(func.irgen(&mut self, &mut g_init_inst)?);
                }
            }
        }

        let mut global = Function::new(GLOBAL_INIT_FUNC, vec![], OperandType::Null);
        global.body = g_init_inst;
        global.add_inst(Instruction::Return {
            value: Operand::null(),
        });

        let mut program = Program {
            global_vals: self.global_vals,
            functions: vec![global],
        };
        for mut func in functions {
            if func.name == "main" {
                func.body.insert(
                    0,
                    Instruction::Call {
                        callee: GLOBAL_INIT_FUNC.to_string(),
                        args: vec![],
                        dest: Operand::null(),
                    },
                );
            }
            program.add_function(func);
        }
        Ok(program)
    }

    fn new_temp(&mut self, typ: OperandType) -> Operand {
        let name = format!("temp_{}", self.tmp_cnt);
        self.tmp_cnt += 1;
        Operand::new(name, typ)
    }

    fn is_global_scope(&self) -> bool {
        self.symboltable.depth() == 1
    }

    /// 求编译期常量，过程中产生的指令被丢弃
    fn const_eval(&mut self, exp: &Exp, what: impl FnOnce() -> String) -> Result<ComptimeValue> {
        let mark = self.tmp_cnt;
        let mut scratch = vec![];
        let value = exp.irgen(self, &mut scratch)?;
        self.tmp_cnt = mark;
        comptime(&value).ok_or_else(|| SemanticError::NonConstant(what()))
    }

    fn fold_dims(&mut self, id: &str, dims: &[Exp]) -> Result<Vec<usize>> {
        let mut folded = Vec::with_capacity(dims.len());
        // 总字节数必须能放进 i32，后面的步长和帧偏移都按 i32 计算
        let mut bytes: i32 = 4;
        for dim in dims {
            let v = self.const_eval(dim, || format!("dimension of `{}`", id))?;
            if v.is_float() {
                return Err(SemanticError::TypeMismatch(format!(
                    "dimension of `{}` is not an integer",
                    id
                )));
            }
            let v = v.to_int();
            if v <= 0 {
                return Err(SemanticError::InvalidDimension(id.to_string()));
            }
            bytes = bytes
                .checked_mul(v)
                .ok_or_else(|| SemanticError::InvalidDimension(id.to_string()))?;
            folded.push(v as usize);
        }
        Ok(folded)
    }

    /// int <-> float 转换；字面量直接折叠
    fn convert(
        &mut self,
        op: Operand,
        target: OperandType,
        buffer: &mut Vec<Instruction>,
    ) -> Result<Operand> {
        expect_scalar(&op)?;
        if op.typ.value_type() == target {
            return Ok(op);
        }
        if let Some(v) = comptime(&op) {
            return Ok(match target {
                OperandType::Float => Operand::float_literal(v.to_float()),
                _ => Operand::int_literal(v.to_int()),
            });
        }
        let (operator, typ) = match target {
            OperandType::Float => (Operator::CvtI2F, OperandType::Float),
            _ => (Operator::CvtF2I, OperandType::Int),
        };
        let dest = self.new_temp(typ);
        buffer.push(Instruction::unary(operator, op, dest.clone()));
        Ok(dest)
    }

    /// def/fdef 用于字面量，mov/fmov 用于变量
    fn emit_move(&mut self, dest: Operand, value: Operand, buffer: &mut Vec<Instruction>) {
        let operator = match (dest.is_float(), value.is_literal()) {
            (false, true) => Operator::Def,
            (true, true) => Operator::FDef,
            (false, false) => Operator::Mov,
            (true, false) => Operator::FMov,
        };
        buffer.push(Instruction::unary(operator, value, dest));
    }

    /// 把条件值规整为 Int
    fn to_cond(&mut self, op: Operand, buffer: &mut Vec<Instruction>) -> Result<Operand> {
        expect_scalar(&op)?;
        if let Some(v) = op.as_float() {
            return Ok(Operand::int_literal((v != 0.0) as i32));
        }
        if op.typ == OperandType::Float {
            let dest = self.new_temp(OperandType::Int);
            buffer.push(Instruction::op(
                Operator::FNeq,
                op,
                Operand::float_literal(0.0),
                dest.clone(),
            ));
            return Ok(dest);
        }
        Ok(op)
    }

    fn condition(&mut self, exp: &Exp, buffer: &mut Vec<Instruction>) -> Result<Operand> {
        let op = exp.irgen(self, buffer)?;
        self.to_cond(op, buffer)
    }

    /// 算术与比较运算，两侧均为字面量时折叠
    fn arith(
        &mut self,
        op: BinaryOp,
        a: Operand,
        b: Operand,
        buffer: &mut Vec<Instruction>,
    ) -> Result<Operand> {
        expect_scalar(&a)?;
        expect_scalar(&b)?;
        let float = a.is_float() || b.is_float();
        if op == BinaryOp::Mod && float {
            return Err(SemanticError::TypeMismatch(
                "`%` applied to float operands".to_string(),
            ));
        }

        if let (Some(x), Some(y)) = (comptime(&a), comptime(&b)) {
            let folded = match op {
                BinaryOp::Add => Some(x + y),
                BinaryOp::Sub => Some(x - y),
                BinaryOp::Mul => Some(x * y),
                BinaryOp::Div => x.checked_div(y),
                BinaryOp::Mod => x.checked_rem(y),
                BinaryOp::And | BinaryOp::Or => unreachable!("logical ops are lowered separately"),
                cmp => Some(x.compare(cmp, y)),
            };
            if let Some(v) = folded {
                return Ok(literal(v));
            }
        }

        let (a, b) = if float {
            (
                self.convert(a, OperandType::Float, buffer)?,
                self.convert(b, OperandType::Float, buffer)?,
            )
        } else {
            (a, b)
        };

        use OperandType::{Float, Int};
        let (operator, typ) = match (op, float) {
            (BinaryOp::Add, false) => (Operator::Add, Int),
            (BinaryOp::Add, true) => (Operator::FAdd, Float),
            (BinaryOp::Sub, false) => (Operator::Sub, Int),
            (BinaryOp::Sub, true) => (Operator::FSub, Float),
            (BinaryOp::Mul, false) => (Operator::Mul, Int),
            (BinaryOp::Mul, true) => (Operator::FMul, Float),
            (BinaryOp::Div, false) => (Operator::Div, Int),
            (BinaryOp::Div, true) => (Operator::FDiv, Float),
            (BinaryOp::Mod, _) => (Operator::Mod, Int),
            (BinaryOp::Lt, false) => (Operator::Lss, Int),
            (BinaryOp::Lt, true) => (Operator::FLss, Int),
            (BinaryOp::Le, false) => (Operator::Leq, Int),
            (BinaryOp::Le, true) => (Operator::FLeq, Int),
            (BinaryOp::Gt, false) => (Operator::Gtr, Int),
            (BinaryOp::Gt, true) => (Operator::FGtr, Int),
            (BinaryOp::Ge, false) => (Operator::Geq, Int),
            (BinaryOp::Ge, true) => (Operator::FGeq, Int),
            (BinaryOp::Eq, false) => (Operator::Eq, Int),
            (BinaryOp::Eq, true) => (Operator::FEq, Int),
            (BinaryOp::Ne, false) => (Operator::Neq, Int),
            (BinaryOp::Ne, true) => (Operator::FNeq, Int),
            (BinaryOp::And | BinaryOp::Or, _) => unreachable!("logical ops are lowered separately"),
        };
        let dest = self.new_temp(typ);
        buffer.push(Instruction::op(operator, a, b, dest.clone()));
        Ok(dest)
    }

    /// && 与 ||
    ///
    /// 右侧有副作用时短路：
    ///   a && b: [a]; def r,0; goto a,2; goto null,|b|+2; [b]; neq r,b,0
    ///   a || b: [a]; def r,1; goto a,|b|+2; [b]; neq r,b,0
    fn logical(
        &mut self,
        op: BinaryOp,
        lhs: &Exp,
        rhs: &Exp,
        buffer: &mut Vec<Instruction>,
    ) -> Result<Operand> {
        let a = self.condition(lhs, buffer)?;

        if let Some(x) = a.as_int() {
            let decided = match op {
                BinaryOp::And => x == 0,
                _ => x != 0,
            };
            if decided {
                return Ok(Operand::int_literal((x != 0) as i32));
            }
            // 结果只取决于右侧
            let b = self.condition(rhs, buffer)?;
            if let Some(y) = b.as_int() {
                let (x, y) = (ComptimeValue::int(x), ComptimeValue::int(y));
                return Ok(literal(match op {
                    BinaryOp::And => x.logical_and(y),
                    _ => x.logical_or(y),
                }));
            }
            let dest = self.new_temp(OperandType::Int);
            buffer.push(Instruction::op(Operator::Neq, b, Operand::int_literal(0), dest.clone()));
            return Ok(dest);
        }

        if is_pure(rhs) {
            let b = self.condition(rhs, buffer)?;
            let operator = match op {
                BinaryOp::And => Operator::And,
                _ => Operator::Or,
            };
            let dest = self.new_temp(OperandType::Int);
            buffer.push(Instruction::op(operator, a, b, dest.clone()));
            return Ok(dest);
        }

        let mut side = vec![];
        let b = self.condition(rhs, &mut side)?;
        let dest = self.new_temp(OperandType::Int);
        let skip = side.len() as i32 + 2;
        match op {
            BinaryOp::And => {
                buffer.push(Instruction::unary(Operator::Def, Operand::int_literal(0), dest.clone()));
                buffer.push(Instruction::branch(a, 2));
                buffer.push(Instruction::goto(skip));
            }
            _ => {
                buffer.push(Instruction::unary(Operator::Def, Operand::int_literal(1), dest.clone()));
                buffer.push(Instruction::branch(a, skip));
            }
        }
        buffer.extend(side);
        buffer.push(Instruction::op(Operator::Neq, b, Operand::int_literal(0), dest.clone()));
        Ok(dest)
    }

    fn unary(&mut self, op: UnaryOp, exp: &Exp, buffer: &mut Vec<Instruction>) -> Result<Operand> {
        let v = exp.irgen(self, buffer)?;
        expect_scalar(&v)?;
        if let Some(c) = comptime(&v) {
            return Ok(match op {
                UnaryOp::Pos => v,
                UnaryOp::Neg => literal(-c),
                UnaryOp::Not => literal(!c),
            });
        }
        let float = v.is_float();
        let dest = self.new_temp(match (op, float) {
            (UnaryOp::Neg, true) => OperandType::Float,
            _ => OperandType::Int,
        });
        let inst = match (op, float) {
            (UnaryOp::Pos, _) => return Ok(v),
            (UnaryOp::Neg, true) => {
                Instruction::op(Operator::FSub, Operand::float_literal(0.0), v, dest.clone())
            }
            (UnaryOp::Neg, false) => {
                Instruction::op(Operator::Sub, Operand::int_literal(0), v, dest.clone())
            }
            (UnaryOp::Not, true) => {
                Instruction::op(Operator::FEq, v, Operand::float_literal(0.0), dest.clone())
            }
            (UnaryOp::Not, false) => Instruction::unary(Operator::Not, v, dest.clone()),
        };
        buffer.push(inst);
        Ok(dest)
    }

    /// 多维下标线性化：Σ index_i * stride_i
    fn linear_index(
        &mut self,
        lval: &LVal,
        entry: &SymbolEntry,
        buffer: &mut Vec<Instruction>,
    ) -> Result<Operand> {
        if lval.dimensions.len() > entry.dimension.len() {
            return Err(SemanticError::TypeMismatch(format!(
                "too many subscripts for `{}`",
                lval.id
            )));
        }
        let mut acc: Option<Operand> = None;
        for (i, exp) in lval.dimensions.iter().enumerate() {
            let idx = exp.irgen(self, buffer)?;
            let idx = self.convert(idx, OperandType::Int, buffer)?;
            let stride: i32 = entry.dimension[i + 1..].iter().product();
            let term = if stride == 1 {
                idx
            } else {
                self.arith(BinaryOp::Mul, idx, Operand::int_literal(stride), buffer)?
            };
            acc = Some(match acc {
                None => term,
                Some(acc) => self.arith(BinaryOp::Add, acc, term, buffer)?,
            });
        }
        Ok(acc.unwrap_or_else(|| Operand::int_literal(0)))
    }

    /// 左值作为右值使用
    fn lval_value(&mut self, lval: &LVal, buffer: &mut Vec<Instruction>) -> Result<Operand> {
        let entry = self.symboltable.resolve(&lval.id)?.clone();
        if !entry.is_array() {
            if !lval.dimensions.is_empty() {
                return Err(SemanticError::TypeMismatch(format!(
                    "`{}` is not an array",
                    lval.id
                )));
            }
            return Ok(entry.operand);
        }
        if lval.dimensions.is_empty() {
            return Ok(entry.operand);
        }

        let index = self.linear_index(lval, &entry, buffer)?;
        if lval.dimensions.len() < entry.dimension.len() {
            // 部分下标得到子数组指针
            let dest = self.new_temp(entry.operand.typ);
            buffer.push(Instruction::op(Operator::GetPtr, entry.operand, index, dest.clone()));
            return Ok(dest);
        }

        if let (Some(values), Some(i)) = (&entry.values, index.as_int()) {
            if let Some(v) = usize::try_from(i).ok().and_then(|i| values.get(i)) {
                return Ok(literal(*v));
            }
        }
        let elem = entry.operand.typ.elem().unwrap_or(OperandType::Int);
        let dest = self.new_temp(elem);
        buffer.push(Instruction::op(Operator::Load, entry.operand, index, dest.clone()));
        Ok(dest)
    }

    /// 数组初始化：局部数组先清零，再写入显式给出的元素
    fn init_array(
        &mut self,
        array: &Operand,
        slots: Vec<Option<Operand>>,
        buffer: &mut Vec<Instruction>,
    ) {
        let global = self.is_global_scope();
        let elem = array.typ.elem().unwrap_or(OperandType::Int);
        let zero = zero_of(elem);
        let len = slots.len();
        let looped = !global && len > ZERO_FILL_THRESHOLD;

        if looped {
            let i = self.new_temp(OperandType::Int);
            let c = self.new_temp(OperandType::Int);
            buffer.push(Instruction::unary(Operator::Def, Operand::int_literal(0), i.clone()));
            buffer.push(Instruction::op(
                Operator::Lss,
                i.clone(),
                Operand::int_literal(len as i32),
                c.clone(),
            ));
            buffer.push(Instruction::branch(c, 2));
            buffer.push(Instruction::goto(4));
            buffer.push(Instruction::op(Operator::Store, array.clone(), i.clone(), zero.clone()));
            buffer.push(Instruction::op(Operator::Add, i.clone(), Operand::int_literal(1), i));
            buffer.push(Instruction::goto(-5));
        } else if !global {
            for (idx, slot) in slots.iter().enumerate() {
                if slot.is_none() {
                    buffer.push(Instruction::op(
                        Operator::Store,
                        array.clone(),
                        Operand::int_literal(idx as i32),
                        zero.clone(),
                    ));
                }
            }
        }

        for (idx, slot) in slots.into_iter().enumerate() {
            if let Some(value) = slot {
                if (global || looped) && is_zero_literal(&value) {
                    continue;
                }
                buffer.push(Instruction::op(
                    Operator::Store,
                    array.clone(),
                    Operand::int_literal(idx as i32),
                    value,
                ));
            }
        }
    }

    /// 为数组预留存储：全局数组进数据段，局部数组用 alloc
    fn reserve_array(&mut self, array: &Operand, len: usize, buffer: &mut Vec<Instruction>) {
        if self.is_global_scope() {
            self.global_vals
                .push(GlobalVal::new(array.clone(), Some(len)));
        } else {
            buffer.push(Instruction::Alloc {
                size: len,
                dest: array.clone(),
            });
        }
    }
}

impl IrGen for Exp {
    type Output = Operand;

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<Operand> {
        match self {
            Exp::Const(v) => Ok(literal(*v)),
            Exp::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
                an.logical(*op, lhs, rhs, buffer)
            }
            Exp::Binary(op, lhs, rhs) => {
                let a = lhs.irgen(an, buffer)?;
                let b = rhs.irgen(an, buffer)?;
                an.arith(*op, a, b, buffer)
            }
            Exp::Unary(op, exp) => an.unary(*op, exp, buffer),
            Exp::FuncCall(call) => call.irgen(an, buffer),
            Exp::LVal(lval) => an.lval_value(lval, buffer),
        }
    }
}

impl IrGen for FuncCall {
    type Output = Operand;

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<Operand> {
        let sig = an.symboltable.function(&self.id)?.clone();
        if sig.params.len() != self.args.len() {
            return Err(SemanticError::ArityMismatch {
                callee: self.id.clone(),
                expected: sig.params.len(),
                found: self.args.len(),
            });
        }

        let mut args = Vec::with_capacity(self.args.len());
        for (exp, param) in self.args.iter().zip(sig.params.iter()) {
            let value = exp.irgen(an, buffer)?;
            let value = if param.is_ptr() {
                if value.typ != param.typ {
                    return Err(SemanticError::TypeMismatch(format!(
                        "argument `{}` of `{}` expects an array",
                        param.name, self.id
                    )));
                }
                value
            } else {
                an.convert(value, param.typ, buffer)?
            };
            args.push(value);
        }

        let dest = match sig.return_type {
            OperandType::Null => Operand::null(),
            typ => an.new_temp(typ),
        };
        buffer.push(Instruction::Call {
            callee: self.id.clone(),
            args,
            dest: dest.clone(),
        });
        Ok(dest)
    }
}

impl IrGen for Decl {
    type Output = ();

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        match self {
            Decl::ConstDecl(decl) => decl.irgen(an, buffer),
            Decl::VarDecl(decl) => decl.irgen(an, buffer),
        }
    }
}

impl IrGen for ConstDecl {
    type Output = ();

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        for def in self.defs.iter() {
            const_def(an, self.typ, def, buffer)?;
        }
        Ok(())
    }
}

fn const_def(
    an: &mut Analyzer,
    typ: BType,
    def: &ConstDef,
    buffer: &mut Vec<Instruction>,
) -> Result<()> {
    let elem = value_type(typ);
    let cast = |v: ComptimeValue| match elem {
        OperandType::Float => ComptimeValue::float(v.to_float()),
        _ => ComptimeValue::int(v.to_int()),
    };
    let dims = an.fold_dims(&def.id, &def.dimensions)?;

    if dims.is_empty() {
        let exp = scalar_init(&def.id, &def.init)?;
        let v = an.const_eval(exp, || format!("initializer of `{}`", def.id))?;
        return an
            .symboltable
            .declare(&def.id, SymbolEntry::scalar(literal(cast(v))));
    }

    let len = product(&dims);
    let mut slots = vec![None; len];
    flatten_init(&def.id, &def.init, &dims, &mut slots)?;
    let mut values = Vec::with_capacity(len);
    for slot in slots.iter() {
        let v = match slot {
            Some(exp) => cast(an.const_eval(exp, || format!("initializer of `{}`", def.id))?),
            None => cast(ComptimeValue::int(0)),
        };
        values.push(v);
    }

    let array = Operand::new(an.symboltable.scoped_name(&def.id), ptr_type(typ));
    an.reserve_array(&array, len, buffer);
    let stored = slots
        .iter()
        .zip(values.iter())
        .map(|(slot, v)| slot.map(|_| literal(*v)))
        .collect();
    an.init_array(&array, stored, buffer);

    let mut entry = SymbolEntry::array(array, dims.iter().map(|d| *d as i32).collect());
    entry.values = Some(values);
    an.symboltable.declare(&def.id, entry)
}

impl IrGen for VarDecl {
    type Output = ();

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        for def in self.defs.iter() {
            var_def(an, self.typ, def, buffer)?;
        }
        Ok(())
    }
}

fn var_def(an: &mut Analyzer, typ: BType, def: &VarDef, buffer: &mut Vec<Instruction>) -> Result<()> {
    let elem = value_type(typ);
    let dims = an.fold_dims(&def.id, &def.dimensions)?;
    let name = an.symboltable.scoped_name(&def.id);
    let global = an.is_global_scope();

    if dims.is_empty() {
        let operand = Operand::new(name, elem);
        if global {
            an.global_vals.push(GlobalVal::new(operand.clone(), None));
        }
        let value = match &def.init {
            Some(init) => {
                let exp = scalar_init(&def.id, init)?;
                let v = exp.irgen(an, buffer)?;
                Some(an.convert(v, elem, buffer)?)
            }
            // 局部变量未初始化时置零
            None if !global => Some(zero_of(elem)),
            None => None,
        };
        if let Some(value) = value {
            // 数据段已经清零
            if !(global && is_zero_literal(&value)) {
                an.emit_move(operand.clone(), value, buffer);
            }
        }
        return an.symboltable.declare(&def.id, SymbolEntry::scalar(operand));
    }

    let len = product(&dims);
    let array = Operand::new(name, ptr_type(typ));
    an.reserve_array(&array, len, buffer);
    if let Some(init) = &def.init {
        let mut slots = vec![None; len];
        flatten_init(&def.id, init, &dims, &mut slots)?;
        let mut values = Vec::with_capacity(len);
        for slot in slots {
            values.push(match slot {
                Some(exp) => {
                    let v = exp.irgen(an, buffer)?;
                    Some(an.convert(v, elem, buffer)?)
                }
                None => None,
            });
        }
        an.init_array(&array, values, buffer);
    }
    an.symboltable.declare(
        &def.id,
        SymbolEntry::array(array, dims.iter().map(|d| *d as i32).collect()),
    )
}

impl IrGen for FuncDef {
    type Output = Function;

    fn irgen(&self, an: &mut Analyzer, _buffer: &mut Vec<Instruction>) -> Result<Function> {
        let saved_tmp = an.tmp_cnt;
        an.tmp_cnt = 0;
        let ret = value_type(self.typ);

        // 形参作用域
        an.symboltable.push_scope();
        let mut params = Vec::with_capacity(self.params.len());
        for param in self.params.iter() {
            let name = an.symboltable.scoped_name(&param.id);
            let entry = match &param.dimensions {
                None => SymbolEntry::scalar(Operand::new(name, value_type(param.typ))),
                Some(dims) => {
                    let dims = an.fold_dims(&param.id, dims)?;
                    let mut dimension = vec![-1];
                    dimension.extend(dims.iter().map(|d| *d as i32));
                    SymbolEntry::array(Operand::new(name, ptr_type(param.typ)), dimension)
                }
            };
            params.push(entry.operand.clone());
            an.symboltable.declare(&param.id, entry)?;
        }
        an.symboltable
            .declare_function(FuncSignature::new(&self.id, params.clone(), ret))?;
        an.cur_ret_type = ret;

        let mut func = Function::new(self.id.clone(), params, ret);
        self.block.irgen(an, &mut func.body)?;
        an.symboltable.pop_scope();

        if let Some(jump) = func.body.iter().find_map(|inst| match inst {
            Instruction::Unresolved(jump) => Some(*jump),
            _ => None,
        }) {
            return Err(SemanticError::LoopControlOutsideLoop(match jump {
                LoopJump::Break => "break",
                LoopJump::Continue => "continue",
            }));
        }

        // 保证函数以 return 结束
        let ends_with_return = func.body.last().map_or(false, Instruction::is_return);
        if !ends_with_return || func.jumps_past_end() {
            let value = if func.is_void() {
                Operand::null()
            } else {
                zero_of(func.return_type)
            };
            func.add_inst(Instruction::Return { value });
        }

        debug!(
            "analyzed function `{}`: {} params, {} instructions",
            func.name,
            func.parameters.len(),
            func.body.len()
        );
        an.tmp_cnt = saved_tmp;
        Ok(func)
    }
}

impl IrGen for Block {
    type Output = ();

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        an.symboltable.push_scope();
        for item in self.items.iter() {
            // 语句结束后临时变量名可以复用
            let mark = an.tmp_cnt;
            match item {
                BlockItem::Decl(decl) => decl.irgen(an, buffer)?,
                BlockItem::Stmt(stmt) => stmt.irgen(an, buffer)?,
            }
            an.tmp_cnt = mark;
        }
        an.symboltable.pop_scope();
        Ok(())
    }
}

impl IrGen for Stmt {
    type Output = ();

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        match self {
            Stmt::Assign(assign) => assign.irgen(an, buffer),
            Stmt::ExpStmt(ExpStmt { exp }) => {
                if let Some(exp) = exp {
                    exp.irgen(an, buffer)?;
                }
                Ok(())
            }
            Stmt::Block(block) => block.irgen(an, buffer),
            Stmt::If(stmt) => stmt.irgen(an, buffer),
            Stmt::While(stmt) => stmt.irgen(an, buffer),
            Stmt::Break(_) => {
                buffer.push(Instruction::Unresolved(LoopJump::Break));
                Ok(())
            }
            Stmt::Continue(_) => {
                buffer.push(Instruction::Unresolved(LoopJump::Continue));
                Ok(())
            }
            Stmt::Return(ret) => ret.irgen(an, buffer),
        }
    }
}

impl IrGen for Assign {
    type Output = ();

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        let entry = an.symboltable.resolve(&self.lval.id)?.clone();
        if entry.is_const() {
            return Err(SemanticError::AssignToConst(self.lval.id.clone()));
        }

        if !entry.is_array() {
            if !self.lval.dimensions.is_empty() {
                return Err(SemanticError::TypeMismatch(format!(
                    "`{}` is not an array",
                    self.lval.id
                )));
            }
            let value = self.exp.irgen(an, buffer)?;
            let value = an.convert(value, entry.operand.typ, buffer)?;
            an.emit_move(entry.operand, value, buffer);
            return Ok(());
        }

        if self.lval.dimensions.len() != entry.dimension.len() {
            return Err(SemanticError::TypeMismatch(format!(
                "cannot assign to array `{}`",
                self.lval.id
            )));
        }
        let index = an.linear_index(&self.lval, &entry, buffer)?;
        let elem = entry.operand.typ.elem().unwrap_or(OperandType::Int);
        let value = self.exp.irgen(an, buffer)?;
        let value = an.convert(value, elem, buffer)?;
        buffer.push(Instruction::op(Operator::Store, entry.operand, index, value));
        Ok(())
    }
}

impl IrGen for Return {
    type Output = ();

    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        let value = match (&self.exp, an.cur_ret_type) {
            (None, OperandType::Null) => Operand::null(),
            (Some(exp), OperandType::Null) => {
                // void 函数中允许 return 一个 void 调用
                let v = exp.irgen(an, buffer)?;
                if !v.is_null() {
                    return Err(SemanticError::TypeMismatch(
                        "void function returns a value".to_string(),
                    ));
                }
                Operand::null()
            }
            (None, _) => {
                return Err(SemanticError::TypeMismatch(
                    "non-void function returns without a value".to_string(),
                ))
            }
            (Some(exp), ret) => {
                let v = exp.irgen(an, buffer)?;
                an.convert(v, ret, buffer)?
            }
        };
        buffer.push(Instruction::Return { value });
        Ok(())
    }
}

impl IrGen for If {
    type Output = ();

    /// [cond]; goto c,2; goto null,|then|+1; [then (+ goto null,|else|+1)]; [else]
    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        let cond = an.condition(&self.cond, buffer)?;

        let mut then_buf = vec![];
        self.then.irgen(an, &mut then_buf)?;
        let mut else_buf = vec![];
        if let Some(else_then) = &self.else_then {
            else_then.irgen(an, &mut else_buf)?;
            then_buf.push(Instruction::goto(else_buf.len() as i32 + 1));
        }

        buffer.push(Instruction::branch(cond, 2));
        buffer.push(Instruction::goto(then_buf.len() as i32 + 1));
        buffer.extend(then_buf);
        buffer.extend(else_buf);
        Ok(())
    }
}

impl IrGen for While {
    type Output = ();

    /// [cond]; goto c,2; goto null,|body|+2; [body]; goto null,-(|cond|+2+|body|)
    fn irgen(&self, an: &mut Analyzer, buffer: &mut Vec<Instruction>) -> Result<()> {
        let mut cond_buf = vec![];
        let cond = an.condition(&self.cond, &mut cond_buf)?;

        let mut body = vec![];
        self.block.irgen(an, &mut body)?;
        backpatch(&mut body, cond_buf.len());

        let cond_len = cond_buf.len() as i32;
        let body_len = body.len() as i32;
        body.push(Instruction::goto(-(cond_len + 2 + body_len)));

        buffer.extend(cond_buf);
        buffer.push(Instruction::branch(cond, 2));
        buffer.push(Instruction::goto(body_len + 2));
        buffer.extend(body);
        Ok(())
    }
}

/// 回填循环体中的 break / continue
///
/// 内层循环在拼接进来之前已经回填完毕，这里剩下的都属于当前循环。
/// break 跳到回跳指令之后，continue 跳回条件求值的第一条指令。
fn backpatch(body: &mut [Instruction], cond_len: usize) {
    let body_len = body.len() as i32;
    let cond_len = cond_len as i32;
    for (p, inst) in body.iter_mut().enumerate() {
        let p = p as i32;
        if let Instruction::Unresolved(jump) = inst {
            *inst = match jump {
                LoopJump::Break => Instruction::goto(body_len + 1 - p),
                LoopJump::Continue => Instruction::goto(-(cond_len + 2 + p)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lowered_while(body: Vec<Instruction>, cond_len: usize) -> Vec<Instruction> {
        let mut body = body;
        backpatch(&mut body, cond_len);
        body
    }

    #[test]
    fn backpatch_targets() {
        let nop = Instruction::unary(
            Operator::Def,
            Operand::int_literal(0),
            Operand::new("x.3", OperandType::Int),
        );
        let body = vec![
            nop.clone(),
            Instruction::Unresolved(LoopJump::Break),
            nop,
            Instruction::Unresolved(LoopJump::Continue),
        ];
        let body = lowered_while(body, 3);
        // break 在第1条，循环体4条 + 回跳 1 条
        assert_eq!(body[1], Instruction::goto(4));
        // continue 在第3条，绝对位置 3+2+3
        assert_eq!(body[3], Instruction::goto(-8));
    }

    #[test]
    fn flatten_respects_brace_elision() {
        let e = |v| InitVal::Exp(Exp::const_(ComptimeValue::int(v)));
        // int a[2][3] = {1, {2}, 3}
        let init = InitVal::List(vec![e(1), InitVal::List(vec![e(2)]), e(3)]);
        let mut out = vec![None; 6];
        let res = flatten_init("a", &init, &[2, 3], &mut out);
        // {2} 不在行首，对齐到最后一维（标量）
        assert!(res.is_ok());
        assert!(out[0].is_some() && out[1].is_some() && out[2].is_some());
        assert!(out[3].is_none());

        // int b[2][2] = {{1}, {2, 3}}
        let init = InitVal::List(vec![
            InitVal::List(vec![e(1)]),
            InitVal::List(vec![e(2), e(3)]),
        ]);
        let mut out = vec![None; 4];
        flatten_init("b", &init, &[2, 2], &mut out).unwrap();
        assert!(out[0].is_some() && out[1].is_none());
        assert!(out[2].is_some() && out[3].is_some());
    }

    #[test]
    fn flatten_rejects_overflow() {
        let e = |v| InitVal::Exp(Exp::const_(ComptimeValue::int(v)));
        let init = InitVal::List(vec![e(1), e(2), e(3)]);
        let mut out = vec![None; 2];
        assert_eq!(
            flatten_init("c", &init, &[2], &mut out),
            Err(SemanticError::TooManyInitializers("c".into()))
        );
    }
}
