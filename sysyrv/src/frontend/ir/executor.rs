//! IR 解释器
//!
//! 直接在 [`Program`] 上执行，用来观察分析器产出的程序语义。
//! 调用栈是显式的，深递归不会耗尽宿主栈。

use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, trace};

use super::{
    function::Function,
    instruction::{Instruction, Operator},
    operand::{Operand, OperandType},
    program::Program,
};
use crate::error::ExecError;
use crate::frontend::lalrpop::ast::parse_hexadecimal_float;

pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    /// 内存区域下标 + 元素偏移
    Ptr { region: usize, offset: i64 },
}

impl Value {
    fn zero(typ: OperandType) -> Value {
        match typ {
            OperandType::Float | OperandType::FloatPtr => Value::Float(0.0),
            _ => Value::Int(0),
        }
    }
}

/// main 执行结束后的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutcome {
    /// main 的返回值
    pub exit_code: i32,
    pub output: String,
}

struct Frame<'p> {
    func: &'p Function,
    pc: usize,
    vars: HashMap<String, Value>,
    // alloc 指令下标 -> 内存区域，重复执行时复用
    allocs: HashMap<usize, usize>,
    // 调用返回后写入的操作数
    ret_dest: Option<Operand>,
}

impl<'p> Frame<'p> {
    fn new(func: &'p Function) -> Self {
        Self {
            func,
            pc: 0,
            vars: HashMap::default(),
            allocs: HashMap::default(),
            ret_dest: None,
        }
    }
}

pub struct Executor<'p> {
    program: &'p Program,
    functions: HashMap<&'p str, &'p Function>,
    globals: HashMap<String, Value>,
    memory: Vec<Vec<Value>>,
    input: Vec<u8>,
    input_pos: usize,
    output: Vec<u8>,
    step_limit: u64,
}

impl<'p> Executor<'p> {
    pub fn new(program: &'p Program) -> Self {
        let functions = program
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();
        Self {
            program,
            functions,
            globals: HashMap::default(),
            memory: vec![],
            input: vec![],
            input_pos: 0,
            output: vec![],
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_input(mut self, input: &str) -> Self {
        self.input = input.as_bytes().to_vec();
        self.input_pos = 0;
        self
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    fn alloc_region(&mut self, len: usize, typ: OperandType) -> usize {
        self.memory.push(vec![Value::zero(typ); len]);
        self.memory.len() - 1
    }

    /// 全局变量清零，全局数组各占一块内存区域
    fn init_globals(&mut self) {
        for global in self.program.global_vals.iter() {
            let value = match global.array_len {
                Some(len) => Value::Ptr {
                    region: self.alloc_region(len, global.operand.typ),
                    offset: 0,
                },
                None => Value::zero(global.operand.typ),
            };
            self.globals.insert(global.operand.name.clone(), value);
        }
    }

    /// 从 main 开始执行
    pub fn run_main(mut self) -> Result<ExecOutcome> {
        self.init_globals();
        let main = *self
            .functions
            .get("main")
            .ok_or_else(|| ExecError::UnknownFunction("main".to_string()))?;

        let ret = self.execute(main, vec![])?;
        let exit_code = match ret {
            Some(Value::Int(v)) => v,
            Some(Value::Float(f)) => f as i32,
            _ => 0,
        };
        debug!("main returned {}", exit_code);
        Ok(ExecOutcome {
            exit_code,
            output: String::from_utf8_lossy(&self.output).into_owned(),
        })
    }

    fn read(&self, frame: &Frame, op: &Operand) -> Result<Value> {
        match op.typ {
            OperandType::IntLiteral => op
                .as_int()
                .map(Value::Int)
                .ok_or_else(|| ExecError::TypeMismatch(format!("bad int literal `{}`", op.name))),
            OperandType::FloatLiteral => op
                .as_float()
                .map(Value::Float)
                .ok_or_else(|| ExecError::TypeMismatch(format!("bad float literal `{}`", op.name))),
            OperandType::Null => Err(ExecError::TypeMismatch("read of null operand".to_string())),
            _ => frame
                .vars
                .get(&op.name)
                .or_else(|| self.globals.get(&op.name))
                .copied()
                .ok_or_else(|| ExecError::Undefined(op.name.clone())),
        }
    }

    fn write(&mut self, frame: &mut Frame, op: &Operand, value: Value) {
        if let Some(slot) = self.globals.get_mut(&op.name) {
            *slot = value;
        } else {
            frame.vars.insert(op.name.clone(), value);
        }
    }

    fn read_int(&self, frame: &Frame, op: &Operand) -> Result<i32> {
        match self.read(frame, op)? {
            Value::Int(v) => Ok(v),
            other => Err(ExecError::TypeMismatch(format!(
                "`{}` expected int, found {:?}",
                op.name, other
            ))),
        }
    }

    fn read_float(&self, frame: &Frame, op: &Operand) -> Result<f32> {
        match self.read(frame, op)? {
            Value::Float(v) => Ok(v),
            other => Err(ExecError::TypeMismatch(format!(
                "`{}` expected float, found {:?}",
                op.name, other
            ))),
        }
    }

    fn read_ptr(&self, frame: &Frame, op: &Operand) -> Result<(usize, i64)> {
        match self.read(frame, op)? {
            Value::Ptr { region, offset } => Ok((region, offset)),
            other => Err(ExecError::TypeMismatch(format!(
                "`{}` expected pointer, found {:?}",
                op.name, other
            ))),
        }
    }

    /// 指针 + 元素下标 -> 内存中的位置
    fn element(&self, frame: &Frame, base: &Operand, index: &Operand) -> Result<(usize, usize)> {
        let (region, offset) = self.read_ptr(frame, base)?;
        let idx = offset + self.read_int(frame, index)? as i64;
        let len = self.memory.get(region).map_or(0, Vec::len);
        if idx < 0 || idx as usize >= len {
            return Err(ExecError::OutOfBounds(base.name.clone(), idx));
        }
        Ok((region, idx as usize))
    }

    /// 执行一个函数直到最外层返回
    fn execute(&mut self, entry: &'p Function, args: Vec<Value>) -> Result<Option<Value>> {
        let mut stack = vec![self.enter(entry, args)];
        let mut steps: u64 = 0;

        loop {
            let Some(frame) = stack.last_mut() else {
                return Ok(None);
            };
            let func = frame.func;

            // 执行到末尾视为无返回值的 return
            let inst = match func.body.get(frame.pc) {
                Some(inst) => inst,
                None => {
                    if let Some(ret) = self.finish_call(&mut stack, None) {
                        return Ok(ret);
                    }
                    continue;
                }
            };

            steps += 1;
            if steps > self.step_limit {
                return Err(ExecError::StepLimit(self.step_limit));
            }
            trace!("{}:{} {:?}", func.name, frame.pc, inst);

            match inst {
                Instruction::Op { op, op1, op2, dest } => {
                    self.exec_op(frame, *op, op1, op2, dest)?;
                    frame.pc += 1;
                }
                Instruction::Alloc { size, dest } => {
                    let pc = frame.pc;
                    let region = match frame.allocs.get(&pc) {
                        Some(region) => *region,
                        None => {
                            let region = self.alloc_region(*size, dest.typ);
                            frame.allocs.insert(pc, region);
                            region
                        }
                    };
                    self.write(frame, dest, Value::Ptr { region, offset: 0 });
                    frame.pc += 1;
                }
                Instruction::Goto { cond, offset } => {
                    let taken = cond.is_null() || self.read_int(frame, cond)? != 0;
                    if taken {
                        // 目标可以是 body 末尾，但不能越过它
                        let target = frame.pc as i64 + *offset as i64;
                        if target < 0 || target > func.body.len() as i64 {
                            return Err(ExecError::JumpOutOfRange(func.name.clone(), frame.pc));
                        }
                        frame.pc = target as usize;
                    } else {
                        frame.pc += 1;
                    }
                }
                Instruction::Call { callee, args, dest } => {
                    let values = args
                        .iter()
                        .map(|a| self.read(frame, a))
                        .collect::<Result<Vec<_>>>()?;
                    frame.pc += 1;
                    let dest = (!dest.is_null()).then(|| dest.clone());

                    if let Some(target) = self.functions.get(callee.as_str()).copied() {
                        frame.ret_dest = dest;
                        let callee_frame = self.enter(target, values);
                        stack.push(callee_frame);
                    } else {
                        let ret = self.call_library(callee, &values)?;
                        if let (Some(dest), Some(ret)) = (dest, ret) {
                            self.write(frame, &dest, ret);
                        }
                    }
                }
                Instruction::Return { value } => {
                    let ret = if value.is_null() {
                        None
                    } else {
                        Some(self.read(frame, value)?)
                    };
                    if let Some(ret) = self.finish_call(&mut stack, ret) {
                        return Ok(ret);
                    }
                }
                Instruction::Unresolved(jump) => {
                    return Err(ExecError::TypeMismatch(format!(
                        "unresolved {:?} in `{}`",
                        jump, func.name
                    )))
                }
            }
        }
    }

    fn enter(&mut self, func: &'p Function, args: Vec<Value>) -> Frame<'p> {
        let mut frame = Frame::new(func);
        for (param, value) in func.parameters.iter().zip(args) {
            frame.vars.insert(param.name.clone(), value);
        }
        frame
    }

    /// 释放函数栈上的数组
    fn leave(&mut self, frame: Frame<'p>) {
        for region in frame.allocs.values() {
            if let Some(mem) = self.memory.get_mut(*region) {
                mem.clear();
            }
        }
    }

    /// 弹出当前帧，返回值交给调用者；调用栈已空时返回 Some(最终结果)
    fn finish_call(&mut self, stack: &mut Vec<Frame<'p>>, ret: Option<Value>) -> Option<Option<Value>> {
        if let Some(frame) = stack.pop() {
            self.leave(frame);
        }
        let Some(caller) = stack.last_mut() else {
            return Some(ret);
        };
        if let (Some(dest), Some(value)) = (caller.ret_dest.take(), ret) {
            self.write(caller, &dest, value);
        }
        None
    }

    fn exec_op(
        &mut self,
        frame: &mut Frame,
        op: Operator,
        op1: &Operand,
        op2: &Operand,
        dest: &Operand,
    ) -> Result<()> {
        use Operator::*;
        let value = match op {
            Def | Mov | FDef | FMov => self.read(frame, op1)?,
            CvtI2F => Value::Float(self.read_int(frame, op1)? as f32),
            CvtF2I => Value::Int(self.read_float(frame, op1)? as i32),
            Add | Sub | Mul | Div | Mod => {
                let (a, b) = (self.read_int(frame, op1)?, self.read_int(frame, op2)?);
                Value::Int(match op {
                    Add => a.wrapping_add(b),
                    Sub => a.wrapping_sub(b),
                    Mul => a.wrapping_mul(b),
                    _ if b == 0 => return Err(ExecError::DivisionByZero(frame.func.name.clone())),
                    Div => a.wrapping_div(b),
                    _ => a.wrapping_rem(b),
                })
            }
            FAdd | FSub | FMul | FDiv => {
                let (a, b) = (self.read_float(frame, op1)?, self.read_float(frame, op2)?);
                Value::Float(match op {
                    FAdd => a + b,
                    FSub => a - b,
                    FMul => a * b,
                    _ => a / b,
                })
            }
            Lss | Leq | Gtr | Geq | Eq | Neq => {
                let (a, b) = (self.read_int(frame, op1)?, self.read_int(frame, op2)?);
                Value::Int(i32::from(match op {
                    Lss => a < b,
                    Leq => a <= b,
                    Gtr => a > b,
                    Geq => a >= b,
                    Eq => a == b,
                    _ => a != b,
                }))
            }
            FLss | FLeq | FGtr | FGeq | FEq | FNeq => {
                let (a, b) = (self.read_float(frame, op1)?, self.read_float(frame, op2)?);
                Value::Int(i32::from(match op {
                    FLss => a < b,
                    FLeq => a <= b,
                    FGtr => a > b,
                    FGeq => a >= b,
                    FEq => a == b,
                    _ => a != b,
                }))
            }
            Not => Value::Int((self.read_int(frame, op1)? == 0) as i32),
            And | Or => {
                let (a, b) = (self.read_int(frame, op1)? != 0, self.read_int(frame, op2)? != 0);
                Value::Int(i32::from(if op == And { a && b } else { a || b }))
            }
            Load => {
                let (region, idx) = self.element(frame, op1, op2)?;
                self.memory[region][idx]
            }
            Store => {
                let (region, idx) = self.element(frame, op1, op2)?;
                let value = self.read(frame, dest)?;
                self.memory[region][idx] = value;
                return Ok(());
            }
            GetPtr => {
                let (region, offset) = self.read_ptr(frame, op1)?;
                let idx = self.read_int(frame, op2)? as i64;
                Value::Ptr {
                    region,
                    offset: offset + idx,
                }
            }
        };
        self.write(frame, dest, value);
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        while self
            .input
            .get(self.input_pos)
            .map_or(false, |c| c.is_ascii_whitespace())
        {
            self.input_pos += 1;
        }
    }

    fn next_token(&mut self, what: &'static str) -> Result<String> {
        self.skip_whitespace();
        let start = self.input_pos;
        while self
            .input
            .get(self.input_pos)
            .map_or(false, |c| !c.is_ascii_whitespace())
        {
            self.input_pos += 1;
        }
        if start == self.input_pos {
            return Err(ExecError::InputExhausted(what));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.input_pos]).into_owned())
    }

    fn next_int(&mut self) -> Result<i32> {
        let token = self.next_token("getint")?;
        token
            .parse::<i64>()
            .map(|v| v as i32)
            .map_err(|_| ExecError::TypeMismatch(format!("`{}` is not an integer", token)))
    }

    fn next_float(&mut self) -> Result<f32> {
        let token = self.next_token("getfloat")?;
        token
            .parse::<f32>()
            .ok()
            .or_else(|| parse_hexadecimal_float(&token).ok())
            .ok_or_else(|| ExecError::TypeMismatch(format!("`{}` is not a float", token)))
    }

    fn library_ptr(&self, args: &[Value], i: usize) -> Result<(usize, i64)> {
        match args.get(i) {
            Some(Value::Ptr { region, offset }) => Ok((*region, *offset)),
            other => Err(ExecError::TypeMismatch(format!(
                "library call expected a pointer argument, found {:?}",
                other
            ))),
        }
    }

    fn library_store(&mut self, (region, offset): (usize, i64), i: usize, value: Value) -> Result<()> {
        let idx = offset + i as i64;
        match self.memory.get_mut(region).and_then(|m| m.get_mut(idx as usize)) {
            Some(slot) if idx >= 0 => {
                *slot = value;
                Ok(())
            }
            _ => Err(ExecError::OutOfBounds("library argument".to_string(), idx)),
        }
    }

    fn library_load(&self, (region, offset): (usize, i64), i: usize) -> Result<Value> {
        let idx = offset + i as i64;
        match self.memory.get(region).and_then(|m| m.get(idx as usize)) {
            Some(v) if idx >= 0 => Ok(*v),
            _ => Err(ExecError::OutOfBounds("library argument".to_string(), idx)),
        }
    }

    /// SysY 运行时库
    fn call_library(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        let int_arg = |i: usize| match args.get(i) {
            Some(Value::Int(v)) => Ok(*v),
            other => Err(ExecError::TypeMismatch(format!(
                "`{}` expected an int argument, found {:?}",
                name, other
            ))),
        };
        let ret = match name {
            "getint" => Some(Value::Int(self.next_int()?)),
            "getch" => {
                let c = self
                    .input
                    .get(self.input_pos)
                    .copied()
                    .ok_or(ExecError::InputExhausted("getch"))?;
                self.input_pos += 1;
                Some(Value::Int(c as i32))
            }
            "getfloat" => Some(Value::Float(self.next_float()?)),
            "getarray" | "getfarray" => {
                let ptr = self.library_ptr(args, 0)?;
                let n = self.next_int()?;
                for i in 0..n.max(0) as usize {
                    let v = if name == "getarray" {
                        Value::Int(self.next_int()?)
                    } else {
                        Value::Float(self.next_float()?)
                    };
                    self.library_store(ptr, i, v)?;
                }
                Some(Value::Int(n))
            }
            "putint" => {
                let v = int_arg(0)?;
                self.output.extend_from_slice(v.to_string().as_bytes());
                None
            }
            "putch" => {
                self.output.push(int_arg(0)? as u8);
                None
            }
            "putfloat" => {
                let v = match args.first() {
                    Some(Value::Float(f)) => *f,
                    other => {
                        return Err(ExecError::TypeMismatch(format!(
                            "`putfloat` expected a float argument, found {:?}",
                            other
                        )))
                    }
                };
                self.output.extend_from_slice(hex_float(v).as_bytes());
                None
            }
            "putarray" | "putfarray" => {
                let n = int_arg(0)?;
                let ptr = self.library_ptr(args, 1)?;
                let mut line = format!("{}:", n);
                for i in 0..n.max(0) as usize {
                    match self.library_load(ptr, i)? {
                        Value::Int(v) => line.push_str(&format!(" {}", v)),
                        Value::Float(f) => line.push_str(&format!(" {}", hex_float(f))),
                        Value::Ptr { .. } => {
                            return Err(ExecError::TypeMismatch("pointer in array".to_string()))
                        }
                    }
                }
                line.push('\n');
                self.output.extend_from_slice(line.as_bytes());
                None
            }
            // 计时函数在解释执行时不产生输出
            "_sysy_starttime" | "_sysy_stoptime" => None,
            _ => return Err(ExecError::UnknownFunction(name.to_string())),
        };
        Ok(ret)
    }
}

/// 与 C 中 `printf("%a", (double)v)` 相同的格式
pub fn hex_float(v: f32) -> String {
    let v = v as f64;
    if v.is_nan() {
        return "nan".to_string();
    }
    let sign = if v.is_sign_negative() { "-" } else { "" };
    if v.is_infinite() {
        return format!("{}inf", sign);
    }
    if v == 0.0 {
        return format!("{}0x0p+0", sign);
    }

    let bits = v.to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i64;
    let mantissa = bits & ((1u64 << 52) - 1);
    let (lead, exp) = if exp == 0 { (0, -1022) } else { (1, exp - 1023) };
    let mut frac = format!("{:013x}", mantissa);
    while frac.ends_with('0') {
        frac.pop();
    }
    if frac.is_empty() {
        format!("{}0x{}p{:+}", sign, lead, exp)
    } else {
        format!("{}0x{}.{}p{:+}", sign, lead, frac, exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ir::program::GlobalVal;

    fn int(name: &str) -> Operand {
        Operand::new(name, OperandType::Int)
    }

    fn main_with(body: Vec<Instruction>) -> Program {
        let mut main = Function::new("main", vec![], OperandType::Int);
        main.body = body;
        Program {
            global_vals: vec![],
            functions: vec![main],
        }
    }

    #[test]
    fn hex_float_matches_printf() {
        assert_eq!(hex_float(3.0), "0x1.8p+1");
        assert_eq!(hex_float(1.0), "0x1p+0");
        assert_eq!(hex_float(0.25), "0x1p-2");
        assert_eq!(hex_float(-0.5), "-0x1p-1");
        assert_eq!(hex_float(0.0), "0x0p+0");
    }

    #[test]
    fn jumps_outside_the_body_are_rejected() {
        let back = main_with(vec![
            Instruction::goto(-2),
            Instruction::Return { value: Operand::int_literal(0) },
        ]);
        assert_eq!(
            Executor::new(&back).run_main(),
            Err(ExecError::JumpOutOfRange(String::from("main"), 0))
        );

        let forward = main_with(vec![
            Instruction::goto(3),
            Instruction::Return { value: Operand::int_literal(0) },
        ]);
        assert_eq!(
            Executor::new(&forward).run_main(),
            Err(ExecError::JumpOutOfRange(String::from("main"), 0))
        );

        // 跳到末尾等同于 return
        let end = main_with(vec![
            Instruction::goto(2),
            Instruction::Return { value: Operand::int_literal(1) },
        ]);
        assert!(Executor::new(&end).run_main().is_ok());
    }

    #[test]
    fn loop_counts_to_ten() {
        // i = 0; while (i < 10) i = i + 1; return i;
        let i = int("i.3");
        let c = int("temp_0");
        let program = main_with(vec![
            Instruction::unary(Operator::Def, Operand::int_literal(0), i.clone()),
            Instruction::op(Operator::Lss, i.clone(), Operand::int_literal(10), c.clone()),
            Instruction::branch(c, 2),
            Instruction::goto(3),
            Instruction::op(Operator::Add, i.clone(), Operand::int_literal(1), i.clone()),
            Instruction::goto(-4),
            Instruction::Return { value: i },
        ]);
        let out = Executor::new(&program).run_main().unwrap();
        assert_eq!(out.exit_code, 10);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let program = main_with(vec![
            Instruction::unary(Operator::Def, Operand::int_literal(0), int("z.3")),
            Instruction::op(Operator::Div, Operand::int_literal(1), int("z.3"), int("temp_0")),
            Instruction::Return { value: int("temp_0") },
        ]);
        assert!(matches!(
            Executor::new(&program).run_main(),
            Err(ExecError::DivisionByZero(_))
        ));
    }

    #[test]
    fn global_array_bounds_are_checked() {
        let arr = Operand::new("a.1", OperandType::IntPtr);
        let mut program = main_with(vec![
            Instruction::op(Operator::Store, arr.clone(), Operand::int_literal(3), Operand::int_literal(1)),
            Instruction::Return { value: Operand::int_literal(0) },
        ]);
        program.global_vals.push(GlobalVal::new(arr, Some(3)));
        assert_eq!(
            Executor::new(&program).run_main(),
            Err(ExecError::OutOfBounds("a.1".into(), 3))
        );
    }

    #[test]
    fn step_limit_stops_infinite_loop() {
        let program = main_with(vec![Instruction::goto(0)]);
        assert_eq!(
            Executor::new(&program).with_step_limit(100).run_main(),
            Err(ExecError::StepLimit(100))
        );
    }

    #[test]
    fn library_io() {
        let n = int("temp_0");
        let program = main_with(vec![
            Instruction::Call {
                callee: "getint".into(),
                args: vec![],
                dest: n.clone(),
            },
            Instruction::Call {
                callee: "putint".into(),
                args: vec![n.clone()],
                dest: Operand::null(),
            },
            Instruction::Call {
                callee: "putch".into(),
                args: vec![Operand::int_literal(10)],
                dest: Operand::null(),
            },
            Instruction::Return { value: n },
        ]);
        let out = Executor::new(&program).with_input("  42\n").run_main().unwrap();
        assert_eq!(out.output, "42\n");
        assert_eq!(out.exit_code, 42);
    }
}
