//! IR -> RV32IMF 汇编
//!
//! 所有具名操作数都住在栈帧里，每条 IR 指令先把源操作数取到固定的
//! 暂存寄存器（t0/t1，ft0/ft1），结果写回 t2/ft2 再存回栈帧。
//! 地址计算使用 t4-t6 组成的临时寄存器池，t3 专用于全局地址与大立即数。

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tracing::{debug, trace};

use super::{
    frame::StackVarMap,
    regs::*,
    rv_inst::{AsmData, AsmFunction, AsmModule, FOp, IOp, ROp, RvInst, SetOp},
};
use crate::error::CodegenError;
use crate::frontend::ir::{
    function::Function,
    instruction::{Instruction, Operator},
    operand::{Operand, OperandType},
    program::Program,
};

type Result<T> = std::result::Result<T, CodegenError>;

pub fn fits_imm12(v: i64) -> bool {
    (-2048..=2047).contains(&v)
}

fn align16(v: i32) -> i32 {
    (v + 15) & !15
}

/// 为函数分配栈帧：形参在前，随后按指令顺序为每个新出现的名字分配槽位。
/// 返回帧布局以及 alloc 出的数组名集合。
pub fn layout_frame(func: &Function, globals: &HashSet<String>) -> (StackVarMap, HashSet<String>) {
    let mut alloc_sizes: HashMap<&str, usize> = HashMap::default();
    for inst in func.body.iter() {
        if let Instruction::Alloc { size, dest } = inst {
            let max = alloc_sizes.entry(dest.name.as_str()).or_insert(0);
            *max = (*max).max(*size);
        }
    }

    let mut stack_map = StackVarMap::new();
    let mut arrays = HashSet::default();
    for param in func.parameters.iter() {
        stack_map.add_operand(&param.name, 4);
    }
    for inst in func.body.iter() {
        for op in inst.operands() {
            if !op.is_named() || globals.contains(&op.name) {
                continue;
            }
            match alloc_sizes.get(op.name.as_str()) {
                Some(size) => {
                    stack_map.add_operand(&op.name, 4 * size);
                    arrays.insert(op.name.clone());
                }
                None => stack_map.add_operand(&op.name, 4),
            }
        }
    }
    (stack_map, arrays)
}

pub struct Generator<'p> {
    program: &'p Program,
    globals: HashSet<String>,
    /// 标签计数器，整个编译单元共享
    label_cnt: usize,

    func_name: String,
    insts: Vec<RvInst>,
    stack_map: StackVarMap,
    arrays: HashSet<String>,
    frame_size: i32,
    // 调用前为溢出参数下移 sp 时，栈帧偏移需要加上的量
    sp_bias: i32,
    pool: TempPool,
}

impl<'p> Generator<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            globals: program.global_names(),
            label_cnt: 0,
            func_name: String::new(),
            insts: vec![],
            stack_map: StackVarMap::new(),
            arrays: HashSet::default(),
            frame_size: 0,
            sp_bias: 0,
            pool: TempPool::new(),
        }
    }

    pub fn gen(mut self) -> Result<String> {
        Ok(self.gen_module()?.get_asm())
    }

    pub fn gen_module(&mut self) -> Result<AsmModule> {
        let program = self.program;
        let mut module = AsmModule::default();
        for global in program.global_vals.iter() {
            module.data.push(AsmData {
                name: global.operand.name.clone(),
                words: global.array_len.unwrap_or(1),
                is_array: global.array_len.is_some(),
            });
        }
        for func in program.functions.iter() {
            module.funcs.push(self.gen_function(func)?);
        }
        Ok(module)
    }

    fn push(&mut self, inst: RvInst) {
        trace!("  {}", inst);
        self.insts.push(inst);
    }

    fn new_label(&mut self) -> String {
        let label = format!(".L{}", self.label_cnt);
        self.label_cnt += 1;
        label
    }

    fn contract(&self, what: impl std::fmt::Display) -> CodegenError {
        CodegenError::Contract(format!("{} in `{}`", what, self.func_name))
    }

    fn gen_function(&mut self, func: &Function) -> Result<AsmFunction> {
        self.func_name = func.name.clone();
        self.insts = vec![];
        self.sp_bias = 0;
        self.pool = TempPool::new();
        let (stack_map, arrays) = layout_frame(func, &self.globals);
        self.stack_map = stack_map;
        self.arrays = arrays;
        self.frame_size = self.stack_map.frame_size();

        let labels = self.scan_labels(func)?;

        self.gen_prologue(func)?;
        for (index, inst) in func.body.iter().enumerate() {
            if let Some(label) = labels.get(&index) {
                self.push(RvInst::Label(label.clone()));
            }
            trace!("{}:{} {}", func.name, index, inst);
            self.gen_inst(inst, index, &labels)?;
        }
        if let Some(label) = labels.get(&func.body.len()) {
            self.push(RvInst::Label(label.clone()));
        }
        if !func.body.last().map_or(false, Instruction::is_return) {
            self.gen_epilogue();
        }

        debug!(
            "generated function `{}`: frame {} bytes, {} asm instructions",
            func.name,
            self.frame_size,
            self.insts.len()
        );
        Ok(AsmFunction {
            name: func.name.clone(),
            insts: std::mem::take(&mut self.insts),
        })
    }

    /// 为每个跳转目标（包括末尾之后一条）分配标签
    fn scan_labels(&mut self, func: &Function) -> Result<HashMap<usize, String>> {
        let mut labels = HashMap::default();
        for (index, inst) in func.body.iter().enumerate() {
            if let Instruction::Goto { .. } = inst {
                match inst.jump_target(index) {
                    Some(target) if target <= func.body.len() => {
                        if !labels.contains_key(&target) {
                            let label = self.new_label();
                            labels.insert(target, label);
                        }
                    }
                    _ => return Err(CodegenError::MissingLabel(index)),
                }
            }
        }
        Ok(labels)
    }

    fn adjust_sp(&mut self, delta: i32) {
        if fits_imm12(delta as i64) {
            self.push(RvInst::addi(sp(), sp(), delta));
        } else {
            self.push(RvInst::Li { rd: t3(), imm: delta });
            self.push(RvInst::rtype(ROp::Add, sp(), sp(), t3()));
        }
    }

    /// sp + offset，超出 12 位时经 t3 计算
    fn sp_access(&mut self, offset: i32) -> (PReg, i32) {
        if fits_imm12(offset as i64) {
            (sp(), offset)
        } else {
            self.push(RvInst::Li { rd: t3(), imm: offset });
            self.push(RvInst::rtype(ROp::Add, t3(), sp(), t3()));
            (t3(), 0)
        }
    }

    fn load_at(&mut self, rd: PReg, offset: i32) {
        let (base, offset) = self.sp_access(offset);
        self.push(RvInst::Load { rd, base, offset });
    }

    fn store_at(&mut self, rs: PReg, offset: i32) {
        let (base, offset) = self.sp_access(offset);
        self.push(RvInst::Store { rs, base, offset });
    }

    fn slot(&self, name: &str) -> Result<i32> {
        Ok(self.stack_map.find_operand(name, &self.func_name)? + self.sp_bias)
    }

    fn is_global(&self, op: &Operand) -> bool {
        self.globals.contains(&op.name)
    }

    fn gen_prologue(&mut self, func: &Function) -> Result<()> {
        let frame = self.frame_size;
        self.adjust_sp(-frame);
        self.store_at(ra(), frame - 4);

        let (mut int_regs, mut float_regs, mut overflow) = (0u8, 0u8, 0);
        for param in func.parameters.iter() {
            let offset = self.slot(&param.name)?;
            let reg = if param.typ == OperandType::Float {
                (usize::from(float_regs) < ARG_REGS).then(|| {
                    float_regs += 1;
                    fa_reg(float_regs - 1)
                })
            } else {
                (usize::from(int_regs) < ARG_REGS).then(|| {
                    int_regs += 1;
                    a_reg(int_regs - 1)
                })
            };
            match reg {
                Some(reg) => self.store_at(reg, offset),
                None => {
                    // 调用者放在本帧之上的溢出参数
                    let scratch = if param.typ == OperandType::Float { ft0() } else { t0() };
                    self.load_at(scratch, frame + 4 * overflow);
                    overflow += 1;
                    self.store_at(scratch, offset);
                }
            }
        }
        Ok(())
    }

    fn gen_epilogue(&mut self) {
        let frame = self.frame_size;
        self.load_at(ra(), frame - 4);
        self.adjust_sp(frame);
        self.push(RvInst::Ret);
    }

    fn load_int(&mut self, op: &Operand, rd: PReg) -> Result<()> {
        match op.typ {
            OperandType::IntLiteral => {
                let imm = op
                    .as_int()
                    .ok_or_else(|| self.contract(format!("bad literal `{}`", op.name)))?;
                self.push(RvInst::Li { rd, imm });
            }
            OperandType::Int if self.is_global(op) => {
                self.push(RvInst::La { rd: t3(), sym: op.name.clone() });
                self.push(RvInst::Load { rd, base: t3(), offset: 0 });
            }
            OperandType::Int => {
                let offset = self.slot(&op.name)?;
                self.load_at(rd, offset);
            }
            _ => return Err(self.contract(format!("`{}` used as an int", op.name))),
        }
        Ok(())
    }

    fn load_float(&mut self, op: &Operand, rd: PReg) -> Result<()> {
        match op.typ {
            OperandType::FloatLiteral => {
                let value = op
                    .as_float()
                    .ok_or_else(|| self.contract(format!("bad literal `{}`", op.name)))?;
                self.push(RvInst::Li { rd: t3(), imm: value.to_bits() as i32 });
                self.push(RvInst::FmvWX { rd, rs: t3() });
            }
            OperandType::Float if self.is_global(op) => {
                self.push(RvInst::La { rd: t3(), sym: op.name.clone() });
                self.push(RvInst::Load { rd, base: t3(), offset: 0 });
            }
            OperandType::Float => {
                let offset = self.slot(&op.name)?;
                self.load_at(rd, offset);
            }
            _ => return Err(self.contract(format!("`{}` used as a float", op.name))),
        }
        Ok(())
    }

    /// 把寄存器写回 dest 的存储位置
    fn store_value(&mut self, rs: PReg, dest: &Operand) -> Result<()> {
        if !dest.is_named() || dest.is_float() != rs.is_float() {
            return Err(self.contract(format!("cannot store into `{}`", dest.name)));
        }
        if self.is_global(dest) {
            self.push(RvInst::La { rd: t3(), sym: dest.name.clone() });
            self.push(RvInst::Store { rs, base: t3(), offset: 0 });
        } else {
            let offset = self.slot(&dest.name)?;
            self.store_at(rs, offset);
        }
        Ok(())
    }

    /// 数组首地址：全局用 la，本帧数组用 sp 偏移，指针变量从槽位读出
    fn get_address(&mut self, op: &Operand, rd: PReg) -> Result<()> {
        if !op.is_ptr() {
            return Err(self.contract(format!("`{}` is not an array", op.name)));
        }
        if self.is_global(op) {
            self.push(RvInst::La { rd, sym: op.name.clone() });
        } else if self.arrays.contains(&op.name) {
            let offset = self.slot(&op.name)?;
            if fits_imm12(offset as i64) {
                self.push(RvInst::addi(rd, sp(), offset));
            } else {
                self.push(RvInst::Li { rd: t3(), imm: offset });
                self.push(RvInst::rtype(ROp::Add, rd, sp(), t3()));
            }
        } else {
            let offset = self.slot(&op.name)?;
            self.load_at(rd, offset);
        }
        Ok(())
    }

    /// base[index] 的地址，返回 (寄存器, 偏移)；寄存器用完后需要归还
    fn element_addr(&mut self, base: &Operand, index: &Operand) -> Result<(PReg, i32)> {
        let reg = self.pool.acquire_temp()?;
        self.get_address(base, reg)?;
        match index.as_int() {
            Some(i) if fits_imm12(i as i64 * 4) => return Ok((reg, i * 4)),
            Some(i) => self.push(RvInst::Li { rd: t0(), imm: i.wrapping_mul(4) }),
            None => {
                self.load_int(index, t0())?;
                self.push(RvInst::IType { op: IOp::Slli, rd: t0(), rs1: t0(), imm: 2 });
            }
        }
        self.push(RvInst::rtype(ROp::Add, reg, reg, t0()));
        Ok((reg, 0))
    }

    fn gen_inst(
        &mut self,
        inst: &Instruction,
        index: usize,
        labels: &HashMap<usize, String>,
    ) -> Result<()> {
        match inst {
            Instruction::Op { op, op1, op2, dest } => self.gen_op(*op, op1, op2, dest),
            // 空间已在栈帧中预留
            Instruction::Alloc { .. } => Ok(()),
            Instruction::Call { callee, args, dest } => self.gen_call(callee, args, dest),
            Instruction::Goto { cond, .. } => {
                let label = inst
                    .jump_target(index)
                    .and_then(|target| labels.get(&target))
                    .cloned()
                    .ok_or(CodegenError::MissingLabel(index))?;
                if cond.is_null() {
                    self.push(RvInst::J { label });
                } else {
                    // beqz 跳过 j，跳转距离不受分支指令范围限制
                    self.load_int(cond, t0())?;
                    let skip = self.new_label();
                    self.push(RvInst::Beqz { rs: t0(), label: skip.clone() });
                    self.push(RvInst::J { label });
                    self.push(RvInst::Label(skip));
                }
                Ok(())
            }
            Instruction::Return { value } => {
                if !value.is_null() {
                    if value.is_float() {
                        self.load_float(value, fa0())?;
                    } else {
                        self.load_int(value, a0())?;
                    }
                }
                self.gen_epilogue();
                Ok(())
            }
            Instruction::Unresolved(jump) => Err(self.contract(format!("unresolved {:?}", jump))),
        }
    }

    fn gen_op(&mut self, op: Operator, op1: &Operand, op2: &Operand, dest: &Operand) -> Result<()> {
        use Operator::*;
        match op {
            Def | Mov => {
                self.load_int(op1, t0())?;
                self.store_value(t0(), dest)
            }
            FDef | FMov => {
                self.load_float(op1, ft0())?;
                self.store_value(ft0(), dest)
            }
            CvtI2F => {
                self.load_int(op1, t0())?;
                self.push(RvInst::FcvtSW { rd: ft2(), rs: t0() });
                self.store_value(ft2(), dest)
            }
            CvtF2I => {
                self.load_float(op1, ft0())?;
                self.push(RvInst::FcvtWS { rd: t2(), rs: ft0() });
                self.store_value(t2(), dest)
            }
            Not => {
                self.load_int(op1, t0())?;
                self.push(RvInst::Set { op: SetOp::Seqz, rd: t2(), rs: t0() });
                self.store_value(t2(), dest)
            }
            FAdd | FSub | FMul | FDiv => {
                self.load_float(op1, ft0())?;
                self.load_float(op2, ft1())?;
                let fop = match op {
                    FAdd => FOp::FAdd,
                    FSub => FOp::FSub,
                    FMul => FOp::FMul,
                    _ => FOp::FDiv,
                };
                self.push(RvInst::FRType { op: fop, rd: ft2(), rs1: ft0(), rs2: ft1() });
                self.store_value(ft2(), dest)
            }
            FLss | FLeq | FGtr | FGeq | FEq | FNeq => {
                self.load_float(op1, ft0())?;
                self.load_float(op2, ft1())?;
                let (fop, rs1, rs2) = match op {
                    FLss => (FOp::Flt, ft0(), ft1()),
                    FLeq => (FOp::Fle, ft0(), ft1()),
                    FGtr => (FOp::Flt, ft1(), ft0()),
                    FGeq => (FOp::Fle, ft1(), ft0()),
                    _ => (FOp::Feq, ft0(), ft1()),
                };
                self.push(RvInst::FRType { op: fop, rd: t2(), rs1, rs2 });
                if op == FNeq {
                    self.push(RvInst::IType { op: IOp::Xori, rd: t2(), rs1: t2(), imm: 1 });
                }
                self.store_value(t2(), dest)
            }
            Load => {
                let (reg, offset) = self.element_addr(op1, op2)?;
                let rd = if op1.typ == OperandType::FloatPtr { ft2() } else { t2() };
                self.push(RvInst::Load { rd, base: reg, offset });
                self.pool.release_temp(reg)?;
                self.store_value(rd, dest)
            }
            Store => {
                let (reg, offset) = self.element_addr(op1, op2)?;
                let rs = if op1.typ == OperandType::FloatPtr {
                    self.load_float(dest, ft1())?;
                    ft1()
                } else {
                    self.load_int(dest, t1())?;
                    t1()
                };
                self.push(RvInst::Store { rs, base: reg, offset });
                self.pool.release_temp(reg)
            }
            GetPtr => {
                let (reg, offset) = self.element_addr(op1, op2)?;
                if offset != 0 {
                    self.push(RvInst::addi(reg, reg, offset));
                }
                self.store_value(reg, dest)?;
                self.pool.release_temp(reg)
            }
            _ => {
                self.gen_int_binary(op, op1, op2)?;
                self.store_value(t2(), dest)
            }
        }
    }

    /// 整数二元运算，结果放在 t2
    fn gen_int_binary(&mut self, op: Operator, op1: &Operand, op2: &Operand) -> Result<()> {
        use Operator::*;
        let imm = |o: &Operand| o.as_int().filter(|v| fits_imm12(*v as i64));

        // 立即数形式
        match op {
            Add => {
                let (var, lit) = match (imm(op1), imm(op2)) {
                    (_, Some(i)) => (op1, Some(i)),
                    (Some(i), _) => (op2, Some(i)),
                    _ => (op1, None),
                };
                if let Some(i) = lit {
                    self.load_int(var, t0())?;
                    self.push(RvInst::addi(t2(), t0(), i));
                    return Ok(());
                }
            }
            Sub => {
                if let Some(i) = op2.as_int().filter(|v| fits_imm12(-(*v as i64))) {
                    self.load_int(op1, t0())?;
                    self.push(RvInst::addi(t2(), t0(), -i));
                    return Ok(());
                }
                if op1.as_int() == Some(0) {
                    self.load_int(op2, t1())?;
                    self.push(RvInst::rtype(ROp::Sub, t2(), zero(), t1()));
                    return Ok(());
                }
            }
            Lss => {
                if let Some(i) = imm(op2) {
                    self.load_int(op1, t0())?;
                    self.push(RvInst::IType { op: IOp::Slti, rd: t2(), rs1: t0(), imm: i });
                    return Ok(());
                }
            }
            Eq | Neq => {
                if let Some(i) = imm(op2) {
                    self.load_int(op1, t0())?;
                    self.push(RvInst::IType { op: IOp::Xori, rd: t2(), rs1: t0(), imm: i });
                    let set = if op == Eq { SetOp::Seqz } else { SetOp::Snez };
                    self.push(RvInst::Set { op: set, rd: t2(), rs: t2() });
                    return Ok(());
                }
            }
            _ => {}
        }

        self.load_int(op1, t0())?;
        self.load_int(op2, t1())?;
        let (a, b, c) = (t0(), t1(), t2());
        match op {
            Add => self.push(RvInst::rtype(ROp::Add, c, a, b)),
            Sub => self.push(RvInst::rtype(ROp::Sub, c, a, b)),
            Mul => self.push(RvInst::rtype(ROp::Mul, c, a, b)),
            Div => self.push(RvInst::rtype(ROp::Div, c, a, b)),
            Mod => self.push(RvInst::rtype(ROp::Rem, c, a, b)),
            Lss => self.push(RvInst::rtype(ROp::Slt, c, a, b)),
            Gtr => self.push(RvInst::rtype(ROp::Slt, c, b, a)),
            Leq | Geq => {
                // a <= b 即 !(b < a)
                let (x, y) = if op == Leq { (b, a) } else { (a, b) };
                self.push(RvInst::rtype(ROp::Slt, c, x, y));
                self.push(RvInst::IType { op: IOp::Xori, rd: c, rs1: c, imm: 1 });
            }
            Eq | Neq => {
                self.push(RvInst::rtype(ROp::Xor, c, a, b));
                let set = if op == Eq { SetOp::Seqz } else { SetOp::Snez };
                self.push(RvInst::Set { op: set, rd: c, rs: c });
            }
            And => {
                self.push(RvInst::Set { op: SetOp::Snez, rd: a, rs: a });
                self.push(RvInst::Set { op: SetOp::Snez, rd: b, rs: b });
                self.push(RvInst::rtype(ROp::And, c, a, b));
            }
            Or => {
                self.push(RvInst::rtype(ROp::Or, c, a, b));
                self.push(RvInst::Set { op: SetOp::Snez, rd: c, rs: c });
            }
            _ => return Err(self.contract(format!("`{}` is not an integer operation", op.name()))),
        }
        Ok(())
    }

    fn load_arg(&mut self, arg: &Operand, reg: PReg) -> Result<()> {
        if arg.is_ptr() {
            self.get_address(arg, reg)
        } else if arg.is_float() {
            self.load_float(arg, reg)
        } else {
            self.load_int(arg, reg)
        }
    }

    fn gen_call(&mut self, callee: &str, args: &[Operand], dest: &Operand) -> Result<()> {
        let (mut int_regs, mut float_regs) = (0usize, 0usize);
        let mut placed = vec![];
        let mut overflow = vec![];
        for arg in args.iter() {
            if arg.is_float() {
                if float_regs < ARG_REGS {
                    placed.push((arg, fa_reg(float_regs as u8)));
                    float_regs += 1;
                } else {
                    overflow.push(arg);
                }
            } else if int_regs < ARG_REGS {
                placed.push((arg, a_reg(int_regs as u8)));
                int_regs += 1;
            } else {
                overflow.push(arg);
            }
        }

        // 溢出参数放在调用者下移 sp 后的区域，第 j 个位于 4j(sp)
        let area = align16(4 * overflow.len() as i32);
        if area > 0 {
            self.adjust_sp(-area);
            self.sp_bias = area;
            for (j, arg) in overflow.into_iter().enumerate() {
                let scratch = if arg.is_float() { ft0() } else { t0() };
                self.load_arg(arg, scratch)?;
                self.store_at(scratch, 4 * j as i32);
            }
        }
        for (arg, reg) in placed {
            self.load_arg(arg, reg)?;
        }
        self.push(RvInst::Call { func: callee.to_string() });
        if area > 0 {
            self.adjust_sp(area);
            self.sp_bias = 0;
        }

        if !dest.is_null() {
            let ret = if dest.is_float() { fa0() } else { a0() };
            self.store_value(ret, dest)?;
        }
        Ok(())
    }
}
