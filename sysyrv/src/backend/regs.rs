use crate::error::CodegenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegKind {
    Integer,
    Float,
}

/// 物理寄存器：编号 + 所属寄存器文件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PReg(pub u8, pub RegKind);

impl PReg {
    pub const fn new(num: u8, kind: RegKind) -> Self { Self(num, kind) }
    pub const fn num(&self) -> u8 { self.0 }
    pub const fn kind(&self) -> RegKind { self.1 }
    pub const fn is_float(&self) -> bool {
        match self.1 {
            RegKind::Float => true,
            _ => false,
        }
    }
}

/// 参数寄存器个数（a0-a7 / fa0-fa7）
pub const ARG_REGS: usize = 8;

#[rustfmt::skip]
// RV32 通用寄存器
pub const fn x_reg(index: u8) -> PReg { PReg::new(index, RegKind::Integer) }
pub const fn zero() -> PReg { x_reg(0) }
pub const fn ra() -> PReg { x_reg(1) }
pub const fn sp() -> PReg { x_reg(2) }
// 源操作数
pub const fn t0() -> PReg { x_reg(5) }
pub const fn t1() -> PReg { x_reg(6) }
// 结果
pub const fn t2() -> PReg { x_reg(7) }
// 地址与大立即数
pub const fn t3() -> PReg { x_reg(28) }
// 临时寄存器池
pub const fn t4() -> PReg { x_reg(29) }
pub const fn t5() -> PReg { x_reg(30) }
pub const fn t6() -> PReg { x_reg(31) }
pub const fn a0() -> PReg { x_reg(10) }
pub const fn a_reg(index: u8) -> PReg { x_reg(10 + index) }

#[rustfmt::skip]
// RV32F 浮点寄存器
pub const fn f_reg(index: u8) -> PReg { PReg::new(index, RegKind::Float) }
pub const fn ft0() -> PReg { f_reg(0) }
pub const fn ft1() -> PReg { f_reg(1) }
pub const fn ft2() -> PReg { f_reg(2) }
pub const fn fa0() -> PReg { f_reg(10) }
pub const fn fa_reg(index: u8) -> PReg { f_reg(10 + index) }

/// ABI 名称
pub fn abi_name(reg: PReg) -> &'static str {
    const X: [&str; 32] = [
        "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
        "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
        "t5", "t6",
    ];
    const F: [&str; 32] = [
        "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fa0", "fa1", "fa2",
        "fa3", "fa4", "fa5", "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7", "fs8", "fs9",
        "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
    ];
    let table = match reg.kind() {
        RegKind::Integer => &X,
        RegKind::Float => &F,
    };
    table.get(reg.num() as usize).copied().unwrap_or("<invalid>")
}

/// 地址计算用的临时寄存器，按 LIFO 顺序借还
#[derive(Debug)]
pub struct TempPool {
    free: Vec<PReg>,
    in_use: Vec<PReg>,
}

impl Default for TempPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TempPool {
    pub fn new() -> Self {
        Self {
            free: vec![t6(), t5(), t4()],
            in_use: vec![],
        }
    }

    pub fn acquire_temp(&mut self) -> Result<PReg, CodegenError> {
        let reg = self.free.pop().ok_or(CodegenError::RegisterExhausted)?;
        self.in_use.push(reg);
        Ok(reg)
    }

    pub fn release_temp(&mut self, reg: PReg) -> Result<(), CodegenError> {
        match self.in_use.pop() {
            Some(last) if last == reg => {
                self.free.push(reg);
                Ok(())
            }
            _ => Err(CodegenError::Contract(format!(
                "register {} released out of order",
                abi_name(reg)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_names() {
        assert_eq!(abi_name(t3()), "t3");
        assert_eq!(abi_name(a_reg(7)), "a7");
        assert_eq!(abi_name(fa_reg(1)), "fa1");
        assert_eq!(abi_name(ft2()), "ft2");
        assert_eq!(abi_name(sp()), "sp");
    }

    #[test]
    fn pool_is_lifo_and_bounded() {
        let mut pool = TempPool::new();
        let r1 = pool.acquire_temp().unwrap();
        let r2 = pool.acquire_temp().unwrap();
        let r3 = pool.acquire_temp().unwrap();
        assert_eq!((r1, r2, r3), (t4(), t5(), t6()));
        assert_eq!(pool.acquire_temp(), Err(CodegenError::RegisterExhausted));
        assert!(pool.release_temp(r2).is_err());
    }

    #[test]
    fn released_register_is_reused() {
        let mut pool = TempPool::new();
        let r = pool.acquire_temp().unwrap();
        pool.release_temp(r).unwrap();
        assert_eq!(pool.acquire_temp().unwrap(), r);
    }
}
