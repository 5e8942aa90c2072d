use rustc_hash::FxHashMap as HashMap;

use crate::error::CodegenError;

/// 操作数名 -> 栈帧内偏移（相对 sp），每个函数重建一次
#[derive(Debug, Default)]
pub struct StackVarMap {
    offsets: HashMap<String, i32>,
    size: i32,
}

impl StackVarMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 name 分配 size 字节；已存在时保持原有位置
    pub fn add_operand(&mut self, name: &str, size: usize) {
        if self.offsets.contains_key(name) {
            return;
        }
        self.offsets.insert(name.to_string(), self.size);
        self.size += size as i32;
    }

    pub fn find_operand(&self, name: &str, func: &str) -> Result<i32, CodegenError> {
        self.offsets
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::MissingFrameSlot(name.to_string(), func.to_string()))
    }

    /// 局部变量占用的字节数
    pub fn size(&self) -> i32 {
        self.size
    }

    /// 帧大小：局部变量 + ra，按 16 字节对齐
    pub fn frame_size(&self) -> i32 {
        (self.size + 4 + 15) & !15
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i32)> {
        self.offsets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_disjoint() {
        let mut map = StackVarMap::new();
        map.add_operand("a.3", 4);
        map.add_operand("arr.3", 40);
        map.add_operand("temp_0", 4);
        map.add_operand("a.3", 4);
        assert_eq!(map.find_operand("a.3", "f"), Ok(0));
        assert_eq!(map.find_operand("arr.3", "f"), Ok(4));
        assert_eq!(map.find_operand("temp_0", "f"), Ok(44));
        assert_eq!(map.size(), 48);
    }

    #[test]
    fn frame_is_aligned_and_holds_ra() {
        let mut map = StackVarMap::new();
        assert_eq!(map.frame_size(), 16);
        map.add_operand("x", 12);
        assert_eq!(map.frame_size(), 16);
        map.add_operand("y", 4);
        assert_eq!(map.frame_size(), 32);
    }

    #[test]
    fn missing_slot_is_an_error() {
        let map = StackVarMap::new();
        assert_eq!(
            map.find_operand("ghost", "main"),
            Err(CodegenError::MissingFrameSlot("ghost".into(), "main".into()))
        );
    }
}
