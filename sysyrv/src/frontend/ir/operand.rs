/// IR操作数的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    Int,
    Float,
    IntPtr,
    FloatPtr,
    IntLiteral,
    FloatLiteral,
    Null,
}

impl OperandType {
    pub fn is_literal(&self) -> bool {
        matches!(self, OperandType::IntLiteral | OperandType::FloatLiteral)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, OperandType::IntPtr | OperandType::FloatPtr)
    }

    /// Float 与 FloatLiteral
    pub fn is_float(&self) -> bool {
        matches!(self, OperandType::Float | OperandType::FloatLiteral)
    }

    /// 指针指向的元素类型
    pub fn elem(&self) -> Option<OperandType> {
        match self {
            OperandType::IntPtr => Some(OperandType::Int),
            OperandType::FloatPtr => Some(OperandType::Float),
            _ => None,
        }
    }

    /// 去掉字面量属性后的值类型
    pub fn value_type(&self) -> OperandType {
        match self {
            OperandType::IntLiteral => OperandType::Int,
            OperandType::FloatLiteral => OperandType::Float,
            other => *other,
        }
    }
}

/// 操作数：变量、临时变量、字面量或指针
///
/// 字面量的值以文本形式保存在 `name` 中，不会出现在符号表或栈帧中。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operand {
    pub name: String,
    pub typ: OperandType,
}

impl Operand {
    pub fn new(name: impl Into<String>, typ: OperandType) -> Self {
        Self {
            name: name.into(),
            typ,
        }
    }

    pub fn int_literal(value: i32) -> Self {
        Self::new(value.to_string(), OperandType::IntLiteral)
    }

    pub fn float_literal(value: f32) -> Self {
        Self::new(value.to_string(), OperandType::FloatLiteral)
    }

    pub fn null() -> Self {
        Self::new("null", OperandType::Null)
    }

    pub fn is_null(&self) -> bool {
        self.typ == OperandType::Null
    }

    pub fn is_literal(&self) -> bool {
        self.typ.is_literal()
    }

    pub fn is_float(&self) -> bool {
        self.typ.is_float()
    }

    pub fn is_ptr(&self) -> bool {
        self.typ.is_ptr()
    }

    /// 具名操作数（非字面量、非空）
    pub fn is_named(&self) -> bool {
        !self.is_literal() && !self.is_null()
    }

    pub fn as_int(&self) -> Option<i32> {
        match self.typ {
            OperandType::IntLiteral => self.name.parse().ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self.typ {
            OperandType::FloatLiteral => self.name.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_text_round_trips() {
        assert_eq!(Operand::int_literal(-2147483648).as_int(), Some(i32::MIN));
        assert_eq!(Operand::float_literal(0.1).as_float(), Some(0.1));
        assert_eq!(Operand::float_literal(1e-10).as_float(), Some(1e-10));
        assert_eq!(Operand::float_literal(3.0).name, "3");
    }

    #[test]
    fn named_operands_have_no_literal_value() {
        let a = Operand::new("a.3", OperandType::Int);
        assert!(a.is_named());
        assert_eq!(a.as_int(), None);
        assert!(!Operand::null().is_named());
        assert!(!Operand::int_literal(0).is_named());
    }

    #[test]
    fn pointer_element_types() {
        assert_eq!(OperandType::FloatPtr.elem(), Some(OperandType::Float));
        assert_eq!(OperandType::Int.elem(), None);
        assert_eq!(OperandType::FloatLiteral.value_type(), OperandType::Float);
    }
}
