use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// 计时宏只有两种形式，合并为一个正则
static TIMING_MACRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(starttime|stoptime)\s*\(\s*\)").expect("invalid timing macro regex")
});

/// SysY 源码的预处理器
///
/// 逐行展开计时宏，参数为宏所在的行号：
///   `starttime()` → `_sysy_starttime(行号)`
///   `stoptime()`  → `_sysy_stoptime(行号)`
pub fn replace_macros(src: &str) -> String {
    let mut result = String::with_capacity(src.len() + 64);

    for (idx, line) in src.lines().enumerate() {
        let lineno = idx + 1;
        let expanded = TIMING_MACRO_RE.replace_all(line, |caps: &Captures| {
            format!("_sysy_{}({})", &caps[1], lineno)
        });
        result.push_str(&expanded);
        result.push('\n');
    }

    result
}

#[cfg(test)]
mod tests {
    use super::replace_macros;

    #[test]
    fn expands_with_line_numbers() {
        let src = "int main() {\n  starttime();\n  putint(1);\n  stoptime ( );\n}";
        let out = replace_macros(src);
        assert!(out.contains("_sysy_starttime(2);"));
        assert!(out.contains("_sysy_stoptime(4);"));
        assert!(!out.contains(" starttime"));
    }

    #[test]
    fn leaves_other_identifiers_alone() {
        let out = replace_macros("int mystarttime() { return 0; }");
        assert_eq!(out, "int mystarttime() { return 0; }\n");
    }
}
