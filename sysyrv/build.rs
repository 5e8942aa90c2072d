fn main() {
    // 生成 src/frontend/lalrpop/sysy.lalrpop 对应的解析器
    lalrpop::process_root().unwrap();
}
