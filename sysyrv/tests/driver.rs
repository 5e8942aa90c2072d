use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// 把源程序写进临时目录，返回路径
fn source_file(name: &str, src: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("sysyrv-{}-{}.sy", name, std::process::id()));
    std::fs::write(&path, src).unwrap();
    path
}

fn sysyrv(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_sysyrv"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn run_reports_exit_code_and_output() {
    let path = source_file(
        "run",
        "int main() { int n = getint(); putint(n * 2); return 300; }",
    );
    let out = sysyrv(&["-run", path.to_str().unwrap()], "21");
    assert_eq!(String::from_utf8_lossy(&out.stdout), "42");
    // 只保留低 8 位
    assert_eq!(out.status.code(), Some(300 & 0xff));
}

#[test]
fn errors_are_reported_once() {
    let path = source_file("undeclared", "int main() { return missing; }");
    let out = sysyrv(&["-run", path.to_str().unwrap()], "");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(
        stderr.matches("use of undeclared identifier `missing`").count(),
        1,
        "{}",
        stderr
    );
}

#[test]
fn assembly_is_written_to_the_output_file() {
    let path = source_file("asm", "int main() { return 0; }");
    let output = std::env::temp_dir().join(format!("sysyrv-asm-{}.s", std::process::id()));
    let out = sysyrv(
        &["-S", "-o", output.to_str().unwrap(), path.to_str().unwrap()],
        "",
    );
    assert!(out.status.success());
    let asm = std::fs::read_to_string(&output).unwrap();
    assert!(asm.contains("\t.global main\n"));
    assert!(asm.contains("\t.size main, .-main\n"));
}
