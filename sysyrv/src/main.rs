use std::io::Read;
use std::process::ExitCode;

use rustc_hash::FxHashMap as HashMap;
use sysyrv::backend::codegen::Generator;
use sysyrv::error::Result;
use sysyrv::frontend::ir::executor::Executor;
use tracing::{error, info};

const USAGE: &str = "\
[sysyrv] Usage:
[sysyrv]    sysyrv [options] source_file
[sysyrv] Options:
[sysyrv]    -ast <file>   : Output the AST to a file
[sysyrv]    -ir <file>    : Output the IR to a file
[sysyrv]    -asm <file>   : Output the ASM to a file( Has higher priority than -S!!! )
[sysyrv]    -S            : Emit ASM, written to the file given by -o
[sysyrv]    -o <file>     : Output file for -S
[sysyrv]    -run          : Interpret the IR, reading program input from stdin
[sysyrv]    -log <level>  : error | warn | info | debug | trace (default: warn)
[sysyrv]    -h            : Print this help";

/// 需要跟一个值的选项
const VALUE_FLAGS: [&str; 5] = ["ast", "ir", "asm", "o", "log"];

/// 解析命令行参数
fn parse_arguments() -> std::result::Result<HashMap<String, String>, String> {
    let mut args_map = HashMap::default();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg.strip_prefix('-') {
            Some("h") => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            Some(flag @ ("S" | "run")) => {
                args_map.insert(flag.to_string(), String::from("true"));
            }
            Some(flag) if VALUE_FLAGS.contains(&flag) => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| format!("option `-{}` expects a value", flag))?;
                args_map.insert(flag.to_string(), value.clone());
                i += 1;
            }
            Some(flag) => return Err(format!("unknown option `-{}`", flag)),
            None => {
                args_map.insert(String::from("source"), arg.to_string());
            }
        }
        i += 1;
    }
    Ok(args_map)
}

/// 检查命令行参数
fn check_args(args: &HashMap<String, String>) -> std::result::Result<(), String> {
    let source = args.get("source").ok_or("source file not specified")?;
    if args.contains_key("S") && !args.contains_key("o") && !args.contains_key("asm") {
        return Err("output file not specified".to_string());
    }
    if !std::path::Path::new(source).exists() {
        return Err(format!("source file `{}` not found", source));
    }
    Ok(())
}

fn log_level(args: &HashMap<String, String>) -> std::result::Result<tracing::Level, String> {
    match args.get("log").map(String::as_str) {
        None | Some("warn") => Ok(tracing::Level::WARN),
        Some("error") => Ok(tracing::Level::ERROR),
        Some("info") => Ok(tracing::Level::INFO),
        Some("debug") => Ok(tracing::Level::DEBUG),
        Some("trace") => Ok(tracing::Level::TRACE),
        Some(other) => Err(format!("unknown log level `{}`", other)),
    }
}

fn run(args: &HashMap<String, String>) -> Result<Option<i32>> {
    let emit_ast = args.get("ast");
    let emit_ir = args.get("ir");
    let emit_asm = args.get("asm");
    let emit_s = args.contains_key("S");
    let execute = args.contains_key("run");

    let source = args.get("source").map(String::as_str).unwrap_or_default();
    let src = std::fs::read_to_string(source)?;

    let ast = sysyrv::parse(&src)?;
    info!("parsed `{}`", source);
    if let Some(ast_file) = emit_ast {
        std::fs::write(ast_file, format!("{:#?}", ast))?;
    }

    let program = sysyrv::frontend::irgen(&ast)?;
    info!("generated IR for {} functions", program.functions.len());
    if let Some(ir_file) = emit_ir {
        std::fs::write(ir_file, program.get_ir_string())?;
    }

    // -asm 优先于 -S -o
    if let Some(output) = emit_asm.or(if emit_s { args.get("o") } else { None }) {
        let asm = Generator::new(&program).gen()?;
        std::fs::write(output, asm)?;
        info!("wrote assembly to `{}`", output);
    }

    if execute {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        let outcome = Executor::new(&program).with_input(&input).run_main()?;
        print!("{}", outcome.output);
        return Ok(Some(outcome.exit_code));
    }
    Ok(None)
}

fn main() -> ExitCode {
    // 参数解析与检查
    let args = match parse_arguments().and_then(|args| check_args(&args).map(|_| args)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {}\n{}", msg, USAGE);
            return ExitCode::FAILURE;
        }
    };
    let level = match log_level(&args) {
        Ok(level) => level,
        Err(msg) => {
            eprintln!("error: {}", msg);
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match run(&args) {
        // 与进程退出码一致，只保留低 8 位
        Ok(Some(code)) => ExitCode::from((code & 0xff) as u8),
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_internal() {
                error!("internal compiler error, please report it");
            }
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
