//! CLI entry point for fable_script.
//! Usage: cargo run -p fable_script -- compile data/logic/core.twl --out core.ron

use std::{env, fs, process};

use fable_script::{ScriptError, compile_knowledge_base, compile_to_ron};

fn main() {
    let args: Vec<String> = env::args().collect();

    let rest: Vec<String> = match args.as_slice() {
        [_, flag, cmd, tail @ ..] if flag == "--" && (cmd == "compile" || cmd == "check") => {
            let mut v = vec![cmd.clone()];
            v.extend_from_slice(tail);
            v
        },
        [_, cmd, tail @ ..] if cmd == "compile" || cmd == "check" => {
            let mut v = vec![cmd.clone()];
            v.extend_from_slice(tail);
            v
        },
        _ => {
            eprintln!("Usage:\n  fable_script check <file.twl>\n  fable_script compile <file.twl> [--out <out.ron>]");
            process::exit(2);
        },
    };
    match rest[0].as_str() {
        "check" => run_check(&rest[1..]),
        _ => run_compile(&rest[1..]),
    }
}

fn read_source(path: Option<&String>) -> String {
    let Some(path) = path else {
        eprintln!("a knowledge-base file is required");
        process::exit(2);
    };
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: unable to read '{path}': {e}");
        process::exit(1);
    })
}

fn report(path: &str, err: &ScriptError) -> ! {
    match err {
        ScriptError::Invalid(errors) => {
            for e in errors {
                eprintln!("{path}: {e}");
            }
            eprintln!("{} error(s)", errors.len());
        },
        other => eprintln!("{path}: {other}"),
    }
    process::exit(1);
}

fn run_check(args: &[String]) {
    let src = read_source(args.first());
    let path = &args[0];
    match compile_knowledge_base(&src) {
        Ok(kb) => println!(
            "{path}: ok ({} types, {} predicates, {} rules, {} constraints)",
            kb.types.len(),
            kb.predicates.len(),
            kb.rules.len(),
            kb.constraints.len()
        ),
        Err(e) => report(path, &e),
    }
}

fn run_compile(args: &[String]) {
    let mut path: Option<String> = None;
    let mut out_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--out" {
            if i + 1 >= args.len() {
                eprintln!("--out requires a filepath");
                process::exit(2);
            }
            out_path = Some(args[i + 1].clone());
            i += 2;
            continue;
        }
        if path.is_none() {
            path = Some(args[i].clone());
        }
        i += 1;
    }
    let src = read_source(path.as_ref());
    let path = path.unwrap_or_default();
    let ron = compile_knowledge_base(&src)
        .and_then(|kb| compile_to_ron(&kb))
        .unwrap_or_else(|e| report(&path, &e));
    if let Some(out) = out_path {
        fs::write(&out, ron).unwrap_or_else(|e| {
            eprintln!("error: writing '{out}': {e}");
            process::exit(1);
        });
    } else {
        println!("{ron}");
    }
}
