use clap::Parser as ClapParser;
use contextkey::{
    context_from_json, validate_when_clauses, ConstantRegistry, ContextEvent, ContextStore, ContextValue, Expr, Parser,
    ParserConfig,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const EXIT_USAGE: i32 = 1;
const EXIT_PARSE: i32 = 2;

/// Evaluate a when-clause against a context given on the command line.
#[derive(ClapParser, Debug)]
#[command(
    name = "when",
    version,
    after_help = "Examples:\n  when \"a && b\" a=true b=1\n  when \"x in list\" --json '{\"list\": [\"x\"]}'\n  when \"isLinux && !isMac\" --platform --serialize"
)]
struct Cli {
    /// The when-clause.
    expression: String,

    /// Context values as key=value pairs.
    #[arg(value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// Context values as a JSON object; pairs given as KEY=VALUE override it.
    #[arg(long, value_name = "JSON")]
    json: Option<String>,

    /// Require regex literals to be well-formed (no recovery of unescaped slashes).
    #[arg(long)]
    strict: bool,

    /// Fold isMac/isLinux/isWindows for the current platform.
    #[arg(long)]
    platform: bool,

    /// Print the canonical form instead of evaluating.
    #[arg(long)]
    serialize: bool,

    /// Negate the expression before printing or evaluating.
    #[arg(long)]
    negate: bool,

    /// Only report diagnostics for the clause.
    #[arg(long)]
    validate: bool,

    /// Output the result in JSON format with keys and timing.
    #[arg(long)]
    output_json: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("CONTEXTKEY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if cli.validate {
        std::process::exit(run_validate(&cli));
    }

    let mut values = BTreeMap::new();
    if let Some(json_str) = &cli.json {
        match context_from_json(json_str) {
            Ok(map) => values.extend(map),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(EXIT_USAGE);
            }
        }
    }
    for arg in &cli.vars {
        match arg.split_once('=') {
            Some((name, value_str)) => {
                values.insert(name.to_string(), parse_value(value_str));
            }
            None => {
                eprintln!("Invalid context assignment: '{}'. Use format: key=value", arg);
                std::process::exit(EXIT_USAGE);
            }
        }
    }

    let config = ParserConfig { regex_parsing_with_error_recovery: !cli.strict };
    let mut parser = if cli.platform {
        match ConstantRegistry::probe_platform().await {
            Ok(constants) => Parser::with_constants(config, Arc::new(constants)),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(EXIT_USAGE);
            }
        }
    } else {
        Parser::with_config(config)
    };

    let start_time = Instant::now();
    let expr = match parser.parse(&cli.expression) {
        Some(expr) => expr,
        None => {
            for e in parser.parsing_errors() {
                eprintln!("Error: {}", e);
            }
            std::process::exit(EXIT_PARSE);
        }
    };
    let expr = if cli.negate { expr.negate() } else { expr };

    if cli.serialize {
        if cli.output_json {
            let output = json!({ "expression": expr.serialize(), "keys": expr.keys() });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string()));
        } else {
            println!("{}", expr);
        }
        return;
    }

    let store = ContextStore::new();
    if let Err(e) = store.handle(&ContextEvent::ExtensionsStarted, &values).await {
        eprintln!("Error: {}", e);
        std::process::exit(EXIT_USAGE);
    }
    let result = store.evaluate(&expr);
    let execution_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    if cli.output_json {
        println!("{}", format_json_output(&expr, result, execution_time_ms));
    } else {
        println!("{}", result);
    }
}

fn run_validate(cli: &Cli) -> i32 {
    let diagnostics = validate_when_clauses(&[cli.expression.as_str()]).into_iter().next().unwrap_or_default();
    if cli.output_json {
        println!("{}", serde_json::to_string_pretty(&diagnostics).unwrap_or_else(|_| "[]".to_string()));
    } else {
        for d in &diagnostics {
            println!("{}..{}: {}", d.offset, d.offset + d.length, d.error_message);
        }
    }
    if diagnostics.is_empty() {
        0
    } else {
        EXIT_PARSE
    }
}

fn format_json_output(expr: &Expr, result: bool, execution_time_ms: f64) -> String {
    let output = json!({
        "result": result,
        "expression": expr.serialize(),
        "keys": expr.keys(),
        "execution_time": format!("{:.2} ms", execution_time_ms)
    });

    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

fn parse_value(s: &str) -> ContextValue {
    // Check for string (quoted)
    if s.len() >= 2 && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\''))) {
        return ContextValue::String(s[1..s.len() - 1].to_string());
    }

    match s {
        "true" => return ContextValue::Bool(true),
        "false" => return ContextValue::Bool(false),
        "null" => return ContextValue::Null,
        _ => {}
    }

    // Basic support for [a,b,c]
    if s.starts_with('[') && s.ends_with(']') {
        let inner = &s[1..s.len() - 1];
        if inner.trim().is_empty() {
            return ContextValue::Array(vec![]);
        }
        return ContextValue::Array(inner.split(',').map(|item| parse_value(item.trim())).collect());
    }

    if let Ok(num) = s.parse::<f64>() {
        return ContextValue::Number(num);
    }

    ContextValue::String(s.to_string())
}
