use std::process::Command;

fn run_when(args: &[&str]) -> Result<(String, String, i32), Box<dyn std::error::Error>> {
    let output = Command::new(env!("CARGO_BIN_EXE_when")).args(args).env_remove("CONTEXTKEY_LOG").output()?;

    let stdout = String::from_utf8(output.stdout)?;
    let stderr = String::from_utf8(output.stderr)?;
    let exit_code = output.status.code().unwrap_or(-1);

    Ok((stdout.trim().to_string(), stderr.trim().to_string(), exit_code))
}

#[test]
fn test_cli_basic_clause() {
    let (stdout, _stderr, code) = run_when(&["a && b", "a=true", "b=1"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "true");
}

#[test]
fn test_cli_missing_key_is_false() {
    let (stdout, _stderr, code) = run_when(&["a && b", "a=true"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "false");
}

#[test]
fn test_cli_with_json_context() {
    let (stdout, _stderr, code) = run_when(&["x in list && n > 2", "--json", r#"{"list": ["x"], "n": 3}"#]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "true");
}

#[test]
fn test_cli_pairs_override_json() {
    let (stdout, _stderr, code) = run_when(&["n > 2", "--json", r#"{"n": 3}"#, "n=1"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "false");
}

#[test]
fn test_cli_array_pair() {
    let (stdout, _stderr, code) = run_when(&["item in list", "item=b", "list=[a,b]"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "true");
}

#[test]
fn test_cli_serialize_and_negate() {
    let (stdout, _stderr, code) = run_when(&["a && (b || c)", "--serialize"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "a && b || a && c");

    let (stdout, _stderr, code) = run_when(&["a || b", "--serialize", "--negate"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "!a && !b");
}

#[test]
fn test_cli_platform_constants() {
    let (stdout, _stderr, code) = run_when(&["isMac || isLinux || isWindows", "--platform", "--serialize"]).unwrap();
    assert_eq!(code, 0);
    if cfg!(any(target_os = "macos", target_os = "linux", target_os = "windows")) {
        assert_eq!(stdout, "true");
    }
}

#[test]
fn test_cli_output_json() {
    let (stdout, _stderr, code) = run_when(&["a == 'x' && b", "a=x", "b=true", "--output-json"]).unwrap();
    assert_eq!(code, 0);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["result"], true);
    assert_eq!(json["expression"], "b && a == 'x'");
    assert_eq!(json["keys"], serde_json::json!(["b", "a"]));
    assert!(json["execution_time"].as_str().unwrap().ends_with("ms"));
}

#[test]
fn test_cli_parse_error() {
    let (stdout, stderr, code) = run_when(&["a b"]).unwrap();
    assert_eq!(code, 2);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Unexpected token"), "stderr: {}", stderr);
}

#[test]
fn test_cli_strict_regex() {
    let (stdout, _stderr, code) = run_when(&["p =~ /src/main/", "p=src/main"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "true");

    let (_stdout, _stderr, code) = run_when(&["p =~ /src/main/", "--strict"]).unwrap();
    assert_eq!(code, 2);
}

#[test]
fn test_cli_validate() {
    let (stdout, _stderr, code) = run_when(&["a = b", "--validate"]).unwrap();
    assert_eq!(code, 2);
    assert!(stdout.contains("Did you mean == or =~?"), "stdout: {}", stdout);

    let (stdout, _stderr, code) = run_when(&["a == b", "--validate", "--output-json"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(stdout, "[]");
}

#[test]
fn test_cli_usage_errors() {
    let (_stdout, _stderr, code) = run_when(&[]).unwrap();
    assert_eq!(code, 1);

    let (_stdout, stderr, code) = run_when(&["a", "novalue"]).unwrap();
    assert_eq!(code, 1);
    assert!(stderr.contains("key=value"));

    let (_stdout, _stderr, code) = run_when(&["a", "--json", "[1, 2]"]).unwrap();
    assert_eq!(code, 1);
}
