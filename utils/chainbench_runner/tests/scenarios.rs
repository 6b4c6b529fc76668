//! End to end runs of the `chainbench` binary, each in a scratch directory of its own.

use std::{
    env, fs,
    path::PathBuf,
    process::{Command, Output},
};

const CHAR_MEMCPY: &str = "CWE122_Heap_Based_Buffer_Overflow__c_CWE805_char_memcpy_01";
const WCHAR_MEMMOVE: &str = "CWE122_Heap_Based_Buffer_Overflow__c_CWE805_wchar_t_memmove_01";
const INT_MULTIPLY: &str = "CWE190_Integer_Overflow__int_fscanf_multiply_01";

fn scratch(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("chainbench_scenario_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn chainbench(dir: &PathBuf, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chainbench"))
        .args(args)
        .current_dir(dir)
        .env_remove("ADD")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn stdin_without_payload_exits_with_2() {
    let dir = scratch("stdin_missing");
    let output = chainbench(&dir, &["single", "--case", INT_MULTIPLY]);

    assert_eq!(output.status.code(), Some(2));
    assert!(!stdout(&output).contains("single_done"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("requires payload.bin"));
}

#[test]
fn env_without_payload_runs_empty() {
    let dir = scratch("env_empty");
    let output = chainbench(
        &dir,
        &[
            "single",
            "--case",
            INT_MULTIPLY,
            "--variant",
            "good",
            "--channel",
            "env",
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("[CB] single_done effects=1 regions=1 payload_len=0"));
}

#[test]
fn stdin_payload_reaches_the_case() {
    let dir = scratch("stdin_payload");
    fs::write(dir.join("payload.bin"), b"21\n").unwrap();
    let output = chainbench(&dir, &["single", "--case", INT_MULTIPLY]);

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("42"));
    assert!(out.contains("payload_len=3"));
}

#[cfg(unix)]
#[test]
fn bad_variant_aborts() {
    let dir = scratch("abort");
    let output = chainbench(&dir, &["single", "--case", CHAR_MEMCPY, "--channel", "file"]);

    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(output.status.signal(), Some(6));
    }
    assert!(!stdout(&output).contains("single_done"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("safety property violated"));
}

#[cfg(unix)]
#[test]
fn aborted_stdin_run_leaves_no_temp_file() {
    use std::os::unix::process::ExitStatusExt;

    let dir = scratch("abort_tmp");
    let tmp = dir.join("tmp");
    fs::create_dir_all(&tmp).unwrap();
    fs::write(dir.join("payload.bin"), b"2000000000\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_chainbench"))
        .args(["single", "--case", INT_MULTIPLY])
        .current_dir(&dir)
        .env("TMPDIR", &tmp)
        .output()
        .unwrap();

    assert_eq!(output.status.signal(), Some(6));
    let leftovers: Vec<_> = fs::read_dir(&tmp)
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .filter(|name| name.to_string_lossy().starts_with(".cb_stdin"))
        .collect();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
}

#[test]
fn oversized_capacity_is_a_usage_error() {
    let dir = scratch("capacity");
    let output = chainbench(
        &dir,
        &[
            "single",
            "--case",
            INT_MULTIPLY,
            "--channel",
            "env",
            "--capacity",
            &usize::MAX.to_string(),
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[CB] ERROR"));
}

#[test]
fn good_variant_completes() {
    let dir = scratch("good");
    let output = chainbench(
        &dir,
        &[
            "single",
            "--case",
            CHAR_MEMCPY,
            "--variant",
            "good",
            "--channel",
            "file",
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("single_done effects=1 regions=1"));
}

#[test]
fn symbolic_replay_prints_the_record() {
    let dir = scratch("symbolic");
    let output = chainbench(
        &dir,
        &[
            "single",
            "--case",
            WCHAR_MEMMOVE,
            "--channel",
            "file",
            "--mode",
            "symbolic",
            "--assign",
            "copy_len=51",
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    let json = &out[out.find('{').unwrap()..];
    let record: serde_json::Value = serde_json::from_str(json).unwrap();
    assert_eq!(record["type"], "HEAP_OVERFLOW");
    assert_eq!(record["variables"][0]["name"], "copy_len");
    assert_eq!(record["variables"][0]["value"], 51);
}

#[test]
fn explore_finds_the_overflow() {
    let dir = scratch("explore");
    let out_file = dir.join("chains.json");
    let output = chainbench(
        &dir,
        &[
            "explore",
            "--case",
            WCHAR_MEMMOVE,
            "--seed",
            "0",
            "--out",
            out_file.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("counterexamples=1"));
    let records: serde_json::Value =
        serde_json::from_slice(&fs::read(&out_file).unwrap()).unwrap();
    assert_eq!(records[0]["cwe"], 122);
    assert_eq!(records[0]["postcondition"], "!(copy_len <= alloc_wchars)");
}

#[test]
fn list_prints_every_case() {
    let dir = scratch("list");
    let output = chainbench(&dir, &["list"]);

    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    let ids: Vec<&str> = out.lines().collect();
    assert_eq!(ids, [CHAR_MEMCPY, WCHAR_MEMMOVE, INT_MULTIPLY]);
}

#[test]
fn bench_classifies_children() {
    let dir = scratch("bench");
    let output = chainbench(&dir, &["bench", "--channel", "file", "--json"]);

    assert_eq!(output.status.code(), Some(0));
    let results: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 6);

    let outcome = |case: &str, variant: &str| {
        results
            .iter()
            .find(|r| r["case"] == case && r["variant"] == variant)
            .map(|r| r["outcome"]["kind"].clone())
            .unwrap()
    };
    #[cfg(unix)]
    assert_eq!(outcome(CHAR_MEMCPY, "bad"), "crash");
    assert_eq!(outcome(CHAR_MEMCPY, "good"), "ok");
    assert_eq!(outcome(WCHAR_MEMMOVE, "good"), "ok");
}
