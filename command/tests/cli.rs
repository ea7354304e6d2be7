use std::{
    fs,
    path::Path,
    process::{Command, Output},
};

use tempfile::TempDir;

const SNIFF_LOG: &str = "\
# Heap Bounds [0x1000-0x3000] (4096 12288)
# CSV Format: Malloc/Free (as 0 or 1), Nanoseconds, Base Address, Bytes Requested
[0] 100 malloc(0x1067) 16: 0, 100, 4199, 16
[1] 200 malloc(0x1080) 32: 0, 200, 4224, 32
[2] 300 free(0x1080) 0: 1, 300, 4224, 0
";

const SNIFF_SCAN: &str = "\
# Scanning heap range: 0x1000 to 0x3000
0x1070 -> 0x20
0x99999 -> 0x1
0x1088 -> 0x1067
0x1070 -> 0x20
";

const EXPECTED: &str = "\
digraph {
\"0x1067\" -> \"0x20\"
\"0x99999\" -> \"0x1\"
\"0x1080\" -> \"0x1067\"
\"0x1067\" -> \"0x20\"
}
";

fn write_logs(dir: &Path, alloc: &str, scan: &str) {
    fs::write(dir.join("sniff.log"), alloc).unwrap();
    fs::write(dir.join("sniff_scan1.log"), scan).unwrap();
}

fn heapgraph(dir: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_heapgraph"))
        .arg(dir.join("sniff.log"))
        .arg(dir.join("sniff_scan1.log"))
        .args(extra)
        .output()
        .unwrap()
}

#[test]
fn test_digraph_on_stdout() {
    let dir = TempDir::new().unwrap();
    write_logs(dir.path(), SNIFF_LOG, SNIFF_SCAN);

    let cases: [&[&str]; 3] = [&[], &["--index", "linear"], &["--parallel", "--threads", "2"]];
    for extra in cases {
        let out = heapgraph(dir.path(), extra);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert_eq!(String::from_utf8(out.stdout).unwrap(), EXPECTED);
    }
}

#[test]
fn test_digraph_to_output_file() {
    let dir = TempDir::new().unwrap();
    write_logs(dir.path(), SNIFF_LOG, SNIFF_SCAN);
    let dot = dir.path().join("heap.dot");

    let out = heapgraph(dir.path(), &["--output", dot.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
    assert_eq!(fs::read_to_string(dot).unwrap(), EXPECTED);
}

#[test]
fn test_comment_only_scan() {
    let dir = TempDir::new().unwrap();
    write_logs(dir.path(), SNIFF_LOG, "# Scanning heap range: 0x1000 to 0x3000\n");

    let out = heapgraph(dir.path(), &[]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap(), "digraph {\n}\n");
}

#[test]
fn test_malformed_scan_line_fails_without_output() {
    let dir = TempDir::new().unwrap();
    write_logs(dir.path(), SNIFF_LOG, "0x1070 -> 0x20\n0x1070 0x20\n");

    let out = heapgraph(dir.path(), &[]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("sniff_scan1.log"), "{stderr}");
    assert!(stderr.contains("scan log line 2: missing `->` separator: `0x1070 0x20`"), "{stderr}");

    let out = heapgraph(dir.path(), &["--lenient"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8(out.stdout).unwrap(), "digraph {\n\"0x1067\" -> \"0x20\"\n}\n");
}

#[test]
fn test_malformed_allocation_line_fails() {
    let dir = TempDir::new().unwrap();
    write_logs(dir.path(), "[0] 100 malloc(0x1067) 16: 0, 100, 0x1067, 16\n", SNIFF_SCAN);

    let out = heapgraph(dir.path(), &[]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("sniff.log"), "{stderr}");
    assert!(stderr.contains("allocation log line 1: invalid decimal `0x1067`"), "{stderr}");
}

#[test]
fn test_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("sniff.log"), SNIFF_LOG).unwrap();

    let out = heapgraph(dir.path(), &[]);
    assert!(!out.status.success());
    assert!(String::from_utf8(out.stderr).unwrap().contains("failed to open"));
}

#[test]
fn test_wrong_argument_count_is_usage_error() {
    let out = Command::new(env!("CARGO_BIN_EXE_heapgraph")).arg("sniff.log").output().unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("scan_log"), "{stderr}");
    assert!(stderr.contains("--help"), "{stderr}");
}
