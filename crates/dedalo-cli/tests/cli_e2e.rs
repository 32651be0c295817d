use std::fs;
use std::path::Path;
use std::process::{Command, Output};
#[cfg(unix)]
use std::{
    process::Stdio,
    thread,
    time::{Duration, Instant},
};

const GRAPH: &str = r#"
<http://ex.org/A> <http://ex.org/likes> <http://ex.org/X> .
<http://ex.org/B> <http://ex.org/likes> <http://ex.org/X> .
<http://ex.org/C> <http://ex.org/likes> <http://ex.org/Y> .
<http://ex.org/D> <http://ex.org/likes> <http://ex.org/Y> .
<http://ex.org/X> <http://ex.org/in> <http://ex.org/Paris> .
"#;

const LABELS: &str = "pos,<http://ex.org/A>\npos,http://ex.org/B\nneg,http://ex.org/C\nneg,http://ex.org/D\n";

fn dedalo(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dedalo"))
        .args(args)
        .current_dir(dir)
        .env("DEDALO_LOG", "dedalo=warn")
        .output()
        .expect("run dedalo")
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("graph.nt"), GRAPH).unwrap();
    fs::write(dir.path().join("labels.csv"), LABELS).unwrap();
    fs::write(dir.path().join("prefixes.txt"), "ex http://ex.org/\n").unwrap();
    dir
}

#[test]
fn explain_writes_text_rows() {
    let dir = fixture();
    let out = dedalo(
        &[
            "explain",
            "graph.nt",
            "labels.csv",
            "out.tsv",
            "--prefix",
            "prefixes.txt",
            "--rounds",
            "1",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let text = fs::read_to_string(dir.path().join("out.tsv")).unwrap();
    let best = text
        .lines()
        .find(|l| l.contains("\tex:likes\tex:X\t"))
        .expect("likes -> X row");
    assert!(best.starts_with("1.000000\t"));
    assert!(text.lines().all(|l| l.split('\t').count() == 7));
}

#[test]
fn explain_writes_jsonl_rows() {
    let dir = fixture();
    let out = dedalo(
        &[
            "explain",
            "graph.nt",
            "labels.csv",
            "out.jsonl",
            "--format",
            "jsonl",
            "--minimum-score",
            "0.5",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let text = fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
    assert!(!text.is_empty());
    for line in text.lines() {
        let row: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(row["score"].as_f64().unwrap() > 0.5);
    }
}

#[test]
fn explain_refuses_existing_output() {
    let dir = fixture();
    fs::write(dir.path().join("out.tsv"), "keep me").unwrap();
    let out = dedalo(&["explain", "graph.nt", "labels.csv", "out.tsv"], dir.path());

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("already exists"));
    assert_eq!(fs::read_to_string(dir.path().join("out.tsv")).unwrap(), "keep me");
}

#[test]
fn explain_rejects_unknown_heuristic_before_output() {
    let dir = fixture();
    let out = dedalo(
        &["explain", "graph.nt", "labels.csv", "out.tsv", "--heuristic", "dfs"],
        dir.path(),
    );
    assert!(!out.status.success());
    assert!(!dir.path().join("out.tsv").exists());
}

#[test]
fn explain_rejects_missing_positive_group() {
    let dir = fixture();
    let out = dedalo(
        &["explain", "graph.nt", "labels.csv", "out.tsv", "--groupid", "nobody"],
        dir.path(),
    );
    assert!(!out.status.success());
    assert!(!dir.path().join("out.tsv").exists());
}

#[test]
fn stats_reports_counts() {
    let dir = fixture();
    let out = dedalo(&["stats", "graph.nt"], dir.path());
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("triples:    5"));
    assert!(stdout.contains("predicates: 2"));
}

#[cfg(unix)]
/// A graph whose frontier keeps growing, so the search outlives the test's signals.
fn write_branching_fixture(dir: &Path) {
    const NODES: usize = 1500;
    const PREDICATES: usize = 12;
    let mut graph = String::new();
    for i in 0..NODES {
        for k in 0..PREDICATES {
            let j = (i * (k + 3) + k + 1) % NODES;
            graph.push_str(&format!(
                "<http://ex.org/n{i}> <http://ex.org/p{k}> <http://ex.org/n{j}> .\n"
            ));
        }
    }
    fs::write(dir.join("big.nt"), graph).unwrap();

    let mut labels = String::new();
    for i in 0..300 {
        let group = if i % 2 == 0 { "1" } else { "0" };
        labels.push_str(&format!("{group},http://ex.org/n{i}\n"));
    }
    fs::write(dir.join("big.csv"), labels).unwrap();
}

#[cfg(unix)]
fn spill_dirs(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".path-data-"))
        .collect()
}

#[cfg(unix)]
fn wait_for(what: &str, deadline: Duration, mut ready: impl FnMut() -> bool) {
    let started = Instant::now();
    while !ready() {
        assert!(started.elapsed() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(20));
    }
}

#[cfg(unix)]
#[test]
fn second_interrupt_removes_spill_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_branching_fixture(dir.path());

    let mut child = Command::new(env!("CARGO_BIN_EXE_dedalo"))
        .args([
            "explain",
            "big.nt",
            "big.csv",
            "out.tsv",
            "--cache-size",
            "1",
            "--runtime",
            "120",
        ])
        .current_dir(dir.path())
        .env("DEDALO_LOG", "dedalo=warn")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn dedalo");

    // The output file is opened after the signal listener is installed.
    let out = dir.path().join("out.tsv");
    wait_for("output file", Duration::from_secs(60), || out.exists());
    assert_eq!(spill_dirs(dir.path()).len(), 1);

    let interrupt = || {
        let status = Command::new("kill")
            .args(["-INT", &child.id().to_string()])
            .status()
            .expect("run kill");
        assert!(status.success());
    };
    interrupt();
    thread::sleep(Duration::from_millis(10));
    interrupt();

    let status = child.wait().expect("wait for dedalo");
    assert!(status.code().is_some(), "dedalo died from the signal: {status:?}");
    assert!(spill_dirs(dir.path()).is_empty());
}
