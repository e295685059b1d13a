use crate::common::*;
use predicates::prelude::*;

#[test]
fn completions_bash_generates_output() {
    use clap::CommandFactory;
    use clap_complete::aot::generate;
    use std::io::BufWriter;

    let mut buf = BufWriter::new(Vec::new());
    generate(
        clap_complete::aot::Shell::Bash,
        &mut dbrig::cli::Cli::command(),
        "dbrig",
        &mut buf,
    );

    let output = String::from_utf8(buf.into_inner().unwrap()).unwrap();
    assert!(!output.is_empty(), "bash completions should not be empty");
    assert!(output.contains("dbrig"), "bash completions should reference 'dbrig'");
}

#[test]
fn completions_command_needs_no_data_root() {
    let home = TestHome::new();
    home.cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef dbrig"));
    assert!(!home.path().join("containers").exists());
}
