//! Behavioural smoke tests for the CLI entrypoint.
#![cfg(feature = "aws")]

use assert_cmd::cargo::cargo_bin_cmd;

#[test]
fn help_lists_the_subcommands() {
    let mut cmd = cargo_bin_cmd!("adf-stacks");
    let output = cmd.arg("--help").assert().success().get_output().clone();
    let stdout = String::from_utf8(output.stdout).unwrap_or_else(|err| panic!("utf8: {err}"));
    for subcommand in ["deploy", "deploy-iam", "delete", "teardown", "outputs"] {
        assert!(stdout.contains(subcommand), "missing {subcommand} in {stdout}");
    }
}
