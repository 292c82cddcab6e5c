use once_cell::sync::Lazy;
use std::{
    ffi::OsStr,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tempfile::TempDir;

static TEST_CLI: Lazy<TestCli> = Lazy::new(|| {
    let cli_path = std::env::current_exe()
        .ok()
        .and_then(|p| Some(p.parent()?.parent()?.join("nexus")))
        .expect("Could not resolve CLI executable from test executable");
    TestCli { cli_path }
});

pub struct TestCli {
    cli_path: PathBuf,
}

impl TestCli {
    pub fn get() -> &'static Self {
        &TEST_CLI
    }

    /// A CLI with its own config file, talking to `endpoint`.
    pub fn session(&self, endpoint: &str) -> TestSession<'_> {
        TestSession {
            cli: self,
            config_dir: tempfile::tempdir().expect("Could not create config directory"),
            endpoint: endpoint.to_owned(),
        }
    }

    pub fn output(&self, command: &mut Command) -> String {
        let output = command.output().unwrap();

        if !output.status.success() {
            panic!(
                "failed to run command:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        String::from_utf8(output.stdout).unwrap()
    }

    pub fn output_error(&self, command: &mut Command) -> String {
        let output = command.output().unwrap();

        if output.status.success() {
            panic!(
                "succeeded running command (expected failure):\n{}",
                String::from_utf8_lossy(&output.stdout)
            );
        }

        String::from_utf8(output.stderr).unwrap()
    }
}

pub struct TestSession<'cli> {
    cli: &'cli TestCli,
    config_dir: TempDir,
    endpoint: String,
}

impl TestSession<'_> {
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("contexts.json")
    }

    pub fn work_dir(&self) -> &Path {
        self.config_dir.path()
    }

    /// Command with an explicit config file only, for the `config` subcommands.
    pub fn bare_command(&self) -> Command {
        let mut command = Command::new(&self.cli.cli_path);
        command
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .arg("--config-file")
            .arg(self.config_path());
        command
    }

    pub fn command(&self) -> Command {
        let mut command = self.bare_command();
        command
            .arg("--endpoint")
            .arg(&self.endpoint)
            .arg("--direct-endpoint")
            .arg(format!("{}/v1.17", self.endpoint))
            .arg("--username")
            .arg("test-user")
            .arg("--password")
            .arg("test-password");
        command
    }

    pub fn run(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> String {
        self.cli.output(self.command().args(args))
    }

    pub fn run_bare(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> String {
        self.cli.output(self.bare_command().args(args))
    }

    pub fn run_and_error(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> String {
        self.cli.output_error(self.command().args(args))
    }

    pub fn run_with_stdin(
        &self,
        args: impl IntoIterator<Item = impl AsRef<OsStr>>,
        stdin: &[u8],
    ) -> String {
        let mut process = self
            .command()
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        process.stdin.as_mut().unwrap().write_all(stdin).unwrap();
        let output = process.wait_with_output().unwrap();

        if !output.status.success() {
            panic!(
                "failed to run command:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        String::from_utf8(output.stdout).unwrap()
    }
}
