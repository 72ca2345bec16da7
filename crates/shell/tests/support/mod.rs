#![cfg(unix)]
#![allow(dead_code)]

use assert_cmd::Command;
use ferry_agent::{AgentListener, UnixSpawner};
use ferry_common::Endpoint;
use once_cell::sync::Lazy;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Directory holding the `ferry` and `ferryctl` binaries of the root package,
/// built once per test binary into the shared target directory.
static BIN_DIR: Lazy<PathBuf> = Lazy::new(|| {
    let dir = assert_cmd::cargo::cargo_bin("ferry")
        .parent()
        .expect("target profile dir")
        .to_path_buf();
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let mut build = std::process::Command::new(env!("CARGO"));
    build
        .arg("build")
        .arg("--manifest-path")
        .arg(workspace.join("Cargo.toml"))
        .args(["-p", "ferry", "--bins"])
        .arg("--target-dir")
        .arg(dir.parent().expect("target dir"));
    if dir.file_name().is_some_and(|name| name == "release") {
        build.arg("--release");
    }
    let status = build.status().expect("failed to run cargo build");
    assert!(status.success(), "building the ferry binaries failed");
    dir
});

pub fn binary_path(name: &str) -> PathBuf {
    BIN_DIR.join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

/// A private ferry home plus an optional in-process agent.
pub struct FerryFixture {
    temp: TempDir,
    agent: Option<(Runtime, CancellationToken)>,
}

impl FerryFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp dir");
        fs::create_dir_all(temp.path().join("home")).expect("failed to create ferry home");
        Self { temp, agent: None }
    }

    /// Same fixture with an agent listening on `socket()`.
    pub fn with_agent() -> Self {
        let mut fixture = Self::new();
        let runtime = Runtime::new().expect("failed to start runtime");
        let endpoint = Endpoint::Unix(fixture.socket());
        let listener = runtime
            .block_on(AgentListener::bind(&endpoint, UnixSpawner))
            .expect("failed to bind agent");
        let cancel = CancellationToken::new();
        runtime.spawn(listener.run(cancel.clone()));
        fixture.agent = Some((runtime, cancel));
        fixture
    }

    pub fn home(&self) -> PathBuf {
        self.temp.path().join("home")
    }

    pub fn socket(&self) -> PathBuf {
        self.temp.path().join("agent.sock")
    }

    pub fn write_config(&self, contents: &str) {
        fs::write(self.home().join("config.toml"), contents).expect("failed to write config");
    }

    fn prepare(&self, mut cmd: Command) -> Command {
        cmd.env("FERRY_HOME", self.home())
            .env("FERRY_ENDPOINT", format!("unix:{}", self.socket().display()))
            .env_remove("FERRY_LOG")
            .env_remove("RUST_LOG")
            .env_remove("FERRYENV")
            .env_remove("ORBENV")
            .current_dir(self.temp.path());
        cmd
    }

    pub fn ferry(&self) -> Command {
        self.prepare(Command::new(binary_path("ferry")))
    }

    pub fn ferryctl(&self) -> Command {
        self.prepare(Command::new(binary_path("ferryctl")))
    }

    /// Run the dispatcher through a symlink called `name`.
    pub fn stub(&self, name: &str) -> Command {
        let dir = self.temp.path().join("stubs");
        fs::create_dir_all(&dir).expect("failed to create stub dir");
        let link = dir.join(name);
        if !link.exists() {
            let target = binary_path("ferry");
            std::os::unix::fs::symlink(target, &link).expect("failed to create stub link");
        }
        self.prepare(Command::new(link))
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.home().join(relative)
    }
}

impl Drop for FerryFixture {
    fn drop(&mut self) {
        if let Some((runtime, cancel)) = self.agent.take() {
            cancel.cancel();
            runtime.shutdown_background();
        }
    }
}

pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}
