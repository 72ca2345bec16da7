#![cfg(unix)]

mod support;

use predicates::prelude::*;
use support::{is_symlink, FerryFixture};

#[test]
fn ferryctl_prints_version() {
    let fixture = FerryFixture::new();
    fixture
        .ferryctl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ferryctl"));
}

#[test]
fn ferryctl_rejects_unknown_subcommands() {
    let fixture = FerryFixture::new();
    fixture
        .ferryctl()
        .arg("uname")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn link_then_list_then_unlink() {
    let fixture = FerryFixture::new();
    fixture.ferryctl().args(["link", "uname"]).assert().success();
    assert!(is_symlink(&fixture.path("links/uname")));

    fixture
        .ferryctl()
        .arg("links")
        .assert()
        .success()
        .stdout("uname\n");
    // `ferry` answers management subcommands too.
    fixture
        .ferry()
        .args(["links", "--json"])
        .assert()
        .success()
        .stdout("[\"uname\"]\n");

    fixture.ferryctl().args(["unlink", "uname"]).assert().success();
    assert!(!fixture.path("links/uname").exists());
}

#[test]
fn double_link_fails_and_keeps_one_link() {
    let fixture = FerryFixture::new();
    fixture.ferryctl().args(["link", "foo"]).assert().success();
    fixture
        .ferryctl()
        .args(["link", "foo"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("foo is already linked"));
    let entries = std::fs::read_dir(fixture.path("links")).unwrap().count();
    assert_eq!(entries, 1);
}

#[test]
fn protected_names_cannot_be_linked_or_unlinked() {
    let fixture = FerryFixture::new();
    fixture
        .ferryctl()
        .args(["unlink", "open"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("default command"));
    fixture
        .ferryctl()
        .args(["link", "open"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already linked by default"));
    assert!(!fixture.path("links").exists());
}

#[test]
fn link_names_with_separators_are_invalid() {
    let fixture = FerryFixture::new();
    fixture
        .ferryctl()
        .args(["link", "bin/ls"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid link name"));
}

#[test]
fn install_defaults_creates_both_sets() {
    let fixture = FerryFixture::new();
    fixture.ferryctl().arg("install-defaults").assert().success();
    assert!(is_symlink(&fixture.path("bin/ferry")));
    assert!(is_symlink(&fixture.path("bin/ferryctl")));
    assert!(is_symlink(&fixture.path("bin-priority/open")));

    // Running it again replaces the directories cleanly.
    fixture.ferryctl().arg("install-defaults").assert().success();
    assert!(is_symlink(&fixture.path("bin/ferry")));
}

#[test]
fn path_translation_uses_config() {
    let fixture = FerryFixture::new();
    fixture.write_config("[paths]\nmode = \"aggressive\"\n");
    fixture
        .ferryctl()
        .args(["path", "/opt/tool", "/tmp/x", "/mnt/linux/etc"])
        .assert()
        .success()
        .stdout("/mnt/mac/opt/tool\n/tmp/x\n/etc\n");
    fixture
        .ferryctl()
        .args(["path", "--to-local", "/etc/hosts"])
        .assert()
        .success()
        .stdout("/mnt/mac/etc/hosts\n");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let fixture = FerryFixture::new();
    fixture.write_config("[transport]\nendpiont = \"/tmp/x\"\n");
    fixture
        .ferry()
        .args(["echo", "hi"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("ferry: "))
        .stderr(predicate::str::contains("invalid TOML"));
}

#[test]
fn unreachable_endpoint_fails_after_probe_timeout() {
    let fixture = FerryFixture::new();
    fixture.write_config("[transport]\nstart_timeout_ms = 100\n");
    fixture
        .ferry()
        .args(["echo", "hi"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not reachable"));
}
