//! Integration tests for mise-s3-cache
//!
//! Every test runs the binary against the filesystem backend inside a
//! throwaway project, with HOME and XDG dirs pointed into the sandbox so no
//! user configuration leaks in.

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Sandbox {
        temp: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let project = temp.path().join("project");
            std::fs::create_dir_all(project.join(".git")).unwrap();
            std::fs::write(
                project.join(".mise.toml"),
                "[tools]\ndemo = \"1.0.0\"\n",
            )
            .unwrap();

            let install = temp.path().join("installs/demo/1.0.0/bin");
            std::fs::create_dir_all(&install).unwrap();
            std::fs::write(install.join("demo"), "#!/bin/sh\necho demo\n").unwrap();
            std::fs::write(install.join("../README"), "demo tool\n").unwrap();

            std::fs::create_dir_all(temp.path().join("remote")).unwrap();
            std::fs::create_dir_all(temp.path().join("home")).unwrap();
            Self { temp }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.temp.path().join(rel)
        }

        /// Command with no backend configured
        fn bare(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("mise-s3-cache");
            cmd.current_dir(self.path("project"))
                .env("HOME", self.path("home"))
                .env("XDG_CONFIG_HOME", self.path("home/.config"))
                .env("XDG_CACHE_HOME", self.path("home/.cache"))
                .env("MISE_S3_CACHE_DIR", self.path("state"))
                .env_remove("MISE_S3_CACHE_CONFIG")
                .env_remove("MISE_S3_CACHE_BUCKET")
                .env_remove("MISE_S3_CACHE_BACKEND")
                .env_remove("MISE_S3_CACHE_ROOT")
                .env_remove("MISE_TOOL_NAME")
                .env_remove("MISE_TOOL_VERSION")
                .env_remove("MISE_TOOL_INSTALL_PATH")
                .arg("--no-local");
            cmd
        }

        /// Command using the filesystem backend under `remote/`
        fn cmd(&self) -> Command {
            let mut cmd = self.bare();
            cmd.env("MISE_S3_CACHE_BACKEND", "fs")
                .env("MISE_S3_CACHE_ROOT", self.path("remote"))
                .env("MISE_S3_CACHE_RETRIES", "0");
            cmd
        }

        fn install_dir(&self) -> String {
            self.path("installs/demo/1.0.0").display().to_string()
        }

        fn store_demo(&self) {
            self.cmd()
                .args(["store", "demo", "1.0.0", "-p", &self.install_dir()])
                .assert()
                .success()
                .stdout(predicate::str::contains("Stored demo@1.0.0"));
        }
    }

    fn files_under(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return found;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(files_under(&path));
            } else {
                found.push(path);
            }
        }
        found
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("mise-s3-cache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("shared tool cache for mise"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("mise-s3-cache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mise-s3-cache"));
    }

    #[test]
    fn check_miss_exits_one() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["check", "demo", "1.0.0"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("not found in cache"));
    }

    #[test]
    fn store_check_restore_round_trip() {
        let sandbox = Sandbox::new();
        sandbox.store_demo();

        let remote = files_under(&sandbox.path("remote"));
        let names: Vec<String> = remote
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert!(names.contains(&"demo-1.0.0.tar.gz".to_string()), "{names:?}");
        assert!(names.contains(&"demo-1.0.0.tar.gz.sha256".to_string()));
        assert!(names.contains(&"metadata.json".to_string()));
        assert!(remote
            .iter()
            .all(|p| p.to_string_lossy().contains("mise-cache/tools/demo/1.0.0/")));

        sandbox
            .cmd()
            .args(["check", "demo", "1.0.0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("exists in cache"));

        let dest = sandbox.path("restored/demo");
        sandbox
            .cmd()
            .args(["restore", "demo", "1.0.0", "-p"])
            .arg(&dest)
            .assert()
            .success()
            .stdout(predicate::str::contains("Restored demo@1.0.0"));

        assert_eq!(
            std::fs::read_to_string(dest.join("bin/demo")).unwrap(),
            "#!/bin/sh\necho demo\n"
        );
        assert_eq!(std::fs::read_to_string(dest.join("README")).unwrap(), "demo tool\n");
    }

    #[test]
    fn blank_checksum_object_fails_restore() {
        let sandbox = Sandbox::new();
        sandbox.store_demo();

        let checksum = files_under(&sandbox.path("remote"))
            .into_iter()
            .find(|p| p.to_string_lossy().ends_with(".tar.gz.sha256"))
            .unwrap();
        std::fs::write(&checksum, "\n").unwrap();

        let dest = sandbox.path("restored/demo");
        sandbox
            .cmd()
            .args(["restore", "demo", "1.0.0", "-p"])
            .arg(&dest)
            .assert()
            .code(1);
        assert!(!dest.exists());
    }

    #[test]
    fn second_store_is_skipped() {
        let sandbox = Sandbox::new();
        sandbox.store_demo();
        sandbox
            .cmd()
            .args(["store", "demo", "1.0.0", "-p", &sandbox.install_dir()])
            .assert()
            .success()
            .stdout(predicate::str::contains("already cached"));
    }

    #[test]
    fn undeclared_store_needs_force() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["store", "other", "2.0.0", "-p", &sandbox.install_dir()])
            .assert()
            .success()
            .stdout(predicate::str::contains("not declared"));
        assert!(files_under(&sandbox.path("remote")).is_empty());

        sandbox
            .cmd()
            .args(["store", "other", "2.0.0", "--force", "-p", &sandbox.install_dir()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Stored other@2.0.0"));
    }

    #[test]
    fn store_missing_source_fails() {
        let sandbox = Sandbox::new();
        let missing = sandbox.path("installs/demo/9.9.9").display().to_string();
        sandbox
            .cmd()
            .args(["store", "demo", "1.0.0", "-p", &missing])
            .assert()
            .failure()
            .stdout(predicate::str::contains("Install directory not found"));
    }

    #[test]
    fn restore_miss_is_recorded_in_stats() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["restore", "demo", "1.0.0", "-p"])
            .arg(sandbox.path("restored/demo"))
            .assert()
            .code(1);

        sandbox
            .cmd()
            .arg("stats")
            .assert()
            .success()
            .stdout(predicate::str::contains("Misses: 1"))
            .stdout(predicate::str::contains("demo@1.0.0"));
    }

    #[test]
    fn stats_empty() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("stats")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache activity recorded yet"));
    }

    #[test]
    fn status_shows_backend() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Backend: fs"))
            .stdout(predicate::str::contains("Cache available"));

        sandbox.cmd().args(["status", "--quiet"]).assert().success().stdout("");
    }

    #[test]
    fn status_quiet_unconfigured_fails() {
        let sandbox = Sandbox::new();
        sandbox.bare().args(["status", "--quiet"]).assert().code(1).stdout("");
    }

    #[test]
    fn hook_mode_is_silent_when_unconfigured() {
        let sandbox = Sandbox::new();
        sandbox
            .bare()
            .args(["restore", "demo", "1.0.0", "--hook-mode", "-p"])
            .arg(sandbox.path("restored/demo"))
            .assert()
            .code(1)
            .stdout("");

        sandbox
            .bare()
            .args(["store", "demo", "1.0.0", "--hook-mode", "-p", &sandbox.install_dir()])
            .assert()
            .success()
            .stdout("");
    }

    #[test]
    fn hook_mode_reads_mise_environment() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .env("MISE_TOOL_NAME", "demo")
            .env("MISE_TOOL_VERSION", "1.0.0")
            .env("MISE_TOOL_INSTALL_PATH", sandbox.install_dir())
            .args(["store", "--hook-mode"])
            .assert()
            .success()
            .stdout("");

        sandbox
            .cmd()
            .env("MISE_TOOL_NAME", "demo")
            .env("MISE_TOOL_VERSION", "1.0.0")
            .args(["check", "--hook-mode"])
            .assert()
            .success()
            .stdout("");
    }

    #[test]
    fn invalid_tool_rejected() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["check", "../evil", "1.0.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("Invalid tool name"));
        assert!(files_under(&sandbox.path("remote")).is_empty());
    }

    #[test]
    fn missing_target_errors_outside_hooks() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Provide TOOL and VERSION"));

        sandbox
            .cmd()
            .args(["check", "--hook-mode"])
            .assert()
            .success();
    }

    #[test]
    fn check_all_reports_project_tools() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["check", "--all"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("demo@1.0.0 not in cache"));

        sandbox.store_demo();
        sandbox
            .cmd()
            .args(["check", "--all"])
            .assert()
            .success()
            .stdout(predicate::str::contains("demo@1.0.0 cached"));
    }

    #[test]
    fn cleanup_local_only() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["cleanup", "--local-only"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stale locks"));
    }

    #[test]
    fn cleanup_keeps_fresh_entries() {
        let sandbox = Sandbox::new();
        sandbox.store_demo();
        sandbox
            .cmd()
            .args(["cleanup", "-d", "7"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0 objects"));
        assert_eq!(files_under(&sandbox.path("remote")).len(), 3);
    }

    #[test]
    fn cleanup_unconfigured_reports_hint() {
        let sandbox = Sandbox::new();
        sandbox
            .bare()
            .arg("cleanup")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unavailable"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn connectivity_test_passes_on_fs_backend() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("test")
            .assert()
            .success()
            .stdout(predicate::str::contains("Connectivity test passed"));
        assert!(files_under(&sandbox.path("remote")).is_empty());
    }

    #[test]
    fn project_config_file_is_discovered() {
        let sandbox = Sandbox::new();
        std::fs::write(
            sandbox.path("project/.mise-s3-cache.toml"),
            format!(
                "backend = \"fs\"\nroot = \"{}\"\nprefix = \"team\"\n",
                sandbox.path("remote").display()
            ),
        )
        .unwrap();

        let mut cmd = cargo_bin_cmd!("mise-s3-cache");
        cmd.current_dir(sandbox.path("project"))
            .env("HOME", sandbox.path("home"))
            .env("XDG_CONFIG_HOME", sandbox.path("home/.config"))
            .env("MISE_S3_CACHE_DIR", sandbox.path("state"))
            .env_remove("MISE_S3_CACHE_BACKEND")
            .env_remove("MISE_S3_CACHE_ROOT")
            .env_remove("MISE_S3_CACHE_PREFIX")
            .args(["store", "demo", "1.0.0", "-p", &sandbox.install_dir()])
            .assert()
            .success();

        assert!(files_under(&sandbox.path("remote"))
            .iter()
            .all(|p| p.to_string_lossy().contains("team/tools/demo")));
    }
}
