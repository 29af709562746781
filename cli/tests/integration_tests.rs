use std::fs;
use std::path::PathBuf;
use std::process::Output;

/// Helper to create a temp directory that is cleaned up on drop.
struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "schema_build_test_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        Self { path }
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Writes a small schema directory with a reusable `user` field set.
fn write_schemas(dir: &TempDir) -> PathBuf {
    let schemas = dir.join("schemas");
    fs::create_dir_all(&schemas).expect("failed to create schema dir");
    fs::write(
        schemas.join("user.yml"),
        r#"
- name: user
  title: User
  description: User fields.
  reusable:
    top_level: true
    expected:
      - destination
  fields:
    - name: name
      level: core
      type: keyword
      description: User name.
"#,
    )
    .expect("failed to write user schema");
    fs::write(
        schemas.join("destination.yml"),
        r#"
- name: destination
  title: Destination
  description: Destination fields.
  fields:
    - name: address
      level: extended
      type: keyword
      description: Destination address.
"#,
    )
    .expect("failed to write destination schema");
    schemas
}

fn run(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_schema-build"))
        .args(args)
        .output()
        .expect("failed to run schema-build")
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

#[test]
fn build_prints_flat_view_as_json() {
    let dir = TempDir::new("flat_json");
    let schemas = write_schemas(&dir);

    let output = run(&["build", "--schemas", schemas.to_str().unwrap()]);
    assert!(output.status.success(), "build should succeed");

    let flat: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(flat["destination.user.name"]["original_fieldset"], "user");
    assert_eq!(flat["user.name"]["ignore_above"], 1024);
    assert!(flat.get("destination.address").is_some());
}

#[test]
fn build_prints_nested_view_as_yaml() {
    let dir = TempDir::new("nested_yaml");
    let schemas = write_schemas(&dir);

    let output = run(&[
        "build",
        "--schemas",
        schemas.to_str().unwrap(),
        "--view",
        "nested",
        "--format",
        "yaml",
    ]);
    assert!(output.status.success());

    let nested: serde_yaml::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    assert_eq!(nested["destination"]["title"].as_str(), Some("Destination"));
    assert_eq!(
        nested["destination"]["nestings"][0].as_str(),
        Some("destination.user")
    );
}

#[test]
fn build_reads_config_file() {
    let dir = TempDir::new("config");
    write_schemas(&dir);
    fs::write(
        dir.join("exclude.yml"),
        "- name: destination\n  fields:\n    - name: address\n",
    )
    .unwrap();
    let config = dir.join("schema-build.yml");
    fs::write(&config, "schemas: [schemas]\nexclude: [exclude.yml]\n").unwrap();

    let output = run(&["build", "--config", config.to_str().unwrap()]);
    assert!(output.status.success());

    let flat: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(flat.get("destination.address").is_none());
    assert!(flat.get("destination.user.name").is_some());
}

#[test]
fn build_combines_config_with_schema_flag() {
    let dir = TempDir::new("config_and_flag");
    let schemas = write_schemas(&dir);
    let config = dir.join("schema-build.yml");
    fs::write(&config, "strict: true\n").unwrap();

    let output = run(&[
        "build",
        "--config",
        config.to_str().unwrap(),
        "--schemas",
        schemas.to_str().unwrap(),
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "unexpected stderr: {stderr}");

    let flat: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(flat.get("destination.user.name").is_some());
}

// ---------------------------------------------------------------------------
// check and failures
// ---------------------------------------------------------------------------

#[test]
fn check_reports_counts() {
    let dir = TempDir::new("check");
    let schemas = write_schemas(&dir);

    let output = run(&["check", "--schemas", schemas.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 field set(s)"), "unexpected output: {stdout}");
    assert!(stdout.contains("3 field(s)"), "unexpected output: {stdout}");
}

#[test]
fn missing_schemas_fail_with_message() {
    let output = run(&["check"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "unexpected stderr: {stderr}");
}

#[test]
fn unknown_subset_path_fails() {
    let dir = TempDir::new("bad_subset");
    let schemas = write_schemas(&dir);
    let subset = dir.join("subset.yml");
    fs::write(&subset, "name: bad\nfields:\n  user:\n    fields:\n      nope: {}\n").unwrap();

    let output = run(&[
        "build",
        "--schemas",
        schemas.to_str().unwrap(),
        "--subset",
        subset.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("user.nope"), "unexpected stderr: {stderr}");
}
