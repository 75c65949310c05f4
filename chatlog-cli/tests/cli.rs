use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const WORKSPACE_ID: &str = "5f2d6a0c9e1b4c7d8a3e";
const SESSION_ID: &str = "8c1e2f4a-0b3d-4e5f-9a7b-6c8d0e1f2a3b";
const LEGACY_SESSION_ID: &str = "legacy-session";

const DELTA_LOG: &str = concat!(
    "{\"kind\":0,\"v\":{\"customTitle\":\"Parser fix\",\"requests\":[]}}\n",
    "{\"kind\":2,\"k\":[\"requests\"],\"v\":[{\"message\":{\"text\":\"why does it panic?\"},\"response\":[]}]}\n",
    "{\"kind\":2,\"k\":[\"requests\",0,\"response\"],\"v\":[",
    "{\"kind\":\"prepareToolInvocation\",\"toolName\":\"copilot_readFile\"},",
    "{\"kind\":\"toolInvocationSerialized\",\"toolId\":\"copilot_readFile\",\"toolCallId\":\"call_1\",\"isComplete\":true,\"pastTenseMessage\":{\"value\":\"Read parser.rs\"}},",
    "{\"value\":\"The index is **off by one**.\"}",
    "]}\n",
    "not json at all\n",
);

fn setup_editor_tree() -> tempfile::TempDir {
    let temp = tempdir().expect("tempdir");
    let workspace_dir = editor_root(temp.path())
        .join("User/workspaceStorage")
        .join(WORKSPACE_ID);
    let chat_dir = workspace_dir.join("chatSessions");
    fs::create_dir_all(&chat_dir).expect("mkdir");
    fs::write(
        workspace_dir.join("workspace.json"),
        r#"{"folder":"file:///home/dev/my%20parser"}"#,
    )
    .expect("write workspace");
    fs::write(chat_dir.join(format!("{SESSION_ID}.jsonl")), DELTA_LOG).expect("write log");
    fs::write(
        chat_dir.join(format!("{LEGACY_SESSION_ID}.json")),
        r#"{"requests":[{"message":{"text":"old question"},"response":[{"value":"old answer"}]}]}"#,
    )
    .expect("write legacy");
    temp
}

fn editor_root(base: &Path) -> PathBuf {
    base.join("Code")
}

fn chatlog(temp: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("chatlog"));
    cmd.arg("--vscode-path")
        .arg(editor_root(temp.path()))
        .env_remove("CHATLOG_VSCODE_PATH");
    cmd
}

fn exported_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = fs::read_dir(dir)
        .expect("read output dir")
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    files.sort();
    files
}

#[test]
fn workspaces_lists_decoded_folder_name() {
    let temp = setup_editor_tree();
    chatlog(&temp)
        .arg("workspaces")
        .assert()
        .success()
        .stdout(predicate::str::contains("[Code]"))
        .stdout(predicate::str::contains(WORKSPACE_ID))
        .stdout(predicate::str::contains("my parser (2 sessions)"));
}

#[test]
fn workspaces_json_output() {
    let temp = setup_editor_tree();
    chatlog(&temp)
        .args(["workspaces", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"session_count\": 2"))
        .stdout(predicate::str::contains("\"name\": \"my parser\""));
}

#[test]
fn sessions_shows_title_and_message_count() {
    let temp = setup_editor_tree();
    chatlog(&temp)
        .args(["sessions", WORKSPACE_ID])
        .assert()
        .success()
        .stdout(predicate::str::contains(SESSION_ID))
        .stdout(predicate::str::contains("1 messages  Parser fix"))
        .stdout(predicate::str::contains(LEGACY_SESSION_ID));
}

#[test]
fn sessions_unknown_workspace_fails() {
    let temp = setup_editor_tree();
    chatlog(&temp)
        .args(["sessions", "does-not-exist"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "error: workspace not found: does-not-exist",
        ));
}

#[test]
fn sessions_rejects_path_like_workspace_id() {
    let temp = setup_editor_tree();
    chatlog(&temp)
        .args(["sessions", "../escape"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: invalid id: ../escape"));
}

#[test]
fn export_html_renders_grouped_tools_and_markdown() {
    let temp = setup_editor_tree();
    let output = temp.path().join("out");
    chatlog(&temp)
        .args(["export", WORKSPACE_ID, SESSION_ID, "--output-dir"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 exported, 0 skipped, 0 failed"));

    let files = exported_files(&output);
    assert_eq!(files.len(), 1);
    let name = files[0]
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name");
    assert!(name.starts_with("chat_8c1e2f4a-0b3_"));
    assert!(name.ends_with(".html"));

    let html = fs::read_to_string(&files[0]).expect("read html");
    assert!(html.contains("<h1>Parser fix</h1>"));
    assert!(html.contains("why does it panic?"));
    assert!(html.contains("Read parser.rs"));
    assert!(html.contains("The index is <strong>off by one</strong>."));
}

#[test]
fn export_text_format() {
    let temp = setup_editor_tree();
    let output = temp.path().join("out");
    chatlog(&temp)
        .args(["export", WORKSPACE_ID, LEGACY_SESSION_ID, "--format", "text"])
        .arg("--output-dir")
        .arg(&output)
        .assert()
        .success();

    let files = exported_files(&output);
    assert_eq!(files.len(), 1);
    let text = fs::read_to_string(&files[0]).expect("read text");
    assert!(text.starts_with(&format!("# Chat: {LEGACY_SESSION_ID}")));
    assert!(text.contains("[USER] Message 1"));
    assert!(text.contains("old answer"));
}

#[test]
fn export_jsonl_copies_raw_log() {
    let temp = setup_editor_tree();
    let output = temp.path().join("out");
    chatlog(&temp)
        .args(["export", WORKSPACE_ID, SESSION_ID, "--format", "jsonl"])
        .arg("--output-dir")
        .arg(&output)
        .assert()
        .success();

    let files = exported_files(&output);
    assert_eq!(files.len(), 1);
    assert_eq!(fs::read_to_string(&files[0]).expect("read copy"), DELTA_LOG);
}

#[test]
fn export_with_missing_session_exits_with_failure() {
    let temp = setup_editor_tree();
    let output = temp.path().join("out");
    chatlog(&temp)
        .args(["export", WORKSPACE_ID])
        .arg(format!("{SESSION_ID},missing"))
        .arg("--output-dir")
        .arg(&output)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("1 exported, 0 skipped, 1 failed"))
        .stderr(predicate::str::contains("failed missing: session not found"));
}

#[test]
fn export_rejects_unknown_format() {
    let temp = setup_editor_tree();
    chatlog(&temp)
        .args(["export", WORKSPACE_ID, SESSION_ID, "--format", "pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid format: pdf"));
}

#[test]
fn export_all_skips_already_exported_sessions() {
    let temp = setup_editor_tree();
    let output = temp.path().join("all");

    chatlog(&temp)
        .args(["export-all", "--format", "json", "--output-dir"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 exported, 0 skipped, 0 failed"));
    let workspace_output = output.join("Code").join("my_parser");
    assert_eq!(exported_files(&workspace_output).len(), 2);

    chatlog(&temp)
        .args(["export-all", "--format", "json", "--json", "--output-dir"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"exported\": []"))
        .stdout(predicate::str::contains(SESSION_ID));
}

#[test]
fn search_finds_sessions_by_raw_content() {
    let temp = setup_editor_tree();
    chatlog(&temp)
        .args(["search", "off by one"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "{WORKSPACE_ID}/{SESSION_ID}"
        )))
        .stdout(predicate::str::contains(LEGACY_SESSION_ID).not());

    chatlog(&temp)
        .args(["search", "nothing like this"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no sessions contain"));
}
