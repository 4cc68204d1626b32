//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_ANSWER: &str = "利用部門の主要メンバを早期に参画させ、要件の合意形成を図る。";
const CLEAN_ANSWER: &str = "週次で進捗会議を開き、課題の担当者と期限を明確にして管理する。";

fn saiten() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("saiten").unwrap()
}

/// A command isolated from any saiten.toml or SAITEN_* variables on the host.
fn saiten_in(dir: &Path) -> Command {
    let mut cmd = saiten();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .env_remove("SAITEN_PROVIDER")
        .env_remove("SAITEN_MODEL")
        .env_remove("SAITEN_OPENAI_KEY")
        .env_remove("SAITEN_OLLAMA_URL");
    cmd
}

fn sample_set() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../problem-sets/pm-sample.toml")
}

fn history_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/history.json")
}

fn write_config(dir: &Path, lmstudio_url: &str) -> PathBuf {
    let path = dir.join("test-config.toml");
    std::fs::write(
        &path,
        format!(
            r#"max_retries = 0
timeout_secs = 10

[providers.lmstudio]
type = "lmstudio"
base_url = "{lmstudio_url}"

[providers.ollama]
type = "ollama"
base_url = "http://127.0.0.1:1"
"#
        ),
    )
    .unwrap();
    path
}

fn chat_reply(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
        "model": "gpt-4o-mini",
        "usage": {"prompt_tokens": 900, "completion_tokens": 80, "total_tokens": 980}
    })
}

const EXCELLENT_REPLY: &str = r#"{"ai_score":"〇","ai_reason":"会議体による管理という観点は妥当。","ai_feedback":{"positive_points":["担当者と期限を明確にしている"],"negative_points":[]}}"#;

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_sample_set() {
    saiten()
        .arg("validate")
        .arg("--problems")
        .arg("../../problem-sets/pm-sample.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 problems"))
        .stdout(predicate::str::contains("All problem sets valid"));
}

#[test]
fn validate_directory() {
    saiten()
        .arg("validate")
        .arg("--problems")
        .arg("../../problem-sets")
        .assert()
        .success()
        .stdout(predicate::str::contains("PM Afternoon I Sample"));
}

#[test]
fn validate_nonexistent_file() {
    saiten()
        .arg("validate")
        .arg("--problems")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"[problem_set]
id = "broken"
name = "Broken"

[[problems]]
id = "dup"
context = "c"
prompt = "p"
model_answer = "m"
intent = "i"

[[problems]]
id = "dup"
context = "c"
prompt = "p"
model_answer = "m"
intent = " "
"#,
    )
    .unwrap();

    saiten()
        .arg("validate")
        .arg("--problems")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[dup] WARNING: duplicate problem ID: dup"))
        .stdout(predicate::str::contains("intent"))
        .stdout(predicate::str::contains("2 warning(s) found."));
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_copied_answer_is_fixed() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path())
        .args(["check", "--problem", "2023-pm1-q1-1", "--answer", MODEL_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .success()
        .stdout(predicate::str::contains("fixed ✕"))
        .stdout(predicate::str::contains("Score fixed to ✕"));
}

#[test]
fn check_json_output() {
    let dir = TempDir::new().unwrap();

    let output = saiten_in(dir.path())
        .args(["check", "--problem", "2023-pm1-q1-1", "--format", "json"])
        .args(["--answer", MODEL_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["problem_id"], "2023-pm1-q1-1");
    assert_eq!(report["summary"]["status"], "overridden");
    assert_eq!(report["summary"]["fixed_score"], "✕");
    assert_eq!(report["outcome"]["passed"], false);
    assert_eq!(report["outcome"]["violations"][0]["rule"], "copy_paste_check");
}

#[test]
fn check_clean_answer_passes() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path())
        .args(["check", "--problem", "2023-pm1-q1-1", "--answer", CLEAN_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .success()
        .stdout(predicate::str::contains("All rule checks passed"));
}

#[test]
fn check_reads_answer_file() {
    let dir = TempDir::new().unwrap();
    let answer = dir.path().join("answer.txt");
    std::fs::write(&answer, format!("{MODEL_ANSWER}\n")).unwrap();

    saiten_in(dir.path())
        .args(["check", "--problem", "2023-pm1-q1-1"])
        .arg("--answer-file")
        .arg(&answer)
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .success()
        .stdout(predicate::str::contains("Score fixed to ✕"));
}

#[test]
fn check_honours_disabled_rules() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("saiten.toml"),
        "[[rules]]\nid = \"copy_paste_check\"\nenabled = false\n",
    )
    .unwrap();

    saiten_in(dir.path())
        .args(["check", "--problem", "2023-pm1-q1-1", "--answer", MODEL_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .success()
        .stdout(predicate::str::contains("All rule checks passed"))
        .stdout(predicate::str::contains("Copy-paste detection").not());
}

#[test]
fn check_unknown_problem() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path())
        .args(["check", "--problem", "nope", "--answer", CLEAN_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .failure()
        .stderr(predicate::str::contains("problem 'nope' not found"));
}

#[test]
fn check_blank_answer_is_rejected() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path())
        .args(["check", "--problem", "2023-pm1-q1-1", "--answer", "   "])
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn check_requires_an_answer() {
    saiten()
        .args(["check", "--problem", "2023-pm1-q1-1"])
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// grade
// ---------------------------------------------------------------------------

#[test]
fn grade_rule_override_needs_no_model() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:1");

    let output = saiten_in(dir.path())
        .args(["grade", "--problem", "2023-pm1-q1-1", "--format", "json"])
        .args(["--answer", MODEL_ANSWER, "--rater", "rater-07"])
        .arg("--problems")
        .arg(sample_set())
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());

    let verdict: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["ai_score"], "✕");
    assert_eq!(verdict["rule_override"], true);
    assert_eq!(verdict["source"], "rule");
    assert_eq!(verdict["metadata"]["rater_id"], "rater-07");
    assert!(verdict["metadata"]["llm_params"].is_null());
}

#[test]
fn grade_unreachable_model_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:1");

    saiten_in(dir.path())
        .args(["grade", "--problem", "2023-pm1-q1-1", "--answer", CLEAN_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: model transport failed"));
}

#[test]
fn grade_unknown_provider_fails() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path())
        .args(["grade", "--problem", "2023-pm1-q1-1", "--answer", CLEAN_ANSWER])
        .args(["--provider", "missing"])
        .arg("--problems")
        .arg(sample_set())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown provider 'missing'"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn grade_with_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(EXCELLENT_REPLY)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());

    let output = saiten_in(dir.path())
        .args(["grade", "--problem", "2023-pm1-q1-1", "--format", "json"])
        .args(["--answer", CLEAN_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let verdict: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["ai_score"], "〇");
    assert_eq!(verdict["source"], "model");
    assert_eq!(verdict["rule_override"], false);
    assert_eq!(verdict["ai_feedback"]["positive_points"][0], "担当者と期限を明確にしている");
    assert_eq!(verdict["metadata"]["json_valid"], true);
    assert_eq!(verdict["metadata"]["llm_params"]["model"], "gpt-4o-mini");
    assert_eq!(verdict["metadata"]["llm_params"]["max_tokens"], 1000);
    assert_eq!(verdict["metadata"]["token_usage"]["total_tokens"], 980);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn grade_text_output_with_garbled_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_reply("採点できませんでした")),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());

    saiten_in(dir.path())
        .args(["grade", "--problem", "2023-pm1-q1-1", "--answer", CLEAN_ANSWER])
        .arg("--problems")
        .arg(sample_set())
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Score:   △ (model)"))
        .stderr(predicate::str::contains("could not be parsed"));
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_mixes_rule_model_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(EXCELLENT_REPLY)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let answers = dir.path().join("answers.json");
    std::fs::write(
        &answers,
        serde_json::json!([
            {"problem_id": "2023-pm1-q1-1", "answer": MODEL_ANSWER, "rater_id": "r1"},
            {"problem_id": "2023-pm1-q1-1", "answer": CLEAN_ANSWER},
            {"problem_id": "missing", "answer": CLEAN_ANSWER}
        ])
        .to_string(),
    )
    .unwrap();
    let results = dir.path().join("results.json");

    saiten_in(dir.path())
        .args(["batch", "--parallelism", "2"])
        .arg("--problems")
        .arg(sample_set())
        .arg("--answers")
        .arg(&answers)
        .arg("--output")
        .arg(&results)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stderr(predicate::str::contains("Results saved to"));

    let items: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&results).unwrap()).unwrap();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 3);

    assert_eq!(items[0]["entry"]["ai_score"], "✕");
    assert_eq!(items[0]["entry"]["rule_override"], true);
    assert_eq!(items[0]["entry"]["rater_id"], "r1");
    assert!(items[0]["entry"]["final_score"].is_null());

    assert_eq!(items[1]["entry"]["ai_score"], "〇");
    assert_eq!(items[1]["entry"]["student_answer"], CLEAN_ANSWER);

    assert_eq!(items[2]["problem_id"], "missing");
    assert!(items[2]["error"]
        .as_str()
        .unwrap()
        .contains("unknown problem id"));
}

#[test]
fn batch_rejects_malformed_answers() {
    let dir = TempDir::new().unwrap();
    let answers = dir.path().join("answers.json");
    std::fs::write(&answers, "{not json").unwrap();

    saiten_in(dir.path())
        .arg("batch")
        .arg("--problems")
        .arg(sample_set())
        .arg("--answers")
        .arg(&answers)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse answers"));
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

#[test]
fn stats_table() {
    saiten()
        .arg("stats")
        .arg("--history")
        .arg(history_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("AI agreement"))
        .stdout(predicate::str::contains("67% (2/3)"))
        .stdout(predicate::str::contains("751ms"));
}

#[test]
fn stats_json() {
    let output = saiten()
        .args(["stats", "--format", "json"])
        .arg("--history")
        .arg(history_fixture())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["score_distribution"]["excellent"], 1);
    assert_eq!(stats["score_distribution"]["poor"], 2);
    assert_eq!(stats["ai_agreement"]["percentage"], 67);
    assert_eq!(stats["rule_overrides"], 1);
    assert_eq!(stats["json_failures"], 1);
}

#[test]
fn stats_missing_history() {
    saiten()
        .arg("stats")
        .arg("--history")
        .arg("no-such-history.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read history"));
}

// ---------------------------------------------------------------------------
// list-models
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_models_from_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": "qwen2.5-7b-instruct"}, {"id": "gpt-4o-mini"}]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());

    saiten_in(dir.path())
        .arg("list-models")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider: lmstudio (default)"))
        .stdout(predicate::str::contains("qwen2.5-7b-instruct"))
        .stdout(predicate::str::contains("Provider: ollama"))
        .stdout(predicate::str::contains("unavailable"));
}

#[test]
fn list_models_unknown_provider() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path())
        .args(["list-models", "--provider", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown provider 'nope'"));
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created saiten.toml"))
        .stdout(predicate::str::contains("Created problem-sets/example.toml"));

    assert!(dir.path().join("saiten.toml").exists());
    assert!(dir.path().join("problem-sets/example.toml").exists());

    saiten_in(dir.path())
        .args(["validate", "--problems", "problem-sets/example.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All problem sets valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    saiten_in(dir.path()).arg("init").assert().success();

    saiten_in(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn init_config_is_picked_up() {
    let dir = TempDir::new().unwrap();
    saiten_in(dir.path()).arg("init").assert().success();

    saiten_in(dir.path())
        .args(["check", "--problems", "problem-sets/example.toml", "--problem", "example-1"])
        .args(["--answer", CLEAN_ANSWER])
        .assert()
        .success()
        .stdout(predicate::str::contains("Character limit"));
}
