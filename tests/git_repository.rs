// tests/git_repository.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::{NamedTempFile, TempDir};
use tokio_util::sync::CancellationToken;
use scriptrunner::errors::RunnerError;
use scriptrunner::repository::git::{MAX_ATTEMPTS, TOKEN_ENV};
use scriptrunner::repository::{GitClient, GitRemote, GitScriptRepository, ScriptRepository};
use scriptrunner_test_utils::builders::ScriptTextBuilder;
use scriptrunner_test_utils::fake_git::{FAKE_COMMIT, FakeGitRunner};
use scriptrunner_test_utils::{init_tracing, with_timeout};

struct Fixture {
    repo: GitScriptRepository,
    git: FakeGitRunner,
    _git_exe: NamedTempFile,
    _work: TempDir,
}

fn remote() -> GitRemote {
    GitRemote {
        url: "https://github.com/acme/scripts.git".to_string(),
        branch: "main".to_string(),
        token: Some("s3cret-token".to_string()),
        proxy: None,
    }
}

fn fixture(git: FakeGitRunner) -> Fixture {
    let git_exe = NamedTempFile::new().unwrap();
    let work = TempDir::new().unwrap();
    let client = GitClient::new(
        Some(PathBuf::from(git_exe.path())),
        remote(),
        Arc::new(git.clone()),
    );
    let repo = GitScriptRepository::with_work_root(
        client,
        Duration::from_secs(30),
        work.path().to_path_buf(),
    );
    Fixture {
        repo,
        git,
        _git_exe: git_exe,
        _work: work,
    }
}

fn greet_script() -> String {
    ScriptTextBuilder::new("greet", "Greeter")
        .param("Name", "String", &["Default: \"World\""])
        .body("Write-Output \"Hello, $Name\"\n")
        .build_shell()
}

#[tokio::test]
async fn test_malformed_scripts_are_left_out_of_listing() {
    init_tracing();
    let fx = fixture(
        FakeGitRunner::new()
            .with_file("ops/greet.ps1", &greet_script())
            .with_file("ops/legacy.ps1", "Write-Output 'no header here'\n")
            .with_file("README.md", "# scripts\n"),
    );
    let cancel = CancellationToken::new();

    let scripts = with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].id, "greet");
    assert_eq!(scripts[0].source_path.as_deref(), Some("ops/greet.ps1"));
}

#[tokio::test]
async fn test_listing_within_ttl_is_served_from_cache() {
    init_tracing();
    let fx = fixture(FakeGitRunner::new().with_file("greet.ps1", &greet_script()));
    let cancel = CancellationToken::new();

    let first = with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();
    let second = with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();

    assert_eq!(fx.git.clone_count(), 1);
    assert!(Arc::ptr_eq(&first, &second));

    fx.repo.invalidate();
    with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();
    assert_eq!(fx.git.clone_count(), 2);
}

#[tokio::test]
async fn test_content_is_fetched_at_the_listed_commit() {
    init_tracing();
    let fx = fixture(FakeGitRunner::new().with_file("greet.ps1", &greet_script()));
    let cancel = CancellationToken::new();

    let text = with_timeout(fx.repo.get_content("GREET", &cancel)).await.unwrap();
    assert_eq!(text, greet_script());

    let expected = format!("{FAKE_COMMIT}:greet.ps1");
    assert!(
        fx.git
            .calls()
            .iter()
            .any(|c| c.args == ["show".to_string(), expected.clone()])
    );

    let missing = with_timeout(fx.repo.get_content("nope", &cancel)).await.unwrap();
    assert_eq!(missing, "");
}

#[tokio::test]
async fn test_spawn_failures_are_retried() {
    init_tracing();
    let fx = fixture(
        FakeGitRunner::new()
            .with_file("greet.ps1", &greet_script())
            .fail_spawns(2),
    );
    let cancel = CancellationToken::new();

    let scripts = with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();
    assert_eq!(scripts.len(), 1);

    let clone_attempts = fx
        .git
        .calls()
        .iter()
        .filter(|c| c.args.first().map(String::as_str) == Some("clone"))
        .count();
    assert_eq!(clone_attempts, 3);
}

#[tokio::test]
async fn test_retries_give_up_after_max_attempts() {
    init_tracing();
    let fx = fixture(FakeGitRunner::new().fail_spawns(10));
    let cancel = CancellationToken::new();

    match with_timeout(fx.repo.list_scripts(&cancel)).await {
        Err(RunnerError::GitRetriesExhausted { attempts, .. }) => {
            assert_eq!(attempts, MAX_ATTEMPTS)
        }
        other => panic!("Expected GitRetriesExhausted, got: {:?}", other.map(|s| s.len())),
    }
    assert_eq!(fx.git.calls().len(), MAX_ATTEMPTS as usize);
}

#[tokio::test]
async fn test_failed_show_skips_only_that_script() {
    init_tracing();
    let other = ScriptTextBuilder::new("other", "Other").build_shell();
    let fx = fixture(
        FakeGitRunner::new()
            .with_file("greet.ps1", &greet_script())
            .with_file("other.ps1", &other)
            .fail_show_for("other.ps1"),
    );
    let cancel = CancellationToken::new();

    let scripts = with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();
    let ids: Vec<_> = scripts.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["greet"]);

    // Non-zero exits are answers, not transport failures.
    let shows = fx
        .git
        .calls()
        .iter()
        .filter(|c| c.args.iter().any(|a| a.ends_with(":other.ps1")))
        .count();
    assert_eq!(shows, 1);
}

#[tokio::test]
async fn test_token_stays_out_of_arguments() {
    init_tracing();
    let fx = fixture(FakeGitRunner::new().with_file("greet.ps1", &greet_script()));
    let cancel = CancellationToken::new();

    with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();

    for call in fx.git.calls() {
        assert!(call.args.iter().all(|a| !a.contains("s3cret-token")));
        assert!(!call.display_command().contains("s3cret-token"));
        assert!(
            call.env
                .iter()
                .any(|(k, v)| k == TOKEN_ENV && v == "s3cret-token")
        );
        assert!(call.env.iter().any(|(k, v)| k == "GIT_TERMINAL_PROMPT" && v == "0"));
    }
}

#[tokio::test]
async fn test_cancelled_listing_reports_cancellation() {
    init_tracing();
    let fx = fixture(FakeGitRunner::new().with_file("greet.ps1", &greet_script()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = with_timeout(fx.repo.list_scripts(&cancel)).await;
    assert!(matches!(result, Err(RunnerError::Cancelled)));
}

#[tokio::test]
async fn test_paths_with_leading_spaces_are_fetched_verbatim() {
    init_tracing();
    let fx = fixture(FakeGitRunner::new().with_file("  ops/greet.ps1", &greet_script()));
    let cancel = CancellationToken::new();

    let scripts = with_timeout(fx.repo.list_scripts(&cancel)).await.unwrap();

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].source_path.as_deref(), Some("  ops/greet.ps1"));
}
