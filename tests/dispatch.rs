#![cfg(unix)]

use jobbox::auth::Groups;
use jobbox::commands::{Command, CommandDescriptor, ShellCommand};
use jobbox::config::Config;
use jobbox::error::{Error, ErrorKind};
use jobbox::jobs::{JobStatus, Request};
use jobbox::store::Store;
use jobbox::tokens::NewTokenRequest;
use jobbox::Dispatcher;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONFIG: &str = r#"
[groups]
admin = ["admin_user"]
ops = ["operator"]

[commands.echo]
cmd = "echo"
help = "command that prints back the arguments passed"
handshake = false

[commands.fail]
cmd = "sh"
args = ["-c", "echo partial; echo broken >&2; exit 1"]
handshake = false

[commands.quiet]
cmd = "true"
record = false
handshake = false

[commands.deploy]
cmd = "echo"
args = ["deployed"]
auth_strategy = "allowed_group"
allowed_groups = ["ops"]
handshake = false
"#;

async fn dispatcher_with(extra: Vec<Box<dyn Command>>) -> Dispatcher {
    let config: Config = toml::from_str(CONFIG).unwrap();
    config.validate().unwrap();
    let mut commands = config.shell_commands();
    commands.extend(extra);
    Dispatcher::new(
        Store::in_memory().await.unwrap(),
        config.auth_groups(),
        commands,
    )
}

async fn dispatcher() -> Dispatcher {
    dispatcher_with(Vec::new()).await
}

fn sh(name: &str, script: &str) -> CommandDescriptor {
    let mut descriptor = CommandDescriptor::new(name, "test script").recorded();
    descriptor.default_args = vec!["-c".into(), script.into()];
    descriptor
}

fn request(user: &str, command: &str, args: &[&str]) -> Request {
    Request {
        command: command.into(),
        args: args.iter().map(ToString::to_string).collect(),
        username: user.into(),
        user_id: user.into(),
        channel: "general".into(),
        channel_link: "<#123>".into(),
        ..Request::default()
    }
}

#[tokio::test]
async fn recorded_shell_command_round_trip() {
    let dispatcher = dispatcher().await;
    let reply = dispatcher
        .dispatch(request("someone", "echo", &["hello", "jobbox"]))
        .await
        .unwrap();

    assert_eq!(reply.job_id, Some(1));
    assert_eq!(reply.status, JobStatus::Successful);
    assert_eq!(reply.error, None);
    assert_eq!(reply.text, "someone done\n```\nhello jobbox\n\n```");

    let job = dispatcher.ledger().get(1).await.unwrap();
    assert_eq!(job.status, JobStatus::Successful);
    assert_eq!(job.request.args, vec!["hello", "jobbox"]);
    let log = dispatcher.logs().get(1).await.unwrap();
    assert_eq!(log.output, "hello jobbox\n");
    assert_eq!(log.error(), None);
}

#[tokio::test]
async fn failing_command_records_output_and_error() {
    let dispatcher = dispatcher().await;
    let reply = dispatcher
        .dispatch(request("someone", "fail", &[]))
        .await
        .unwrap();

    assert_eq!(reply.status, JobStatus::Failed);
    assert_eq!(reply.error.as_deref(), Some("broken"));
    assert!(reply.text.starts_with("someone failed: broken"));

    let id = reply.job_id.unwrap();
    assert_eq!(
        dispatcher.ledger().get(id).await.unwrap().status,
        JobStatus::Failed
    );
    let log = dispatcher.logs().get(id).await.unwrap();
    assert_eq!(log.output, "partial\n");
    assert_eq!(log.error(), Some("broken"));
}

#[tokio::test]
async fn failed_log_write_still_finishes_the_job() {
    let config: Config = toml::from_str(CONFIG).unwrap();
    let store = Store::in_memory().await.unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_log_lines BEFORE INSERT ON job_log_lines \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();
    let dispatcher = Dispatcher::new(store, config.auth_groups(), config.shell_commands());

    let err = dispatcher
        .dispatch(request("someone", "echo", &["hello"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);

    let job = dispatcher.ledger().get(1).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.end_time.is_some());
}

#[tokio::test]
async fn unrecorded_command_leaves_no_job() {
    let dispatcher = dispatcher().await;
    let reply = dispatcher
        .dispatch(request("someone", "quiet", &[]))
        .await
        .unwrap();
    assert_eq!(reply.job_id, None);
    assert_eq!(reply.status, JobStatus::Successful);
    assert!(matches!(
        dispatcher.ledger().get(1).await,
        Err(Error::NoJobWithId(1))
    ));
}

#[tokio::test]
async fn allowed_group_is_enforced() {
    let dispatcher = dispatcher().await;

    let denied = request("someone", "deploy", &[]);
    let err = dispatcher.dispatch(denied.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(
        dispatcher.reply_for_error(&denied, &err),
        "someone you are not allowed to run deploy"
    );
    assert!(dispatcher.ledger().get(1).await.is_err());

    let reply = dispatcher
        .dispatch(request("operator", "deploy", &["now"]))
        .await
        .unwrap();
    assert_eq!(reply.status, JobStatus::Successful);
    assert_eq!(dispatcher.logs().get(1).await.unwrap().output, "deployed now\n");
}

#[tokio::test]
async fn admin_builtins_reject_other_users() {
    let dispatcher = dispatcher().await;
    let err = dispatcher
        .dispatch(request("someone", "audit", &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let reply = dispatcher
        .dispatch(request("admin_user", "audit", &[]))
        .await
        .unwrap();
    assert_eq!(reply.text, "admin_user\nNo jobs found\n");
}

#[tokio::test]
async fn unknown_command_is_not_found() {
    let dispatcher = dispatcher().await;
    let req = request("someone", "launch", &[]);
    let err = dispatcher.dispatch(req.clone()).await.unwrap_err();
    assert!(matches!(err, Error::CommandNotFound(ref name) if name == "launch"));
    assert_eq!(
        dispatcher.reply_for_error(&req, &err),
        "someone unknown command launch"
    );
}

#[tokio::test]
async fn deadline_fails_the_job() {
    let slow = ShellCommand::new(
        "sh",
        sh("slow", "sleep 30").with_timeout(Duration::from_millis(200)),
    );
    let dispatcher = dispatcher_with(vec![Box::new(slow)]).await;

    let started = std::time::Instant::now();
    let reply = dispatcher
        .dispatch(request("someone", "slow", &[]))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(reply.status, JobStatus::Failed);
    let error = reply.error.unwrap();
    assert!(error.contains("timed out"), "{error}");

    let id = reply.job_id.unwrap();
    assert_eq!(
        dispatcher.ledger().get(id).await.unwrap().status,
        JobStatus::Failed
    );
    assert_eq!(
        dispatcher.logs().get(id).await.unwrap().error(),
        Some(error.as_str())
    );
}

async fn wait_until_running(dispatcher: &Dispatcher, id: u64) {
    for _ in 0..500 {
        if dispatcher.runner().is_running(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never started");
}

#[tokio::test]
async fn owner_can_cancel_running_job() {
    let sleepy = ShellCommand::new("sh", sh("sleepy", "sleep 30"));
    let dispatcher = Arc::new(dispatcher_with(vec![Box::new(sleepy)]).await);

    let background = Arc::clone(&dispatcher);
    let running = tokio::spawn(async move {
        background
            .dispatch(request("someone", "sleepy", &[]))
            .await
    });
    wait_until_running(&dispatcher, 1).await;

    let reply = dispatcher
        .dispatch(request("someone", "cancel", &["1"]))
        .await
        .unwrap();
    assert_eq!(reply.status, JobStatus::Successful);
    assert!(reply.text.contains("Issued command cancellation to job 1"));

    let cancelled = running.await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(
        dispatcher.ledger().get(1).await.unwrap().status,
        JobStatus::Cancelled
    );
    assert!(!dispatcher.runner().is_running(1));
}

#[tokio::test]
async fn cancel_landing_before_the_run_starts_is_kept() {
    let sleepy = ShellCommand::new("sh", sh("sleepy", "sleep 30"));
    let dispatcher = dispatcher_with(vec![Box::new(sleepy)]).await;

    // Job 1 is in the ledger but its body has not registered yet.
    assert!(!dispatcher.runner().cancel(1));

    let started = std::time::Instant::now();
    let reply = dispatcher
        .dispatch(request("someone", "sleepy", &[]))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(reply.job_id, Some(1));
    assert_eq!(reply.status, JobStatus::Cancelled);
    assert_eq!(
        dispatcher.ledger().get(1).await.unwrap().status,
        JobStatus::Cancelled
    );
}

#[tokio::test]
async fn non_owner_cancel_leaves_job_running() {
    let sleepy = ShellCommand::new(
        "sh",
        sh("sleepy", "sleep 30").with_timeout(Duration::from_secs(2)),
    );
    let dispatcher = Arc::new(dispatcher_with(vec![Box::new(sleepy)]).await);

    let background = Arc::clone(&dispatcher);
    let running = tokio::spawn(async move {
        background
            .dispatch(request("someone", "sleepy", &[]))
            .await
    });
    wait_until_running(&dispatcher, 1).await;

    let reply = dispatcher
        .dispatch(request("someone_else", "cancel", &["1"]))
        .await
        .unwrap();
    assert_eq!(reply.status, JobStatus::Failed);
    assert_eq!(reply.error.as_deref(), Some("no job could be found"));
    assert!(dispatcher.runner().is_running(1));
    assert_eq!(
        dispatcher.ledger().get(1).await.unwrap().status,
        JobStatus::Running
    );

    // Left alone, the job hits its deadline instead.
    let finished = running.await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
}

#[tokio::test]
async fn cancel_after_finish_is_noop() {
    let dispatcher = dispatcher().await;
    dispatcher
        .dispatch(request("someone", "echo", &["done"]))
        .await
        .unwrap();

    let reply = dispatcher
        .dispatch(request("someone", "cancel", &["1"]))
        .await
        .unwrap();
    assert_eq!(reply.status, JobStatus::Successful);
    assert_eq!(
        dispatcher.ledger().get(1).await.unwrap().status,
        JobStatus::Successful
    );
}

#[tokio::test]
async fn handshake_is_sent_before_running() {
    let greeter = ShellCommand::new("echo", {
        let mut d = CommandDescriptor::new("greet", "says hi")
            .recorded()
            .with_handshake();
        d.default_args = vec!["hi".into()];
        d
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = dispatcher_with(vec![Box::new(greeter)])
        .await
        .with_handshake(tx);

    let mut req = request("someone", "greet", &[]);
    req.user_link = "<@someone>".into();
    let reply = dispatcher.dispatch(req).await.unwrap();
    assert_eq!(reply.status, JobStatus::Successful);
    assert_eq!(rx.try_recv().unwrap(), "<@someone> on it");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn token_replay_runs_as_token_owner() {
    let dispatcher = dispatcher().await;
    let token_id = dispatcher
        .tokens()
        .create(NewTokenRequest {
            user_link: "<@someone>".into(),
            user_id: "someone".into(),
            channel_link: "<#123>".into(),
            text: r#"echo "hello world" again "\d+""#.into(),
        })
        .await
        .unwrap();

    let reply = dispatcher.dispatch_token(&token_id).await.unwrap();
    assert_eq!(reply.status, JobStatus::Successful);

    let job = dispatcher.ledger().get(reply.job_id.unwrap()).await.unwrap();
    assert_eq!(job.request.username, "someone");
    assert_eq!(job.request.channel_link, "<#123>");
    assert_eq!(job.request.args, vec!["hello world", "again", r"\d+"]);
    assert_eq!(
        dispatcher.logs().get(job.id).await.unwrap().output,
        "hello world again \\d+\n"
    );
}

#[tokio::test]
async fn token_replay_still_checks_auth() {
    let dispatcher = dispatcher().await;
    let token_id = dispatcher
        .tokens()
        .create(NewTokenRequest {
            user_link: "<@someone>".into(),
            user_id: "someone".into(),
            channel_link: "<#123>".into(),
            text: "deploy".into(),
        })
        .await
        .unwrap();
    let err = dispatcher.dispatch_token(&token_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = dispatcher.dispatch_token("missing").await.unwrap_err();
    assert!(matches!(err, Error::TokenNotFound(_)));
}

#[tokio::test]
async fn jobs_builtin_sees_dispatched_jobs() {
    let dispatcher = dispatcher().await;
    for word in ["one", "two", "three"] {
        dispatcher
            .dispatch(request("someone", "echo", &[word]))
            .await
            .unwrap();
    }
    dispatcher
        .dispatch(request("someone", "fail", &[]))
        .await
        .unwrap();

    let reply = dispatcher
        .dispatch(request("someone", "jobs", &["-limit=2"]))
        .await
        .unwrap();
    assert_eq!(
        reply.text,
        concat!(
            "someone\n",
            "*4* - now - *fail* by *someone* in *<#123>* - *Failed*\n",
            "*3* - now - *echo* by *someone* in *<#123>* - *Successful*\n",
        )
    );

    let reply = dispatcher
        .dispatch(request("someone", "tail", &[]))
        .await
        .unwrap();
    assert_eq!(reply.status, JobStatus::Failed);
    assert_eq!(reply.error.as_deref(), Some("broken"));
}

#[tokio::test]
async fn groups_come_from_config() {
    let dispatcher = Dispatcher::new(
        Store::in_memory().await.unwrap(),
        Groups::new(BTreeMap::from([(
            "admin".to_string(),
            vec!["root".to_string()],
        )])),
        Vec::new(),
    );
    let reply = dispatcher
        .dispatch(request("root", "groups", &[]))
        .await
        .unwrap();
    assert_eq!(reply.text, "root\n\n- admin: root\n");
}
