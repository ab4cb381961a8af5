use super::{BuiltinContext, parse_job_id};
use crate::commands::{CommandOutput, flags};
use crate::error::Error;
use crate::jobs::{Job, JobFilter, JobStatus, is_job_id, is_status_or_any, is_user};
use crate::render::Payload;
use clap::Parser;

pub(super) const JOBS_TEMPLATE: &str = concat!(
    "{% if jobs | length == 0 %}No jobs found\n{% else %}",
    "{% for job in jobs %}",
    "*{{ job.id }}* - {{ job.start_time | humanize_time }}",
    " - *{{ job.request.command }}*",
    " by *{{ job.request.username }}*",
    " in *{% if job.request.is_im %}DM{% else %}{{ job.request.channel_link }}{% endif %}*",
    " - *{{ job.status }}*\n",
    "{% endfor %}{% endif %}",
);

pub(super) const JOB_TEMPLATE: &str = concat!(
    "* *ID* {{ job.id }}\n",
    "* *Status* {{ job.status }}\n",
    "* *Command* {{ job.request.command }}\n",
    "{% if job.request.args | length > 0 %}",
    "* *Args* \"{{ job.request.args | join(sep='\" \"') }}\" \n",
    "{% endif %}",
    "* *Where* {% if job.request.is_im %}IM{% else %}{{ job.request.channel_link }}{% endif %}\n",
    "* *When* {{ job.start_time | humanize_time }}\n",
);

const NO_LAST_COMMAND: &str = "No last command for current user";

#[derive(Parser, Debug)]
#[command(
    name = "jobs",
    no_binary_name = true,
    disable_help_flag = true,
    allow_negative_numbers = true
)]
struct JobsFlags {
    /// how many jobs to return
    #[arg(long, default_value_t = 5)]
    limit: i64,
    /// filter jobs per status (running, failed, successful or cancelled)
    #[arg(long)]
    status: Option<JobStatus>,
}

#[derive(Parser, Debug)]
#[command(
    name = "audit",
    no_binary_name = true,
    disable_help_flag = true,
    allow_negative_numbers = true
)]
struct AuditFlags {
    #[arg(long, default_value_t = 5)]
    limit: i64,
    /// the user to audit
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    status: Option<JobStatus>,
}

fn render_jobs(ctx: &BuiltinContext, jobs: &[Job]) -> anyhow::Result<CommandOutput> {
    let mut payload = Payload::new();
    payload.insert("jobs", jobs);
    Ok(CommandOutput::text(
        ctx.renderer.render("jobs", JOBS_TEMPLATE, &payload)?,
    ))
}

fn render_job(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let mut payload = Payload::new();
    payload.insert("job", job);
    Ok(CommandOutput::text(
        ctx.renderer.render("job", JOB_TEMPLATE, &payload)?,
    ))
}

/// Output and error of a job's log as a command result.
async fn log_output(ctx: &BuiltinContext, job_id: u64) -> anyhow::Result<CommandOutput> {
    let log = ctx.logs.get(job_id).await?;
    Ok(CommandOutput {
        error: log.error().map(ToString::to_string),
        output: log.output,
    })
}

/// Most recent job of the calling user.
async fn last_job(ctx: &BuiltinContext, caller: &Job) -> anyhow::Result<Job> {
    let filter = JobFilter::new(1).with(is_user(caller.request.username.as_str()));
    ctx.ledger
        .find(&filter)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!(NO_LAST_COMMAND))
}

/// Job `id` when it belongs to the calling user.
async fn owned_job(ctx: &BuiltinContext, caller: &Job, id: u64) -> anyhow::Result<Job> {
    let username = caller.request.username.as_str();
    let filter = JobFilter::new(1).with(is_job_id(id)).with(is_user(username));
    ctx.ledger
        .find(&filter)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No job with id {id} for user {username}"))
}

pub(super) async fn list(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let flags: JobsFlags = flags::parse(&job.request.args)?;
    let filter = JobFilter::new(flags::limit(flags.limit))
        .with(is_user(job.request.username.as_str()))
        .with(is_status_or_any(flags.status));
    let jobs = ctx.ledger.find(&filter).await?;
    render_jobs(ctx, &jobs)
}

pub(super) async fn audit(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let flags: AuditFlags = flags::parse(&job.request.args)?;
    let mut filter =
        JobFilter::new(flags::limit(flags.limit)).with(is_status_or_any(flags.status));
    if let Some(user) = flags.user.filter(|u| !u.is_empty()) {
        filter = filter.with(is_user(user));
    }
    let jobs = ctx.ledger.find(&filter).await?;
    render_jobs(ctx, &jobs)
}

pub(super) async fn show(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let id = parse_job_id(job)?;
    let found = owned_job(ctx, job, id).await?;
    render_job(ctx, &found)
}

pub(super) async fn audit_job(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let id = parse_job_id(job)?;
    let found = match ctx.ledger.get(id).await {
        Ok(found) => found,
        Err(Error::NoJobWithId(_)) => anyhow::bail!("Job not found"),
        Err(e) => return Err(e.into()),
    };
    render_job(ctx, &found)
}

pub(super) async fn last(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let found = last_job(ctx, job).await?;
    render_job(ctx, &found)
}

pub(super) async fn tail(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let found = last_job(ctx, job).await?;
    log_output(ctx, found.id).await
}

pub(super) async fn logs(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let id = parse_job_id(job)?;
    let found = owned_job(ctx, job, id).await?;
    log_output(ctx, found.id).await
}

pub(super) async fn audit_logs(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let id = parse_job_id(job)?;
    match ctx.ledger.get(id).await {
        Ok(found) => log_output(ctx, found.id).await,
        Err(Error::NoJobWithId(_)) => anyhow::bail!("there is no job {id}"),
        Err(e) => Err(e.into()),
    }
}

/// Cancel a job owned by the caller. A job owned by someone else is
/// reported as missing.
pub(super) async fn cancel(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let id = parse_job_id(job)?;
    let target = ctx.ledger.get(id).await?;
    if target.request.username != job.request.username {
        return Err(Error::NoJobWithId(id).into());
    }
    issue_cancel(ctx, job, &target)
}

pub(super) async fn kill(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    let id = parse_job_id(job)?;
    let target = ctx.ledger.get(id).await?;
    issue_cancel(ctx, job, &target)
}

/// Signal `target` if it is still running. Finished jobs are left alone.
fn issue_cancel(
    ctx: &BuiltinContext,
    caller: &Job,
    target: &Job,
) -> anyhow::Result<CommandOutput> {
    let id = target.id;
    tracing::info!(job_id = id, user = %caller.request.username, "cancellation requested");
    if target.status == JobStatus::Running {
        (ctx.cancel)(id);
    }
    Ok(CommandOutput::text(format!(
        "Issued command cancellation to job {id}"
    )))
}
