use super::BuiltinContext;
use crate::commands::{CommandOutput, flags};
use crate::error::Error;
use crate::jobs::Job;
use crate::render::Payload;
use crate::tokens::{
    NewTokenRequest, TokenFilter, has_command_prefix, is_channel_link, is_user_link,
};
use clap::Parser;

pub(super) const TOKENS_TEMPLATE: &str = concat!(
    "{% if tokens | length == 0 %}No tokens could be found{% else %}",
    "{% for t in tokens %}",
    "- *{{ t.token_id }}* {{ t.user_link }} at {{ t.channel_link }} _{{ t.text }}_\n",
    "{% endfor %}{% endif %}",
);

const IM_ONLY: &str = "API tokens can only be managed over an IM conversation, security ffs";

#[derive(Parser, Debug)]
#[command(
    name = "tokens",
    no_binary_name = true,
    disable_help_flag = true,
    allow_negative_numbers = true
)]
struct TokensFlags {
    #[arg(long, default_value_t = 5)]
    limit: i64,
    /// user to filter for
    #[arg(long)]
    user: Option<String>,
    /// channel to filter for
    #[arg(long)]
    channel: Option<String>,
    /// command to filter for
    #[arg(long)]
    command: Option<String>,
}

fn require_im(job: &Job) -> Result<(), Error> {
    if job.request.is_im {
        Ok(())
    } else {
        Err(Error::invalid(IM_ONLY))
    }
}

/// `token-new <user> <channel> <command> [args...]`
pub(super) async fn create(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    require_im(job)?;
    let [user, channel, text @ ..] = job.request.args.as_slice() else {
        return Err(Error::invalid("not enough arguments passed in").into());
    };
    if text.is_empty() {
        return Err(Error::invalid("not enough arguments passed in").into());
    }

    let token_id = ctx
        .tokens
        .create(NewTokenRequest {
            user_link: user.clone(),
            user_id: user.clone(),
            channel_link: channel.clone(),
            text: text.join(" "),
        })
        .await?;
    Ok(CommandOutput::text(format!("created token {token_id}")))
}

pub(super) async fn list(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    require_im(job)?;
    let flags: TokensFlags = flags::parse(&job.request.args)?;

    let mut filter = TokenFilter::new(flags::limit(flags.limit));
    if let Some(user) = flags.user.filter(|v| !v.is_empty()) {
        filter = filter.with(is_user_link(user));
    }
    if let Some(channel) = flags.channel.filter(|v| !v.is_empty()) {
        filter = filter.with(is_channel_link(channel));
    }
    if let Some(command) = flags.command.filter(|v| !v.is_empty()) {
        filter = filter.with(has_command_prefix(command));
    }

    let tokens = ctx.tokens.find(&filter).await?;
    let mut payload = Payload::new();
    payload.insert("tokens", &tokens);
    Ok(CommandOutput::text(ctx.renderer.render(
        "tokens",
        TOKENS_TEMPLATE,
        &payload,
    )?))
}

pub(super) async fn revoke(ctx: &BuiltinContext, job: &Job) -> anyhow::Result<CommandOutput> {
    require_im(job)?;
    let [token_id] = job.request.args.as_slice() else {
        return Err(Error::invalid("only one token ID should be passed as an argument").into());
    };
    ctx.tokens.revoke(token_id).await?;
    Ok(CommandOutput::text(format!(
        "Token *{token_id}* has been revoked"
    )))
}
