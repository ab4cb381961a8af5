//! Pre-authorized command invocations that can be replayed without a chat
//! session.

use crate::error::{Error, Result, StorageContext};
use crate::filter::{Filter, Predicate, predicate};
use crate::store::Store;
use chrono::{SecondsFormat, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_id: String,
    pub user_link: String,
    pub user_id: String,
    pub channel_link: String,
    /// Full command line (command name followed by its arguments).
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewTokenRequest {
    pub user_link: String,
    pub user_id: String,
    pub channel_link: String,
    pub text: String,
}

pub type TokenFilter = Filter<Token>;

pub fn is_user_link(user: impl Into<String>) -> Predicate<Token> {
    let user = user.into();
    predicate(move |token: &Token| token.user_link == user || token.user_id == user)
}

pub fn is_channel_link(channel: impl Into<String>) -> Predicate<Token> {
    let channel = channel.into();
    predicate(move |token: &Token| token.channel_link == channel)
}

pub fn has_command_prefix(prefix: impl Into<String>) -> Predicate<Token> {
    let prefix = prefix.into();
    predicate(move |token: &Token| token.text.starts_with(prefix.as_str()))
}

#[derive(Clone, Debug)]
pub struct TokenStore {
    store: Store,
}

impl TokenStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Persist a new token and return its freshly generated id.
    pub async fn create(&self, request: NewTokenRequest) -> Result<String> {
        let token_id = generate_token_id();
        sqlx::query(
            "INSERT INTO tokens (token_id, user_link, user_id, channel_link, text, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&token_id)
        .bind(&request.user_link)
        .bind(&request.user_id)
        .bind(&request.channel_link)
        .bind(&request.text)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
        .execute(self.store.pool())
        .await
        .storage_op(|| format!("create token for {}", request.user_link))?;

        tracing::info!(channel = %request.channel_link, "api token created");
        Ok(token_id)
    }

    pub async fn get(&self, token_id: &str) -> Result<Token> {
        let row = sqlx::query(
            "SELECT token_id, user_link, user_id, channel_link, text FROM tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(self.store.pool())
        .await
        .storage_op(|| format!("get token {token_id}"))?;

        match row {
            Some(row) => map_token_row(&row).storage_op(|| format!("decode token {token_id}")),
            None => Err(Error::TokenNotFound(token_id.to_string())),
        }
    }

    /// Tokens in creation order, filtered and bounded like job scans.
    pub async fn find(&self, filter: &TokenFilter) -> Result<Vec<Token>> {
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut rows = sqlx::query(
            "SELECT token_id, user_link, user_id, channel_link, text FROM tokens ORDER BY seq ASC",
        )
        .fetch(self.store.pool());

        while let Some(row) = rows
            .try_next()
            .await
            .storage_op(|| "scan tokens".to_string())?
        {
            let token = map_token_row(&row).storage_op(|| "decode token during scan".to_string())?;
            if filter.matches(&token) {
                found.push(token);
                if found.len() >= filter.limit {
                    break;
                }
            }
        }
        Ok(found)
    }

    pub async fn revoke(&self, token_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM tokens WHERE token_id = $1")
            .bind(token_id)
            .execute(self.store.pool())
            .await
            .storage_op(|| format!("revoke token {token_id}"))?;

        if result.rows_affected() == 0 {
            return Err(Error::TokenNotFound(token_id.to_string()));
        }
        tracing::info!(token_id, "api token revoked");
        Ok(())
    }
}

fn generate_token_id() -> String {
    use rand::RngCore;
    let mut buf = [0u8; 16];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn map_token_row(row: &SqliteRow) -> std::result::Result<Token, sqlx::Error> {
    Ok(Token {
        token_id: row.try_get("token_id")?,
        user_link: row.try_get("user_link")?,
        user_id: row.try_get("user_id")?,
        channel_link: row.try_get("channel_link")?,
        text: row.try_get("text")?,
    })
}
