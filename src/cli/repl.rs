use jobbox::Dispatcher;
use jobbox::jobs::Request;
use jobbox::request::request_from_line;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// stdin acting as a chat channel: one command line per message.
pub struct StdinChannel;

impl StdinChannel {
    pub fn new() -> Self {
        Self
    }

    /// Forward non-empty lines until EOF, `/quit` or `/exit`.
    pub async fn listen(&self, tx: mpsc::Sender<String>) -> anyhow::Result<()> {
        let mut lines = BufReader::new(io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line == "/quit" || line == "/exit" {
                break;
            }
            if tx.send(line).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Dispatch every line from stdin concurrently and print the replies.
pub async fn run(dispatcher: Arc<Dispatcher>, origin: Request) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<String>(32);
    let listener = tokio::spawn(async move { StdinChannel::new().listen(tx).await });
    let mut inflight = tokio::task::JoinSet::new();

    while let Some(line) = rx.recv().await {
        let request = match request_from_line(&line, &origin) {
            Ok(request) => request,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        let dispatcher = Arc::clone(&dispatcher);
        inflight.spawn(async move {
            match dispatcher.dispatch(request.clone()).await {
                Ok(reply) => println!("{}", reply.text),
                Err(e) => println!("{}", dispatcher.reply_for_error(&request, &e)),
            }
        });
    }

    while inflight.join_next().await.is_some() {}
    listener.await??;
    Ok(())
}
