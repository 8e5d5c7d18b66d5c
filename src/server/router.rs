use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use serde_json::Value;
use crate::{DocumentStore, Error, Filter, Result};
use log::{info, error};
use tokio::sync::Semaphore;

/// Maximum number of connections served at once.
const MAX_CONNECTIONS: usize = 100;

pub struct Router {
    store: Arc<dyn DocumentStore>,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    pub async fn listen(&self, port: &str) -> Result<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Docstore listening on port {}", port);

        loop {
            let (socket, _) = listener.accept().await?;
            let store = self.store.clone();
            let sem = self.semaphore.clone();

            tokio::spawn(async move {
                let _permit = match sem.try_acquire() {
                    Ok(p) => p,
                    Err(_) => {
                        error!("Server busy: too many concurrent connections. Rejecting...");
                        let mut socket = socket;
                        let _ = socket.shutdown().await;
                        return;
                    }
                };

                if let Err(e) = handle_connection(socket, store).await {
                    error!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Runs a blocking store call off the async worker threads.
async fn blocking<T, F>(store: &Arc<dyn DocumentStore>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn DocumentStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| Error::Internal(e.to_string()))?
}

fn ok_json<T: serde::Serialize>(res: Result<T>) -> Result<String> {
    match res {
        Ok(val) => Ok(format!("OK {}", serde_json::to_string(&val)?)),
        Err(e) => Ok(err_line(&e)),
    }
}

fn ok_empty(res: Result<()>) -> String {
    match res {
        Ok(_) => "OK".to_string(),
        Err(e) => err_line(&e),
    }
}

fn err_line(e: &Error) -> String {
    format!("ERR {}", e.to_string().to_lowercase())
}

/// Splits `line` into its first `n` whitespace-separated words and the rest.
fn split_args(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut rest = line.trim_start();
    let mut words = Vec::with_capacity(n);
    for _ in 0..n {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        words.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((words, rest.trim_end()))
}

pub async fn handle_connection(mut socket: TcpStream, store: Arc<dyn DocumentStore>) -> Result<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let Some((head, _)) = split_args(&line, 1) else {
            continue;
        };

        let command = head[0].to_uppercase();
        let response = match command.as_str() {
            "WRITE" => match split_args(&line, 3) {
                Some((parts, json)) if !json.is_empty() => match serde_json::from_str::<Value>(json) {
                    Ok(val) => {
                        let (c, id) = (parts[1].to_string(), parts[2].to_string());
                        ok_empty(blocking(&store, move |s| s.write(&c, &id, &val)).await)
                    }
                    Err(_) => "ERR invalid json value".to_string(),
                },
                _ => "ERR missing arguments".to_string(),
            },
            "READ" => match split_args(&line, 3) {
                Some((parts, _)) => {
                    let (c, id) = (parts[1].to_string(), parts[2].to_string());
                    ok_json(blocking(&store, move |s| s.read(&c, &id)).await)?
                }
                None => "ERR missing arguments".to_string(),
            },
            "READ_ALL" => match split_args(&line, 2) {
                Some((parts, _)) => {
                    let c = parts[1].to_string();
                    ok_json(blocking(&store, move |s| s.read_all(&c)).await)?
                }
                None => "ERR missing arguments".to_string(),
            },
            "DELETE" => match split_args(&line, 2) {
                Some((parts, rest)) => {
                    let (c, id) = (parts[1].to_string(), rest.to_string());
                    ok_empty(blocking(&store, move |s| s.delete(&c, &id)).await)
                }
                None => "ERR missing arguments".to_string(),
            },
            "DELETE_ALL" => match split_args(&line, 2) {
                Some((parts, _)) => {
                    let c = parts[1].to_string();
                    ok_empty(blocking(&store, move |s| s.delete_all(&c)).await)
                }
                None => "ERR missing arguments".to_string(),
            },
            "SEARCH" => match split_args(&line, 1) {
                Some((_, json)) if !json.is_empty() => match serde_json::from_str::<Filter>(json) {
                    Ok(filter) => ok_json(blocking(&store, move |s| s.search(&filter)).await)?,
                    Err(_) => "ERR invalid json filter".to_string(),
                },
                _ => "ERR missing arguments".to_string(),
            },
            "REGEX" => match split_args(&line, 2) {
                Some((parts, json)) if !json.is_empty() => {
                    match serde_json::from_str::<HashMap<String, String>>(json) {
                        Ok(patterns) => {
                            let c = parts[1].to_string();
                            ok_json(blocking(&store, move |s| s.regex_search(&c, &patterns)).await)?
                        }
                        Err(_) => "ERR invalid json patterns".to_string(),
                    }
                }
                _ => "ERR missing arguments".to_string(),
            },
            "PING" => "PONG".to_string(),
            "QUIT" => break,
            _ => "ERR unknown command".to_string(),
        };

        writer.write_all(format!("{}\n", response).as_bytes()).await?;
    }
    Ok(())
}
