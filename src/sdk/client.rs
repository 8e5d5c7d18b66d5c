use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use serde_json::Value;
use crate::{Result, Error, Filter, SearchHits};
use tokio::sync::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Number of send attempts before a request is given up.
const MAX_ATTEMPTS: u64 = 3;

/// Remote client for the line protocol served by [`Router`](crate::server::Router).
pub struct Client {
    addr: String,
    inner: Mutex<Option<ClientInner>>,
}

struct ClientInner {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self> {
        let inner = Client::connect_inner(addr).await?;
        Ok(Self {
            addr: addr.to_string(),
            inner: Mutex::new(Some(inner)),
        })
    }

    async fn send_and_receive(&self, cmd: String) -> Result<String> {
        let mut inner_guard = self.inner.lock().await;

        // Reconnect on a broken connection and retry.
        for i in 0..MAX_ATTEMPTS {
            if inner_guard.is_none() {
                match Client::connect_inner(&self.addr).await {
                    Ok(inner) => *inner_guard = Some(inner),
                    Err(e) => {
                        if i == MAX_ATTEMPTS - 1 { return Err(e); }
                        tokio::time::sleep(std::time::Duration::from_millis((i + 1) * 200)).await;
                        continue;
                    }
                }
            }

            let Some(inner) = inner_guard.as_mut() else {
                continue;
            };

            if inner.writer.write_all(format!("{}\n", cmd).as_bytes()).await.is_err() {
                *inner_guard = None;
                continue;
            }

            let mut resp = String::new();
            match inner.reader.read_line(&mut resp).await {
                Ok(0) | Err(_) => {
                    *inner_guard = None;
                    continue;
                }
                Ok(_) => {
                    let resp = resp.trim();
                    if let Some(msg) = resp.strip_prefix("ERR") {
                        return Err(Error::Internal(msg.trim_start().to_string()));
                    }
                    return Ok(resp.to_string());
                }
            }
        }

        Err(Error::Internal(format!("failed after {} attempts", MAX_ATTEMPTS)))
    }

    async fn connect_inner(addr: &str) -> Result<ClientInner> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(ClientInner {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn request_json<T: DeserializeOwned>(&self, cmd: String) -> Result<T> {
        let resp = self.send_and_receive(cmd).await?;
        let json_data = resp.strip_prefix("OK ").ok_or_else(|| Error::Internal("Invalid response".to_string()))?;
        Ok(serde_json::from_str(json_data)?)
    }

    pub async fn ping(&self) -> Result<()> {
        let resp = self.send_and_receive("PING".to_string()).await?;
        if resp != "PONG" {
            return Err(Error::Internal(format!("unexpected reply {:?}", resp)));
        }
        Ok(())
    }

    pub async fn write(&self, collection: &str, id: &str, record: &Value) -> Result<()> {
        let val_str = serde_json::to_string(record)?;
        self.send_and_receive(format!("WRITE {} {} {}", collection, id, val_str)).await?;
        Ok(())
    }

    pub async fn read(&self, collection: &str, id: &str) -> Result<Value> {
        self.request_json(format!("READ {} {}", collection, id)).await
    }

    pub async fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        self.request_json(format!("READ_ALL {}", collection)).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.send_and_receive(format!("DELETE {} {}", collection, id)).await?;
        Ok(())
    }

    pub async fn delete_all(&self, collection: &str) -> Result<()> {
        self.send_and_receive(format!("DELETE_ALL {}", collection)).await?;
        Ok(())
    }

    pub async fn search(&self, filter: &Filter) -> Result<SearchHits> {
        let filter_str = serde_json::to_string(filter)?;
        self.request_json(format!("SEARCH {}", filter_str)).await
    }

    pub async fn regex_search(&self, collection: &str, patterns: &HashMap<String, String>) -> Result<Vec<Value>> {
        let patterns_str = serde_json::to_string(patterns)?;
        self.request_json(format!("REGEX {} {}", collection, patterns_str)).await
    }

    pub async fn read_as<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T> {
        let val = self.read(collection, id).await?;
        Ok(serde_json::from_value(val)?)
    }

    pub async fn write_from<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        let val = serde_json::to_value(value)?;
        self.write(collection, id, &val).await
    }
}
