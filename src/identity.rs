//! Network identity rotation and session handout.
//!
//! Rotation is global and non-reentrant: while one caller is asking the
//! anonymizing proxy for a new identity, every other caller waiting for a
//! session blocks until the rotation has completed. [`IdentityGate`]
//! enforces this with a write-preferring `RwLock`: rotations take the write
//! side, session handout takes the read side.
//!
//! # Configuration
//!
//! ```toml
//! [identity]
//! enabled = true
//! proxy_url = "socks5h://127.0.0.1:9050"
//! control_addr = "127.0.0.1:9051"
//! password_env = "TOR_CONTROLLER_PW"
//! ```

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::RwLock;

use crate::config::IdentityConfig;
use crate::error::IdentityError;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:78.0) Gecko/20100101 Firefox/78.0";

/// Asks the anonymizing network for a fresh identity.
#[async_trait]
pub trait IdentityControl: Send + Sync {
    async fn new_identity(&self) -> Result<(), IdentityError>;
}

/// Identity control that does nothing. Used when rotation is disabled.
pub struct NoopControl;

#[async_trait]
impl IdentityControl for NoopControl {
    async fn new_identity(&self) -> Result<(), IdentityError> {
        Ok(())
    }
}

/// Tor control-port client issuing `SIGNAL NEWNYM`.
pub struct TorControl {
    addr: String,
    password: Option<String>,
}

impl TorControl {
    pub fn new(addr: impl Into<String>, password: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            password,
        }
    }

    /// Read the control password from the named environment variable.
    pub fn from_env(addr: impl Into<String>, password_env: &str) -> Self {
        let password = std::env::var(password_env).ok();
        if password.is_none() {
            tracing::warn!(
                var = password_env,
                "control password not set, authenticating without one"
            );
        }
        Self::new(addr, password)
    }
}

#[async_trait]
impl IdentityControl for TorControl {
    async fn new_identity(&self) -> Result<(), IdentityError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| IdentityError::Connect {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        let auth = match &self.password {
            Some(pw) => format!("AUTHENTICATE \"{}\"\r\n", escape_control_string(pw)),
            None => "AUTHENTICATE\r\n".to_string(),
        };
        send(&mut write, &auth).await?;
        expect_ok(&mut reader).await.map_err(IdentityError::Auth)?;

        send(&mut write, "SIGNAL NEWNYM\r\n").await?;
        expect_ok(&mut reader).await.map_err(IdentityError::Signal)?;

        // Best effort; the identity has already changed.
        let _ = write.write_all(b"QUIT\r\n").await;
        Ok(())
    }
}

fn escape_control_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

async fn send(write: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> Result<(), IdentityError> {
    write
        .write_all(line.as_bytes())
        .await
        .map_err(|e| IdentityError::Signal(e.to_string()))
}

/// Read one (possibly multi-line) control reply and require status 250.
async fn expect_ok<R>(reader: &mut R) -> Result<(), String>
where
    R: AsyncBufReadExt + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| e.to_string())?;
        if n == 0 {
            return Err("control connection closed".to_string());
        }
        let line = line.trim_end();
        if !line.starts_with("250") {
            return Err(line.to_string());
        }
        // "250-" and "250+" continue the reply; "250 " ends it.
        if line.as_bytes().get(3) == Some(&b' ') || line.len() == 3 {
            return Ok(());
        }
    }
}

/// An HTTP session bound to the identity current when it was handed out.
#[derive(Debug, Clone)]
pub struct Session {
    pub client: reqwest::Client,
    pub generation: u64,
}

/// Serializes identity rotation and hands out sessions between rotations.
pub struct IdentityGate {
    control: Box<dyn IdentityControl>,
    proxy_url: Option<String>,
    generation: RwLock<u64>,
}

impl IdentityGate {
    pub fn new(control: Box<dyn IdentityControl>, proxy_url: Option<String>) -> Self {
        Self {
            control,
            proxy_url,
            generation: RwLock::new(0),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        if config.enabled {
            Self::new(
                Box::new(TorControl::from_env(
                    config.control_addr.clone(),
                    &config.password_env,
                )),
                Some(config.proxy_url.clone()),
            )
        } else {
            Self::new(Box::new(NoopControl), None)
        }
    }

    /// Rotate to a new identity. Returns the new identity generation.
    pub async fn rotate(&self) -> Result<u64, IdentityError> {
        let mut generation = self.generation.write().await;
        self.control.new_identity().await?;
        *generation += 1;
        tracing::debug!(generation = *generation, "network identity rotated");
        Ok(*generation)
    }

    /// Hand out a session, waiting for any in-flight rotation to finish.
    pub async fn session(&self) -> Result<Session, IdentityError> {
        let generation = self.generation.read().await;
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(url) = &self.proxy_url {
            let proxy =
                reqwest::Proxy::all(url).map_err(|e| IdentityError::Session(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| IdentityError::Session(e.to_string()))?;
        Ok(Session {
            client,
            generation: *generation,
        })
    }

    /// Rotate, then hand out a session on the fresh identity.
    pub async fn renewed_session(&self) -> Result<Session, IdentityError> {
        self.rotate().await?;
        self.session().await
    }

    pub async fn generation(&self) -> u64 {
        *self.generation.read().await
    }
}
