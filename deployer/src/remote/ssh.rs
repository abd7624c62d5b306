//! SSH implementation of the remote session gateway

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::models::deployment::SshConfig;
use crate::remote::{CommandOutput, LineBuffer, LineStream, RemoteSession, SessionConnector};

/// SSH client options
#[derive(Debug, Clone)]
pub struct Options {
    /// Timeout for TCP connect and key exchange
    pub connect_timeout: Duration,

    /// Idle timeout for an established session
    pub inactivity_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(1800),
        }
    }
}

/// Accepts any host key, like an auto-add known-hosts policy
struct TrustOnConnect;

#[async_trait]
impl client::Handler for TrustOnConnect {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Connects to remote hosts over SSH
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: Options,
}

impl SshConnector {
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self, config: &SshConfig) -> Result<Box<dyn RemoteSession>, DeployError> {
        info!("Connecting to {}@{}:{}...", config.username, config.host, config.port);

        let client_config = Arc::new(client::Config {
            inactivity_timeout: Some(self.options.inactivity_timeout),
            ..Default::default()
        });

        let connect = client::connect(
            client_config,
            (config.host.as_str(), config.port),
            TrustOnConnect,
        );
        let mut handle = tokio::time::timeout(self.options.connect_timeout, connect)
            .await
            .map_err(|_| {
                DeployError::Session(format!(
                    "Connection to {}:{} timed out after {:?}",
                    config.host, config.port, self.options.connect_timeout
                ))
            })?
            .map_err(|e| {
                DeployError::Session(format!(
                    "Unable to connect to {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;

        let authenticated = if let Some(key_file) = &config.key_file {
            debug!("Authenticating with key file {}", key_file);
            let key_pair = russh_keys::load_secret_key(key_file, None).map_err(|e| {
                DeployError::Session(format!("Unable to load key {}: {}", key_file, e))
            })?;
            handle
                .authenticate_publickey(config.username.clone(), Arc::new(key_pair))
                .await?
        } else if let Some(password) = config.password() {
            debug!("Authenticating with password");
            handle
                .authenticate_password(config.username.clone(), password)
                .await?
        } else {
            return Err(DeployError::Session(
                "No password or key file provided".to_string(),
            ));
        };

        if !authenticated {
            return Err(DeployError::Session(format!(
                "Authentication failed for {}@{}",
                config.username, config.host
            )));
        }

        info!("Connected to {}", config.host);
        Ok(Box::new(SshSession { handle }))
    }
}

/// An authenticated SSH session
pub struct SshSession {
    handle: Handle<TrustOnConnect>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput, DeployError> {
        // Commands may embed credentials, so only their size is logged
        debug!("exec ({} bytes)", command.len());
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        let exit_status = exit_status.unwrap_or_else(|| {
            warn!("No exit status received, treating command as failed");
            u32::MAX
        });

        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn stream(&self, command: &str) -> Result<LineStream, DeployError> {
        debug!("stream ({} bytes)", command.len());
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
        tokio::spawn(async move {
            let mut buffer = LineBuffer::new();
            while let Some(msg) = channel.wait().await {
                let data = match msg {
                    ChannelMsg::Data { data } => data,
                    ChannelMsg::ExtendedData { data, .. } => data,
                    ChannelMsg::Eof | ChannelMsg::Close => break,
                    _ => continue,
                };
                for line in buffer.push(&data) {
                    if tx.unbounded_send(line).is_err() {
                        // Reader went away
                        let _ = channel.close().await;
                        return;
                    }
                }
            }
            if let Some(line) = buffer.finish() {
                let _ = tx.unbounded_send(line);
            }
        });

        Ok(rx.boxed())
    }

    async fn close(&self) -> Result<(), DeployError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}
