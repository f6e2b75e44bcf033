//! HTTP/HTTPS server setup and lifecycle management.
//!
//! Loads credentials and the object store backend, then serves the editor
//! with optional TLS.

use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::fs::File;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::cli::Cli;
use crate::config::EditorConfig;
use crate::credentials::CredentialStore;
use crate::error::EditorError;
use crate::request_handler::RequestHandler;
use crate::router::route_request;
use crate::store;

/// Main server struct holding the parsed command line
pub struct Server {
    cli: Cli,
}

impl Server {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    #[cfg(test)]
    /// Create a server instance for testing that binds to a random available port
    pub(crate) async fn test_mode(
        root_dir: std::path::PathBuf,
        credentials_dir: std::path::PathBuf,
    ) -> Result<(Self, u16), EditorError> {
        use clap::Parser;
        use std::num::NonZeroU16;

        let host = "127.0.0.1".to_string();
        let addr = format!("{host}:0");
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let mut cli = Cli::parse_from(["bucketedit"]);
        cli.host = host;
        cli.port = NonZeroU16::try_from(port).map_err(|_| {
            EditorError::Configuration(format!("Failed to convert port '{port}' to NonZeroU16"))
        })?;
        cli.root_dir = root_dir;
        cli.credentials_dir = credentials_dir;
        cli.request_timeout = 5;
        Ok((Server::new(cli), port))
    }

    /// Everything the request path needs, shared by all connections.
    pub async fn build_handler(&self) -> Result<Arc<RequestHandler>, EditorError> {
        let config = Arc::new(EditorConfig::from_cli(&self.cli)?);

        let credentials = Arc::new(CredentialStore::new(&self.cli.credentials_dir)?);
        if credentials.is_empty() {
            if !self.cli.disable_auth {
                error!(credentials_dir = ?self.cli.credentials_dir, "No credentials loaded, refusing to start without --disable-auth");
                return Err(EditorError::Configuration(format!(
                    "no credentials found in {}",
                    self.cli.credentials_dir.display()
                )));
            }
            warn!("AUTHENTICATION IS DISABLED: every request will be allowed, including writes");
        }

        let store = store::from_cli(&self.cli).await?;
        Ok(Arc::new(RequestHandler::new(store, config, credentials)))
    }

    pub async fn run(self) -> Result<(), EditorError> {
        let addr = format!("{}:{}", self.cli.host, self.cli.port);
        let addr: SocketAddr = addr.parse().map_err(|err| {
            EditorError::Configuration(format!("Failed to parse address '{addr}': {err}"))
        })?;

        let handler = self.build_handler().await?;

        let use_tls = match (&self.cli.tls_cert, &self.cli.tls_key) {
            (Some(_), Some(_)) => true,
            (None, None) => false,
            _ => {
                error!(
                    "Both TLS certificate and key must be provided to enable TLS. Starting server without TLS."
                );
                false
            }
        };
        if use_tls {
            let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        }

        let listening_url = format!(
            "http{}://{}{}",
            if use_tls { "s" } else { "" },
            addr,
            handler.config().base_path
        );
        info!(
            backend = ?self.cli.backend,
            root_dir = ?self.cli.root_dir,
            credentials_dir = ?self.cli.credentials_dir,
            project = %self.cli.project,
            bucket = ?self.cli.bucket,
            address = %addr,
            tls_cert = ?self.cli.tls_cert,
            tls_key = ?self.cli.tls_key,
            "Starting bucketedit..."
        );

        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listening_url);

        if use_tls {
            let certs = self.load_cert().await.inspect_err(|e| {
                error!(tls_cert = ?self.cli.tls_cert, error = %e, "Failed to load TLS certificate");
            })?;
            let key = self.load_private_key().await.inspect_err(|e| {
                error!(tls_key = ?self.cli.tls_key, error = %e, "Failed to load TLS private key");
            })?;

            let mut tls_server_config = ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(certs, key)
                .inspect_err(|err| error!(error = ?err, "Failed to configure TLS server"))?;
            tls_server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
            let tls_acceptor = TlsAcceptor::from(Arc::new(tls_server_config));

            loop {
                let (stream, remote_addr) = listener.accept().await?;
                let tls_acceptor = tls_acceptor.clone();
                debug!(remote_addr = %remote_addr, "Accepted new connection");

                let handler = handler.clone();

                tokio::task::spawn(async move {
                    let tls_stream = match tls_acceptor.accept(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            error!(error = %e, remote_addr = %remote_addr, "TLS handshake failed");
                            return;
                        }
                    };
                    // Use auto builder to support both HTTP/1.1 and HTTP/2
                    if let Err(err) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(
                            TokioIo::new(tls_stream),
                            service_fn(move |req| {
                                let handler = handler.clone();
                                async move { route_request(req, remote_addr, handler).await }
                            }),
                        )
                        .await
                    {
                        debug!(error = %err, remote_addr = %remote_addr, "Error serving connection");
                    }
                });
            }
        } else {
            loop {
                let (stream, remote_addr) = listener.accept().await?;
                debug!(remote_addr = %remote_addr, "Accepted new connection");

                let io = TokioIo::new(stream);
                let handler = handler.clone();

                tokio::task::spawn(async move {
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(
                            io,
                            service_fn(move |req| {
                                let handler = Arc::clone(&handler);
                                async move { route_request(req, remote_addr, handler).await }
                            }),
                        )
                        .await
                    {
                        debug!(error = %err, remote_addr = %remote_addr, "Error serving connection");
                    }
                });
            }
        }
    }

    // Load public certificate from file.
    async fn load_cert(&self) -> Result<Vec<CertificateDer<'static>>, EditorError> {
        let Some(cert_file) = self.cli.tls_cert.as_ref() else {
            return Ok(vec![]);
        };
        let certfile = File::open(cert_file).await?;
        let mut reader = BufReader::new(certfile.into_std().await);
        rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EditorError::Configuration(format!("Failed to load certificates: {e}")))
    }

    // Load private key from file.
    async fn load_private_key(&self) -> Result<PrivateKeyDer<'static>, EditorError> {
        let Some(key_file) = self.cli.tls_key.as_ref() else {
            return Err(EditorError::Configuration(
                "TLS key file not specified".to_string(),
            ));
        };
        let keyfile = File::open(key_file).await?;
        let mut reader = BufReader::new(keyfile.into_std().await);

        match rustls_pemfile::private_key(&mut reader) {
            Ok(Some(key)) => Ok(key),
            Ok(None) => Err(EditorError::Configuration(
                "No private keys found in the key file".to_string(),
            )),
            Err(e) => Err(EditorError::Configuration(format!(
                "Failed to load private key: {e}"
            ))),
        }
    }
}
