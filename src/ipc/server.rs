//! Component side of the IPC channel
//!
//! A component binary builds a [`ComponentServer`] from its components and
//! serves the host on the socket path it was launched with:
//!
//! ```rust,no_run
//! # async fn run(reports: impl component_loader::Component + 'static) -> Result<(), component_loader::ComponentError> {
//! use component_loader::ipc::ComponentServer;
//!
//! ComponentServer::new().with_component(reports).serve_from_args().await
//! # }
//! ```

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use crate::component::{Component, ComponentError, ServiceCollection, CONTRACT_ID};
use crate::ipc::protocol::{
    ComponentMessage, RequestMessage, RequestPayload, ResponseMessage, ResponsePayload,
};

/// Command-line flag carrying the socket path
pub const SOCKET_PATH_ARG: &str = "--socket-path";

/// Command-line flag carrying the isolation context id
pub const INSTANCE_ID_ARG: &str = "--instance-id";

/// Serves one or more components to the host
#[derive(Default)]
pub struct ComponentServer {
    components: Vec<Arc<dyn Component>>,
}

impl ComponentServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a component
    pub fn with_component<C: Component + 'static>(mut self, component: C) -> Self {
        self.components.push(Arc::new(component));
        self
    }

    /// Declared names of the exposed components
    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|c| c.name().to_string()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Component>> {
        self.components.iter().find(|c| c.name() == name)
    }

    /// Listen on the socket given by `--socket-path` and serve the host
    #[cfg(unix)]
    pub async fn serve_from_args(self) -> Result<(), ComponentError> {
        let args: Vec<String> = std::env::args().collect();
        let socket_path = args
            .iter()
            .position(|a| a == SOCKET_PATH_ARG)
            .and_then(|i| args.get(i + 1))
            .ok_or_else(|| ComponentError::Ipc(format!("missing {} argument", SOCKET_PATH_ARG)))?;
        self.serve(socket_path).await
    }

    /// Bind `socket_path`, accept the host connection and serve it
    #[cfg(unix)]
    pub async fn serve<P: AsRef<std::path::Path>>(self, socket_path: P) -> Result<(), ComponentError> {
        let socket_path = socket_path.as_ref();
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .map_err(|e| ComponentError::Ipc(format!("Failed to remove old socket: {}", e)))?;
        }
        let listener = tokio::net::UnixListener::bind(socket_path)
            .map_err(|e| ComponentError::Ipc(format!("Failed to bind socket: {}", e)))?;
        info!("Component IPC server listening on {:?}", socket_path);

        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| ComponentError::Ipc(format!("Failed to accept host connection: {}", e)))?;
        self.serve_connection(stream).await
    }

    /// Serve requests on a connected stream until the host disconnects
    pub async fn serve_connection<S>(self, stream: S) -> Result<(), ComponentError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
        let mut handshaken = false;

        while let Some(frame) = reader.next().await {
            let bytes = frame.map_err(|e| ComponentError::Ipc(format!("Failed to read request: {}", e)))?;
            let request = match ComponentMessage::decode(&bytes)? {
                ComponentMessage::Request(request) => request,
                ComponentMessage::Response(_) => {
                    warn!("Ignoring response message sent to component");
                    continue;
                }
            };

            let response = self.handle(request, &mut handshaken).await;
            writer
                .send(ComponentMessage::Response(response).encode()?)
                .await
                .map_err(|e| ComponentError::Ipc(format!("Failed to send response: {}", e)))?;
        }

        debug!("Host closed the component connection");
        Ok(())
    }

    async fn handle(&self, request: RequestMessage, handshaken: &mut bool) -> ResponseMessage {
        let id = request.correlation_id;
        match request.payload {
            RequestPayload::Handshake {
                contract,
                instance_id,
            } => {
                if contract != CONTRACT_ID {
                    warn!("Host contract {} differs from {}", contract, CONTRACT_ID);
                }
                info!("Handshake from host, context {}", instance_id);
                *handshaken = true;
                ResponseMessage::success(
                    id,
                    ResponsePayload::HandshakeAck {
                        contract: CONTRACT_ID.to_string(),
                        components: self.component_names(),
                    },
                )
            }
            _ if !*handshaken => ResponseMessage::error(id, "First message must be a handshake request"),
            RequestPayload::RegisterServices { component } => {
                let Some(target) = self.find(&component) else {
                    return ResponseMessage::error(id, format!("unknown component {}", component));
                };
                let mut services = ServiceCollection::new();
                match target.register_services(&mut services).await {
                    Ok(()) => ResponseMessage::success(id, ResponsePayload::Services(services.into_services())),
                    Err(e) => ResponseMessage::error(id, e.to_string()),
                }
            }
            RequestPayload::Activate {
                component,
                application,
            } => {
                let Some(target) = self.find(&component) else {
                    return ResponseMessage::error(id, format!("unknown component {}", component));
                };
                match target.activate(&application).await {
                    Ok(()) => ResponseMessage::success(id, ResponsePayload::Activated),
                    Err(e) => ResponseMessage::error(id, e.to_string()),
                }
            }
        }
    }
}
