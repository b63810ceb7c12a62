//! Host side of the component IPC channel
//!
//! [`ComponentIpcClient`] sends requests to a component process and
//! [`RemoteComponent`] presents each exposed component as a local
//! [`Component`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::debug;

use crate::component::{
    ApplicationHandle, ApplicationInfo, Component, ComponentError, ServiceSink, CONTRACT_ID,
};
use crate::ipc::protocol::{
    ComponentMessage, CorrelationId, RequestMessage, RequestPayload, ResponseMessage,
    ResponsePayload,
};
use crate::utils::with_custom_timeout;

/// Time a component gets to answer a lifecycle request
pub const DEFAULT_LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handshake result reported by a component process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAck {
    pub contract: String,
    pub components: Vec<String>,
}

/// IPC client the host uses to drive a component process
pub struct ComponentIpcClient<S> {
    reader: FramedRead<ReadHalf<S>, LengthDelimitedCodec>,
    writer: FramedWrite<WriteHalf<S>, LengthDelimitedCodec>,
    next_correlation_id: CorrelationId,
    lifecycle_timeout: Duration,
}

#[cfg(unix)]
impl ComponentIpcClient<tokio::net::UnixStream> {
    /// Connect to a component's IPC socket
    pub async fn connect<P: AsRef<std::path::Path>>(socket_path: P) -> Result<Self, ComponentError> {
        let stream = tokio::net::UnixStream::connect(socket_path.as_ref())
            .await
            .map_err(|e| ComponentError::Ipc(format!("Failed to connect to socket: {}", e)))?;
        debug!("Connected to component socket {:?}", socket_path.as_ref());
        Ok(Self::from_stream(stream))
    }
}

impl<S> ComponentIpcClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an already connected stream
    pub fn from_stream(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(read_half, LengthDelimitedCodec::new()),
            writer: FramedWrite::new(write_half, LengthDelimitedCodec::new()),
            next_correlation_id: 1,
            lifecycle_timeout: DEFAULT_LIFECYCLE_TIMEOUT,
        }
    }

    /// Bound on `RegisterServices` and `Activate` round trips
    pub fn with_lifecycle_timeout(mut self, timeout: Duration) -> Self {
        self.lifecycle_timeout = timeout;
        self
    }

    pub fn lifecycle_timeout(&self) -> Duration {
        self.lifecycle_timeout
    }

    fn next_correlation_id(&mut self) -> CorrelationId {
        let id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        id
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, payload: RequestPayload) -> Result<ResponsePayload, ComponentError> {
        let correlation_id = self.next_correlation_id();
        let bytes = ComponentMessage::Request(RequestMessage {
            correlation_id,
            payload,
        })
        .encode()?;

        self.writer
            .send(bytes)
            .await
            .map_err(|e| ComponentError::Ipc(format!("Failed to send request: {}", e)))?;
        debug!("Sent request with correlation_id={}", correlation_id);

        let response_bytes = self
            .reader
            .next()
            .await
            .ok_or_else(|| ComponentError::Ipc("Connection closed while waiting for response".to_string()))?
            .map_err(|e| ComponentError::Ipc(format!("Failed to read response: {}", e)))?;

        match ComponentMessage::decode(&response_bytes)? {
            ComponentMessage::Response(ResponseMessage {
                correlation_id: got, ..
            }) if got != correlation_id => Err(ComponentError::Ipc(format!(
                "Correlation ID mismatch: expected {}, got {}",
                correlation_id, got
            ))),
            ComponentMessage::Response(ResponseMessage {
                success: true,
                payload: Some(payload),
                ..
            }) => Ok(payload),
            ComponentMessage::Response(resp) => Err(ComponentError::Operation(
                resp.error
                    .unwrap_or_else(|| "component returned an empty response".to_string()),
            )),
            ComponentMessage::Request(_) => Err(ComponentError::Ipc(
                "Received unexpected message type".to_string(),
            )),
        }
    }

    /// Exchange contract identities and learn the exposed components
    pub async fn handshake(&mut self, instance_id: &str) -> Result<HandshakeAck, ComponentError> {
        let response = self
            .request(RequestPayload::Handshake {
                contract: CONTRACT_ID.to_string(),
                instance_id: instance_id.to_string(),
            })
            .await?;
        match response {
            ResponsePayload::HandshakeAck {
                contract,
                components,
            } => Ok(HandshakeAck {
                contract,
                components,
            }),
            other => Err(ComponentError::Ipc(format!(
                "Expected handshake acknowledgment, got {:?}",
                other
            ))),
        }
    }
}

/// Host-side proxy for one component living in another process
pub struct RemoteComponent<S> {
    name: String,
    client: Arc<Mutex<ComponentIpcClient<S>>>,
}

impl<S> RemoteComponent<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(name: impl Into<String>, client: Arc<Mutex<ComponentIpcClient<S>>>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    async fn lifecycle_request(&self, payload: RequestPayload) -> Result<ResponsePayload, ComponentError> {
        let mut client = self.client.lock().await;
        let timeout = client.lifecycle_timeout();
        match with_custom_timeout(client.request(payload), timeout).await {
            Ok(result) => result,
            Err(_) => Err(ComponentError::Ipc(format!(
                "component {} did not answer within {:?}",
                self.name, timeout
            ))),
        }
    }
}

/// Proxies for every component named in a handshake, sharing one channel
pub fn remote_components<S>(
    client: ComponentIpcClient<S>,
    names: &[String],
) -> Vec<Arc<dyn Component>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let client = Arc::new(Mutex::new(client));
    names
        .iter()
        .map(|name| Arc::new(RemoteComponent::new(name.clone(), client.clone())) as Arc<dyn Component>)
        .collect()
}

#[async_trait]
impl<S> Component for RemoteComponent<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_services(&self, services: &mut dyn ServiceSink) -> Result<(), ComponentError> {
        let response = self
            .lifecycle_request(RequestPayload::RegisterServices {
                component: self.name.clone(),
            })
            .await?;
        match response {
            ResponsePayload::Services(list) => {
                for mut service in list {
                    service.component = Some(self.name.clone());
                    services.add(service);
                }
                Ok(())
            }
            other => Err(ComponentError::Ipc(format!(
                "Expected service list, got {:?}",
                other
            ))),
        }
    }

    async fn activate(&self, application: &dyn ApplicationHandle) -> Result<(), ComponentError> {
        let response = self
            .lifecycle_request(RequestPayload::Activate {
                component: self.name.clone(),
                application: ApplicationInfo::from_handle(application),
            })
            .await?;
        match response {
            ResponsePayload::Activated => Ok(()),
            other => Err(ComponentError::Ipc(format!(
                "Expected activation acknowledgment, got {:?}",
                other
            ))),
        }
    }
}
