//! IPC message protocol
//!
//! Messages between the host and a component process. Each message is one
//! length-delimited frame holding a bincode-encoded [`ComponentMessage`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::component::{ApplicationInfo, ComponentError, ServiceDescriptor};

/// Correlation ID for matching requests with responses
pub type CorrelationId = u64;

/// Main IPC message wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComponentMessage {
    /// Request from host to component
    Request(RequestMessage),
    /// Response from component to host
    Response(ResponseMessage),
}

impl ComponentMessage {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            ComponentMessage::Request(req) => req.correlation_id,
            ComponentMessage::Response(resp) => resp.correlation_id,
        }
    }

    pub fn encode(&self) -> Result<Bytes, ComponentError> {
        Ok(Bytes::from(bincode::serialize(self)?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ComponentError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub correlation_id: CorrelationId,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestPayload {
    /// First message: host announces its contract
    Handshake { contract: String, instance_id: String },
    /// Run the first lifecycle phase of one component
    RegisterServices { component: String },
    /// Run the second lifecycle phase of one component
    Activate {
        component: String,
        application: ApplicationInfo,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub payload: Option<ResponsePayload>,
    pub error: Option<String>,
}

impl ResponseMessage {
    pub fn success(correlation_id: CorrelationId, payload: ResponsePayload) -> Self {
        Self {
            correlation_id,
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(correlation_id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Handshake acknowledgment listing every exposed component
    HandshakeAck {
        contract: String,
        components: Vec<String>,
    },
    Services(Vec<ServiceDescriptor>),
    Activated,
}
